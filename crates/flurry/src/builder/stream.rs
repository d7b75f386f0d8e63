//! The delivery stream and its observability attachments.
//!
//! A stream is assembled in a fixed order tracked by [`StreamState`]: its
//! destination, then its delivery identity, then the processing chain, then
//! the log sink. Only then is the stream declared, followed by the alarm.

use std::fmt;

use flurry_core::topology::{Attribute, Property, ResourceNode, ResourceRef};
use indexmap::IndexMap;
use tracing::{debug, warn};

use super::{
    BuildContext, IdentitySpec, SourceStreamSpec, StorageSpec, TransformSpec, kinds, non_empty,
};
use crate::config::{AlarmConfig, Comparator};
use crate::error::{ConfigError, GraphError, PipelineError};

const DESTINATION: &str = "extended_s3";

/// Build progress of one delivery stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StreamState {
    Unbuilt,
    DestinationBound,
    IdentityBound,
    ProcessingChainBound,
    ObservedLogSink,
    ObservedAlarm,
    Complete,
}

impl StreamState {
    /// The only state reachable from this one.
    pub fn next(self) -> Option<StreamState> {
        use StreamState::*;
        match self {
            Unbuilt => Some(DestinationBound),
            DestinationBound => Some(IdentityBound),
            IdentityBound => Some(ProcessingChainBound),
            ProcessingChainBound => Some(ObservedLogSink),
            ObservedLogSink => Some(ObservedAlarm),
            ObservedAlarm => Some(Complete),
            Complete => None,
        }
    }

    /// Move to `to`, which must directly follow the current state.
    pub fn advance(&mut self, stream: &str, to: StreamState) -> Result<(), GraphError> {
        if self.next() != Some(to) {
            return Err(GraphError::InvalidTransition {
                resource: stream.to_string(),
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        *self = to;
        Ok(())
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Unbuilt => "Unbuilt",
            StreamState::DestinationBound => "DestinationBound",
            StreamState::IdentityBound => "IdentityBound",
            StreamState::ProcessingChainBound => "ProcessingChainBound",
            StreamState::ObservedLogSink => "Observed(LogSink)",
            StreamState::ObservedAlarm => "Observed(Alarm)",
            StreamState::Complete => "Complete",
        };
        f.write_str(name)
    }
}

/// A log group and the log stream inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSink {
    group: ResourceRef,
    stream: ResourceRef,
    group_name: String,
    stream_name: String,
}

impl LogSink {
    pub fn group(&self) -> &ResourceRef {
        &self.group
    }

    pub fn stream(&self) -> &ResourceRef {
        &self.stream
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlarmSpec {
    pub alarm: ResourceRef,
    pub metric_name: String,
    pub comparator: Comparator,
    pub threshold: f64,
    pub evaluation_periods: u32,
    pub period_seconds: u32,
}

/// Names and settings for one delivery stream.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub name: String,
    pub log_group_name: String,
    pub log_stream_name: String,
    pub alarm_name: String,
    pub alarm: AlarmConfig,
    /// Stream to read records from, if any.
    pub source: Option<SourceStreamSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamSpec {
    stream: ResourceRef,
    state: StreamState,
    destination: ResourceRef,
    delivery_role: ResourceRef,
    processing_chain: Vec<ResourceRef>,
    log_sink: LogSink,
    alarm: AlarmSpec,
}

impl StreamSpec {
    pub fn stream(&self) -> &ResourceRef {
        &self.stream
    }

    pub fn name(&self) -> &str {
        self.stream.name()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn destination(&self) -> &ResourceRef {
        &self.destination
    }

    pub fn delivery_role(&self) -> &ResourceRef {
        &self.delivery_role
    }

    /// Functions invoked on each batch, in invocation order.
    pub fn processing_chain(&self) -> &[ResourceRef] {
        &self.processing_chain
    }

    pub fn log_sink(&self) -> &LogSink {
        &self.log_sink
    }

    pub fn alarm(&self) -> &AlarmSpec {
        &self.alarm
    }

    /// Reference external publishers target.
    pub fn callable(&self) -> Property {
        Property::reference(&self.stream, Attribute::Arn)
    }
}

/// The stream's destination configuration, filled in state order.
struct StreamDraft {
    name: String,
    state: StreamState,
    s3: IndexMap<String, Property>,
}

impl StreamDraft {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: StreamState::Unbuilt,
            s3: IndexMap::new(),
        }
    }

    fn bind_destination(&mut self, storage: &StorageSpec) -> Result<(), GraphError> {
        self.state.advance(&self.name, StreamState::DestinationBound)?;
        self.s3.insert(
            "bucket_arn".to_string(),
            Property::reference(storage.primary(), Attribute::Arn),
        );
        Ok(())
    }

    fn bind_identity(&mut self, identity: &IdentitySpec) -> Result<(), GraphError> {
        self.state.advance(&self.name, StreamState::IdentityBound)?;
        self.s3.insert(
            "role_arn".to_string(),
            Property::reference(identity.role(), Attribute::Arn),
        );
        Ok(())
    }

    fn bind_processing_chain(&mut self, chain: &[TransformSpec]) -> Result<(), GraphError> {
        self.state.advance(&self.name, StreamState::ProcessingChainBound)?;
        let processors = chain.iter().map(|transform| {
            Property::map([
                ("type", Property::from("Lambda")),
                (
                    "parameters",
                    Property::list([Property::map([
                        ("parameter_name", Property::from("LambdaArn")),
                        ("parameter_value", transform.callable()),
                    ])]),
                ),
            ])
        });
        self.s3.insert(
            "processing_configuration".to_string(),
            Property::map([
                ("enabled", Property::from(!chain.is_empty())),
                ("processors", Property::list(processors)),
            ]),
        );
        Ok(())
    }

    fn bind_log_sink(&mut self, sink: &LogSink) -> Result<(), GraphError> {
        self.state.advance(&self.name, StreamState::ObservedLogSink)?;
        self.s3.insert(
            "cloudwatch_logging_options".to_string(),
            Property::map([
                ("enabled", Property::from(true)),
                ("log_group_name", Property::reference(sink.group(), Attribute::Name)),
                ("log_stream_name", Property::reference(sink.stream(), Attribute::Name)),
            ]),
        );
        Ok(())
    }

    fn into_node(self, source: Option<(&SourceStreamSpec, &IdentitySpec)>) -> ResourceNode {
        let node = ResourceNode::new(kinds::DELIVERY_STREAM, &self.name)
            .property("name", &self.name)
            .property("destination", DESTINATION)
            .property("extended_s3_configuration", Property::Map(self.s3));

        match source {
            Some((source, identity)) => node.property(
                "kinesis_source_configuration",
                Property::map([
                    (
                        "kinesis_stream_arn",
                        Property::reference(source.stream(), Attribute::Arn),
                    ),
                    ("role_arn", Property::reference(identity.role(), Attribute::Arn)),
                ]),
            ),
            None => node,
        }
    }
}

pub struct StreamBuilder;

impl StreamBuilder {
    /// Declare the log sink, the delivery stream and its freshness alarm.
    ///
    /// Every input must already be realized in `ctx`; otherwise nothing is
    /// declared. An alarm that fails validation or collides is reported after
    /// the stream itself has been declared, and what was declared stays in
    /// `ctx`.
    pub fn build(
        ctx: &mut BuildContext,
        destination: &StorageSpec,
        delivery_identity: &IdentitySpec,
        processing_chain: &[TransformSpec],
        request: StreamRequest,
    ) -> Result<StreamSpec, PipelineError> {
        let name = non_empty(&request.name, || ConfigError::EmptyName {
            kind: kinds::DELIVERY_STREAM,
        })?;
        let stream = ctx.ensure_available(kinds::DELIVERY_STREAM, name)?;

        ctx.require(&stream, destination.primary())?;
        ctx.require(&stream, delivery_identity.role())?;
        for transform in processing_chain {
            ctx.require(&stream, transform.function())?;
        }
        if let Some(source) = &request.source {
            ctx.require(&stream, source.stream())?;
        }

        let log_sink = Self::declare_log_sink(ctx, &request)?;

        let mut draft = StreamDraft::new(name);
        draft.bind_destination(destination)?;
        draft.bind_identity(delivery_identity)?;
        draft.bind_processing_chain(processing_chain)?;
        draft.bind_log_sink(&log_sink)?;
        let mut state = draft.state;

        let node = draft.into_node(request.source.as_ref().map(|s| (s, delivery_identity)));
        let stream = ctx.declare(node)?;
        debug!(stream = %stream, chain = processing_chain.len(), "Declared delivery stream");

        let alarm = Self::declare_alarm(ctx, &stream, &request).inspect_err(|e| {
            warn!(stream = %stream, state = %state, error = %e, "Alarm not attached");
        })?;
        state.advance(name, StreamState::ObservedAlarm)?;
        state.advance(name, StreamState::Complete)?;

        Ok(StreamSpec {
            stream,
            state,
            destination: destination.primary().clone(),
            delivery_role: delivery_identity.role().clone(),
            processing_chain: processing_chain
                .iter()
                .map(|transform| transform.function().clone())
                .collect(),
            log_sink,
            alarm,
        })
    }

    fn declare_log_sink(
        ctx: &mut BuildContext,
        request: &StreamRequest,
    ) -> Result<LogSink, PipelineError> {
        let group_name = non_empty(&request.log_group_name, || ConfigError::EmptyName {
            kind: kinds::LOG_GROUP,
        })?;
        let stream_name = non_empty(&request.log_stream_name, || ConfigError::EmptyName {
            kind: kinds::LOG_STREAM,
        })?;

        let group = ctx.declare(
            ResourceNode::new(kinds::LOG_GROUP, group_name).property("name", group_name),
        )?;
        // Log stream names are scoped to their group.
        let stream = ctx.declare(
            ResourceNode::new(kinds::LOG_STREAM, format!("{group_name}:{stream_name}"))
                .property("name", stream_name)
                .property("log_group_name", Property::reference(&group, Attribute::Name)),
        )?;

        Ok(LogSink {
            group,
            stream,
            group_name: group_name.to_string(),
            stream_name: stream_name.to_string(),
        })
    }

    fn declare_alarm(
        ctx: &mut BuildContext,
        stream: &ResourceRef,
        request: &StreamRequest,
    ) -> Result<AlarmSpec, PipelineError> {
        let settings = &request.alarm;
        settings
            .validate()
            .map_err(|message| ConfigError::InvalidAlarm {
                pipeline: request.name.clone(),
                message,
            })?;

        let alarm = ctx.declare(
            ResourceNode::new(kinds::METRIC_ALARM, &request.alarm_name)
                .property("name", &request.alarm_name)
                .property("namespace", &settings.namespace)
                .property("metric_name", &settings.metric_name)
                .property("comparison_operator", settings.comparator.as_str())
                .property("threshold", settings.threshold)
                .property("evaluation_periods", settings.evaluation_periods)
                .property("period", settings.period_seconds)
                .property("statistic", settings.statistic.as_str())
                .property("treat_missing_data", "notBreaching")
                .property("actions_enabled", false)
                .property(
                    "dimensions",
                    Property::map([(
                        "DeliveryStreamName",
                        Property::reference(stream, Attribute::Name),
                    )]),
                ),
        )?;

        Ok(AlarmSpec {
            alarm,
            metric_name: settings.metric_name.clone(),
            comparator: settings.comparator,
            threshold: settings.threshold,
            evaluation_periods: settings.evaluation_periods,
            period_seconds: settings.period_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{
        IdentityBuilder, IdentityRequest, StorageBuilder, TransformBuilder, TransformRequest,
    };
    use crate::policy::ServicePrincipal;
    use serde_json::json;

    struct Inputs {
        storage: StorageSpec,
        delivery: IdentitySpec,
        transform: TransformSpec,
    }

    fn inputs(ctx: &mut BuildContext) -> Inputs {
        let storage = StorageBuilder::build(ctx, "acme").unwrap();
        let delivery = IdentityBuilder::build(
            ctx,
            IdentityRequest::new("delivery", ServicePrincipal::Firehose),
        )
        .unwrap();
        let role =
            IdentityBuilder::build(ctx, IdentityRequest::new("transform", ServicePrincipal::Lambda))
                .unwrap();
        let transform =
            TransformBuilder::build(ctx, &role, TransformRequest::new("processor", ".")).unwrap();
        Inputs {
            storage,
            delivery,
            transform,
        }
    }

    fn request(name: &str) -> StreamRequest {
        StreamRequest {
            name: name.to_string(),
            log_group_name: format!("/aws/kinesisfirehose/{name}"),
            log_stream_name: "S3Delivery".to_string(),
            alarm_name: format!("{name}-freshness"),
            alarm: AlarmConfig::default(),
            source: None,
        }
    }

    #[test]
    fn test_state_transitions_require_predecessor() {
        let mut state = StreamState::Unbuilt;
        let err = state
            .advance("clicks", StreamState::ProcessingChainBound)
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidTransition { .. }));
        assert_eq!(state, StreamState::Unbuilt);

        state.advance("clicks", StreamState::DestinationBound).unwrap();
        assert!(state.advance("clicks", StreamState::ProcessingChainBound).is_err());
        state.advance("clicks", StreamState::IdentityBound).unwrap();
        state.advance("clicks", StreamState::ProcessingChainBound).unwrap();
        assert_eq!(StreamState::Complete.next(), None);
    }

    #[test]
    fn test_complete_stream() {
        let mut ctx = BuildContext::new();
        let inputs = inputs(&mut ctx);
        let spec = StreamBuilder::build(
            &mut ctx,
            &inputs.storage,
            &inputs.delivery,
            std::slice::from_ref(&inputs.transform),
            request("clicks"),
        )
        .unwrap();

        assert_eq!(spec.state(), StreamState::Complete);
        assert_eq!(spec.processing_chain(), &[inputs.transform.function().clone()]);
        assert_eq!(spec.log_sink().group_name(), "/aws/kinesisfirehose/clicks");
        assert_eq!(spec.alarm().comparator, Comparator::GreaterThanOrEqualToThreshold);

        let plan = ctx.plan().unwrap();
        let group = plan.position(spec.log_sink().group()).unwrap();
        let log_stream = plan.position(spec.log_sink().stream()).unwrap();
        let stream = plan.position(spec.stream()).unwrap();
        let alarm = plan.position(&spec.alarm().alarm).unwrap();
        assert!(group < log_stream && log_stream < stream && stream < alarm);

        let config = &plan.steps[stream].properties["extended_s3_configuration"];
        assert_eq!(plan.steps[stream].properties["destination"], json!("extended_s3"));
        assert_eq!(config["bucket_arn"], json!("${aws:s3/bucket::acme.arn}"));
        assert_eq!(config["role_arn"], json!("${aws:iam/role::delivery.arn}"));
        assert_eq!(
            config["processing_configuration"]["processors"][0]["parameters"][0],
            json!({
                "parameter_name": "LambdaArn",
                "parameter_value": "${aws:lambda/function::processor.arn}:$LATEST"
            })
        );
        assert_eq!(
            config["cloudwatch_logging_options"]["log_stream_name"],
            json!("${aws:cloudwatch/logStream::/aws/kinesisfirehose/clicks:S3Delivery.name}")
        );
    }

    #[test]
    fn test_unrealized_transform_declares_nothing() {
        let mut scratch = BuildContext::new();
        let role = IdentityBuilder::build(
            &mut scratch,
            IdentityRequest::new("other", ServicePrincipal::Lambda),
        )
        .unwrap();
        let foreign =
            TransformBuilder::build(&mut scratch, &role, TransformRequest::new("foreign", "."))
                .unwrap();

        let mut ctx = BuildContext::new();
        let inputs = inputs(&mut ctx);
        let before = ctx.graph().len();

        let err = StreamBuilder::build(
            &mut ctx,
            &inputs.storage,
            &inputs.delivery,
            &[inputs.transform.clone(), foreign],
            request("clicks"),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Dependency {
                source: GraphError::UnrealizedDependency { .. }
            }
        ));
        assert_eq!(ctx.graph().len(), before);
    }

    #[test]
    fn test_invalid_alarm_leaves_stream_declared() {
        let mut ctx = BuildContext::new();
        let inputs = inputs(&mut ctx);
        let mut request = request("clicks");
        request.alarm.period_seconds = 45;

        let err = StreamBuilder::build(
            &mut ctx,
            &inputs.storage,
            &inputs.delivery,
            std::slice::from_ref(&inputs.transform),
            request,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Configuration {
                source: ConfigError::InvalidAlarm { .. }
            }
        ));
        assert!(ctx.is_realized(&ResourceRef::new(kinds::DELIVERY_STREAM, "clicks")));
        assert!(!ctx.is_realized(&ResourceRef::new(kinds::METRIC_ALARM, "clicks-freshness")));
    }

    #[test]
    fn test_empty_chain_disables_processing() {
        let mut ctx = BuildContext::new();
        let inputs = inputs(&mut ctx);
        let spec = StreamBuilder::build(
            &mut ctx,
            &inputs.storage,
            &inputs.delivery,
            &[],
            request("raw"),
        )
        .unwrap();

        let plan = ctx.plan().unwrap();
        let step = &plan.steps[plan.position(spec.stream()).unwrap()];
        assert_eq!(
            step.properties["extended_s3_configuration"]["processing_configuration"],
            json!({"enabled": false, "processors": []})
        );
        assert_eq!(spec.state(), StreamState::Complete);
    }
}
