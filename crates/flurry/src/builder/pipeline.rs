//! Composes the four builders into one pipeline.

use std::time::Instant;

use flurry_core::emit;
use flurry_core::metrics::events::BuildCompleted;
use flurry_core::topology::{Attribute, Property, ResourceGraph, ResourceRef};
use serde::Serialize;
use tracing::{error, info, warn};

use super::{
    BuildContext, IdentityBuilder, IdentityRequest, IdentitySpec, SourceStreamBuilder,
    SourceStreamSpec, StorageBuilder, StorageSpec, StreamBuilder, StreamRequest, StreamSpec,
    TransformBuilder, TransformRequest, TransformSpec, non_empty,
};
use crate::config::PipelineConfig;
use crate::error::{ConfigError, PipelineError};
use crate::policy::{PolicyGrant, ServicePrincipal, Statement};

/// Values other systems consume once a pipeline exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutputs {
    pub bucket_name: String,
    pub stream: ResourceRef,
}

impl PipelineOutputs {
    pub fn stream_id(&self) -> Property {
        Property::reference(&self.stream, Attribute::Id)
    }

    /// What a record publisher targets.
    pub fn stream_callable(&self) -> Property {
        Property::reference(&self.stream, Attribute::Arn)
    }
}

/// Every spec produced for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub name: String,
    pub storage: StorageSpec,
    pub source: Option<SourceStreamSpec>,
    pub delivery_identity: IdentitySpec,
    pub transform_identity: IdentitySpec,
    pub transform: TransformSpec,
    pub stream: StreamSpec,
    pub outputs: PipelineOutputs,
}

/// Builds a complete pipeline graph from a [`PipelineConfig`].
pub struct PipelineBuilder<'a> {
    config: &'a PipelineConfig,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Build into a fresh graph.
    pub fn build(&self) -> Result<(ResourceGraph, PipelineResult), PipelineError> {
        let mut ctx = BuildContext::new();
        let result = self.build_into(&mut ctx)?;
        Ok((ctx.into_graph(), result))
    }

    /// Build into an existing context, e.g. one shared by several pipelines.
    ///
    /// Storage, identities and the optional source stream do not depend on
    /// each other and are all attempted. The transform is skipped if its role
    /// failed, the stream if any of its inputs failed. The first error, in
    /// that order, is returned unchanged.
    pub fn build_into(&self, ctx: &mut BuildContext) -> Result<PipelineResult, PipelineError> {
        let started = Instant::now();
        let config = self.config;
        let name = non_empty(config.name(), || ConfigError::EmptyPipelineName)?;
        let failed = |component: &'static str| {
            move |e: &PipelineError| {
                error!(pipeline = name, component, error = %e, "Component failed")
            }
        };

        let storage = StorageBuilder::build(ctx, config.primary_bucket_name())
            .inspect_err(failed("storage"));
        let source = config
            .source_stream
            .as_ref()
            .map(|source| SourceStreamBuilder::build(ctx, &config.source_stream_name(), source))
            .transpose()
            .inspect_err(failed("source_stream"));
        let delivery_identity = IdentityBuilder::build(ctx, self.delivery_identity_request())
            .inspect_err(failed("delivery_identity"));
        let transform = IdentityBuilder::build(
            ctx,
            IdentityRequest::new(config.transform_role_name(), ServicePrincipal::Lambda)
                .grants(config.transform.grants.iter().cloned()),
        )
        .inspect_err(|e| {
            failed("transform_identity")(e);
            aborted(name, "transform");
        })
        .and_then(|identity| {
            let transform = TransformBuilder::build(ctx, &identity, self.transform_request())
                .inspect_err(failed("transform"))?;
            Ok((identity, transform))
        });

        if storage.is_err() || source.is_err() || delivery_identity.is_err() || transform.is_err() {
            aborted(name, "stream");
        }
        let storage = storage?;
        let source = source?;
        let delivery_identity = delivery_identity?;
        let (transform_identity, transform) = transform?;

        let stream = StreamBuilder::build(
            ctx,
            &storage,
            &delivery_identity,
            std::slice::from_ref(&transform),
            StreamRequest {
                name: config.delivery_stream_name().to_string(),
                log_group_name: config.log_group_name(),
                log_stream_name: config.log_stream_name(),
                alarm_name: config.alarm_name(),
                alarm: config.alarm.clone(),
                source: source.clone(),
            },
        )
        .inspect_err(failed("stream"))?;

        emit!(BuildCompleted {
            duration: started.elapsed(),
            nodes: ctx.graph().len(),
            pipeline: name.to_string(),
        });
        info!(
            pipeline = name,
            bucket = storage.primary_name(),
            stream = stream.name(),
            "Pipeline built"
        );

        let outputs = PipelineOutputs {
            bucket_name: storage.primary_name().to_string(),
            stream: stream.stream().clone(),
        };
        Ok(PipelineResult {
            name: name.to_string(),
            storage,
            source,
            delivery_identity,
            transform_identity,
            transform,
            stream,
            outputs,
        })
    }

    fn transform_request(&self) -> TransformRequest {
        let transform = &self.config.transform;
        TransformRequest {
            name: self.config.function_name(),
            package: transform.package.clone(),
            runtime: transform.runtime.clone(),
            handler: transform.handler.clone(),
            timeout_seconds: transform.timeout_seconds,
            qualifier: transform.qualifier.clone(),
        }
    }

    /// The delivery role may write to the bucket, invoke the processor and
    /// write delivery logs. Resources are addressed by their derived names.
    fn delivery_identity_request(&self) -> IdentityRequest {
        let config = self.config;
        let bucket = config.primary_bucket_name();
        let mut statements = vec![
            Statement::allow(
                [
                    "s3:AbortMultipartUpload",
                    "s3:GetBucketLocation",
                    "s3:GetObject",
                    "s3:ListBucket",
                    "s3:ListBucketMultipartUploads",
                    "s3:PutObject",
                ],
                [format!("arn:aws:s3:::{bucket}"), format!("arn:aws:s3:::{bucket}/*")],
            ),
            Statement::allow(
                ["lambda:InvokeFunction", "lambda:GetFunctionConfiguration"],
                [format!("arn:aws:lambda:*:*:function:{}*", config.function_name())],
            ),
            Statement::allow(
                ["logs:PutLogEvents"],
                [format!(
                    "arn:aws:logs:*:*:log-group:{}:log-stream:*",
                    config.log_group_name()
                )],
            ),
        ];
        if config.source_stream.is_some() {
            statements.push(SourceStreamSpec::read_statement(&config.source_stream_name()));
        }

        IdentityRequest::new(config.delivery_role_name(), ServicePrincipal::Firehose)
            .grant(PolicyGrant::inline(
                format!("{}-delivery", config.name()),
                statements,
            ))
            .grants(config.extra_grants.iter().cloned())
    }
}

fn aborted(pipeline: &str, component: &'static str) {
    warn!(pipeline, component, "Component aborted: an upstream component failed");
}
