use flurry_core::topology::{Property, ResourceNode, ResourceRef};
use tracing::debug;

use super::{BuildContext, kinds, non_empty};
use crate::config::SourceStreamConfig;
use crate::error::{ConfigError, PipelineError};
use crate::policy::Statement;

/// A provisioned stream that feeds the delivery stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStreamSpec {
    stream: ResourceRef,
    shard_count: u32,
}

impl SourceStreamSpec {
    pub fn stream(&self) -> &ResourceRef {
        &self.stream
    }

    pub fn name(&self) -> &str {
        self.stream.name()
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    /// Statement letting a delivery role read from the stream named `name`.
    pub fn read_statement(name: &str) -> Statement {
        Statement::allow(
            [
                "kinesis:DescribeStream",
                "kinesis:GetShardIterator",
                "kinesis:GetRecords",
                "kinesis:ListShards",
            ],
            [format!("arn:aws:kinesis:*:*:stream/{name}")],
        )
    }
}

pub struct SourceStreamBuilder;

impl SourceStreamBuilder {
    pub fn build(
        ctx: &mut BuildContext,
        name: &str,
        config: &SourceStreamConfig,
    ) -> Result<SourceStreamSpec, PipelineError> {
        let name = non_empty(name, || ConfigError::EmptyName {
            kind: kinds::SOURCE_STREAM,
        })?;
        config
            .validate()
            .map_err(|message| ConfigError::InvalidSourceStream {
                pipeline: name.to_string(),
                message,
            })?;

        let stream = ctx.declare(
            ResourceNode::new(kinds::SOURCE_STREAM, name)
                .property("name", name)
                .property("shard_count", config.shard_count)
                .property("retention_period", config.retention_hours)
                .property("shard_level_metrics", Property::list(&config.shard_level_metrics))
                .property(
                    "stream_mode_details",
                    Property::map([("stream_mode", "PROVISIONED")]),
                ),
        )?;

        debug!(stream = name, shards = config.shard_count, "Declared source stream");
        Ok(SourceStreamSpec {
            stream,
            shard_count: config.shard_count,
        })
    }
}
