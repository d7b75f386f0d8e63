//! Configuration for flurry pipelines.

mod alarm;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use alarm::{AlarmConfig, Comparator, Statistic};
pub use flurry_core::config::{
    ComponentKey, ConfigPath, GlobalConfig, Mergeable, conflicts, describe_conflicts,
    interpolate, load_from_paths,
};

use flurry_core::topology::ResourceRef;

use crate::builder::{
    DEFAULT_HANDLER, DEFAULT_QUALIFIER, DEFAULT_RUNTIME, LOGGING_SUFFIX, effective_timeout, kinds,
};
use crate::error::ConfigError;
use crate::policy::{PolicyGrant, managed};

/// Default log stream receiving delivery diagnostics.
pub const DEFAULT_LOG_STREAM: &str = "S3Delivery";

const SHARD_LEVEL_METRICS: [&str; 5] = [
    "IncomingBytes",
    "OutgoingBytes",
    "IteratorAgeMilliseconds",
    "ReadProvisionedThroughputExceeded",
    "WriteProvisionedThroughputExceeded",
];

fn default_package() -> String {
    "./lambdas/data-interceptor".to_string()
}

fn default_runtime() -> String {
    DEFAULT_RUNTIME.to_string()
}

fn default_handler() -> String {
    DEFAULT_HANDLER.to_string()
}

fn default_qualifier() -> String {
    DEFAULT_QUALIFIER.to_string()
}

fn default_transform_grants() -> Vec<PolicyGrant> {
    vec![
        PolicyGrant::managed(managed::LAMBDA_FULL_ACCESS),
        PolicyGrant::managed(managed::FIREHOSE_FULL_ACCESS),
    ]
}

fn default_shard_count() -> u32 {
    1
}

fn default_shard_level_metrics() -> Vec<String> {
    SHARD_LEVEL_METRICS.iter().map(|m| m.to_string()).collect()
}

fn default_retention_hours() -> u32 {
    24
}

/// The inline transform invoked on every delivered batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformConfig {
    /// Path to the packaged function code.
    #[serde(default = "default_package")]
    pub package: String,
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default = "default_handler")]
    pub handler: String,
    /// Defaults to 30 seconds; must be between 1 and 900.
    #[serde(default)]
    pub timeout_seconds: Option<i64>,
    #[serde(default = "default_qualifier")]
    pub qualifier: String,
    /// Grants for the transform's execution role. A logging grant is added
    /// automatically when none of these permits execution logging.
    #[serde(default = "default_transform_grants")]
    pub grants: Vec<PolicyGrant>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            package: default_package(),
            runtime: default_runtime(),
            handler: default_handler(),
            timeout_seconds: None,
            qualifier: default_qualifier(),
            grants: default_transform_grants(),
        }
    }
}

/// Where delivery diagnostics are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSinkConfig {
    /// Defaults to `/aws/kinesisfirehose/<pipeline>`.
    #[serde(default)]
    pub group_name: Option<String>,
    /// Defaults to `S3Delivery`.
    #[serde(default)]
    pub stream_name: Option<String>,
}

/// A provisioned-mode stream the delivery stream reads from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceStreamConfig {
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,
    #[serde(default = "default_shard_level_metrics")]
    pub shard_level_metrics: Vec<String>,
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u32,
}

impl Default for SourceStreamConfig {
    fn default() -> Self {
        Self {
            shard_count: default_shard_count(),
            shard_level_metrics: default_shard_level_metrics(),
            retention_hours: default_retention_hours(),
        }
    }
}

impl SourceStreamConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.shard_count == 0 {
            return Err("shard_count must be at least 1".to_string());
        }
        if !(24..=8760).contains(&self.retention_hours) {
            return Err(format!(
                "retention_hours must be between 24 and 8760, got {}",
                self.retention_hours
            ));
        }
        Ok(())
    }
}

/// Configuration for one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Base name for storage. The logging bucket is `<bucket_name>-logging`.
    pub bucket_name: String,
    /// Used to derive role, function, log and alarm names. Defaults to the
    /// pipeline's key.
    #[serde(default)]
    pub pipeline_name: String,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub alarm: AlarmConfig,
    #[serde(default)]
    pub logging: LogSinkConfig,
    #[serde(default)]
    pub source_stream: Option<SourceStreamConfig>,
    /// Additional grants for the delivery role.
    #[serde(default)]
    pub extra_grants: Vec<PolicyGrant>,
}

impl PipelineConfig {
    pub fn new(bucket_name: impl Into<String>, pipeline_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            pipeline_name: pipeline_name.into(),
            transform: TransformConfig::default(),
            alarm: AlarmConfig::default(),
            logging: LogSinkConfig::default(),
            source_stream: None,
            extra_grants: Vec::new(),
        }
    }

    /// The pipeline name, without surrounding whitespace.
    pub fn name(&self) -> &str {
        self.pipeline_name.trim()
    }

    /// The primary bucket name, without surrounding whitespace.
    ///
    /// Every derived name and grant goes through this and [`name`](Self::name)
    /// so they agree with what the builders declare.
    pub fn primary_bucket_name(&self) -> &str {
        self.bucket_name.trim()
    }

    pub fn logging_bucket_name(&self) -> String {
        format!("{}{LOGGING_SUFFIX}", self.primary_bucket_name())
    }

    pub fn delivery_stream_name(&self) -> &str {
        self.name()
    }

    pub fn delivery_role_name(&self) -> String {
        format!("{}-delivery-role", self.name())
    }

    pub fn transform_role_name(&self) -> String {
        format!("{}-transform-role", self.name())
    }

    pub fn function_name(&self) -> String {
        format!("{}-processor", self.name())
    }

    pub fn log_group_name(&self) -> String {
        match self.logging.group_name.as_deref().map(str::trim) {
            Some(group) => group.to_string(),
            None => format!("/aws/kinesisfirehose/{}", self.name()),
        }
    }

    pub fn log_stream_name(&self) -> String {
        self.logging
            .stream_name
            .as_deref()
            .unwrap_or(DEFAULT_LOG_STREAM)
            .trim()
            .to_string()
    }

    pub fn alarm_name(&self) -> String {
        format!("{}-freshness", self.name())
    }

    pub fn source_stream_name(&self) -> String {
        format!("{}-source", self.name())
    }

    /// Strip surrounding whitespace from every configured name.
    pub fn normalize(&mut self) {
        self.bucket_name = self.primary_bucket_name().to_string();
        self.pipeline_name = self.name().to_string();
        for name in [&mut self.logging.group_name, &mut self.logging.stream_name]
            .into_iter()
            .flatten()
        {
            *name = name.trim().to_string();
        }
    }

    /// Exclusive resources this pipeline will create.
    ///
    /// Two pipelines claiming the same resource cannot coexist.
    pub fn resources(&self) -> Vec<ResourceRef> {
        let mut claims = vec![
            ResourceRef::new(kinds::BUCKET, self.primary_bucket_name()),
            ResourceRef::new(kinds::BUCKET, self.logging_bucket_name()),
            ResourceRef::new(kinds::ROLE, self.delivery_role_name()),
            ResourceRef::new(kinds::ROLE, self.transform_role_name()),
            ResourceRef::new(kinds::FUNCTION, self.function_name()),
            ResourceRef::new(kinds::LOG_GROUP, self.log_group_name()),
            ResourceRef::new(kinds::DELIVERY_STREAM, self.delivery_stream_name()),
            ResourceRef::new(kinds::METRIC_ALARM, self.alarm_name()),
        ];
        if self.source_stream.is_some() {
            claims.push(ResourceRef::new(kinds::SOURCE_STREAM, self.source_stream_name()));
        }
        claims
    }

    /// Every problem with this pipeline's settings.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.name().is_empty() {
            errors.push(ConfigError::EmptyPipelineName);
        }
        if self.primary_bucket_name().is_empty() {
            errors.push(ConfigError::EmptyBucketName);
        }
        if let Err(e) = effective_timeout(self.transform.timeout_seconds) {
            errors.push(e);
        }
        if let Err(message) = self.alarm.validate() {
            errors.push(ConfigError::InvalidAlarm {
                pipeline: self.name().to_string(),
                message,
            });
        }
        if let Some(Err(message)) = self.source_stream.as_ref().map(SourceStreamConfig::validate) {
            errors.push(ConfigError::InvalidSourceStream {
                pipeline: self.name().to_string(),
                message,
            });
        }

        errors
    }
}

/// Main configuration for flurry.
///
/// # Example
///
/// ```yaml
/// pipelines:
///   clicks:
///     bucket_name: acme
///     transform:
///       timeout_seconds: 60
///     alarm:
///       threshold: 300
///
/// global:
///   total_concurrency: 4
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipelines: IndexMap<ComponentKey, PipelineConfig>,
    #[serde(default)]
    pub global: GlobalConfig,
}

impl Mergeable for Config {
    type Key = ComponentKey;
    type Component = PipelineConfig;

    fn components_mut(&mut self) -> &mut IndexMap<Self::Key, Self::Component> {
        &mut self.pipelines
    }

    fn global_mut(&mut self) -> &mut GlobalConfig {
        &mut self.global
    }

    fn parse_yaml(contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(|source| ConfigError::YamlParse { source })
    }
}

impl Config {
    /// Load configuration from multiple paths (files or directories).
    pub fn from_paths(paths: &[ConfigPath]) -> Result<Self, ConfigError> {
        let mut config: Self = load_from_paths(paths)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let result = interpolate(contents);
        if !result.is_ok() {
            return Err(ConfigError::EnvInterpolation {
                message: result.errors.join("\n"),
            });
        }

        let mut config = Self::parse_yaml(&result.text)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Trim names and default each pipeline's name to its key.
    fn normalize(&mut self) {
        for (key, pipeline) in self.pipelines.iter_mut() {
            pipeline.normalize();
            if pipeline.pipeline_name.is_empty() {
                pipeline.pipeline_name = key.id().to_string();
            }
        }
    }

    /// Validate every pipeline, then check that no two pipelines claim the
    /// same resource.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let errors: Vec<String> = self
            .pipelines
            .iter()
            .flat_map(|(key, pipeline)| {
                pipeline
                    .validate()
                    .into_iter()
                    .map(move |e| format!("pipeline '{key}': {e}"))
            })
            .collect();
        if !errors.is_empty() {
            return Err(ConfigError::MultipleErrors { errors });
        }

        let found = conflicts(
            self.pipelines
                .iter()
                .map(|(key, pipeline)| (key.id().to_string(), pipeline.resources())),
        );
        if !found.is_empty() {
            return Err(ConfigError::ResourceConflict {
                message: describe_conflicts(&found),
            });
        }

        Ok(())
    }

    pub fn pipelines(&self) -> impl Iterator<Item = (&ComponentKey, &PipelineConfig)> {
        self.pipelines.iter()
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }
}
