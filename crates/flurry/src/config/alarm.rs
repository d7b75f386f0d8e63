//! Freshness alarm settings.

use serde::{Deserialize, Serialize};

pub const DEFAULT_METRIC_NAME: &str = "DeliveryToS3.DataFreshness";
pub const DEFAULT_NAMESPACE: &str = "AWS/Firehose";

fn default_metric_name() -> String {
    DEFAULT_METRIC_NAME.to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_threshold() -> f64 {
    60.0
}

fn default_evaluation_periods() -> u32 {
    2
}

fn default_period_seconds() -> u32 {
    120
}

/// How the metric is compared against the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    #[default]
    GreaterThanOrEqualToThreshold,
    GreaterThanThreshold,
    LessThanThreshold,
    LessThanOrEqualToThreshold,
}

impl Comparator {
    /// Name understood by the metrics service.
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::GreaterThanOrEqualToThreshold => "GreaterThanOrEqualToThreshold",
            Comparator::GreaterThanThreshold => "GreaterThanThreshold",
            Comparator::LessThanThreshold => "LessThanThreshold",
            Comparator::LessThanOrEqualToThreshold => "LessThanOrEqualToThreshold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Statistic {
    SampleCount,
    Average,
    Sum,
    Minimum,
    #[default]
    Maximum,
}

impl Statistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::SampleCount => "SampleCount",
            Statistic::Average => "Average",
            Statistic::Sum => "Sum",
            Statistic::Minimum => "Minimum",
            Statistic::Maximum => "Maximum",
        }
    }
}

/// Threshold watcher on the delivery freshness metric.
///
/// The alarm is advisory: it has no actions and never changes the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlarmConfig {
    #[serde(default = "default_metric_name")]
    pub metric_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub comparator: Comparator,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_evaluation_periods")]
    pub evaluation_periods: u32,
    #[serde(default = "default_period_seconds")]
    pub period_seconds: u32,
    #[serde(default)]
    pub statistic: Statistic,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            metric_name: default_metric_name(),
            namespace: default_namespace(),
            comparator: Comparator::default(),
            threshold: default_threshold(),
            evaluation_periods: default_evaluation_periods(),
            period_seconds: default_period_seconds(),
            statistic: Statistic::default(),
        }
    }
}

impl AlarmConfig {
    /// Check the settings against what the metrics service accepts.
    pub fn validate(&self) -> Result<(), String> {
        if self.metric_name.trim().is_empty() {
            return Err("metric_name cannot be empty".to_string());
        }
        if self.namespace.trim().is_empty() {
            return Err("namespace cannot be empty".to_string());
        }
        if !self.threshold.is_finite() {
            return Err(format!("threshold must be finite, got {}", self.threshold));
        }
        if self.evaluation_periods == 0 {
            return Err("evaluation_periods must be at least 1".to_string());
        }
        let period = self.period_seconds;
        if !(period == 10 || period == 30 || (period > 0 && period % 60 == 0)) {
            return Err(format!(
                "period_seconds must be 10, 30 or a multiple of 60, got {period}"
            ));
        }
        Ok(())
    }
}
