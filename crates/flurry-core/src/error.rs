//! Common error types shared by the graph, scheduler and configuration layers.
//!
//! The taxonomy mirrors how callers react:
//! - [`ConfigError`]: bad or missing input, never retryable.
//! - [`GraphError`]: an upstream resource was not declared before something
//!   referenced it. Always a builder-ordering bug.
//! - [`ProviderError`]: the provisioning API rejected a call.

use std::fmt;

use snafu::prelude::*;

use crate::topology::{ResourceKind, ResourceRef};

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Bucket name is empty.
    #[snafu(display("Bucket name cannot be empty"))]
    EmptyBucketName,

    /// Pipeline name is empty.
    #[snafu(display("Pipeline name cannot be empty"))]
    EmptyPipelineName,

    /// A derived or requested resource name is empty.
    #[snafu(display("{kind} name cannot be empty"))]
    EmptyName { kind: ResourceKind },

    /// A resource name is already reserved in the current build.
    #[snafu(display("Name collision: {kind} '{name}' is already declared in this build"))]
    NameCollision { kind: ResourceKind, name: String },

    /// Transform timeout is out of range.
    #[snafu(display("Invalid transform timeout {seconds}s: must be between 1 and {max}"))]
    InvalidTimeout { seconds: i64, max: u32 },

    /// Alarm settings are not accepted by the metrics service.
    #[snafu(display("Invalid alarm for '{pipeline}': {message}"))]
    InvalidAlarm { pipeline: String, message: String },

    /// Source stream settings are invalid.
    #[snafu(display("Invalid source stream for '{pipeline}': {message}"))]
    InvalidSourceStream { pipeline: String, message: String },

    /// Another build for the same pipeline is in flight.
    #[snafu(display("Pipeline '{pipeline}' is already being built"))]
    PipelineInUse { pipeline: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file: {source}"))]
    ReadFile { source: std::io::Error },

    /// Two pipelines claim the same exclusive resource.
    #[snafu(display("Resource conflict: {message}"))]
    ResourceConflict { message: String },

    /// Duplicate component keys found across config files.
    #[snafu(display("Duplicate pipeline keys: {}", keys.join(", ")))]
    DuplicateComponents { keys: Vec<String> },

    /// Unsupported config file format.
    #[snafu(display("Unsupported config format for {}: only .yaml/.yml supported", path.display()))]
    UnsupportedFormat { path: std::path::PathBuf },

    /// Failed to read configuration directory.
    #[snafu(display("Failed to read directory {}", path.display()))]
    ReadDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Multiple configuration errors occurred.
    #[snafu(display("Multiple config errors:\n{}", errors.join("\n")))]
    MultipleErrors { errors: Vec<String> },
}

// ============ Graph Errors ============

/// Ordering errors raised while declaring or scheduling the resource graph.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum GraphError {
    /// A node references something that has not been declared yet.
    #[snafu(display("{resource} depends on {missing}, which has not been realized"))]
    UnrealizedDependency {
        resource: ResourceRef,
        missing: ResourceRef,
    },

    /// The same node was inserted twice.
    #[snafu(display("{resource} is already part of the graph"))]
    DuplicateNode { resource: ResourceRef },

    /// The dependency edges do not form a DAG.
    #[snafu(display("Dependency cycle detected among: {}", members.join(", ")))]
    Cycle { members: Vec<String> },

    /// A state machine was asked to skip or repeat a step.
    #[snafu(display("{resource}: cannot move from {from} to {to}"))]
    InvalidTransition {
        resource: String,
        from: String,
        to: String,
    },

    /// A property reference could not be resolved at submission time.
    #[snafu(display("{resource}: reference to {target} has no resolved value"))]
    UnresolvedReference {
        resource: ResourceRef,
        target: ResourceRef,
    },
}

// ============ Provider Errors ============

/// A create, resolve or attach call rejected by the provisioning API.
///
/// Retryable errors may be retried by the engine behind the API. The core
/// surfaces them unchanged and never retries on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderError {
    pub kind: ResourceKind,
    pub name: String,
    pub message: String,
    pub retryable: bool,
}

impl ProviderError {
    /// Build an error for the given resource.
    pub fn new(resource: &ResourceRef, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind: resource.kind(),
            name: resource.name().to_string(),
            message: message.into(),
            retryable,
        }
    }

    /// Whether the engine behind the API may retry the call.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Provider rejected {} '{}' (retryable: {}): {}",
            self.kind, self.name, self.retryable, self.message
        )
    }
}

impl std::error::Error for ProviderError {}
