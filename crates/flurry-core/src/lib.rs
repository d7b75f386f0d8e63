//! Shared building blocks for flurry pipelines.
//!
//! - [`topology`] - the declarative resource graph and its scheduler
//! - [`config`] - multi-file YAML configuration with env interpolation
//! - [`error`] - the configuration/dependency/provider error taxonomy
//! - [`metrics`] - internal events emitted through the `metrics` facade

pub mod config;
pub mod error;
pub mod metrics;
pub mod topology;
pub mod tracing;

pub use config::{ComponentKey, ConfigArgs, ConfigPath, GlobalConfig, Mergeable};
pub use error::{ConfigError, GraphError, ProviderError};
pub use topology::{
    Attachment, Attribute, Property, ProvisioningApi, ResourceGraph, ResourceKind, ResourceNode,
    ResourceRef, Scheduler,
};
pub use self::tracing::init_tracing;
