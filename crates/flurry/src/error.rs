//! Error types for pipeline builds and deployments.

use snafu::prelude::*;

use flurry_core::topology::ResourceRef;

pub use flurry_core::error::{ConfigError, GraphError, ProviderError};

/// Top-level pipeline errors.
///
/// Each variant wraps its cause unchanged, so the resource kind and name
/// reported by the failing layer reach the caller verbatim.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Bad or missing input. Fix the configuration and rebuild.
    #[snafu(display("Configuration error: {source}"))]
    Configuration { source: ConfigError },

    /// A build step ran before something it needs was realized.
    #[snafu(display("Dependency error: {source}"))]
    Dependency { source: GraphError },

    /// The provisioning API rejected a call. Dependents were never submitted.
    #[snafu(display(
        "Provider error: {source} ({} dependent resource(s) aborted)",
        aborted.len()
    ))]
    Provider {
        source: ProviderError,
        aborted: Vec<ResourceRef>,
    },
}

impl PipelineError {
    /// Only provider errors flagged by the provider may be retried, and only by
    /// the engine behind the provisioning API.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Provider { source, .. } if source.is_retryable())
    }
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Configuration { source }
    }
}

impl From<GraphError> for PipelineError {
    fn from(source: GraphError) -> Self {
        PipelineError::Dependency { source }
    }
}

impl From<ProviderError> for PipelineError {
    fn from(source: ProviderError) -> Self {
        PipelineError::Provider {
            source,
            aborted: Vec::new(),
        }
    }
}
