//! Flurry: builds and provisions a streaming-ingestion pipeline.
//!
//! A pipeline is a primary bucket with an access-logging bucket, a delivery
//! stream that batches records into it, an inline transform invoked on each
//! batch, the roles and grants they act with, a log sink for delivery
//! diagnostics and an alarm on delivery freshness.
//!
//! Builders declare these as a resource graph; [`deploy`] hands the graph to
//! a [`ProvisioningApi`](flurry_core::topology::ProvisioningApi).

pub mod builder;
pub mod config;
pub mod deploy;
pub mod error;
pub mod policy;
pub mod provider;
pub mod registry;

pub use builder::{BuildContext, PipelineBuilder, PipelineOutputs, PipelineResult};
pub use config::{Config, PipelineConfig};
pub use deploy::{DeployedOutputs, check_report, deploy, resolve_outputs};
pub use error::PipelineError;
pub use provider::MemoryProvider;
pub use registry::{BuildLease, PipelineRegistry};

pub use flurry_core::{ConfigArgs, init_tracing};
