//! Realizing built pipelines through a provisioning API.

use flurry_core::config::GlobalConfig;
use flurry_core::topology::{DeploymentReport, ProvisioningApi, ResourceGraph, Scheduler};
use serde::Serialize;
use tracing::{info, warn};

use crate::builder::PipelineOutputs;
use crate::error::PipelineError;

/// Pipeline outputs with live identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployedOutputs {
    pub bucket_name: String,
    pub stream_id: String,
    pub stream_arn: String,
}

/// Submit `graph` to `provider` in dependency order.
///
/// The report is returned even when resources failed, so callers can see what
/// exists. Use [`check_report`] to turn failures into an error.
pub async fn deploy<P>(
    provider: &P,
    graph: &ResourceGraph,
    global: &GlobalConfig,
) -> Result<DeploymentReport, PipelineError>
where
    P: ProvisioningApi + ?Sized,
{
    info!(resources = graph.len(), "Deploying");
    let report = Scheduler::new(provider)
        .with_concurrency(global.total_concurrency)
        .deploy(graph)
        .await?;

    for resource in report.aborted() {
        warn!(resource = %resource, "Not submitted: an upstream resource failed");
    }
    Ok(report)
}

/// Fail with the first provider error, unchanged, if anything was not created.
pub fn check_report(report: &DeploymentReport) -> Result<(), PipelineError> {
    match report.first_failure() {
        Some(source) => Err(PipelineError::Provider {
            source: source.clone(),
            aborted: report.aborted().cloned().collect(),
        }),
        None => Ok(()),
    }
}

/// Read a pipeline's outputs from a deployment, if its stream was created.
pub fn resolve_outputs(
    outputs: &PipelineOutputs,
    report: &DeploymentReport,
) -> Option<DeployedOutputs> {
    let stream = report.resolved(&outputs.stream)?;
    Some(DeployedOutputs {
        bucket_name: outputs.bucket_name.clone(),
        stream_id: stream.id.clone(),
        stream_arn: stream.arn.clone(),
    })
}
