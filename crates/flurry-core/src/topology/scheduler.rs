//! Wave-by-wave dispatch of a resource graph to a provisioning API.
//!
//! Nodes in the same wave have no path between them and are submitted
//! concurrently (bounded by the configured limit). A node whose dependency
//! failed, or was itself aborted, is marked [`NodeStatus::Aborted`] and never
//! submitted. Resources that were already created are left in place: rollback
//! and reconciliation belong to the engine behind the API.

use std::time::Instant;

use futures::StreamExt;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::graph::{ResourceGraph, ResourceNode, ResourceRef};
use super::provider::{CreateRequest, ProvisioningApi, ResolvedResource, ResourceHandle};
use crate::emit;
use crate::error::{GraphError, ProviderError};
use crate::metrics::events::{
    DeployCompleted, GrantAttached, ResourceAborted, ResourceCreated, ResourceFailed,
};

/// Outcome for one node of a deployment.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeStatus {
    Created {
        handle: ResourceHandle,
        resolved: ResolvedResource,
    },
    /// The provider rejected a create, attach or resolve call for this node.
    Failed(ProviderError),
    /// Never submitted because `cause` failed upstream.
    Aborted { cause: ResourceRef },
}

/// Per-node outcomes of a deployment, in submission order.
#[derive(Debug, Clone, Default)]
pub struct DeploymentReport {
    statuses: IndexMap<ResourceRef, NodeStatus>,
}

impl DeploymentReport {
    pub fn status(&self, resource: &ResourceRef) -> Option<&NodeStatus> {
        self.statuses.get(resource)
    }

    pub fn statuses(&self) -> impl Iterator<Item = (&ResourceRef, &NodeStatus)> {
        self.statuses.iter()
    }

    pub fn handle(&self, resource: &ResourceRef) -> Option<&ResourceHandle> {
        match self.statuses.get(resource) {
            Some(NodeStatus::Created { handle, .. }) => Some(handle),
            _ => None,
        }
    }

    pub fn resolved(&self, resource: &ResourceRef) -> Option<&ResolvedResource> {
        match self.statuses.get(resource) {
            Some(NodeStatus::Created { resolved, .. }) => Some(resolved),
            _ => None,
        }
    }

    /// True when every node was created.
    pub fn is_complete(&self) -> bool {
        self.statuses
            .values()
            .all(|status| matches!(status, NodeStatus::Created { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ResourceRef, &ProviderError)> {
        self.statuses.iter().filter_map(|(id, status)| match status {
            NodeStatus::Failed(err) => Some((id, err)),
            _ => None,
        })
    }

    pub fn aborted(&self) -> impl Iterator<Item = &ResourceRef> {
        self.statuses.iter().filter_map(|(id, status)| match status {
            NodeStatus::Aborted { .. } => Some(id),
            _ => None,
        })
    }

    /// The first provider error in submission order, if any.
    pub fn first_failure(&self) -> Option<&ProviderError> {
        self.failures().next().map(|(_, err)| err)
    }

    pub fn created_count(&self) -> usize {
        self.statuses
            .values()
            .filter(|status| matches!(status, NodeStatus::Created { .. }))
            .count()
    }

    /// The upstream node that prevents `node` from being submitted, if any.
    fn blocking_dependency(&self, node: &ResourceNode) -> Option<ResourceRef> {
        node.dependencies()
            .into_iter()
            .find_map(|dep| match self.statuses.get(dep) {
                Some(NodeStatus::Created { .. }) => None,
                Some(NodeStatus::Aborted { cause }) => Some(cause.clone()),
                Some(NodeStatus::Failed(_)) | None => Some(dep.clone()),
            })
    }
}

/// Dispatches a [`ResourceGraph`] to a [`ProvisioningApi`].
pub struct Scheduler<'a, P: ?Sized> {
    provider: &'a P,
    concurrency: Option<usize>,
}

impl<'a, P> Scheduler<'a, P>
where
    P: ProvisioningApi + ?Sized,
{
    pub fn new(provider: &'a P) -> Self {
        Self {
            provider,
            concurrency: None,
        }
    }

    /// Limit the number of in-flight submissions within a wave.
    ///
    /// `None` (the default) submits a whole wave at once.
    pub fn with_concurrency(mut self, limit: Option<usize>) -> Self {
        self.concurrency = limit;
        self
    }

    /// Realize every node of `graph`, honoring its dependency order.
    ///
    /// Provider failures are recorded in the report rather than returned, so
    /// callers can see what was created, what failed and what was aborted.
    /// An `Err` means the graph itself is malformed.
    pub async fn deploy(&self, graph: &ResourceGraph) -> Result<DeploymentReport, GraphError> {
        let started = Instant::now();
        let waves = graph.waves()?;
        let mut report = DeploymentReport::default();

        for (index, wave) in waves.into_iter().enumerate() {
            let mut ready = Vec::with_capacity(wave.len());
            for node in wave {
                if let Some(cause) = report.blocking_dependency(node) {
                    warn!(
                        resource = %node.id(),
                        cause = %cause,
                        "Aborting: upstream resource was not created"
                    );
                    emit!(ResourceAborted {
                        kind: node.id().kind().as_str(),
                    });
                    report
                        .statuses
                        .insert(node.id().clone(), NodeStatus::Aborted { cause });
                    continue;
                }
                let properties = resolve_properties(node, &report)?;
                ready.push((node, properties));
            }

            debug!(wave = index, submissions = ready.len(), "Dispatching wave");
            let limit = self.concurrency.unwrap_or(ready.len()).max(1);
            let report_ref = &report;
            let outcomes: Vec<(ResourceRef, NodeStatus)> = futures::stream::iter(ready)
                .map(|(node, properties)| async move {
                    let status = self.realize(node, properties, report_ref).await;
                    (node.id().clone(), status)
                })
                .buffered(limit)
                .collect()
                .await;

            report.statuses.extend(outcomes);
        }

        emit!(DeployCompleted {
            duration: started.elapsed(),
            created: report.created_count(),
        });
        Ok(report)
    }

    async fn realize(
        &self,
        node: &ResourceNode,
        properties: Value,
        report: &DeploymentReport,
    ) -> NodeStatus {
        let request = CreateRequest {
            resource: node.id().clone(),
            properties,
            depends_on: node
                .dependencies()
                .into_iter()
                .filter_map(|dep| report.handle(dep).cloned())
                .collect(),
        };

        let handle = match self.provider.create(request).await {
            Ok(handle) => handle,
            Err(err) => return failed(node, err),
        };

        for attachment in node.attachments() {
            if let Err(err) = self.provider.attach(&handle, attachment).await {
                return failed(node, err);
            }
            emit!(GrantAttached {
                kind: node.id().kind().as_str(),
            });
        }

        match self.provider.resolve(&handle).await {
            Ok(resolved) => {
                info!(resource = %node.id(), id = %resolved.id, "Resource created");
                emit!(ResourceCreated {
                    kind: node.id().kind().as_str(),
                });
                NodeStatus::Created { handle, resolved }
            }
            Err(err) => failed(node, err),
        }
    }
}

fn failed(node: &ResourceNode, err: ProviderError) -> NodeStatus {
    warn!(resource = %node.id(), retryable = err.retryable, error = %err, "Resource failed");
    emit!(ResourceFailed {
        kind: node.id().kind().as_str(),
        retryable: err.retryable,
    });
    NodeStatus::Failed(err)
}

fn resolve_properties(node: &ResourceNode, report: &DeploymentReport) -> Result<Value, GraphError> {
    let lookup = |resource: &ResourceRef| report.resolved(resource);
    node.properties()
        .iter()
        .map(|(key, property)| Ok((key.clone(), property.resolve(node.id(), &lookup)?)))
        .collect::<Result<serde_json::Map<_, _>, GraphError>>()
        .map(Value::Object)
}
