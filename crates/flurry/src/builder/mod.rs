//! Pipeline builders.
//!
//! Each builder declares its resources into a shared [`BuildContext`]. A
//! resource counts as *realized* once it has been declared there; builders
//! refuse to reference anything that is not, so the order in which they run
//! is checked rather than assumed.
//!
//! - [`StorageBuilder`] - primary bucket, its logging bucket and a private ACL
//! - [`IdentityBuilder`] - execution roles and their grants
//! - [`TransformBuilder`] - the inline record-processing function
//! - [`StreamBuilder`] - the delivery stream, its log sink and freshness alarm
//! - [`PipelineBuilder`] - runs the above in dependency order

mod identity;
mod pipeline;
mod source;
mod storage;
mod stream;
mod transform;

pub use identity::{IdentityBuilder, IdentityRequest, IdentitySpec};
pub use pipeline::{PipelineBuilder, PipelineOutputs, PipelineResult};
pub use source::{SourceStreamBuilder, SourceStreamSpec};
pub use storage::{Acl, LOGGING_SUFFIX, StorageBuilder, StorageSpec};
pub use stream::{AlarmSpec, LogSink, StreamBuilder, StreamRequest, StreamSpec, StreamState};
pub use transform::{
    DEFAULT_HANDLER, DEFAULT_QUALIFIER, DEFAULT_RUNTIME, DEFAULT_TIMEOUT_SECONDS,
    MAX_TIMEOUT_SECONDS, TransformBuilder, TransformRequest, TransformSpec, effective_timeout,
};

use flurry_core::topology::{Plan, ResourceGraph, ResourceKind, ResourceNode, ResourceRef};

use crate::error::{ConfigError, GraphError, PipelineError};

/// Resource kinds declared by the builders.
pub mod kinds {
    use flurry_core::topology::ResourceKind;

    pub const BUCKET: ResourceKind = ResourceKind::new("aws:s3/bucket");
    pub const BUCKET_ACL: ResourceKind = ResourceKind::new("aws:s3/bucketAclV2");
    pub const ROLE: ResourceKind = ResourceKind::new("aws:iam/role");
    pub const FUNCTION: ResourceKind = ResourceKind::new("aws:lambda/function");
    pub const LOG_GROUP: ResourceKind = ResourceKind::new("aws:cloudwatch/logGroup");
    pub const LOG_STREAM: ResourceKind = ResourceKind::new("aws:cloudwatch/logStream");
    pub const DELIVERY_STREAM: ResourceKind =
        ResourceKind::new("aws:kinesis/firehoseDeliveryStream");
    pub const SOURCE_STREAM: ResourceKind = ResourceKind::new("aws:kinesis/stream");
    pub const METRIC_ALARM: ResourceKind = ResourceKind::new("aws:cloudwatch/metricAlarm");
}

/// The graph under construction for one build pass.
///
/// After a failed build step the context still holds everything declared
/// so far, for inspection.
#[derive(Debug, Default)]
pub struct BuildContext {
    graph: ResourceGraph,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with a name collision if `kind`/`name` is already declared.
    pub fn ensure_available(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<ResourceRef, ConfigError> {
        let resource = ResourceRef::new(kind, name);
        if self.graph.contains(&resource) {
            return Err(ConfigError::NameCollision {
                kind,
                name: name.to_string(),
            });
        }
        Ok(resource)
    }

    /// Fail with a dependency error unless `dependency` has been realized.
    pub fn require(
        &self,
        dependent: &ResourceRef,
        dependency: &ResourceRef,
    ) -> Result<(), GraphError> {
        if self.graph.contains(dependency) {
            Ok(())
        } else {
            Err(GraphError::UnrealizedDependency {
                resource: dependent.clone(),
                missing: dependency.clone(),
            })
        }
    }

    /// Declare a node whose dependencies are all realized.
    pub fn declare(&mut self, node: ResourceNode) -> Result<ResourceRef, PipelineError> {
        self.ensure_available(node.id().kind(), node.id().name())?;
        Ok(self.graph.insert(node)?)
    }

    pub fn is_realized(&self, resource: &ResourceRef) -> bool {
        self.graph.contains(resource)
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    pub fn into_graph(self) -> ResourceGraph {
        self.graph
    }

    pub fn plan(&self) -> Result<Plan, GraphError> {
        self.graph.plan()
    }
}

/// Reject empty or whitespace-only names.
pub(crate) fn non_empty<'a>(
    name: &'a str,
    error: impl FnOnce() -> ConfigError,
) -> Result<&'a str, ConfigError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(error())
    } else {
        Ok(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_rejects_name_collision() {
        let mut ctx = BuildContext::new();
        ctx.declare(ResourceNode::new(kinds::BUCKET, "acme")).unwrap();

        let err = ctx
            .declare(ResourceNode::new(kinds::BUCKET, "acme"))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Configuration {
                source: ConfigError::NameCollision { .. }
            }
        ));

        // Same name, different kind.
        ctx.declare(ResourceNode::new(kinds::DELIVERY_STREAM, "acme"))
            .unwrap();
        assert_eq!(ctx.graph().len(), 2);
    }

    #[test]
    fn test_declare_rejects_unrealized_dependency() {
        let mut ctx = BuildContext::new();
        let role = ResourceRef::new(kinds::ROLE, "missing");

        let err = ctx
            .declare(ResourceNode::new(kinds::FUNCTION, "fn").depends_on(&role))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Dependency {
                source: GraphError::UnrealizedDependency { .. }
            }
        ));
        assert!(ctx.graph().is_empty());
    }
}
