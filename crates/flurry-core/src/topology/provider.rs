//! The provisioning API the scheduler dispatches to.
//!
//! Implementations own the control-plane wire format, retries with backoff,
//! rollback and reconciliation. The core only ever asks for three things:
//! create a resource, resolve its identifiers, attach a grant to a role.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::graph::{ResourceKind, ResourceRef};
use crate::error::ProviderError;

/// Reference-counted handle to a [`ProvisioningApi`].
pub type ProvisioningApiRef = Arc<dyn ProvisioningApi>;

/// Opaque handle returned by [`ProvisioningApi::create`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceHandle {
    pub resource: ResourceRef,
    /// Provider-side token identifying the created resource.
    pub token: String,
}

/// Identifiers and computed attributes of a created resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedResource {
    pub id: String,
    pub arn: String,
    pub name: String,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, Value>,
}

/// A permission grant in the provider's text format.
///
/// Typed policy models are rendered into this shape only at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Attachment {
    /// A provider-managed policy, referenced by identifier.
    Managed { policy_arn: String },
    /// A policy document embedded on the role.
    Inline { name: String, document: String },
}

/// A fully resolved create call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateRequest {
    pub resource: ResourceRef,
    pub properties: Value,
    /// Handles of every resource this one was declared to depend on.
    pub depends_on: Vec<ResourceHandle>,
}

impl CreateRequest {
    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    pub fn name(&self) -> &str {
        self.resource.name()
    }
}

/// External collaborator that turns specifications into live resources.
#[async_trait]
pub trait ProvisioningApi: Send + Sync {
    /// Create a resource of `request.kind()` named `request.name()`.
    async fn create(&self, request: CreateRequest) -> Result<ResourceHandle, ProviderError>;

    /// Look up identifiers needed to wire dependents.
    async fn resolve(&self, handle: &ResourceHandle) -> Result<ResolvedResource, ProviderError>;

    /// Attach a grant to a role. Attaching the same grant twice must be a no-op.
    async fn attach(&self, role: &ResourceHandle, grant: &Attachment)
    -> Result<(), ProviderError>;
}
