//! Declarative resource graph and the scheduler that realizes it.
//!
//! Builders describe *what* should exist as [`ResourceNode`]s in a
//! [`ResourceGraph`]. Edges are explicit: a node lists the nodes it depends
//! on, and every [`Property::Ref`] it carries adds an implicit edge to its
//! target. Nothing relies on the order in which nodes were declared.
//!
//! - [`ResourceGraph`] - node storage, validation, topological ordering, plans
//! - [`Property`] - property values, including deferred references
//! - [`ProvisioningApi`] - the external collaborator that creates resources
//! - [`Scheduler`] - dispatches a graph to a provider, wave by wave

mod graph;
mod property;
mod provider;
mod scheduler;

pub use graph::{Plan, PlanStep, ResourceGraph, ResourceKind, ResourceNode, ResourceRef};
pub use property::{Attribute, Property};
pub use provider::{
    Attachment, CreateRequest, ProvisioningApi, ProvisioningApiRef, ResolvedResource,
    ResourceHandle,
};
pub use scheduler::{DeploymentReport, NodeStatus, Scheduler};
