//! Execution identities.
//!
//! An identity is one role bound to exactly one trust principal plus a set of
//! grants. Identities that run compute always end up with a grant allowing
//! execution logging: when the request has none, the managed basic-execution
//! policy is added.

use flurry_core::topology::{ResourceNode, ResourceRef};
use tracing::{debug, info};

use super::{BuildContext, kinds, non_empty};
use crate::error::{ConfigError, PipelineError};
use crate::policy::{GrantSet, PolicyGrant, ServicePrincipal, managed};

/// What an identity should be called, who assumes it, and what it may do.
#[derive(Debug, Clone)]
pub struct IdentityRequest {
    pub name: String,
    pub principal: ServicePrincipal,
    pub grants: Vec<PolicyGrant>,
    /// Treat the identity as running compute even if its principal does not.
    pub runs_compute: bool,
}

impl IdentityRequest {
    pub fn new(name: impl Into<String>, principal: ServicePrincipal) -> Self {
        Self {
            name: name.into(),
            principal,
            grants: Vec::new(),
            runs_compute: false,
        }
    }

    pub fn grant(mut self, grant: PolicyGrant) -> Self {
        self.grants.push(grant);
        self
    }

    pub fn grants(mut self, grants: impl IntoIterator<Item = PolicyGrant>) -> Self {
        self.grants.extend(grants);
        self
    }

    pub fn running_compute(mut self) -> Self {
        self.runs_compute = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentitySpec {
    role: ResourceRef,
    principal: ServicePrincipal,
    grants: GrantSet,
    runs_compute: bool,
}

impl IdentitySpec {
    pub fn role(&self) -> &ResourceRef {
        &self.role
    }

    pub fn name(&self) -> &str {
        self.role.name()
    }

    pub fn principal(&self) -> &ServicePrincipal {
        &self.principal
    }

    /// Every grant the role carries, including a synthesized logging grant.
    pub fn grants(&self) -> &GrantSet {
        &self.grants
    }

    pub fn runs_compute(&self) -> bool {
        self.runs_compute
    }
}

pub struct IdentityBuilder;

impl IdentityBuilder {
    pub fn build(
        ctx: &mut BuildContext,
        request: IdentityRequest,
    ) -> Result<IdentitySpec, PipelineError> {
        let name = non_empty(&request.name, || ConfigError::EmptyName { kind: kinds::ROLE })?;
        ctx.ensure_available(kinds::ROLE, name)?;

        let runs_compute = request.runs_compute || request.principal.runs_compute();
        let mut grants: GrantSet = request.grants.iter().cloned().collect();
        if runs_compute && !grants.permits_execution_logging() {
            info!(role = name, "Adding execution logging grant");
            grants.attach(PolicyGrant::managed(managed::LAMBDA_BASIC_EXECUTION));
        }

        let node = grants.iter().fold(
            ResourceNode::new(kinds::ROLE, name)
                .property("name", name)
                .property("assume_role_policy", request.principal.trust_policy()),
            |node, grant| node.attach(grant.to_attachment()),
        );
        let role = ctx.declare(node)?;

        debug!(
            role = name,
            principal = %request.principal,
            grants = grants.len(),
            "Declared identity"
        );
        Ok(IdentitySpec {
            role,
            principal: request.principal,
            grants,
            runs_compute,
        })
    }
}
