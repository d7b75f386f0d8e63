use flurry_core::topology::{Attribute, Property, ResourceNode, ResourceRef};
use tracing::debug;

use super::{BuildContext, IdentitySpec, kinds, non_empty};
use crate::error::{ConfigError, PipelineError};

pub const DEFAULT_TIMEOUT_SECONDS: i64 = 30;
/// Upper bound the compute service accepts.
pub const MAX_TIMEOUT_SECONDS: u32 = 900;
pub const DEFAULT_RUNTIME: &str = "nodejs16.x";
pub const DEFAULT_HANDLER: &str = "exports.handler";
pub const DEFAULT_QUALIFIER: &str = "$LATEST";

/// The inline record-processing function to declare.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformRequest {
    pub name: String,
    /// Path of the packaged function code.
    pub package: String,
    pub runtime: String,
    pub handler: String,
    /// `None` uses [`DEFAULT_TIMEOUT_SECONDS`].
    pub timeout_seconds: Option<i64>,
    /// Version or alias the delivery stream invokes.
    pub qualifier: String,
}

impl TransformRequest {
    pub fn new(name: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            runtime: DEFAULT_RUNTIME.to_string(),
            handler: DEFAULT_HANDLER.to_string(),
            timeout_seconds: None,
            qualifier: DEFAULT_QUALIFIER.to_string(),
        }
    }

    pub fn with_timeout(mut self, seconds: i64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformSpec {
    function: ResourceRef,
    execution_role: ResourceRef,
    package: String,
    runtime: String,
    handler: String,
    timeout_seconds: u32,
    qualifier: String,
}

impl TransformSpec {
    pub fn function(&self) -> &ResourceRef {
        &self.function
    }

    pub fn execution_role(&self) -> &ResourceRef {
        &self.execution_role
    }

    /// Path of the packaged function code.
    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn timeout_seconds(&self) -> u32 {
        self.timeout_seconds
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    /// Reference a delivery stream uses to invoke this function:
    /// `<function arn>:<qualifier>`.
    pub fn callable(&self) -> Property {
        Property::reference(&self.function, Attribute::Arn)
            .with_suffix(format!(":{}", self.qualifier))
    }
}

/// Resolve the effective timeout, rejecting values the service would refuse.
pub fn effective_timeout(requested: Option<i64>) -> Result<u32, ConfigError> {
    let seconds = requested.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
    u32::try_from(seconds)
        .ok()
        .filter(|s| (1..=MAX_TIMEOUT_SECONDS).contains(s))
        .ok_or(ConfigError::InvalidTimeout {
            seconds,
            max: MAX_TIMEOUT_SECONDS,
        })
}

pub struct TransformBuilder;

impl TransformBuilder {
    /// Declare the function, executing as `identity`.
    ///
    /// Fails with a dependency error if `identity` was not realized in `ctx`.
    pub fn build(
        ctx: &mut BuildContext,
        identity: &IdentitySpec,
        request: TransformRequest,
    ) -> Result<TransformSpec, PipelineError> {
        let name = non_empty(&request.name, || ConfigError::EmptyName {
            kind: kinds::FUNCTION,
        })?;
        let function = ctx.ensure_available(kinds::FUNCTION, name)?;
        ctx.require(&function, identity.role())?;
        let timeout_seconds = effective_timeout(request.timeout_seconds)?;

        let function = ctx.declare(
            ResourceNode::new(kinds::FUNCTION, name)
                .property("name", name)
                .property("role", Property::reference(identity.role(), Attribute::Arn))
                .property("runtime", &request.runtime)
                .property("handler", &request.handler)
                .property("timeout", timeout_seconds)
                .property("code", Property::map([("archive", &request.package)])),
        )?;

        debug!(
            function = %function,
            role = %identity.role(),
            timeout_seconds,
            "Declared transform"
        );
        Ok(TransformSpec {
            function,
            execution_role: identity.role().clone(),
            package: request.package,
            runtime: request.runtime,
            handler: request.handler,
            timeout_seconds,
            qualifier: request.qualifier,
        })
    }
}
