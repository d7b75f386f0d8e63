use flurry_core::topology::{Attribute, Property, ResourceNode, ResourceRef};
use serde::Serialize;
use tracing::debug;

use super::{BuildContext, kinds, non_empty};
use crate::error::{ConfigError, PipelineError};

/// Suffix of the bucket receiving the primary bucket's access logs.
pub const LOGGING_SUFFIX: &str = "-logging";

/// Prefix under which access logs are written in the logging bucket.
const ACCESS_LOG_PREFIX: &str = "access-logs/";

/// Canned access control applied to the primary bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Acl {
    Private,
}

impl Acl {
    pub fn as_str(&self) -> &'static str {
        match self {
            Acl::Private => "private",
        }
    }
}

/// The durable sink: a primary bucket, its access-logging bucket and ACL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSpec {
    primary: ResourceRef,
    logging_target: ResourceRef,
    acl_binding: ResourceRef,
    acl: Acl,
}

impl StorageSpec {
    pub fn primary_name(&self) -> &str {
        self.primary.name()
    }

    pub fn logging_target_name(&self) -> &str {
        self.logging_target.name()
    }

    pub fn primary(&self) -> &ResourceRef {
        &self.primary
    }

    pub fn logging_target(&self) -> &ResourceRef {
        &self.logging_target
    }

    /// The node binding [`StorageSpec::acl`] to the primary bucket.
    pub fn acl_binding(&self) -> &ResourceRef {
        &self.acl_binding
    }

    pub fn acl(&self) -> Acl {
        self.acl
    }
}

/// Builds the durable sink for a pipeline.
pub struct StorageBuilder;

impl StorageBuilder {
    /// Declare the logging bucket, then the primary bucket logging into it,
    /// then a private ACL on the primary.
    ///
    /// Both bucket names are checked before anything is declared, so a
    /// collision leaves the context untouched.
    pub fn build(ctx: &mut BuildContext, bucket_name: &str) -> Result<StorageSpec, PipelineError> {
        let primary_name = non_empty(bucket_name, || ConfigError::EmptyBucketName)?;
        let logging_name = format!("{primary_name}{LOGGING_SUFFIX}");

        ctx.ensure_available(kinds::BUCKET, &logging_name)?;
        ctx.ensure_available(kinds::BUCKET, primary_name)?;
        ctx.ensure_available(kinds::BUCKET_ACL, primary_name)?;

        let logging_target = ctx.declare(
            ResourceNode::new(kinds::BUCKET, &logging_name)
                .property("bucket", &logging_name)
                .property("acl", "log-delivery-write"),
        )?;

        let primary = ctx.declare(
            ResourceNode::new(kinds::BUCKET, primary_name)
                .property("bucket", primary_name)
                .property(
                    "logging",
                    Property::map([
                        (
                            "target_bucket",
                            Property::reference(&logging_target, Attribute::Id),
                        ),
                        ("target_prefix", Property::from(ACCESS_LOG_PREFIX)),
                    ]),
                )
                .depends_on(&logging_target),
        )?;

        let acl = Acl::Private;
        let acl_binding = ctx.declare(
            ResourceNode::new(kinds::BUCKET_ACL, primary_name)
                .property("bucket", Property::reference(&primary, Attribute::Id))
                .property("acl", acl.as_str()),
        )?;

        debug!(bucket = primary_name, logging = %logging_name, "Declared storage");
        Ok(StorageSpec {
            primary,
            logging_target,
            acl_binding,
            acl,
        })
    }
}
