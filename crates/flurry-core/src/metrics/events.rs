//! Internal events for flurry metrics emission.
//!
//! Each struct is one measurable occurrence. Resource events carry the
//! resource kind as a label so failures can be broken down per service.

use std::time::Duration;

use metrics::{counter, histogram};
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// A resource was created and resolved.
pub struct ResourceCreated {
    pub kind: &'static str,
}

impl InternalEvent for ResourceCreated {
    fn emit(self) {
        trace!(kind = self.kind, "Resource created");
        counter!("flurry_resources_created_total", "kind" => self.kind).increment(1);
    }
}

/// The provider rejected a call for a resource.
pub struct ResourceFailed {
    pub kind: &'static str,
    pub retryable: bool,
}

impl InternalEvent for ResourceFailed {
    fn emit(self) {
        trace!(kind = self.kind, retryable = self.retryable, "Resource failed");
        let retryable = if self.retryable { "true" } else { "false" };
        counter!("flurry_resources_failed_total", "kind" => self.kind, "retryable" => retryable)
            .increment(1);
    }
}

/// A resource was skipped because something upstream failed.
pub struct ResourceAborted {
    pub kind: &'static str,
}

impl InternalEvent for ResourceAborted {
    fn emit(self) {
        trace!(kind = self.kind, "Resource aborted");
        counter!("flurry_resources_aborted_total", "kind" => self.kind).increment(1);
    }
}

/// A grant was attached to a role.
pub struct GrantAttached {
    pub kind: &'static str,
}

impl InternalEvent for GrantAttached {
    fn emit(self) {
        trace!(kind = self.kind, "Grant attached");
        counter!("flurry_grants_attached_total", "kind" => self.kind).increment(1);
    }
}

/// A pipeline graph finished building.
pub struct BuildCompleted {
    pub duration: Duration,
    pub nodes: usize,
    pub pipeline: String,
}

impl InternalEvent for BuildCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            nodes = self.nodes,
            pipeline = %self.pipeline,
            "Build completed"
        );
        histogram!("flurry_build_duration_seconds", "pipeline" => self.pipeline)
            .record(self.duration.as_secs_f64());
    }
}

/// A graph finished deploying, successfully or not.
pub struct DeployCompleted {
    pub duration: Duration,
    pub created: usize,
}

impl InternalEvent for DeployCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            created = self.created,
            "Deploy completed"
        );
        histogram!("flurry_deploy_duration_seconds").record(self.duration.as_secs_f64());
    }
}
