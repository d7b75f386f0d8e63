//! Observability for builds and deployments.
//!
//! Events are emitted through the `metrics` facade. No exporter is installed
//! here: a caller that wants the numbers installs a recorder of its choice
//! before building.

pub mod events;

/// Macro for emitting metric events.
///
/// Calls [`events::InternalEvent::emit`] on the given event.
///
/// # Example
///
/// ```ignore
/// use flurry_core::metrics::events::ResourceCreated;
///
/// emit!(ResourceCreated { kind: "aws:s3/bucket" });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}

pub use emit;
