//! Per-pipeline build leases.
//!
//! Two builds of the same pipeline would race to create the same resource
//! names. A build must hold the pipeline's lease; a second request for a
//! held lease is refused rather than queued.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::error::ConfigError;

/// Tracks which pipelines are currently being built.
///
/// Cloning shares the underlying table.
#[derive(Debug, Clone, Default)]
pub struct PipelineRegistry {
    active: Arc<DashMap<String, Instant>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for `pipeline`, failing if it is already held.
    pub fn acquire(&self, pipeline: &str) -> Result<BuildLease, ConfigError> {
        match self.active.entry(pipeline.to_string()) {
            Entry::Occupied(_) => Err(ConfigError::PipelineInUse {
                pipeline: pipeline.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                debug!(pipeline, "Build lease acquired");
                Ok(BuildLease {
                    pipeline: pipeline.to_string(),
                    active: Arc::clone(&self.active),
                })
            }
        }
    }

    pub fn is_active(&self, pipeline: &str) -> bool {
        self.active.contains_key(pipeline)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

/// Exclusive right to build one pipeline. Released on drop.
#[derive(Debug)]
pub struct BuildLease {
    pipeline: String,
    active: Arc<DashMap<String, Instant>>,
}

impl BuildLease {
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }
}

impl Drop for BuildLease {
    fn drop(&mut self) {
        if let Some((_, acquired)) = self.active.remove(&self.pipeline) {
            debug!(
                pipeline = %self.pipeline,
                held_ms = acquired.elapsed().as_millis(),
                "Build lease released"
            );
        }
    }
}
