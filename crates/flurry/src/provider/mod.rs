//! Provisioning API implementations.

mod memory;

pub use flurry_core::topology::{
    Attachment, CreateRequest, ProvisioningApi, ProvisioningApiRef, ResolvedResource,
    ResourceHandle,
};
pub use memory::MemoryProvider;
