//! Configuration primitives shared by every flurry binary.

mod claims;
mod component_key;
mod global;
mod loader;
mod path;
mod vars;

pub use claims::{conflicts, describe_conflicts};
pub use component_key::ComponentKey;
pub use global::GlobalConfig;
pub use loader::{Mergeable, load_from_paths};
pub use path::{ConfigArgs, ConfigPath, is_yaml_file};
pub use vars::{InterpolationResult, interpolate};
