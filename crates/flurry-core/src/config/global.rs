//! Settings that apply to every pipeline in a configuration.

use serde::{Deserialize, Serialize};

/// Options shared by all pipelines of a merged configuration.
///
/// ```
/// use flurry_core::config::GlobalConfig;
///
/// let config: GlobalConfig = serde_yaml::from_str("total_concurrency: 4").unwrap();
/// assert_eq!(config.total_concurrency, Some(4));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Maximum provider submissions in flight at once.
    ///
    /// `None` submits every independent resource of a wave together.
    #[serde(default)]
    pub total_concurrency: Option<usize>,
}

impl GlobalConfig {
    /// Merge values from a later file (last-write-wins for set values).
    pub fn merge_from(&mut self, other: Self) {
        if other.total_concurrency.is_some() {
            self.total_concurrency = other.total_concurrency;
        }
    }
}
