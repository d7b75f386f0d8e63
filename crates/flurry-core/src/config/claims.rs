//! Detection of resources claimed by more than one pipeline.
//!
//! Physical names such as bucket or stream names are exclusive: two
//! pipelines that would both create `acme-logging` cannot coexist. Claims are
//! checked when configuration is validated, before anything is built.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use crate::topology::ResourceRef;

/// Map every resource claimed by more than one component to its claimants.
///
/// An empty map means no conflicts.
///
/// ```
/// use flurry_core::config::conflicts;
/// use flurry_core::topology::{ResourceKind, ResourceRef};
///
/// const BUCKET: ResourceKind = ResourceKind::new("aws:s3/bucket");
///
/// let found = conflicts(vec![
///     ("clicks", vec![ResourceRef::new(BUCKET, "acme")]),
///     ("orders", vec![ResourceRef::new(BUCKET, "acme")]),
/// ]);
/// assert_eq!(found.len(), 1);
/// ```
pub fn conflicts<K>(
    components: impl IntoIterator<Item = (K, Vec<ResourceRef>)>,
) -> HashMap<ResourceRef, BTreeSet<K>>
where
    K: Ord + Hash + Clone,
{
    let mut claimants: HashMap<ResourceRef, BTreeSet<K>> = HashMap::new();

    for (key, claims) in components {
        for claim in claims {
            claimants.entry(claim).or_default().insert(key.clone());
        }
    }

    claimants.retain(|_, keys| keys.len() > 1);
    claimants
}

/// Render conflicts as a stable, human-readable message.
pub fn describe_conflicts<K: std::fmt::Display>(
    found: &HashMap<ResourceRef, BTreeSet<K>>,
) -> String {
    let mut lines: Vec<String> = found
        .iter()
        .map(|(resource, keys)| {
            let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
            format!("{resource} claimed by: {}", keys.join(", "))
        })
        .collect();
    lines.sort();
    lines.join("; ")
}
