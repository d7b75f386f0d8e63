//! Resource graph storage and ordering.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use super::property::Property;
use super::provider::Attachment;
use crate::error::GraphError;

/// The kind of a resource, as understood by the provisioning API.
///
/// Kinds are static identifiers such as `"aws:s3/bucket"`. Domain crates
/// declare them as constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKind(&'static str);

impl ResourceKind {
    pub const fn new(kind: &'static str) -> Self {
        Self(kind)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for ResourceKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

/// Logical identity of a node: its kind plus its name.
///
/// Two declarations with the same kind and name are the same resource, which
/// is how name collisions are detected within one build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    kind: ResourceKind,
    name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.kind, self.name)
    }
}

impl Serialize for ResourceRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A single resource specification.
///
/// Nodes are immutable once inserted into a graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    id: ResourceRef,
    properties: IndexMap<String, Property>,
    depends_on: BTreeSet<ResourceRef>,
    attachments: Vec<Attachment>,
}

impl ResourceNode {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            id: ResourceRef::new(kind, name),
            properties: IndexMap::new(),
            depends_on: BTreeSet::new(),
            attachments: Vec::new(),
        }
    }

    /// Set a property. Setting the same key twice keeps the last value.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<Property>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Declare an explicit ordering edge.
    pub fn depends_on(mut self, resource: &ResourceRef) -> Self {
        self.depends_on.insert(resource.clone());
        self
    }

    /// Attach a grant to be applied right after creation.
    ///
    /// Attaching an identical grant twice is a no-op.
    pub fn attach(mut self, attachment: Attachment) -> Self {
        if !self.attachments.contains(&attachment) {
            self.attachments.push(attachment);
        }
        self
    }

    pub fn id(&self) -> &ResourceRef {
        &self.id
    }

    pub fn properties(&self) -> &IndexMap<String, Property> {
        &self.properties
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// All nodes this node must wait on: explicit edges plus property references.
    pub fn dependencies(&self) -> BTreeSet<&ResourceRef> {
        let mut deps: BTreeSet<&ResourceRef> = self.depends_on.iter().collect();
        for property in self.properties.values() {
            deps.extend(property.references());
        }
        deps
    }
}

/// One entry of a rendered plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanStep {
    pub resource: ResourceRef,
    /// Index of the wave in which the resource can be submitted.
    pub wave: usize,
    pub depends_on: Vec<ResourceRef>,
    pub properties: IndexMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// A graph rendered in submission order, for inspection.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn position(&self, resource: &ResourceRef) -> Option<usize> {
        self.steps.iter().position(|step| &step.resource == resource)
    }
}

/// A directed acyclic graph of resource specifications.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    nodes: IndexMap<ResourceRef, ResourceNode>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node whose dependencies are all already present.
    ///
    /// This is the incremental path used by builders: a node can only be
    /// realized once everything it references has been realized.
    pub fn insert(&mut self, node: ResourceNode) -> Result<ResourceRef, GraphError> {
        if self.nodes.contains_key(node.id()) {
            return Err(GraphError::DuplicateNode {
                resource: node.id().clone(),
            });
        }
        if let Some(missing) = node
            .dependencies()
            .into_iter()
            .find(|dep| !self.nodes.contains_key(*dep))
        {
            return Err(GraphError::UnrealizedDependency {
                resource: node.id().clone(),
                missing: missing.clone(),
            });
        }

        let id = node.id().clone();
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    /// Assemble a graph from nodes declared in any order.
    ///
    /// Every referenced node must be part of the set. Cycles are reported by
    /// [`ResourceGraph::topological_order`].
    pub fn from_nodes(nodes: impl IntoIterator<Item = ResourceNode>) -> Result<Self, GraphError> {
        let mut map = IndexMap::new();
        for node in nodes {
            if map.contains_key(node.id()) {
                return Err(GraphError::DuplicateNode {
                    resource: node.id().clone(),
                });
            }
            map.insert(node.id().clone(), node);
        }

        for node in map.values() {
            if let Some(missing) = node
                .dependencies()
                .into_iter()
                .find(|dep| !map.contains_key(*dep))
            {
                return Err(GraphError::UnrealizedDependency {
                    resource: node.id().clone(),
                    missing: missing.clone(),
                });
            }
        }

        Ok(Self { nodes: map })
    }

    pub fn contains(&self, resource: &ResourceRef) -> bool {
        self.nodes.contains_key(resource)
    }

    pub fn get(&self, resource: &ResourceRef) -> Option<&ResourceNode> {
        self.nodes.get(resource)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.values()
    }

    /// Every node that depends on `resource`, directly or transitively.
    pub fn transitive_dependents(&self, resource: &ResourceRef) -> BTreeSet<ResourceRef> {
        let mut found = BTreeSet::new();
        let mut frontier = vec![resource];

        while let Some(current) = frontier.pop() {
            for node in self.nodes.values() {
                if node.dependencies().contains(current) && found.insert(node.id().clone()) {
                    frontier.push(node.id());
                }
            }
        }

        found
    }

    /// Group nodes into waves: every node's dependencies live in earlier waves.
    ///
    /// Within a wave, nodes keep declaration order. Nodes in the same wave
    /// have no path between them and may be submitted concurrently.
    pub fn waves(&self) -> Result<Vec<Vec<&ResourceNode>>, GraphError> {
        let mut in_degree: HashMap<&ResourceRef, usize> = HashMap::new();
        let mut dependents: HashMap<&ResourceRef, Vec<&ResourceRef>> = HashMap::new();

        for node in self.nodes.values() {
            let deps = node.dependencies();
            in_degree.insert(node.id(), deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(node.id());
            }
        }

        let mut current: Vec<&ResourceRef> = self
            .nodes
            .keys()
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .collect();
        let mut waves = Vec::new();
        let mut visited = 0;

        while !current.is_empty() {
            visited += current.len();
            let mut next = Vec::new();
            for id in &current {
                for dependent in dependents.get(id).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(*dependent);
                        }
                    }
                }
            }

            waves.push(current.iter().filter_map(|id| self.nodes.get(*id)).collect());
            next.sort_by_key(|id| self.nodes.get_index_of(*id));
            current = next;
        }

        if visited != self.nodes.len() {
            let members = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(id, _)| id.to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            return Err(GraphError::Cycle { members });
        }

        Ok(waves)
    }

    /// Nodes in a dependency-respecting order.
    pub fn topological_order(&self) -> Result<Vec<&ResourceNode>, GraphError> {
        Ok(self.waves()?.into_iter().flatten().collect())
    }

    /// Render the graph as a plan in submission order.
    pub fn plan(&self) -> Result<Plan, GraphError> {
        let steps = self
            .waves()?
            .into_iter()
            .enumerate()
            .flat_map(|(wave, nodes)| {
                nodes.into_iter().map(move |node| PlanStep {
                    resource: node.id().clone(),
                    wave,
                    depends_on: node.dependencies().into_iter().cloned().collect(),
                    properties: node
                        .properties()
                        .iter()
                        .map(|(key, value)| (key.clone(), value.render()))
                        .collect(),
                    attachments: node.attachments().to_vec(),
                })
            })
            .collect();

        Ok(Plan { steps })
    }
}
