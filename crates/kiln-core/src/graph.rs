//! The dependency graph: an arena of nodes addressed by [`NodeId`], with
//! requirement edges stored as index pairs.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use kiln_schema::{
    BinaryStatus, ConfigurationModel, PackageId, PackageName, Reference, VersionConstraint,
};
use serde::Serialize;

use crate::error::GraphError;
use crate::recipe::Recipe;
use crate::store::StoreError;

/// Handle of a node inside a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A consumer root that only carries requirements.
    Virtual,
    Package,
}

/// Why a node cannot produce a valid binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// The node's own `validate` hook rejected the configuration.
    Own(String),
    /// A dependency, direct or transitive, failed its own validation.
    Dependency { reference: Reference, message: String },
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Own(message) => f.write_str(message),
            Self::Dependency { reference, message } => {
                write!(f, "Invalid dependency {reference}: {message}")
            }
        }
    }
}

/// A compatibility candidate that replaced the requested package ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityFallback {
    pub requested: PackageId,
    pub selected: PackageId,
    /// Position of the selected candidate in the hook's list.
    pub candidate_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub constraint: VersionConstraint,
    pub transitive: bool,
    /// Order in which the builder met this requirement.
    pub position: usize,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub reference: Reference,
    pub recipe: Option<Arc<Recipe>>,
    /// Requested configuration (consumed settings plus effective options).
    pub settings: ConfigurationModel,
    /// Identity model after dependency rendering and the `package_id` hook.
    pub info: ConfigurationModel,
    pub package_id: Option<PackageId>,
    pub binary: Option<BinaryStatus>,
    pub invalid: Option<InvalidReason>,
    pub fallback: Option<CompatibilityFallback>,
    /// Remote the binary was located on, for `Download` nodes.
    pub remote: Option<String>,
    pub store_errors: Vec<StoreError>,
}

impl Node {
    fn new(id: NodeId, kind: NodeKind, reference: Reference, recipe: Option<Arc<Recipe>>) -> Self {
        Self {
            id,
            kind,
            reference,
            recipe,
            settings: ConfigurationModel::new(),
            info: ConfigurationModel::new(),
            package_id: None,
            binary: None,
            invalid: None,
            fallback: None,
            remote: None,
            store_errors: Vec::new(),
        }
    }

    pub fn name(&self) -> &PackageName {
        &self.reference.name
    }

    pub fn is_virtual(&self) -> bool {
        self.kind == NodeKind::Virtual
    }

    /// The ID a binary is installed under: the fallback's when one was
    /// selected, the requested one otherwise.
    pub fn effective_package_id(&self) -> Option<&PackageId> {
        self.fallback
            .as_ref()
            .map(|f| &f.selected)
            .or(self.package_id.as_ref())
    }

    /// Status of the node, `Missing` until evaluated.
    pub fn status(&self) -> BinaryStatus {
        self.binary.unwrap_or(BinaryStatus::Missing)
    }
}

#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<RequirementEdge>,
    by_name: HashMap<PackageName, NodeId>,
}

impl Graph {
    /// A graph holding only its root.
    pub fn new(kind: NodeKind, reference: Reference, recipe: Option<Arc<Recipe>>) -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            by_name: HashMap::new(),
        };
        let root = NodeId(0);
        if kind == NodeKind::Package {
            graph.by_name.insert(reference.name.clone(), root);
        }
        graph.nodes.push(Node::new(root, kind, reference, recipe));
        graph
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn add_package(&mut self, reference: Reference, recipe: Arc<Recipe>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.by_name.insert(reference.name.clone(), id);
        self.nodes
            .push(Node::new(id, NodeKind::Package, reference, Some(recipe)));
        id
    }

    pub fn add_edge(&mut self, edge: RequirementEdge) {
        self.edges.push(edge);
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[RequirementEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Package node by name; the virtual root is never returned.
    pub fn find(&self, name: &str) -> Option<&Node> {
        self.by_name
            .get(PackageName::new(name).as_str())
            .map(|id| self.node(*id))
    }

    /// Outgoing edges of `id`, in declaration order.
    pub fn dependencies(&self, id: NodeId) -> impl Iterator<Item = &RequirementEdge> {
        self.edges.iter().filter(move |e| e.from == id)
    }

    /// Incoming edges of `id`.
    pub fn dependents(&self, id: NodeId) -> impl Iterator<Item = &RequirementEdge> {
        self.edges.iter().filter(move |e| e.to == id)
    }

    /// Dependencies that contribute to the identity of `id`: direct ones, plus
    /// whatever they expose through transitive edges, nearest first.
    pub fn identity_closure(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut out = Vec::new();
        let mut queue: VecDeque<NodeId> = self.dependencies(id).map(|e| e.to).collect();
        while let Some(dep) = queue.pop_front() {
            if seen[dep.0] {
                continue;
            }
            seen[dep.0] = true;
            out.push(dep);
            queue.extend(self.dependencies(dep).filter(|e| e.transitive).map(|e| e.to));
        }
        out
    }

    /// Kahn layers, leaves first. Nodes within a layer are sorted by name.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Cycle` listing the nodes that could not be
    /// ordered if the graph is not acyclic.
    pub fn layers(&self) -> Result<Vec<Vec<NodeId>>, GraphError> {
        let mut pending: Vec<usize> = vec![0; self.nodes.len()];
        let mut dependents: Vec<Vec<NodeId>> = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            pending[edge.from.0] += 1;
            dependents[edge.to.0].push(edge.from);
        }

        let mut queue: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| pending[n.id.0] == 0)
            .map(|n| n.id)
            .collect();

        let mut layers = Vec::new();
        let mut sorted = 0;
        while !queue.is_empty() {
            queue.sort_by(|a, b| self.node(*a).name().cmp(self.node(*b).name()));
            let mut next = Vec::new();
            for id in &queue {
                for dependent in &dependents[id.0] {
                    pending[dependent.0] -= 1;
                    if pending[dependent.0] == 0 {
                        next.push(*dependent);
                    }
                }
            }
            sorted += queue.len();
            layers.push(std::mem::replace(&mut queue, next));
        }

        if sorted < self.nodes.len() {
            let path = self
                .nodes
                .iter()
                .filter(|n| pending[n.id.0] > 0)
                .map(|n| n.reference.clone())
                .collect();
            return Err(GraphError::Cycle { path });
        }

        Ok(layers)
    }
}
