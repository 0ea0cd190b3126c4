//! Structured view of a resolved graph, for machine rendering.

use kiln_schema::BinaryStatus;
use serde::Serialize;

use crate::graph::{Graph, InvalidReason, Node, NodeKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackReport {
    pub requested: String,
    pub selected: String,
    pub candidate_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeReport {
    pub reference: String,
    pub kind: NodeKind,
    pub package_id: Option<String>,
    pub effective_package_id: Option<String>,
    pub binary: Option<BinaryStatus>,
    pub invalid: Option<InvalidReason>,
    pub fallback: Option<FallbackReport>,
    pub remote: Option<String>,
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub store_errors: Vec<String>,
}

impl NodeReport {
    pub fn new(graph: &Graph, node: &Node) -> Self {
        Self {
            reference: node.reference.to_string(),
            kind: node.kind,
            package_id: node.package_id.as_ref().map(ToString::to_string),
            effective_package_id: node.effective_package_id().map(ToString::to_string),
            binary: node.binary,
            invalid: node.invalid.clone(),
            fallback: node.fallback.as_ref().map(|f| FallbackReport {
                requested: f.requested.to_string(),
                selected: f.selected.to_string(),
                candidate_index: f.candidate_index,
            }),
            remote: node.remote.clone(),
            dependencies: graph
                .dependencies(node.id)
                .map(|e| graph.node(e.to).reference.to_string())
                .collect(),
            store_errors: node.store_errors.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphReport {
    pub root: String,
    pub nodes: Vec<NodeReport>,
}

impl GraphReport {
    pub fn new(graph: &Graph) -> Self {
        Self {
            root: graph.node(graph.root()).reference.to_string(),
            nodes: graph
                .nodes()
                .iter()
                .map(|node| NodeReport::new(graph, node))
                .collect(),
        }
    }

    pub fn node(&self, reference: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.reference == reference)
    }
}
