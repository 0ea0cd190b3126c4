//! Binary status evaluation.
//!
//! Each package node is decided on its own first ([`BinaryEvaluator`]),
//! concurrently across nodes. Two graph-wide passes follow: invalidity
//! propagates from dependencies to dependents ([`propagate_invalid`]), and
//! nodes whose binaries nobody needs are skipped ([`mark_skipped`]).

use kiln_schema::BinaryStatus;

use crate::compat::CompatibilityExplorer;
use crate::error::ResolveError;
use crate::graph::{CompatibilityFallback, Graph, InvalidReason, NodeId};
use crate::policy::BuildPolicy;
use crate::store::{BinaryKey, BinaryStores, Location, StoreError};

/// Per-node verdict of the status evaluator.
#[derive(Debug, Clone)]
pub struct Decision {
    pub id: NodeId,
    pub status: BinaryStatus,
    pub fallback: Option<CompatibilityFallback>,
    pub remote: Option<String>,
    pub store_errors: Vec<StoreError>,
}

impl Decision {
    fn new(id: NodeId, status: BinaryStatus) -> Self {
        Self {
            id,
            status,
            fallback: None,
            remote: None,
            store_errors: Vec::new(),
        }
    }

    fn located(mut self, location: Location) -> Self {
        match location {
            Location::Local => self.status = BinaryStatus::Cache,
            Location::Remote(name) => {
                self.status = BinaryStatus::Download;
                self.remote = Some(name);
            }
        }
        self
    }
}

pub struct BinaryEvaluator<'a> {
    stores: &'a BinaryStores,
    policy: &'a BuildPolicy,
    explorer: CompatibilityExplorer<'a>,
}

impl<'a> BinaryEvaluator<'a> {
    pub fn new(stores: &'a BinaryStores, policy: &'a BuildPolicy, explorer: CompatibilityExplorer<'a>) -> Self {
        Self {
            stores,
            policy,
            explorer,
        }
    }

    /// Decide the status of one package node from its own validity, the
    /// stores and the build policy. Dependencies are not considered here.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::Hook` if the compatibility hook crashes.
    pub async fn evaluate(&self, graph: &Graph, id: NodeId) -> Result<Decision, ResolveError> {
        let node = graph.node(id);
        let reference = &node.reference;
        let forced = self.policy.is_forced(reference);
        let Some(package_id) = node.package_id.as_ref() else {
            return Ok(Decision::new(id, BinaryStatus::Skip));
        };

        if node.invalid.is_some() {
            if forced {
                return Ok(Decision::new(id, BinaryStatus::Invalid));
            }
            return self.rescue(graph, id, Decision::new(id, BinaryStatus::Invalid)).await;
        }

        let mut decision = Decision::new(id, BinaryStatus::Missing);
        let lookup = self.stores.locate(&BinaryKey::new(reference, package_id)).await;
        decision.store_errors.extend(lookup.errors);

        match lookup.location {
            Some(Location::Local) => return Ok(decision.located(Location::Local)),
            Some(location @ Location::Remote(_)) if !forced => return Ok(decision.located(location)),
            _ => {}
        }
        if forced {
            tracing::debug!("{reference}: forced build");
            decision.status = BinaryStatus::Build;
            return Ok(decision);
        }

        let mut decision = self.rescue(graph, id, decision).await?;
        if decision.fallback.is_none() && self.policy.builds_missing(reference) {
            decision.status = BinaryStatus::Build;
        }
        Ok(decision)
    }

    /// Try the compatibility candidates; `decision` is kept when none has a binary.
    async fn rescue(&self, graph: &Graph, id: NodeId, mut decision: Decision) -> Result<Decision, ResolveError> {
        let candidates = self.explorer.candidates(graph, id)?;
        if candidates.is_empty() {
            return Ok(decision);
        }
        let exploration = self.explorer.search(graph, id, &candidates).await;
        decision.store_errors.extend(exploration.store_errors);
        match exploration.selected {
            Some((fallback, location)) => {
                decision.fallback = Some(fallback);
                decision.remote = None;
                Ok(decision.located(location))
            }
            None => Ok(decision),
        }
    }
}

/// Whether `id` counts as invalid for its dependents.
fn is_unrescued_invalid(graph: &Graph, id: NodeId) -> bool {
    let node = graph.node(id);
    node.invalid.is_some() && node.fallback.is_none()
}

/// Mark dependents of invalid nodes, leaves first.
///
/// Each dependent records the package whose own validation failed, however
/// deep it sits. A dependent keeps a `Build` status when the policy selects
/// it for building, but still records the invalid dependency.
pub fn propagate_invalid(graph: &mut Graph, layers: &[Vec<NodeId>], policy: &BuildPolicy) {
    for id in layers.iter().flatten().copied() {
        if graph.node(id).is_virtual() || graph.node(id).invalid.is_some() {
            continue;
        }
        let culprit = graph
            .dependencies(id)
            .map(|e| e.to)
            .find(|dep| is_unrescued_invalid(graph, *dep));
        let Some(culprit) = culprit else {
            continue;
        };

        // name the package that failed validation, not the intermediate hop
        let reason = match &graph.node(culprit).invalid {
            Some(InvalidReason::Dependency { reference, message }) => InvalidReason::Dependency {
                reference: reference.clone(),
                message: message.clone(),
            },
            Some(InvalidReason::Own(message)) => InvalidReason::Dependency {
                reference: graph.node(culprit).reference.clone(),
                message: message.clone(),
            },
            None => continue,
        };
        let node = graph.node_mut(id);
        tracing::debug!("{}: {reason}", node.reference);
        if node.status() != BinaryStatus::Build || !policy.selects(&node.reference) {
            node.binary = Some(BinaryStatus::Invalid);
            node.fallback = None;
            node.remote = None;
        }
        node.invalid = Some(reason);
    }
}

/// Skip nodes whose binary nobody needs, dependents first.
///
/// The virtual root is always skipped. A package node is skipped when every
/// edge into it is non-transitive and every dependent already has (or needs
/// no) binary of its own.
pub fn mark_skipped(graph: &mut Graph, layers: &[Vec<NodeId>]) {
    let root = graph.root();
    if graph.node(root).is_virtual() {
        graph.node_mut(root).binary = Some(BinaryStatus::Skip);
    }

    for id in layers.iter().rev().flatten().copied() {
        if id == root || graph.node(id).invalid.is_some() {
            continue;
        }
        let skippable = {
            let mut incoming = graph.dependents(id).peekable();
            if incoming.peek().is_none() {
                continue;
            }
            incoming.all(|edge| {
                !edge.transitive
                    && matches!(
                        graph.node(edge.from).status(),
                        BinaryStatus::Cache | BinaryStatus::Download | BinaryStatus::Skip
                    )
            })
        };
        if skippable {
            tracing::debug!("{}: binary not needed, skipping", graph.node(id).reference);
            graph.node_mut(id).binary = Some(BinaryStatus::Skip);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeKind, RequirementEdge};
    use crate::identity::IdentityCalculator;
    use crate::recipe::Recipe;
    use crate::store::MemoryStore;
    use kiln_schema::{ConfigurationModel, PackageId, Reference, VersionConstraint};
    use std::sync::Arc;

    fn package_graph(names: &[&str]) -> Graph {
        let reference = Reference::new(names[0], "1.0");
        let mut graph = Graph::new(
            NodeKind::Package,
            reference.clone(),
            Some(Arc::new(Recipe::new(reference))),
        );
        for name in &names[1..] {
            let reference = Reference::new(*name, "1.0");
            graph.add_package(reference.clone(), Arc::new(Recipe::new(reference)));
        }
        for node in 0..graph.len() {
            let model: ConfigurationModel = {
                let mut m = ConfigurationModel::new();
                m.set("name", names[node]);
                m
            };
            let id = graph.nodes()[node].id;
            graph.node_mut(id).package_id = Some(PackageId::compute(&model));
        }
        graph
    }

    fn link(graph: &mut Graph, from: usize, to: usize, transitive: bool) {
        let from = graph.nodes()[from].id;
        let to = graph.nodes()[to].id;
        graph.add_edge(RequirementEdge {
            from,
            to,
            constraint: VersionConstraint::Exact("1.0".into()),
            transitive,
            position: 0,
        });
    }

    async fn decide(graph: &Graph, stores: &BinaryStores, policy: &BuildPolicy, index: usize) -> Decision {
        let identity = IdentityCalculator::default();
        let explorer = CompatibilityExplorer::new(&identity, stores);
        let evaluator = BinaryEvaluator::new(stores, policy, explorer);
        evaluator.evaluate(graph, graph.nodes()[index].id).await.unwrap()
    }

    fn key(graph: &Graph, index: usize) -> BinaryKey {
        let node = &graph.nodes()[index];
        BinaryKey::new(&node.reference, node.package_id.as_ref().unwrap())
    }

    #[tokio::test]
    async fn local_then_remote_then_policy() {
        let graph = package_graph(&["pkg"]);
        let local = Arc::new(MemoryStore::new("local"));
        let remote = Arc::new(MemoryStore::new("remote"));
        let stores = BinaryStores::new(local.clone()).with_remote(remote.clone());

        let missing = decide(&graph, &stores, &BuildPolicy::never(), 0).await;
        assert_eq!(missing.status, BinaryStatus::Missing);
        let build = decide(&graph, &stores, &BuildPolicy::missing(), 0).await;
        assert_eq!(build.status, BinaryStatus::Build);

        remote.insert(key(&graph, 0)).await;
        let download = decide(&graph, &stores, &BuildPolicy::never(), 0).await;
        assert_eq!(download.status, BinaryStatus::Download);
        assert_eq!(download.remote.as_deref(), Some("remote"));

        let forced = BuildPolicy::never().force("pkg/*").unwrap();
        assert_eq!(decide(&graph, &stores, &forced, 0).await.status, BinaryStatus::Build);

        local.insert(key(&graph, 0)).await;
        assert_eq!(decide(&graph, &stores, &forced, 0).await.status, BinaryStatus::Cache);
    }

    #[tokio::test]
    async fn own_invalid_short_circuits() {
        let mut graph = package_graph(&["pkg"]);
        let root = graph.root();
        graph.node_mut(root).invalid = Some(InvalidReason::Own("nope".to_string()));
        let local = Arc::new(MemoryStore::new("local"));
        local.insert(key(&graph, 0)).await;
        let stores = BinaryStores::new(local);

        let decision = decide(&graph, &stores, &BuildPolicy::missing(), 0).await;
        assert_eq!(decision.status, BinaryStatus::Invalid);
    }

    #[tokio::test]
    async fn unavailable_remote_is_recorded() {
        let graph = package_graph(&["pkg"]);
        let remote = Arc::new(MemoryStore::new("flaky"));
        remote.set_offline(true).await;
        let stores = BinaryStores::new(Arc::new(MemoryStore::new("local"))).with_remote(remote);

        let decision = decide(&graph, &stores, &BuildPolicy::never(), 0).await;
        assert_eq!(decision.status, BinaryStatus::Missing);
        assert_eq!(decision.store_errors.len(), 1);
    }

    #[test]
    fn invalidity_propagates_to_dependents() {
        // app -> lib -> bad
        let mut graph = package_graph(&["app", "lib", "bad"]);
        link(&mut graph, 0, 1, true);
        link(&mut graph, 1, 2, true);
        for node in graph.nodes().iter().map(|n| n.id).collect::<Vec<_>>() {
            graph.node_mut(node).binary = Some(BinaryStatus::Cache);
        }
        let bad = graph.nodes()[2].id;
        graph.node_mut(bad).invalid = Some(InvalidReason::Own("unsupported".to_string()));
        graph.node_mut(bad).binary = Some(BinaryStatus::Invalid);

        let layers = graph.layers().unwrap();
        propagate_invalid(&mut graph, &layers, &BuildPolicy::never());

        let lib = &graph.nodes()[1];
        assert_eq!(lib.status(), BinaryStatus::Invalid);
        assert!(matches!(
            lib.invalid,
            Some(InvalidReason::Dependency { ref reference, .. }) if reference.name == "bad"
        ));
        // the transitive dependent names the origin, with its message
        let app = &graph.nodes()[0];
        assert_eq!(
            app.invalid,
            Some(InvalidReason::Dependency {
                reference: Reference::new("bad", "1.0"),
                message: "unsupported".to_string(),
            })
        );
    }

    #[test]
    fn selected_dependents_keep_building() {
        let mut graph = package_graph(&["app", "bad"]);
        link(&mut graph, 0, 1, true);
        let (app, bad) = (graph.nodes()[0].id, graph.nodes()[1].id);
        graph.node_mut(app).binary = Some(BinaryStatus::Build);
        graph.node_mut(bad).binary = Some(BinaryStatus::Invalid);
        graph.node_mut(bad).invalid = Some(InvalidReason::Own("unsupported".to_string()));

        let layers = graph.layers().unwrap();
        propagate_invalid(&mut graph, &layers, &BuildPolicy::missing());
        assert_eq!(graph.node(app).status(), BinaryStatus::Build);
        assert!(graph.node(app).invalid.is_some());
    }

    #[test]
    fn rescued_dependencies_do_not_propagate() {
        let mut graph = package_graph(&["app", "dep"]);
        link(&mut graph, 0, 1, true);
        let (app, dep) = (graph.nodes()[0].id, graph.nodes()[1].id);
        graph.node_mut(app).binary = Some(BinaryStatus::Cache);
        let requested = graph.node(dep).package_id.clone().unwrap();
        let node = graph.node_mut(dep);
        node.binary = Some(BinaryStatus::Cache);
        node.invalid = Some(InvalidReason::Own("unsupported".to_string()));
        node.fallback = Some(CompatibilityFallback {
            requested: requested.clone(),
            selected: requested,
            candidate_index: 0,
        });

        let layers = graph.layers().unwrap();
        propagate_invalid(&mut graph, &layers, &BuildPolicy::never());
        assert!(graph.node(app).invalid.is_none());
        assert_eq!(graph.node(app).status(), BinaryStatus::Cache);
    }

    #[test]
    fn non_transitive_dependencies_of_cached_nodes_are_skipped() {
        // app -> lib (transitive), lib -> tool (non-transitive)
        let mut graph = package_graph(&["app", "lib", "tool"]);
        link(&mut graph, 0, 1, true);
        link(&mut graph, 1, 2, false);
        let ids: Vec<NodeId> = graph.nodes().iter().map(|n| n.id).collect();
        graph.node_mut(ids[0]).binary = Some(BinaryStatus::Build);
        graph.node_mut(ids[1]).binary = Some(BinaryStatus::Cache);
        graph.node_mut(ids[2]).binary = Some(BinaryStatus::Missing);

        let layers = graph.layers().unwrap();
        mark_skipped(&mut graph, &layers);
        assert_eq!(graph.node(ids[0]).status(), BinaryStatus::Build);
        assert_eq!(graph.node(ids[1]).status(), BinaryStatus::Cache);
        assert_eq!(graph.node(ids[2]).status(), BinaryStatus::Skip);

        // once lib must be built, tool is needed again
        graph.node_mut(ids[1]).binary = Some(BinaryStatus::Build);
        graph.node_mut(ids[2]).binary = Some(BinaryStatus::Missing);
        mark_skipped(&mut graph, &layers);
        assert_eq!(graph.node(ids[2]).status(), BinaryStatus::Missing);
    }
}
