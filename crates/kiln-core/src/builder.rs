//! Graph expansion.
//!
//! Requirements are expanded breadth-first. Each package name maps to a
//! single node: the first version chosen for a name (in build order) stays,
//! and later requirements must accept it. Override requirements pin a
//! version for the whole graph; discovering a pin after the name was already
//! resolved to something else restarts the expansion with the pin in place.

use std::collections::{HashMap, VecDeque};

use kiln_schema::{PackageName, Reference, Requirement, VersionConstraint};

use crate::error::GraphError;
use crate::graph::{Graph, NodeId, NodeKind, RequirementEdge};
use crate::index::RecipeSource;

/// What sits at the top of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootSpec {
    /// Resolve a recipe as the root, like creating that package.
    Reference(Reference),
    /// A consumer that only lists requirements.
    Requires(Vec<Requirement>),
}

/// Reference shown for the virtual consumer root.
pub fn consumer_reference() -> Reference {
    Reference::new("consumer", "virtual")
}

#[derive(Debug, Clone)]
struct Pin {
    constraint: VersionConstraint,
    by: Reference,
}

#[derive(Debug, Clone)]
struct Chosen {
    id: NodeId,
    by: Reference,
    constraint: VersionConstraint,
}

enum Interrupt {
    Restart(PackageName),
    Failed(GraphError),
}

impl From<GraphError> for Interrupt {
    fn from(err: GraphError) -> Self {
        Self::Failed(err)
    }
}

pub struct GraphBuilder<'a> {
    source: &'a dyn RecipeSource,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(source: &'a dyn RecipeSource) -> Self {
        Self { source }
    }

    /// Expand `root` into a dependency graph.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphError`] on version conflicts, cycles, unsatisfiable
    /// constraints or missing recipes.
    pub fn build(&self, root: &RootSpec) -> Result<Graph, GraphError> {
        let mut pins = HashMap::new();
        loop {
            match self.expand(root, &mut pins) {
                Ok(graph) => {
                    graph.layers()?;
                    tracing::debug!("Dependency graph built with {} nodes", graph.len());
                    return Ok(graph);
                }
                Err(Interrupt::Restart(name)) => {
                    tracing::debug!("Override on '{name}' changed the graph, expanding again");
                }
                Err(Interrupt::Failed(err)) => return Err(err),
            }
        }
    }

    fn expand(&self, root: &RootSpec, pins: &mut HashMap<PackageName, Pin>) -> Result<Graph, Interrupt> {
        let mut chosen: HashMap<PackageName, Chosen> = HashMap::new();
        let mut graph = match root {
            RootSpec::Reference(reference) => {
                let recipe = self.source.recipe(reference).ok_or_else(|| GraphError::NotFound {
                    what: reference.to_string(),
                    requester: consumer_reference(),
                })?;
                let reference = recipe.reference.clone();
                let graph = Graph::new(NodeKind::Package, reference.clone(), Some(recipe));
                chosen.insert(
                    reference.name.clone(),
                    Chosen {
                        id: graph.root(),
                        by: consumer_reference(),
                        constraint: VersionConstraint::Exact(reference.version.clone()),
                    },
                );
                graph
            }
            RootSpec::Requires(_) => Graph::new(NodeKind::Virtual, consumer_reference(), None),
        };

        let mut queue = VecDeque::from([graph.root()]);
        let mut position = 0;

        while let Some(current) = queue.pop_front() {
            let node = graph.node(current);
            let requester = node.reference.clone();
            let requirements = match (&node.recipe, root) {
                (Some(recipe), _) => recipe.requires.clone(),
                (None, RootSpec::Requires(reqs)) => reqs.clone(),
                (None, RootSpec::Reference(_)) => Vec::new(),
            };
            tracing::trace!("Expanding {requester} ({} requirements)", requirements.len());

            for req in requirements {
                if req.is_override {
                    self.register_pin(&req, &requester, pins, &chosen, &graph)?;
                    continue;
                }

                position += 1;
                let pinned = pins.get(&req.name);
                let constraint = pinned.map_or(&req.constraint, |p| &p.constraint);

                let target = if let Some(existing) = chosen.get(&req.name) {
                    let version = &graph.node(existing.id).reference.version;
                    if !self.source.satisfies(constraint, version) {
                        return Err(GraphError::Conflict {
                            package: req.name.clone(),
                            first_by: existing.by.clone(),
                            first: existing.constraint.clone(),
                            second_by: requester.clone(),
                            second: req.constraint.clone(),
                        }
                        .into());
                    }
                    if let Some(mut path) = path_between(&graph, existing.id, current) {
                        path.push(existing.id);
                        return Err(GraphError::Cycle {
                            path: path
                                .into_iter()
                                .map(|id| graph.node(id).reference.clone())
                                .collect(),
                        }
                        .into());
                    }
                    existing.id
                } else {
                    let reference = self.choose_version(&req.name, constraint, &requester)?;
                    let recipe = self.source.recipe(&reference).ok_or_else(|| GraphError::NotFound {
                        what: reference.to_string(),
                        requester: requester.clone(),
                    })?;
                    tracing::debug!("{requester} requires {reference}");
                    let id = graph.add_package(reference, recipe);
                    chosen.insert(
                        req.name.clone(),
                        Chosen {
                            id,
                            by: requester.clone(),
                            constraint: constraint.clone(),
                        },
                    );
                    queue.push_back(id);
                    id
                };

                graph.add_edge(RequirementEdge {
                    from: current,
                    to: target,
                    constraint: constraint.clone(),
                    transitive: req.transitive,
                    position,
                });
            }
        }

        Ok(graph)
    }

    fn register_pin(
        &self,
        req: &Requirement,
        requester: &Reference,
        pins: &mut HashMap<PackageName, Pin>,
        chosen: &HashMap<PackageName, Chosen>,
        graph: &Graph,
    ) -> Result<(), Interrupt> {
        if let Some(pin) = pins.get(&req.name) {
            if pin.constraint != req.constraint {
                return Err(GraphError::Conflict {
                    package: req.name.clone(),
                    first_by: pin.by.clone(),
                    first: pin.constraint.clone(),
                    second_by: requester.clone(),
                    second: req.constraint.clone(),
                }
                .into());
            }
            return Ok(());
        }

        pins.insert(
            req.name.clone(),
            Pin {
                constraint: req.constraint.clone(),
                by: requester.clone(),
            },
        );
        tracing::debug!("{requester} overrides {}", req);

        match chosen.get(&req.name) {
            Some(existing)
                if !self
                    .source
                    .satisfies(&req.constraint, &graph.node(existing.id).reference.version) =>
            {
                Err(Interrupt::Restart(req.name.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Highest available version of `name` satisfying `constraint`.
    fn choose_version(
        &self,
        name: &PackageName,
        constraint: &VersionConstraint,
        requester: &Reference,
    ) -> Result<Reference, GraphError> {
        let available = self.source.available_versions(name);
        if available.is_empty() {
            return Err(GraphError::NotFound {
                what: name.to_string(),
                requester: requester.clone(),
            });
        }
        available
            .iter()
            .rev()
            .find(|v| self.source.satisfies(constraint, v))
            .map(|v| Reference::new(name.clone(), v.clone()))
            .ok_or_else(|| GraphError::Unsolvable {
                package: name.clone(),
                constraint: constraint.clone(),
                requester: requester.clone(),
                available,
            })
    }
}

/// Nodes on a dependency path from `from` to `to`, both included.
fn path_between(graph: &Graph, from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
    let mut parent: HashMap<NodeId, NodeId> = HashMap::new();
    let mut queue = VecDeque::from([from]);
    let mut seen = vec![false; graph.len()];
    seen[from.index()] = true;

    while let Some(id) = queue.pop_front() {
        if id == to {
            let mut path = vec![to];
            let mut cursor = to;
            while let Some(prev) = parent.get(&cursor) {
                path.push(*prev);
                cursor = *prev;
            }
            path.reverse();
            return Some(path);
        }
        for edge in graph.dependencies(id) {
            if !seen[edge.to.index()] {
                seen[edge.to.index()] = true;
                parent.insert(edge.to, id);
                queue.push_back(edge.to);
            }
        }
    }
    None
}
