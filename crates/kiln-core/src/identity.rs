//! Package ID computation.
//!
//! The identity model of a node is its requested configuration plus one
//! `requires` entry per contributing dependency, rendered according to the
//! configured [`PackageIdMode`]. The recipe's `package_id` hook then prunes a
//! private copy of that model before it is hashed.

use kiln_schema::{ConfigurationModel, PackageId, PackageIdMode, ValueMap};

use crate::error::ResolveError;
use crate::graph::{Graph, NodeId};
use crate::hooks::{DependencyInfo, HookKind};
use crate::recipe::Recipe;

/// Result of identifying one configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The model after the `package_id` hook ran.
    pub info: ConfigurationModel,
    pub package_id: PackageId,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCalculator {
    mode: PackageIdMode,
}

impl IdentityCalculator {
    pub fn new(mode: PackageIdMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> PackageIdMode {
        self.mode
    }

    /// Rendered contributions of the dependencies of `id`, keyed by name.
    ///
    /// Dependencies must already carry their package IDs when the mode
    /// embeds them.
    pub fn contributions(&self, graph: &Graph, id: NodeId) -> ValueMap {
        graph
            .identity_closure(id)
            .into_iter()
            .filter_map(|dep| {
                let node = graph.node(dep);
                self.mode
                    .render(&node.reference, node.package_id.as_ref())
                    .map(|rendered| (node.name().to_string(), rendered))
            })
            .collect()
    }

    /// Identify `requested` for `recipe`, given the dependency contributions.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::Hook` if the `package_id` hook fails.
    pub fn identify(
        &self,
        recipe: &Recipe,
        requested: &ConfigurationModel,
        requires: &ValueMap,
    ) -> Result<Identity, ResolveError> {
        let mut info = requested.clone();
        info.requires = requires.clone();
        if let Some(hook) = &recipe.hooks.package_id {
            hook(&mut info)
                .map_err(|e| ResolveError::hook(&recipe.reference, HookKind::PackageId, e))?;
        }
        let package_id = PackageId::compute(&info);
        tracing::trace!("{}: package ID {package_id}", recipe.reference);
        Ok(Identity { info, package_id })
    }
}

/// The dependencies a hook of `id` gets to see.
pub fn dependency_infos(graph: &Graph, id: NodeId) -> Vec<DependencyInfo> {
    graph
        .identity_closure(id)
        .into_iter()
        .map(|dep| {
            let node = graph.node(dep);
            DependencyInfo {
                reference: node.reference.clone(),
                package_id: node.package_id.clone(),
            }
        })
        .collect()
}
