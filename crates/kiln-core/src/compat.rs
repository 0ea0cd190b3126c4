//! Compatibility fallback search.
//!
//! When the requested package ID has no binary, the recipe's
//! `compatibility` hook may offer alternate configurations. Candidates are
//! identified and validated like the primary configuration, then looked up
//! in list order; the first one with a binary wins.

use std::collections::HashSet;

use kiln_schema::PackageId;

use crate::error::ResolveError;
use crate::graph::{CompatibilityFallback, Graph, NodeId};
use crate::hooks::{HookContext, HookKind};
use crate::identity::{IdentityCalculator, dependency_infos};
use crate::store::{BinaryKey, BinaryStores, Location, StoreError};
use crate::validate::{Verdict, validate};

/// A candidate that survived identification and validation.
#[derive(Debug, Clone)]
pub struct PreparedCandidate {
    /// Position in the hook's list.
    pub index: usize,
    pub package_id: PackageId,
}

/// Outcome of a fallback search.
#[derive(Debug, Clone, Default)]
pub struct Exploration {
    pub selected: Option<(CompatibilityFallback, Location)>,
    pub store_errors: Vec<StoreError>,
}

pub struct CompatibilityExplorer<'a> {
    identity: &'a IdentityCalculator,
    stores: &'a BinaryStores,
}

impl<'a> CompatibilityExplorer<'a> {
    pub fn new(identity: &'a IdentityCalculator, stores: &'a BinaryStores) -> Self {
        Self { identity, stores }
    }

    /// Run the compatibility hook of `id` and identify every candidate.
    ///
    /// Candidates that fail validation, collapse onto the requested ID, or
    /// duplicate an earlier candidate are dropped; the rest keep hook order.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::Hook` if any hook crashes.
    pub fn candidates(&self, graph: &Graph, id: NodeId) -> Result<Vec<PreparedCandidate>, ResolveError> {
        let node = graph.node(id);
        let Some(recipe) = node.recipe.as_deref() else {
            return Ok(Vec::new());
        };
        let Some(hook) = &recipe.hooks.compatibility else {
            return Ok(Vec::new());
        };

        let dependencies = dependency_infos(graph, id);
        let ctx = HookContext {
            reference: &node.reference,
            settings: &node.settings,
            info: &node.info,
            dependencies: &dependencies,
        };
        let offered = hook(&ctx)
            .map_err(|e| ResolveError::hook(&node.reference, HookKind::Compatibility, e))?;

        let requires = self.identity.contributions(graph, id);
        let mut seen: HashSet<PackageId> = node.package_id.iter().cloned().collect();
        let mut prepared = Vec::new();
        for (index, candidate) in offered.iter().enumerate() {
            let mut model = candidate.apply(&node.settings);
            model.settings = recipe.filter_settings(&model.settings);

            let identity = self.identity.identify(recipe, &model, &requires)?;
            let ctx = HookContext {
                reference: &node.reference,
                settings: &model,
                info: &identity.info,
                dependencies: &dependencies,
            };
            if let Verdict::Invalid(reason) = validate(recipe, &ctx)? {
                tracing::debug!(
                    "{}: compatible candidate #{index} ({}) rejected: {reason}",
                    node.reference,
                    identity.package_id
                );
                continue;
            }
            if !seen.insert(identity.package_id.clone()) {
                continue;
            }
            prepared.push(PreparedCandidate {
                index,
                package_id: identity.package_id,
            });
        }
        Ok(prepared)
    }

    /// Look the candidates up in order and select the first with a binary.
    pub async fn search(&self, graph: &Graph, id: NodeId, candidates: &[PreparedCandidate]) -> Exploration {
        let node = graph.node(id);
        let mut exploration = Exploration::default();
        let Some(requested) = node.package_id.clone() else {
            return exploration;
        };

        for candidate in candidates {
            let key = BinaryKey::new(&node.reference, &candidate.package_id);
            let lookup = self.stores.locate(&key).await;
            exploration.store_errors.extend(lookup.errors);
            if let Some(location) = lookup.location {
                tracing::info!(
                    "{}: main binary package '{requested}' missing, using compatible package '{}'",
                    node.reference,
                    candidate.package_id
                );
                exploration.selected = Some((
                    CompatibilityFallback {
                        requested,
                        selected: candidate.package_id.clone(),
                        candidate_index: candidate.index,
                    },
                    location,
                ));
                break;
            }
        }
        exploration
    }
}
