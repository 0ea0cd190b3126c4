//! Resolution pipeline.
//!
//! 1. Expand the requirements into a graph.
//! 2. Walk the Kahn layers leaves first, computing each node's identity and
//!    running its `validate` hook.
//! 3. Decide binary statuses, querying the stores concurrently across nodes.
//! 4. Propagate invalidity to dependents, then skip unneeded nodes.
//! 5. Hand the annotated graph to the reporter.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use kiln_schema::{BinaryStatus, Reference, Requirement};

use crate::binary::{BinaryEvaluator, Decision, mark_skipped, propagate_invalid};
use crate::builder::{GraphBuilder, RootSpec};
use crate::compat::CompatibilityExplorer;
use crate::config::KilnConfig;
use crate::error::ResolveError;
use crate::graph::{Graph, InvalidReason, Node, NodeId};
use crate::hooks::HookContext;
use crate::identity::{IdentityCalculator, dependency_infos};
use crate::index::RecipeSource;
use crate::policy::BuildPolicy;
use crate::profile::Profile;
use crate::report::{GraphReport, NodeReport};
use crate::reporter::{NullReporter, Reporter};
use crate::store::{BinaryHandle, BinaryKey, BinaryStores, StoreError};
use crate::validate::{Verdict, validate};

#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub root: RootSpec,
    pub profile: Profile,
    pub build_policy: BuildPolicy,
}

impl ResolveRequest {
    /// Resolve `reference` as the root package.
    pub fn create(reference: Reference) -> Self {
        Self {
            root: RootSpec::Reference(reference),
            profile: Profile::default(),
            build_policy: BuildPolicy::default(),
        }
    }

    /// Resolve a virtual consumer with the given requirements.
    pub fn requires(requirements: Vec<Requirement>) -> Self {
        Self {
            root: RootSpec::Requires(requirements),
            profile: Profile::default(),
            build_policy: BuildPolicy::default(),
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_policy(mut self, policy: BuildPolicy) -> Self {
        self.build_policy = policy;
        self
    }
}

/// Overall result of a resolution that produced a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ready,
    /// Some binaries exist nowhere and will not be built.
    MissingBinaries,
    /// At least one node cannot produce a valid binary.
    InvalidPackages,
}

/// The annotated graph produced by [`Resolver::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution {
    graph: Graph,
}

impl Resolution {
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    /// Package node by name.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.graph.find(name)
    }

    /// Every node that is invalid for the requested configuration and was
    /// not rescued by a compatible binary.
    pub fn invalid_nodes(&self) -> Vec<&Node> {
        self.graph
            .nodes()
            .iter()
            .filter(|n| n.invalid.is_some() && n.fallback.is_none())
            .collect()
    }

    pub fn missing_nodes(&self) -> Vec<&Node> {
        self.graph
            .nodes()
            .iter()
            .filter(|n| n.binary == Some(BinaryStatus::Missing))
            .collect()
    }

    pub fn outcome(&self) -> Outcome {
        if !self.invalid_nodes().is_empty() {
            Outcome::InvalidPackages
        } else if !self.missing_nodes().is_empty() {
            Outcome::MissingBinaries
        } else {
            Outcome::Ready
        }
    }

    pub fn report(&self) -> GraphReport {
        GraphReport::new(&self.graph)
    }
}

pub struct Resolver {
    source: Arc<dyn RecipeSource>,
    stores: BinaryStores,
    config: KilnConfig,
    reporter: Arc<dyn Reporter>,
}

impl Resolver {
    pub fn new(source: Arc<dyn RecipeSource>, stores: BinaryStores, config: KilnConfig) -> Self {
        Self {
            source,
            stores,
            config,
            reporter: Arc::new(NullReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &KilnConfig {
        &self.config
    }

    /// Resolve `request` into an annotated graph.
    ///
    /// Invalid configurations and missing binaries are part of a successful
    /// result; see [`Resolution::outcome`].
    ///
    /// # Errors
    ///
    /// Returns `ResolveError` if the graph cannot be built, an option value
    /// is rejected, or a hook crashes.
    pub async fn resolve(&self, request: &ResolveRequest) -> Result<Resolution, ResolveError> {
        self.reporter.section("Computing dependency graph");
        let mut graph = GraphBuilder::new(self.source.as_ref()).build(&request.root)?;
        let layers = graph.layers()?;
        self.configure(&mut graph, &request.profile)?;

        self.reporter.section("Computing package IDs");
        let identity = IdentityCalculator::new(self.config.package_id.default_unknown_mode);
        self.identify(&mut graph, &layers, &identity)?;

        self.reporter.section("Computing necessary packages");
        let decisions = self
            .decide(&graph, &identity, &request.build_policy)
            .await?;
        for decision in decisions {
            self.apply(&mut graph, decision);
        }

        propagate_invalid(&mut graph, &layers, &request.build_policy);
        for node in graph.nodes() {
            if let Some(reason @ InvalidReason::Dependency { .. }) = &node.invalid {
                self.reporter.invalid(&node.reference, reason);
            }
        }
        mark_skipped(&mut graph, &layers);

        for id in layers.iter().flatten().copied() {
            let node = graph.node(id);
            tracing::debug!(
                "{}: {} {}",
                node.reference,
                node.status(),
                node.effective_package_id()
                    .map(ToString::to_string)
                    .unwrap_or_default()
            );
            self.reporter.node_resolved(&NodeReport::new(&graph, node));
        }

        let resolution = Resolution { graph };
        self.reporter.graph(&resolution.report());
        tracing::info!("Resolution finished: {:?}", resolution.outcome());
        Ok(resolution)
    }

    /// Attach the requested configuration to every package node.
    fn configure(&self, graph: &mut Graph, profile: &Profile) -> Result<(), ResolveError> {
        let root = graph.root();
        let ids: Vec<NodeId> = graph.nodes().iter().map(|n| n.id).collect();
        for id in ids {
            let Some(recipe) = graph.node(id).recipe.clone() else {
                continue;
            };
            graph.node_mut(id).settings = profile.configure(&recipe, id == root)?;
        }
        Ok(())
    }

    /// Compute package IDs and run `validate`, dependencies first.
    fn identify(
        &self,
        graph: &mut Graph,
        layers: &[Vec<NodeId>],
        identity: &IdentityCalculator,
    ) -> Result<(), ResolveError> {
        for id in layers.iter().flatten().copied() {
            let node = graph.node(id);
            let Some(recipe) = node.recipe.clone() else {
                continue;
            };
            let requires = identity.contributions(graph, id);
            let computed = identity.identify(&recipe, &node.settings, &requires)?;
            let dependencies = dependency_infos(graph, id);
            let ctx = HookContext {
                reference: &node.reference,
                settings: &node.settings,
                info: &computed.info,
                dependencies: &dependencies,
            };
            let verdict = validate(&recipe, &ctx)?;

            let node = graph.node_mut(id);
            tracing::debug!("{}: package ID {}", node.reference, computed.package_id);
            node.info = computed.info;
            node.package_id = Some(computed.package_id);
            if let Verdict::Invalid(message) = verdict {
                let reason = InvalidReason::Own(message);
                self.reporter.invalid(&node.reference, &reason);
                node.invalid = Some(reason);
            }
        }
        Ok(())
    }

    /// Decide every package node, a bounded number at a time.
    async fn decide(
        &self,
        graph: &Graph,
        identity: &IdentityCalculator,
        policy: &BuildPolicy,
    ) -> Result<Vec<Decision>, ResolveError> {
        let explorer = CompatibilityExplorer::new(identity, &self.stores);
        let evaluator = BinaryEvaluator::new(&self.stores, policy, explorer);
        let evaluator = &evaluator;

        let ids: Vec<NodeId> = graph
            .nodes()
            .iter()
            .filter(|n| !n.is_virtual())
            .map(|n| n.id)
            .collect();
        let results: Vec<Result<Decision, ResolveError>> = stream::iter(ids)
            .map(move |id| evaluator.evaluate(graph, id))
            .buffer_unordered(self.config.max_concurrent_queries())
            .collect()
            .await;

        let mut decisions = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        decisions.sort_by_key(|d| d.id);
        Ok(decisions)
    }

    fn apply(&self, graph: &mut Graph, decision: Decision) {
        let node = graph.node_mut(decision.id);
        // already logged by `locate` against the key that was queried
        for error in &decision.store_errors {
            self.reporter.store_unavailable(&node.reference, error);
        }
        if let Some(fallback) = &decision.fallback {
            self.reporter.compatible_fallback(&node.reference, fallback);
        }
        node.binary = Some(decision.status);
        node.fallback = decision.fallback;
        node.remote = decision.remote;
        node.store_errors = decision.store_errors;
    }

    /// Fetch every `Download` node from the remote it was located on.
    ///
    /// # Errors
    ///
    /// Returns the first `StoreError` encountered.
    pub async fn fetch(&self, resolution: &Resolution) -> Result<Vec<BinaryHandle>, StoreError> {
        let downloads: Vec<&Node> = resolution
            .graph()
            .nodes()
            .iter()
            .filter(|n| n.binary == Some(BinaryStatus::Download))
            .collect();
        self.reporter.section("Downloading binaries");

        let results: Vec<Result<BinaryHandle, StoreError>> = stream::iter(downloads)
            .map(|node| async move {
                let name = node.remote.clone().unwrap_or_default();
                let unavailable = |message: &str| StoreError::Unavailable {
                    store: name.clone(),
                    message: message.to_string(),
                };
                let store = self
                    .stores
                    .remote(&name)
                    .ok_or_else(|| unavailable("remote is not configured"))?;
                let package_id = node
                    .effective_package_id()
                    .ok_or_else(|| unavailable("node has no package ID"))?;
                let key = BinaryKey::new(&node.reference, package_id);
                tracing::info!("Downloading {key} from '{name}'");
                store.fetch(&key).await
            })
            .buffer_unordered(self.config.max_concurrent_queries())
            .collect()
            .await;

        let mut handles = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        handles.sort_by(|a, b| a.key.reference.cmp(&b.key.reference));
        Ok(handles)
    }
}
