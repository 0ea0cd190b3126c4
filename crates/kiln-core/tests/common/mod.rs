#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use kiln_core::{
    BinaryKey, BinaryStores, CompatibilityFallback, GraphReport, InvalidReason, KilnConfig,
    MemoryStore, Node, NodeReport, Recipe, Reporter, ResolveError, ResolveRequest, Resolution,
    Resolver, StoreError,
};
use kiln_schema::{PackageIdMode, Reference, Requirement};

/// Recipes plus a local cache and one remote, all in memory.
pub struct TestContext {
    pub recipes: kiln_core::RecipeIndex,
    pub local: Arc<MemoryStore>,
    pub remote: Arc<MemoryStore>,
    pub config: KilnConfig,
    pub reporter: Arc<RecordingReporter>,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            recipes: kiln_core::RecipeIndex::new(),
            local: Arc::new(MemoryStore::new("local")),
            remote: Arc::new(MemoryStore::new("central")),
            config: KilnConfig::default(),
            reporter: Arc::new(RecordingReporter::default()),
        }
    }

    pub fn with(mut self, recipe: Recipe) -> Self {
        self.recipes.upsert(recipe);
        self
    }

    pub fn with_mode(mut self, mode: PackageIdMode) -> Self {
        self.config = self.config.with_mode(mode);
        self
    }

    pub fn stores(&self) -> BinaryStores {
        BinaryStores::new(self.local.clone()).with_remote(self.remote.clone())
    }

    pub fn resolver(&self) -> Resolver {
        Resolver::new(Arc::new(self.recipes.clone()), self.stores(), self.config.clone())
            .with_reporter(self.reporter.clone())
    }

    pub async fn resolve(&self, request: &ResolveRequest) -> Result<Resolution, ResolveError> {
        self.resolver().resolve(request).await
    }
}

pub fn reference(text: &str) -> Reference {
    text.parse().expect("valid reference")
}

pub fn requires(texts: &[&str]) -> Vec<Requirement> {
    texts
        .iter()
        .map(|t| Requirement::parse(t).expect("valid requirement"))
        .collect()
}

/// Key of the binary the node asked for.
pub fn requested_key(node: &Node) -> BinaryKey {
    BinaryKey::new(&node.reference, node.package_id.as_ref().expect("node has an ID"))
}

#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub sections: Mutex<Vec<String>>,
    pub resolved: Mutex<Vec<String>>,
    pub fallbacks: Mutex<Vec<(String, usize)>>,
    pub invalid: Mutex<Vec<(String, String)>>,
    pub unavailable: Mutex<Vec<(String, String)>>,
    pub graphs: Mutex<Vec<GraphReport>>,
}

impl Reporter for RecordingReporter {
    fn section(&self, title: &str) {
        self.sections.lock().unwrap().push(title.to_string());
    }

    fn node_resolved(&self, node: &NodeReport) {
        self.resolved.lock().unwrap().push(node.reference.clone());
    }

    fn compatible_fallback(&self, reference: &Reference, fallback: &CompatibilityFallback) {
        self.fallbacks
            .lock()
            .unwrap()
            .push((reference.to_string(), fallback.candidate_index));
    }

    fn invalid(&self, reference: &Reference, reason: &InvalidReason) {
        self.invalid
            .lock()
            .unwrap()
            .push((reference.to_string(), reason.to_string()));
    }

    fn store_unavailable(&self, reference: &Reference, error: &StoreError) {
        let store = match error {
            StoreError::Unavailable { store, .. } | StoreError::NotFound { store, .. } => store.clone(),
        };
        self.unavailable
            .lock()
            .unwrap()
            .push((reference.to_string(), store));
    }

    fn graph(&self, report: &GraphReport) {
        self.graphs.lock().unwrap().push(report.clone());
    }
}
