//! Sink for resolution progress and per-node decisions.
//!
//! The core never formats output; front ends render these events.

use kiln_schema::Reference;

use crate::graph::{CompatibilityFallback, InvalidReason};
use crate::report::{GraphReport, NodeReport};
use crate::store::StoreError;

pub trait Reporter: Send + Sync {
    /// Indicates a new phase has started (e.g. "Computing package IDs").
    fn section(&self, title: &str);

    /// A node's binary status has been decided.
    fn node_resolved(&self, node: &NodeReport);

    /// A compatible configuration replaced the requested package ID.
    fn compatible_fallback(&self, reference: &Reference, fallback: &CompatibilityFallback);

    /// A node cannot produce a valid binary.
    fn invalid(&self, reference: &Reference, reason: &InvalidReason);

    /// A store query failed and was counted as a miss.
    fn store_unavailable(&self, reference: &Reference, error: &StoreError);

    /// The final annotated graph.
    fn graph(&self, report: &GraphReport);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title)
    }
    fn node_resolved(&self, node: &NodeReport) {
        (**self).node_resolved(node)
    }
    fn compatible_fallback(&self, reference: &Reference, fallback: &CompatibilityFallback) {
        (**self).compatible_fallback(reference, fallback)
    }
    fn invalid(&self, reference: &Reference, reason: &InvalidReason) {
        (**self).invalid(reference, reason)
    }
    fn store_unavailable(&self, reference: &Reference, error: &StoreError) {
        (**self).store_unavailable(reference, error)
    }
    fn graph(&self, report: &GraphReport) {
        (**self).graph(report)
    }
}

/// Discards everything.
#[derive(Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn node_resolved(&self, _: &NodeReport) {}
    fn compatible_fallback(&self, _: &Reference, _: &CompatibilityFallback) {}
    fn invalid(&self, _: &Reference, _: &InvalidReason) {}
    fn store_unavailable(&self, _: &Reference, _: &StoreError) {}
    fn graph(&self, _: &GraphReport) {}
}
