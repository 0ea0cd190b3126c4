//! Resolution-wide failures.
//!
//! Node-local conditions (invalid configurations, unreachable stores) never
//! show up here; they are absorbed into node state. Everything in this module
//! aborts the whole request.

use kiln_schema::{PackageName, Reference, Version, VersionConstraint};
use thiserror::Error;

use crate::hooks::{HookError, HookKind};

/// Structural failure while building the dependency graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error(
        "Version conflict on '{package}': {first_by} requires {package}/{first}, \
         {second_by} requires {package}/{second}"
    )]
    Conflict {
        package: PackageName,
        first_by: Reference,
        first: VersionConstraint,
        second_by: Reference,
        second: VersionConstraint,
    },

    #[error("Circular dependency: {}", format_path(.path))]
    Cycle { path: Vec<Reference> },

    #[error(
        "No version of '{package}' satisfies {constraint} (required by {requester}); available: {}",
        format_versions(.available)
    )]
    Unsolvable {
        package: PackageName,
        constraint: VersionConstraint,
        requester: Reference,
        available: Vec<Version>,
    },

    #[error("Recipe '{what}' not found (required by {requester})")]
    NotFound { what: String, requester: Reference },
}

fn format_path(path: &[Reference]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_versions(versions: &[Version]) -> String {
    if versions.is_empty() {
        return "none".to_string();
    }
    versions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure of a whole resolution request.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("{reference}: Error in {hook}() hook: {message}")]
    Hook {
        reference: Reference,
        hook: HookKind,
        message: String,
    },

    #[error("{reference}: '{value}' is not a valid value for option '{option}' (allowed: {})", .allowed.join(", "))]
    InvalidOption {
        reference: Reference,
        option: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("{reference}: option '{option}' is not declared")]
    UnknownOption { reference: Reference, option: String },
}

impl ResolveError {
    /// Wrap a crashed hook. `HookError::Invalid` is node-local and must be
    /// handled before reaching this point; it is still accepted here so a
    /// misplaced one reports its message rather than vanishing.
    pub fn hook(reference: &Reference, hook: HookKind, err: HookError) -> Self {
        let message = match err {
            HookError::Invalid(reason) => reason,
            HookError::Other(e) => format!("{e:#}"),
        };
        Self::Hook {
            reference: reference.clone(),
            hook,
            message,
        }
    }

    /// Whether the graph itself could not be produced.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Graph(_))
    }
}
