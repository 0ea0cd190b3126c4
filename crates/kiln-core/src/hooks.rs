//! Per-package hook slots: `validate`, `compatibility` and `package_id`.
//!
//! Hooks are plain callbacks stored on a [`Recipe`](crate::recipe::Recipe).
//! They only ever see their own node: a read-only [`HookContext`] snapshot,
//! plus (for `package_id`) a private copy of the identity model to prune.

use kiln_schema::{ConfigurationModel, PackageId, Reference};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error returned by a user hook.
#[derive(Error, Debug)]
pub enum HookError {
    /// The configuration cannot produce a valid binary.
    #[error("{0}")]
    Invalid(String),

    /// Anything else; aborts the whole resolution.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HookError {
    /// Shorthand for [`HookError::Invalid`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }
}

/// Which hook slot a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Validate,
    Compatibility,
    PackageId,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Validate => "validate",
            Self::Compatibility => "compatibility",
            Self::PackageId => "package_id",
        })
    }
}

/// A resolved dependency as seen from a hook.
#[derive(Debug, Clone)]
pub struct DependencyInfo {
    pub reference: Reference,
    pub package_id: Option<PackageId>,
}

/// Read-only view of the node a hook runs for.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    /// Reference of the node.
    pub reference: &'a Reference,
    /// The full requested configuration, before package-ID pruning.
    pub settings: &'a ConfigurationModel,
    /// The identity model after the `package_id` hook ran.
    pub info: &'a ConfigurationModel,
    /// Every dependency contributing to this node's identity.
    pub dependencies: &'a [DependencyInfo],
}

impl HookContext<'_> {
    /// Requested value of a setting (`os`, `compiler.version`, ...).
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.settings.get(key)
    }

    /// Requested value of an option.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.settings.options.get(key)
    }

    /// Dependency by package name.
    pub fn dependency(&self, name: &str) -> Option<&DependencyInfo> {
        self.dependencies.iter().find(|d| d.reference.name == name)
    }
}

/// An alternate configuration offered by a `compatibility` hook.
///
/// Substitutions are applied on top of the node's requested configuration;
/// the result then goes through `package_id` and `validate` like the primary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompatibilityCandidate {
    pub settings: Vec<(String, String)>,
    pub options: Vec<(String, String)>,
}

impl CompatibilityCandidate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Substitute a setting value.
    pub fn setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.push((key.into(), value.into()));
        self
    }

    /// Substitute an option value.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }

    /// Apply the substitutions to a copy of `base`.
    pub fn apply(&self, base: &ConfigurationModel) -> ConfigurationModel {
        let mut model = base.clone();
        for (key, value) in &self.settings {
            model.settings.set(key.clone(), value.clone());
        }
        for (key, value) in &self.options {
            model.options.set(key.clone(), value.clone());
        }
        model
    }
}

pub type ValidateHook = Arc<dyn Fn(&HookContext<'_>) -> Result<(), HookError> + Send + Sync>;
pub type CompatibilityHook =
    Arc<dyn Fn(&HookContext<'_>) -> Result<Vec<CompatibilityCandidate>, HookError> + Send + Sync>;
pub type PackageIdHook = Arc<dyn Fn(&mut ConfigurationModel) -> Result<(), HookError> + Send + Sync>;

/// The three optional hook slots of a package definition.
#[derive(Clone, Default)]
pub struct Hooks {
    pub validate: Option<ValidateHook>,
    pub compatibility: Option<CompatibilityHook>,
    pub package_id: Option<PackageIdHook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("validate", &self.validate.is_some())
            .field("compatibility", &self.compatibility.is_some())
            .field("package_id", &self.package_id.is_some())
            .finish()
    }
}
