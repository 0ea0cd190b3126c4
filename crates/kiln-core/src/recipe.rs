//! Package definitions (recipes).
//!
//! The declarative part of a recipe can be read from TOML:
//!
//! ```toml
//! settings = ["os", "compiler", "build_type"]
//! requires = ["zlib/[>=1.2 <2]", { ref = "openssl/3.0.13", transitive = false }]
//!
//! [package]
//! name = "pkg"
//! version = "0.1"
//!
//! [options.shared]
//! values = ["True", "False"]
//! default = "False"
//! ```
//!
//! Hooks are attached in code with [`Recipe::on_validate`] and friends.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use kiln_schema::{ConfigurationModel, Reference, Requirement, ValueMap};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hooks::{CompatibilityCandidate, HookContext, HookError, Hooks};

/// Errors that can occur when loading or parsing a recipe.
#[derive(Error, Debug)]
pub enum RecipeError {
    /// An I/O error occurred while reading a recipe file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML content could not be deserialized into a valid recipe.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Declaration of one package option.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDecl {
    /// Allowed values; empty means any value is accepted.
    #[serde(default)]
    pub values: Vec<String>,
    /// Value used when nothing is requested.
    #[serde(default)]
    pub default: Option<String>,
}

impl OptionDecl {
    /// Whether `value` is allowed for this option.
    pub fn accepts(&self, value: &str) -> bool {
        self.values.is_empty() || self.values.iter().any(|v| v == value)
    }
}

#[derive(Debug, Deserialize)]
struct RecipeManifest {
    package: PackageMeta,
    #[serde(default)]
    settings: Vec<String>,
    #[serde(default)]
    options: BTreeMap<String, OptionDecl>,
    #[serde(default)]
    requires: Vec<Requirement>,
}

#[derive(Debug, Deserialize)]
struct PackageMeta {
    name: String,
    version: String,
}

/// A package definition: what it consumes, what it requires and its hooks.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub reference: Reference,
    /// Settings this package is sensitive to. A declared `compiler` also
    /// captures every `compiler.*` sub-setting.
    pub settings: Vec<String>,
    pub options: BTreeMap<String, OptionDecl>,
    pub requires: Vec<Requirement>,
    pub hooks: Hooks,
}

impl Recipe {
    pub fn new(reference: Reference) -> Self {
        Self {
            reference,
            settings: Vec::new(),
            options: BTreeMap::new(),
            requires: Vec::new(),
            hooks: Hooks::default(),
        }
    }

    /// Parse a recipe from a TOML file on disk.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::Io` if the file cannot be read, or
    /// `RecipeError::Parse` if the TOML content is invalid.
    pub fn from_file(path: &Path) -> Result<Self, RecipeError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a recipe from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::Parse` if the TOML content is invalid or does
    /// not match the expected schema.
    pub fn parse(content: &str) -> Result<Self, RecipeError> {
        let manifest: RecipeManifest = toml::from_str(content)?;
        Ok(Self {
            reference: Reference::new(manifest.package.name, manifest.package.version),
            settings: manifest.settings,
            options: manifest.options,
            requires: manifest.requires,
            hooks: Hooks::default(),
        })
    }

    pub fn with_settings(mut self, settings: &[&str]) -> Self {
        self.settings = settings.iter().map(ToString::to_string).collect();
        self
    }

    /// Declare an option. An empty `values` slice accepts anything.
    pub fn with_option(mut self, name: &str, values: &[&str], default: &str) -> Self {
        self.options.insert(
            name.to_string(),
            OptionDecl {
                values: values.iter().map(ToString::to_string).collect(),
                default: Some(default.to_string()),
            },
        );
        self
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requires.push(requirement);
        self
    }

    pub fn on_validate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext<'_>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.hooks.validate = Some(Arc::new(hook));
        self
    }

    pub fn on_compatibility<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext<'_>) -> Result<Vec<CompatibilityCandidate>, HookError>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.compatibility = Some(Arc::new(hook));
        self
    }

    pub fn on_package_id<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ConfigurationModel) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.hooks.package_id = Some(Arc::new(hook));
        self
    }

    /// Whether the recipe consumes the (possibly dotted) setting `key`.
    pub fn declares_setting(&self, key: &str) -> bool {
        self.settings.iter().any(|declared| {
            key == declared
                || key
                    .strip_prefix(declared.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    /// Keep only the requested settings this recipe consumes.
    pub fn filter_settings(&self, requested: &ValueMap) -> ValueMap {
        requested
            .iter()
            .filter(|(key, _)| self.declares_setting(key))
            .collect()
    }

    /// Default value of every option that has one.
    pub fn default_options(&self) -> ValueMap {
        self.options
            .iter()
            .filter_map(|(name, decl)| decl.default.as_deref().map(|d| (name.as_str(), d)))
            .collect()
    }
}
