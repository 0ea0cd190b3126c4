//! Requested settings and option assignments.
//!
//! Profiles can be written as TOML:
//!
//! ```toml
//! [settings]
//! os = "Linux"
//! compiler = "gcc"
//! "compiler.version" = "12"
//!
//! [options]
//! shared = "True"           # root package only
//! "zlib/*:shared" = "False" # scoped
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use kiln_schema::{ConfigurationModel, Reference, ValueMap};
use serde::Deserialize;

use crate::config::ConfigError;
use crate::error::ResolveError;
use crate::policy::RefPattern;
use crate::recipe::Recipe;

/// One `[scope:]name=value` option assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionAssignment {
    /// `None` targets the root package.
    pub scope: Option<RefPattern>,
    pub name: String,
    pub value: String,
}

impl OptionAssignment {
    fn applies_to(&self, reference: &Reference, is_root: bool) -> bool {
        match &self.scope {
            None => is_root,
            Some(pattern) => pattern.matches(reference),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub settings: ValueMap,
    pub options: Vec<OptionAssignment>,
}

#[derive(Debug, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    settings: BTreeMap<String, String>,
    #[serde(default)]
    options: BTreeMap<String, String>,
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn setting(mut self, key: &str, value: &str) -> Self {
        self.settings.set(key, value);
        self
    }

    /// Set an option on the root package.
    pub fn option(mut self, name: &str, value: &str) -> Self {
        self.options.push(OptionAssignment {
            scope: None,
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Set an option on every package matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Pattern` for a malformed glob.
    pub fn scoped_option(mut self, pattern: &str, name: &str, value: &str) -> Result<Self, ConfigError> {
        self.options.push(OptionAssignment {
            scope: Some(RefPattern::new(pattern)?),
            name: name.to_string(),
            value: value.to_string(),
        });
        Ok(self)
    }

    /// Parse a profile from TOML. Option keys of the form `pattern:name`
    /// are scoped.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` on malformed TOML and
    /// `ConfigError::Pattern` on a malformed scope.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: ProfileFile = toml::from_str(content)?;
        let mut profile = Self {
            settings: file.settings.into_iter().collect(),
            options: Vec::new(),
        };
        for (key, value) in file.options {
            profile = match key.rsplit_once(':') {
                Some((pattern, name)) => profile.scoped_option(pattern, name, &value)?,
                None => profile.option(&key, &value),
            };
        }
        Ok(profile)
    }

    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Option assignments that target `reference`, later ones winning.
    pub fn options_for(&self, reference: &Reference, is_root: bool) -> Vec<&OptionAssignment> {
        self.options
            .iter()
            .filter(|o| o.applies_to(reference, is_root))
            .collect()
    }

    /// The requested configuration of `recipe`: the settings it consumes
    /// and its options (defaults overlaid with matching assignments).
    ///
    /// Scoped assignments skip packages that do not declare the option, so
    /// `*:shared` only touches packages that have `shared`.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::InvalidOption` for a value outside the declared
    /// set and `ResolveError::UnknownOption` for an unscoped assignment to an
    /// undeclared option.
    pub fn configure(&self, recipe: &Recipe, is_root: bool) -> Result<ConfigurationModel, ResolveError> {
        let mut model = ConfigurationModel::new();
        model.settings = recipe.filter_settings(&self.settings);
        model.options = recipe.default_options();

        for assignment in self.options_for(&recipe.reference, is_root) {
            match recipe.options.get(&assignment.name) {
                None if assignment.scope.is_none() => {
                    return Err(ResolveError::UnknownOption {
                        reference: recipe.reference.clone(),
                        option: assignment.name.clone(),
                    });
                }
                None => {}
                Some(decl) if !decl.accepts(&assignment.value) => {
                    return Err(ResolveError::InvalidOption {
                        reference: recipe.reference.clone(),
                        option: assignment.name.clone(),
                        value: assignment.value.clone(),
                        allowed: decl.values.clone(),
                    });
                }
                Some(_) => model.options.set(assignment.name.clone(), assignment.value.clone()),
            }
        }
        Ok(model)
    }
}
