//! Per-node configuration: settings, options and dependency contributions.
//!
//! Keys are flat strings; nested settings use dotted keys such as
//! `compiler.version`. Values are opaque tokens compared verbatim.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A sorted key/value map with explicit absence semantics.
///
/// Removing a key also removes its dotted sub-keys, so removing `compiler`
/// drops `compiler.version` and `compiler.libcxx` as well.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueMap(BTreeMap<String, String>);

impl ValueMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Value for `key`, or `None` if absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Remove `key` and every `key.*` sub-key. Returns whether anything was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        let prefix = format!("{key}.");
        let before = self.0.len();
        self.0.retain(|k, _| k != key && !k.starts_with(&prefix));
        self.0.len() != before
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Which section of a [`ConfigurationModel`] a field lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    /// Platform and toolchain axes.
    Settings,
    /// Package-specific build choices.
    Options,
    /// Contributions of dependencies to the package identity.
    Requires,
}

impl Section {
    /// Section name as used in field paths and the canonical rendering.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Settings => "settings",
            Self::Options => "options",
            Self::Requires => "requires",
        }
    }
}

/// The configuration of one graph node.
///
/// Two models are equal iff all their retained entries are equal, which is
/// what makes a pruned model a sound identity input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigurationModel {
    /// Platform/toolchain settings (`os`, `compiler.version`, ...).
    #[serde(default)]
    pub settings: ValueMap,
    /// Package options (`shared`, `header_only`, ...).
    #[serde(default)]
    pub options: ValueMap,
    /// Rendered dependency contributions keyed by dependency name.
    #[serde(default)]
    pub requires: ValueMap,
}

impl ConfigurationModel {
    /// An empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow one section.
    pub fn section(&self, section: Section) -> &ValueMap {
        match section {
            Section::Settings => &self.settings,
            Section::Options => &self.options,
            Section::Requires => &self.requires,
        }
    }

    /// Mutably borrow one section.
    pub fn section_mut(&mut self, section: Section) -> &mut ValueMap {
        match section {
            Section::Settings => &mut self.settings,
            Section::Options => &mut self.options,
            Section::Requires => &mut self.requires,
        }
    }

    /// Set a field addressed by a path such as `settings.os` or `options.shared`.
    ///
    /// Paths without a recognized section prefix address settings.
    pub fn set(&mut self, path: &str, value: impl Into<String>) {
        let (section, key) = split_path(path);
        self.section_mut(section).set(key, value);
    }

    /// Read a field addressed by path; see [`ConfigurationModel::set`].
    pub fn get(&self, path: &str) -> Option<&str> {
        let (section, key) = split_path(path);
        self.section(section).get(key)
    }

    /// Remove a field (and its dotted sub-keys) addressed by path.
    pub fn remove(&mut self, path: &str) -> bool {
        let (section, key) = split_path(path);
        self.section_mut(section).remove(key)
    }

    /// Drop every field in every section.
    ///
    /// Used by package-ID customization to declare that nothing in this
    /// configuration affects the binary (header-only packages).
    pub fn clear(&mut self) {
        self.settings.clear();
        self.options.clear();
        self.requires.clear();
    }

    /// Whether every section is empty.
    pub fn is_empty(&self) -> bool {
        self.settings.is_empty() && self.options.is_empty() && self.requires.is_empty()
    }

    /// All entries as `(section.key, value)` pairs in canonical order.
    pub fn fields(&self) -> Vec<(String, String)> {
        [Section::Settings, Section::Options, Section::Requires]
            .into_iter()
            .flat_map(|section| {
                self.section(section)
                    .iter()
                    .map(move |(k, v)| (format!("{}.{k}", section.as_str()), v.to_string()))
            })
            .collect()
    }
}

fn split_path(path: &str) -> (Section, &str) {
    if let Some(key) = path.strip_prefix("settings.") {
        (Section::Settings, key)
    } else if let Some(key) = path.strip_prefix("options.") {
        (Section::Options, key)
    } else if let Some(key) = path.strip_prefix("requires.") {
        (Section::Requires, key)
    } else {
        (Section::Settings, path)
    }
}
