//! Recipe lookup collaborators.
//!
//! The graph builder only needs two things from the outside world: which
//! versions of a package exist, and the recipe for a chosen reference.
//! [`RecipeIndex`] is the in-memory implementation of both.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use kiln_schema::{PackageName, Reference, Version, VersionConstraint};

use crate::recipe::{Recipe, RecipeError};

pub trait VersionResolver {
    /// Known versions of `name`, oldest first.
    fn available_versions(&self, name: &PackageName) -> Vec<Version>;

    fn satisfies(&self, constraint: &VersionConstraint, version: &Version) -> bool {
        constraint.matches(version)
    }
}

pub trait RecipeProvider {
    fn recipe(&self, reference: &Reference) -> Option<Arc<Recipe>>;
}

/// Everything the resolver needs to expand a graph.
pub trait RecipeSource: VersionResolver + RecipeProvider + Send + Sync {}

impl<T: VersionResolver + RecipeProvider + Send + Sync> RecipeSource for T {}

#[derive(Debug, Clone, Default)]
pub struct RecipeIndex {
    recipes: HashMap<PackageName, BTreeMap<Version, Arc<Recipe>>>,
}

impl RecipeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a recipe.
    pub fn upsert(&mut self, recipe: Recipe) {
        self.recipes
            .entry(recipe.reference.name.clone())
            .or_default()
            .insert(recipe.reference.version.clone(), Arc::new(recipe));
    }

    pub fn with(mut self, recipe: Recipe) -> Self {
        self.upsert(recipe);
        self
    }

    /// Load every `*.toml` recipe in `dir`.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError` if the directory cannot be read or any recipe
    /// fails to parse.
    pub fn load_dir(dir: &Path) -> Result<Self, RecipeError> {
        let mut index = Self::new();
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        for path in paths {
            let recipe = Recipe::from_file(&path)?;
            tracing::debug!("Loaded recipe {} from {}", recipe.reference, path.display());
            index.upsert(recipe);
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.recipes.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

impl VersionResolver for RecipeIndex {
    fn available_versions(&self, name: &PackageName) -> Vec<Version> {
        self.recipes
            .get(name)
            .map(|versions| versions.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl RecipeProvider for RecipeIndex {
    fn recipe(&self, reference: &Reference) -> Option<Arc<Recipe>> {
        let versions = self.recipes.get(&reference.name)?;
        versions.get(&reference.version).cloned().or_else(|| {
            // `1.2` and `1.2.0` name the same release
            let wanted = VersionConstraint::Exact(reference.version.clone());
            versions
                .iter()
                .find(|(v, _)| wanted.matches(v))
                .map(|(_, r)| Arc::clone(r))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> RecipeIndex {
        RecipeIndex::new()
            .with(Recipe::new(Reference::new("zlib", "1.2.13")))
            .with(Recipe::new(Reference::new("zlib", "1.3")))
            .with(Recipe::new(Reference::new("zlib", "1.10.0")))
    }

    #[test]
    fn versions_are_sorted_semantically() {
        let versions = index().available_versions(&PackageName::new("zlib"));
        assert_eq!(versions, vec!["1.2.13", "1.3", "1.10.0"]);
        assert!(index().available_versions(&PackageName::new("bzip2")).is_empty());
    }

    #[test]
    fn recipe_lookup_tolerates_short_versions() {
        let index = index();
        assert!(index.recipe(&Reference::new("zlib", "1.3.0")).is_some());
        assert!(index.recipe(&Reference::new("zlib", "1.4")).is_none());
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn load_recipes_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("zlib.toml"),
            "[package]\nname = \"zlib\"\nversion = \"1.3\"\n",
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "not a recipe").unwrap();

        let index = RecipeIndex::load_dir(dir.path()).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.recipe(&Reference::new("zlib", "1.3")).is_some());
    }
}
