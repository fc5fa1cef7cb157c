//! Change detection.
//!
//! A [`ChangeSource`] reports changed file paths; [`resolve`] intersects them
//! with a [`RecipeCatalog`] to produce the [`ChangeSet`] of recipes to build.
//! Both sources yield absolute paths, so the intersection does not care which
//! one was used.

pub mod git;
pub mod local;
pub mod remote;

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::RecipeCatalog;
use crate::domain::{Recipe, RECIPE_SUFFIX};
use crate::error::Result;

pub use local::LocalDiff;
pub use remote::{latest_push, EventSource, GitLabEvents, ProjectEvent, PushData, PushRange, RemoteApi};

/// Where changed paths come from.
#[derive(Debug, Clone)]
pub enum ChangeSource {
    LocalDiff(LocalDiff),
    RemoteApi(RemoteApi),
}

impl ChangeSource {
    /// Strategy name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ChangeSource::LocalDiff(_) => "local",
            ChangeSource::RemoteApi(_) => "remote",
        }
    }

    /// Absolute paths reported as changed.
    pub async fn changed_paths(&self) -> Result<Vec<PathBuf>> {
        match self {
            ChangeSource::LocalDiff(local) => local.changed_paths(),
            ChangeSource::RemoteApi(remote) => remote.changed_paths().await,
        }
    }
}

/// Ordered, duplicate-free recipes to build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    recipes: Vec<Recipe>,
}

impl ChangeSet {
    /// Build a change set, dropping repeated recipes and keeping first order.
    pub fn from_recipes(recipes: impl IntoIterator<Item = Recipe>) -> Self {
        let mut set = Self::default();
        for recipe in recipes {
            set.push(recipe);
        }
        set
    }

    /// Append a recipe unless it is already present. Returns whether it was added.
    pub fn push(&mut self, recipe: Recipe) -> bool {
        if self.contains(&recipe) {
            return false;
        }
        self.recipes.push(recipe);
        true
    }

    pub fn contains(&self, recipe: &Recipe) -> bool {
        self.recipes.contains(recipe)
    }

    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Recipe> {
        self.recipes.iter()
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Recipe;
    type IntoIter = std::slice::Iter<'a, Recipe>;

    fn into_iter(self) -> Self::IntoIter {
        self.recipes.iter()
    }
}

/// Resolve the recipes changed according to `source`.
pub async fn resolve(catalog: &RecipeCatalog, source: &ChangeSource) -> Result<ChangeSet> {
    let paths = source.changed_paths().await?;
    let change_set = intersect(catalog, &paths);

    info!(
        strategy = source.name(),
        changed_paths = paths.len(),
        changed_recipes = change_set.len(),
        "Resolved change set"
    );
    Ok(change_set)
}

/// Keep the catalog recipes whose paths appear in `paths`, in catalog order.
pub fn intersect(catalog: &RecipeCatalog, paths: &[PathBuf]) -> ChangeSet {
    let mut hits = BTreeSet::new();

    for path in paths {
        match catalog.position(path) {
            Some(index) => {
                hits.insert(index);
            }
            None if is_recipe_like(path) && path.starts_with(catalog.root()) => {
                warn!(
                    path = %path.display(),
                    "Changed recipe is not in the catalog (deleted or malformed); dropping it"
                );
            }
            None => debug!(path = %path.display(), "Ignoring changed non-recipe path"),
        }
    }

    ChangeSet::from_recipes(hits.into_iter().map(|i| catalog.recipes()[i].clone()))
}

fn is_recipe_like(path: &std::path::Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(RECIPE_SUFFIX))
        .unwrap_or(false)
}
