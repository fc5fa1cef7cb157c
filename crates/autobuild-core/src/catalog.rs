//! Recipe discovery.
//!
//! Walks a recipe tree and turns every `{name}.{version}.recipe` file into a
//! [`Recipe`]. Files that do not follow the naming schema are reported as
//! [`NamingDiagnostic`]s and left out; they never fail the scan.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::domain::{NamingIssue, Recipe};
use crate::error::{AutobuildError, Result};

/// A file excluded from the catalog and the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamingDiagnostic {
    pub path: PathBuf,
    pub issue: NamingIssue,
}

/// All recipes found under a root directory.
#[derive(Debug, Clone)]
pub struct RecipeCatalog {
    root: PathBuf,
    recipes: Vec<Recipe>,
    diagnostics: Vec<NamingDiagnostic>,
}

impl RecipeCatalog {
    /// Scan `root` recursively.
    ///
    /// The root is canonicalised so recipe paths are absolute and comparable
    /// with paths reported by git. Hidden directories are not entered.
    /// Symlinks are followed; a recipe reached through a link keeps the
    /// link's path and name.
    pub fn scan(root: &Path) -> Result<Self> {
        let root = std::fs::canonicalize(root).map_err(|e| {
            AutobuildError::Config(format!("recipe root {} is not readable: {e}", root.display()))
        })?;
        if !root.is_dir() {
            return Err(AutobuildError::Config(format!(
                "recipe root {} is not a directory",
                root.display()
            )));
        }
        // Surface permission problems on the root itself as fatal.
        std::fs::read_dir(&root).map_err(|e| {
            AutobuildError::Config(format!("recipe root {} is not readable: {e}", root.display()))
        })?;

        let mut recipes = Vec::new();
        let mut diagnostics = Vec::new();

        let walker = WalkDir::new(&root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden_dir(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry under recipe root");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            match Recipe::from_path(entry.path()) {
                Ok(recipe) => recipes.push(recipe),
                Err(issue) => diagnostics.push(NamingDiagnostic {
                    path: entry.path().to_path_buf(),
                    issue,
                }),
            }
        }

        recipes.sort();
        let clashes = remove_clashes(&mut recipes);
        diagnostics.extend(clashes);

        for diagnostic in &diagnostics {
            log_diagnostic(diagnostic);
        }

        info!(
            root = %root.display(),
            recipes = recipes.len(),
            excluded = diagnostics.len(),
            "Scanned recipe tree"
        );

        Ok(Self {
            root,
            recipes,
            diagnostics,
        })
    }

    /// Canonical root the catalog was scanned from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Recipes ordered by (collection, name, version, path).
    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    /// Files excluded by the naming schema.
    pub fn diagnostics(&self) -> &[NamingDiagnostic] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// Look up the recipe stored at `path`.
    pub fn get_by_path(&self, path: &Path) -> Option<&Recipe> {
        self.recipes.iter().find(|r| r.path == path)
    }

    /// Position of the recipe at `path` in catalog order.
    pub fn position(&self, path: &Path) -> Option<usize> {
        self.recipes.iter().position(|r| r.path == path)
    }
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// Drop recipes whose registry tag is already taken by an earlier recipe.
fn remove_clashes(recipes: &mut Vec<Recipe>) -> Vec<NamingDiagnostic> {
    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    let mut clashes = Vec::new();

    recipes.retain(|recipe| match seen.get(&recipe.tag()) {
        Some(first) => {
            clashes.push(NamingDiagnostic {
                path: recipe.path.clone(),
                issue: NamingIssue::Clash { with: first.clone() },
            });
            false
        }
        None => {
            seen.insert(recipe.tag(), recipe.path.clone());
            true
        }
    });

    clashes
}

fn log_diagnostic(diagnostic: &NamingDiagnostic) {
    match diagnostic.issue {
        NamingIssue::NotARecipe => {
            debug!(path = %diagnostic.path.display(), "Ignoring non-recipe file");
        }
        _ => {
            warn!(
                path = %diagnostic.path.display(),
                issue = %diagnostic.issue,
                "Excluding file that violates the recipe naming schema"
            );
        }
    }
}
