//! Recipe identity and the `{name}.{version}.recipe` naming schema.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// File suffix every recipe carries.
pub const RECIPE_SUFFIX: &str = ".recipe";

/// A single container image recipe.
///
/// Identity is `(collection, name, version, path)`. The collection is the
/// name of the recipe's parent directory; name and version come from the
/// file name. Field order matters: the derived `Ord` is the catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Recipe {
    /// Parent directory name, used as registry namespace.
    pub collection: String,

    /// Container name (file name up to the first `.`).
    pub name: String,

    /// Version string (between the first `.` and `.recipe`).
    pub version: String,

    /// Location of the recipe file.
    pub path: PathBuf,
}

/// Why a file was not accepted as a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NamingIssue {
    #[error("file name does not end in .recipe")]
    NotARecipe,

    #[error("file name has no container name before the first '.'")]
    MissingName,

    #[error("file name has no version between the container name and .recipe")]
    MissingVersion,

    #[error("path is not valid UTF-8")]
    NonUtf8,

    #[error("recipe has no parent directory to use as collection")]
    MissingCollection,

    #[error("registry tag clashes with {with}")]
    Clash { with: PathBuf },
}

impl Recipe {
    /// Parse a recipe identity from its path.
    pub fn from_path(path: &Path) -> Result<Self, NamingIssue> {
        let file_name = path
            .file_name()
            .ok_or(NamingIssue::NotARecipe)?
            .to_str()
            .ok_or(NamingIssue::NonUtf8)?;

        let (name, version) = parse_file_name(file_name)?;

        let collection = path
            .parent()
            .and_then(Path::file_name)
            .ok_or(NamingIssue::MissingCollection)?
            .to_str()
            .ok_or(NamingIssue::NonUtf8)?;

        Ok(Self {
            collection: collection.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            path: path.to_path_buf(),
        })
    }

    /// Registry tag `{collection}/{name}:{version}`.
    pub fn tag(&self) -> String {
        format!("{}/{}:{}", self.collection, self.name, self.version)
    }

    /// Registry repository name `{collection}/{name}` (tag without version).
    pub fn repository(&self) -> String {
        format!("{}/{}", self.collection, self.name)
    }

    /// Build log file name. Includes the collection so that equally named
    /// containers in different collections never share a log.
    pub fn log_file_name(&self) -> String {
        format!("{}.{}.{}.log", self.collection, self.name, self.version)
    }

    /// Path of the image the build tool produces, next to the recipe.
    pub fn image_path(&self, image_type: &str) -> PathBuf {
        let file_name = format!("{}.{}.{}", self.name, self.version, image_type);
        match self.path.parent() {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }

    /// Directory holding the recipe.
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Split `{name}.{version}.recipe` into its parts.
fn parse_file_name(file_name: &str) -> Result<(&str, &str), NamingIssue> {
    let stem = file_name
        .strip_suffix(RECIPE_SUFFIX)
        .ok_or(NamingIssue::NotARecipe)?;

    let (name, version) = match stem.split_once('.') {
        Some(parts) => parts,
        None if stem.is_empty() => return Err(NamingIssue::MissingName),
        None => return Err(NamingIssue::MissingVersion),
    };

    if name.is_empty() {
        return Err(NamingIssue::MissingName);
    }
    if version.is_empty() {
        return Err(NamingIssue::MissingVersion);
    }

    Ok((name, version))
}
