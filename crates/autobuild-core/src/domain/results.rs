//! Per-recipe build and push outcomes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::recipe::Recipe;

/// Outcome of a build-tool invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildOutcome {
    Built,
    BuildFailed,
}

/// Outcome of a push-tool invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PushOutcome {
    Pushed,
    PushFailed,
}

/// Result of building one recipe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildResult {
    /// Recipe that was built.
    pub recipe: Recipe,

    /// Build outcome.
    pub outcome: BuildOutcome,

    /// Exit code of the build tool (-1 if it never exited normally).
    pub exit_code: i32,

    /// Captured build output.
    pub log_path: PathBuf,

    /// Produced image, present only when built.
    pub image_path: Option<PathBuf>,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the invocation was killed after its timeout.
    pub timed_out: bool,
}

impl BuildResult {
    /// Successful build producing `image_path`.
    pub fn built(recipe: Recipe, log_path: PathBuf, image_path: PathBuf, duration_ms: u64) -> Self {
        Self {
            recipe,
            outcome: BuildOutcome::Built,
            exit_code: 0,
            log_path,
            image_path: Some(image_path),
            duration_ms,
            timed_out: false,
        }
    }

    /// Failed build.
    pub fn failed(recipe: Recipe, exit_code: i32, log_path: PathBuf, duration_ms: u64) -> Self {
        Self {
            recipe,
            outcome: BuildOutcome::BuildFailed,
            exit_code,
            log_path,
            image_path: None,
            duration_ms,
            timed_out: false,
        }
    }

    /// Mark this result as produced by a timeout.
    pub fn with_timeout(mut self) -> Self {
        self.timed_out = true;
        self
    }

    pub fn is_built(&self) -> bool {
        self.outcome == BuildOutcome::Built
    }
}

/// Result of publishing one built image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushResult {
    /// Recipe whose image was pushed.
    pub recipe: Recipe,

    /// Push outcome.
    pub outcome: PushOutcome,

    /// Remote tag attempted.
    pub tag: String,

    /// Exit code of the last push attempt.
    pub exit_code: i32,

    /// Number of attempts made.
    pub attempts: u32,

    /// Whether the last attempt was killed after its timeout.
    pub timed_out: bool,
}

impl PushResult {
    pub fn is_pushed(&self) -> bool {
        self.outcome == PushOutcome::Pushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn recipe() -> Recipe {
        Recipe::from_path(Path::new("/r/app/nginx.1.2.recipe")).unwrap()
    }

    #[test]
    fn test_built_result_carries_image() {
        let result = BuildResult::built(
            recipe(),
            PathBuf::from("logs/app.nginx.1.2.log"),
            PathBuf::from("/r/app/nginx.1.2.simg"),
            1200,
        );
        assert!(result.is_built());
        assert_eq!(result.exit_code, 0);
        assert!(result.image_path.is_some());
        assert!(!result.timed_out);
    }

    #[test]
    fn test_failed_result_has_no_image() {
        let result = BuildResult::failed(recipe(), 255, PathBuf::from("x.log"), 10).with_timeout();
        assert!(!result.is_built());
        assert_eq!(result.outcome, BuildOutcome::BuildFailed);
        assert!(result.image_path.is_none());
        assert!(result.timed_out);
    }

    #[test]
    fn test_outcome_serde_names() {
        let json = serde_json::to_string(&BuildOutcome::BuildFailed).unwrap();
        assert_eq!(json, "\"build_failed\"");
        let json = serde_json::to_string(&PushOutcome::Pushed).unwrap();
        assert_eq!(json, "\"pushed\"");
    }
}
