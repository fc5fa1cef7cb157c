//! Run configuration.
//!
//! Built once at startup (the CLI fills it from flags and environment) and
//! passed by reference into every component. Nothing below this module reads
//! the process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::changeset::{ChangeSource, EventSource, GitLabEvents, LocalDiff, RemoteApi};
use crate::error::{AutobuildError, Result};

/// Default build-tool binary.
pub const DEFAULT_BUILD_TOOL: &str = "singularity";

/// Default registry client binary.
pub const DEFAULT_PUSH_TOOL: &str = "sregistry";

/// Default registry client mode passed to the push tool.
pub const DEFAULT_CLIENT_MODE: &str = "registry";

/// An external tool and how long one invocation may take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Executable name or path.
    pub program: String,

    /// Timeout in seconds.
    pub timeout_secs: u64,
}

impl ToolConfig {
    pub fn new(program: &str, timeout_secs: u64) -> Self {
        Self {
            program: program.to_string(),
            timeout_secs,
        }
    }
}

/// Registry client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Push tool and push timeout.
    pub push: ToolConfig,

    /// Timeout for existence lookups.
    pub search_timeout_secs: u64,

    /// Attempts per image before recording `PushFailed`.
    pub push_attempts: u32,

    /// Exported to the push tool as `SREGISTRY_CLIENT`.
    pub client_mode: String,

    /// Exported to the push tool as `SREGISTRY_CLIENT_SECRETS`.
    pub credentials_path: PathBuf,
}

impl RegistryConfig {
    /// `~/.sregistry`, or `.sregistry` when no home directory is known.
    pub fn default_credentials_path() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".sregistry"))
            .unwrap_or_else(|| PathBuf::from(".sregistry"))
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            push: ToolConfig::new(DEFAULT_PUSH_TOOL, 600),
            search_timeout_secs: 60,
            push_attempts: 3,
            client_mode: DEFAULT_CLIENT_MODE.to_string(),
            credentials_path: Self::default_credentials_path(),
        }
    }
}

/// Everything a run needs besides the change source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutobuildConfig {
    /// Root of the recipe tree.
    pub recipe_root: PathBuf,

    /// Image format / file extension produced by the build tool.
    pub image_type: String,

    /// Directory receiving one build log per recipe.
    pub log_dir: PathBuf,

    /// Build tool and build timeout.
    pub build: ToolConfig,

    pub registry: RegistryConfig,

    /// Also build unchanged recipes whose image is missing from the registry.
    pub backfill_missing: bool,

    /// Keep produced images on disk after publication.
    pub keep_images: bool,
}

impl AutobuildConfig {
    /// Configuration with defaults for everything but the recipe root.
    pub fn new(recipe_root: impl Into<PathBuf>) -> Self {
        Self {
            recipe_root: recipe_root.into(),
            image_type: "simg".to_string(),
            log_dir: PathBuf::from("build_logs"),
            build: ToolConfig::new(DEFAULT_BUILD_TOOL, 7200),
            registry: RegistryConfig::default(),
            backfill_missing: false,
            keep_images: false,
        }
    }

    /// Reject values no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.image_type.trim().is_empty() || self.image_type.contains('/') {
            return Err(AutobuildError::Config(format!(
                "invalid image type: {:?}",
                self.image_type
            )));
        }
        if self.build.program.is_empty() || self.registry.push.program.is_empty() {
            return Err(AutobuildError::Config(
                "build and push tools must be named".to_string(),
            ));
        }
        if self.build.timeout_secs == 0
            || self.registry.push.timeout_secs == 0
            || self.registry.search_timeout_secs == 0
        {
            return Err(AutobuildError::Config(
                "tool timeouts must be at least one second".to_string(),
            ));
        }
        if self.registry.push_attempts == 0 {
            return Err(AutobuildError::Config(
                "push attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which change source a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStrategy {
    Local,
    Remote,
}

impl FromStr for ChangeStrategy {
    type Err = AutobuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(ChangeStrategy::Local),
            "remote" => Ok(ChangeStrategy::Remote),
            other => Err(AutobuildError::Config(format!(
                "unknown change strategy: {other} (expected local or remote)"
            ))),
        }
    }
}

/// Unvalidated change source settings as collected from flags and env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSourceConfig {
    pub strategy: ChangeStrategy,

    /// Directory inside the git work tree holding the recipes.
    pub repo: PathBuf,

    /// Local strategy: older revision.
    pub base: Option<String>,

    /// Local strategy: newer revision.
    pub head: String,

    /// Remote strategy: events endpoint.
    pub api_url: Option<String>,

    /// Remote strategy: access token.
    pub api_token: Option<String>,

    /// Remote strategy: ignore pushes before this instant.
    pub since: Option<DateTime<Utc>>,
}

impl ChangeSourceConfig {
    /// Validate and build the change source, using the GitLab HTTP client
    /// for the remote strategy.
    pub fn into_source(self) -> Result<ChangeSource> {
        match self.strategy {
            ChangeStrategy::Local => self.into_local(),
            ChangeStrategy::Remote => {
                let url = required(&self.api_url, "events API endpoint (GITLAB_API_STRING)")?;
                let token = required(&self.api_token, "events API token (GITLAB_API_TOKEN)")?;
                let events = Arc::new(GitLabEvents::new(url, token)?);
                self.into_remote(events)
            }
        }
    }

    /// Build the remote source around an arbitrary event source. Endpoint and
    /// token are still required so a misconfigured run never looks empty.
    pub fn into_remote(self, events: Arc<dyn EventSource>) -> Result<ChangeSource> {
        required(&self.api_url, "events API endpoint (GITLAB_API_STRING)")?;
        required(&self.api_token, "events API token (GITLAB_API_TOKEN)")?;
        Ok(ChangeSource::RemoteApi(RemoteApi {
            repo: self.repo,
            since: self.since,
            events,
        }))
    }

    fn into_local(self) -> Result<ChangeSource> {
        let base = required(&self.base, "base revision (--base)")?;
        if self.head.trim().is_empty() {
            return Err(AutobuildError::Config("head revision is empty".to_string()));
        }
        Ok(ChangeSource::LocalDiff(LocalDiff::new(
            self.repo.clone(),
            base,
            &self.head,
        )))
    }
}

fn required<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AutobuildError::Config(format!("missing {what}"))),
    }
}
