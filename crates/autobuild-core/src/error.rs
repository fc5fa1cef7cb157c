//! Run-level error taxonomy.
//!
//! Every variant here is fatal: it stops the run before any build starts.
//! Per-recipe failures are recorded as `BuildFailed` / `PushFailed` values
//! instead and never surface as an [`AutobuildError`].

/// Fatal errors of an autobuild run.
#[derive(Debug, thiserror::Error)]
pub enum AutobuildError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("events API error: {0}")]
    Api(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AutobuildError {
    /// Whether the error came from configuration rather than an external service.
    pub fn is_config(&self) -> bool {
        matches!(self, AutobuildError::Config(_))
    }
}

impl From<reqwest::Error> for AutobuildError {
    fn from(err: reqwest::Error) -> Self {
        AutobuildError::Api(err.to_string())
    }
}

/// Result type for autobuild operations.
pub type Result<T> = std::result::Result<T, AutobuildError>;
