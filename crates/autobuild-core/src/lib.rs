//! recipe-autobuild core library
//!
//! Change detection and reporting for CI-driven container image builds:
//!
//! - [`RecipeCatalog`] discovers `{name}.{version}.recipe` files
//! - [`resolve`] turns a [`ChangeSource`] into the [`ChangeSet`] to build
//! - [`BuildReport`] reduces build and push results to a run status
//!
//! Building and publishing live in the `autobuild-ci` crate.

pub mod catalog;
pub mod changeset;
pub mod config;
pub mod domain;
pub mod error;
pub mod report;
pub mod telemetry;

pub use catalog::{NamingDiagnostic, RecipeCatalog};
pub use changeset::{
    intersect, resolve, ChangeSet, ChangeSource, EventSource, GitLabEvents, LocalDiff,
    ProjectEvent, PushData, RemoteApi,
};
pub use config::{
    AutobuildConfig, ChangeSourceConfig, ChangeStrategy, RegistryConfig, ToolConfig,
    DEFAULT_BUILD_TOOL, DEFAULT_CLIENT_MODE, DEFAULT_PUSH_TOOL,
};
pub use domain::{BuildOutcome, BuildResult, NamingIssue, PushOutcome, PushResult, Recipe};
pub use error::{AutobuildError, Result};
pub use report::{write_report_json, BuildReport, ReportCounts, ReportEntry, RunStatus};
pub use telemetry::init_tracing;

/// recipe-autobuild version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
