//! recipe-autobuild CLI
//!
//! The `autobuild` command builds and publishes the container image recipes
//! changed by the latest push (or a local revision range), prints a summary
//! and exits 0 when everything made it into the registry.
//!
//! ## Exit codes
//!
//! - `0`: every changed recipe was built and pushed (or nothing changed)
//! - `1`: at least one build or push failed
//! - `2`: configuration, repository or events API error; nothing was built

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use autobuild_ci::{AutobuildPipeline, ProcessRunner};
use autobuild_core::{
    write_report_json, AutobuildConfig, ChangeSourceConfig, ChangeStrategy, RegistryConfig,
    ToolConfig, DEFAULT_BUILD_TOOL, DEFAULT_CLIENT_MODE, DEFAULT_PUSH_TOOL,
};
use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::{error, info, Level};

#[derive(Parser, Debug)]
#[command(name = "autobuild")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build and publish changed container image recipes", long_about = None)]
struct Cli {
    /// Root of the recipe tree
    #[arg(long)]
    path: PathBuf,

    /// Image format produced by the build tool
    #[arg(long, default_value = "simg")]
    image_type: String,

    /// Where changed files come from: local or remote
    #[arg(long, env = "AUTOBUILD_CHANGES", default_value = "remote")]
    changes: ChangeStrategy,

    /// Git repository holding the recipes
    #[arg(long, env = "CI_PROJECT_DIR", default_value = ".")]
    repo: PathBuf,

    /// Older revision of the local range
    #[arg(long)]
    base: Option<String>,

    /// Newer revision of the local range
    #[arg(long, default_value = "HEAD")]
    head: String,

    /// Project events endpoint
    #[arg(long, env = "GITLAB_API_STRING")]
    api_url: Option<String>,

    /// Project events access token
    #[arg(long, env = "GITLAB_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Ignore push events before this RFC 3339 instant
    #[arg(long, env = "AUTOBUILD_SINCE")]
    since: Option<DateTime<Utc>>,

    /// Directory for per-recipe build logs
    #[arg(long, env = "AUTOBUILD_LOG_DIR", default_value = "build_logs")]
    log_dir: PathBuf,

    /// Build tool executable
    #[arg(long, env = "AUTOBUILD_BUILD_TOOL", default_value = DEFAULT_BUILD_TOOL)]
    build_tool: String,

    /// Registry client executable
    #[arg(long, env = "AUTOBUILD_PUSH_TOOL", default_value = DEFAULT_PUSH_TOOL)]
    push_tool: String,

    /// Build timeout in seconds
    #[arg(long, default_value_t = 7200)]
    build_timeout: u64,

    /// Push timeout in seconds
    #[arg(long, default_value_t = 600)]
    push_timeout: u64,

    /// Push attempts per image
    #[arg(long, default_value_t = 3)]
    push_attempts: u32,

    /// Registry client mode
    #[arg(long, env = "SREGISTRY_CLIENT", default_value = DEFAULT_CLIENT_MODE)]
    registry_client: String,

    /// Registry credentials file (default: ~/.sregistry)
    #[arg(long, env = "SREGISTRY_CLIENT_SECRETS")]
    registry_secrets: Option<PathBuf>,

    /// Also build unchanged recipes missing from the registry
    #[arg(long)]
    backfill_missing: bool,

    /// Keep built images on disk after pushing
    #[arg(long)]
    keep_images: bool,

    /// Write a JSON report to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn autobuild_config(&self) -> AutobuildConfig {
        let defaults = RegistryConfig::default();
        AutobuildConfig {
            recipe_root: self.path.clone(),
            image_type: self.image_type.clone(),
            log_dir: self.log_dir.clone(),
            build: ToolConfig::new(&self.build_tool, self.build_timeout),
            registry: RegistryConfig {
                push: ToolConfig::new(&self.push_tool, self.push_timeout),
                push_attempts: self.push_attempts,
                client_mode: self.registry_client.clone(),
                credentials_path: self
                    .registry_secrets
                    .clone()
                    .unwrap_or(defaults.credentials_path),
                search_timeout_secs: defaults.search_timeout_secs,
            },
            backfill_missing: self.backfill_missing,
            keep_images: self.keep_images,
        }
    }

    fn change_source_config(&self) -> ChangeSourceConfig {
        ChangeSourceConfig {
            strategy: self.changes,
            repo: self.repo.clone(),
            base: self.base.clone(),
            head: self.head.clone(),
            api_url: self.api_url.clone(),
            api_token: self.api_token.clone(),
            since: self.since,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    autobuild_core::init_tracing(cli.json, level);

    match run(&cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %format!("{e:#}"), "Autobuild aborted");
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: &Cli) -> Result<u8> {
    let config = cli.autobuild_config();
    let source = cli
        .change_source_config()
        .into_source()
        .context("Invalid change source configuration")?;

    let outcome = AutobuildPipeline::run(&config, &source, &ProcessRunner::new())
        .await
        .context("Autobuild run failed before building")?;

    println!(
        "Autobuild run {} ({} recipes scanned, {} changed)",
        outcome.run_id,
        outcome.catalog_size,
        outcome.change_set.len()
    );
    if outcome.naming_issues > 0 {
        println!(
            "  {} file(s) skipped for naming issues (see log)",
            outcome.naming_issues
        );
    }
    print!("{}", outcome.report.render_summary());

    if let Some(path) = &cli.report {
        write_report_json(path, &outcome.report)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Wrote build report");
    }

    Ok(outcome.report.exit_code())
}
