//! End-to-end run: catalog, change detection, builds, pushes, report.

use std::time::Instant;

use autobuild_core::{
    resolve, AutobuildConfig, AutobuildError, BuildReport, ChangeSet, ChangeSource,
    RecipeCatalog, Result,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatcher::BuildDispatcher;
use crate::publisher::{remove_images, RegistryPublisher};
use crate::runner::CommandRunner;

/// Result of a complete run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Correlates the log lines of one run.
    pub run_id: Uuid,

    /// Recipes found in the tree.
    pub catalog_size: usize,

    /// Files rejected by the naming schema.
    pub naming_issues: usize,

    /// Recipes selected for building.
    pub change_set: ChangeSet,

    pub report: BuildReport,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

/// Run orchestrator.
pub struct AutobuildPipeline;

impl AutobuildPipeline {
    /// Execute one run.
    ///
    /// Configuration, catalog and change-detection errors abort before any
    /// build starts. From then on per-recipe failures only show up in the
    /// report.
    pub async fn run(
        config: &AutobuildConfig,
        source: &ChangeSource,
        runner: &dyn CommandRunner,
    ) -> Result<RunOutcome> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();

        config.validate()?;
        info!(run_id = %run_id, root = %config.recipe_root.display(), strategy = source.name(), "Starting autobuild run");

        let catalog = RecipeCatalog::scan(&config.recipe_root)?;
        info!(
            run_id = %run_id,
            recipes = catalog.len(),
            naming_issues = catalog.diagnostics().len(),
            "Scanned recipe catalog"
        );

        let mut change_set = resolve(&catalog, source).await?;

        let dispatcher = BuildDispatcher::new(config, runner);
        let publisher = RegistryPublisher::new(&config.registry, runner);

        if config.backfill_missing {
            for recipe in catalog.recipes() {
                if change_set.contains(recipe) || publisher.exists(recipe).await {
                    continue;
                }
                info!(run_id = %run_id, recipe = %recipe, "Image missing from registry; adding to build");
                change_set.push(recipe.clone());
            }
        }

        // The log directory is a CI artifact and must exist even for empty runs.
        dispatcher.prepare_log_dir().map_err(|e| {
            AutobuildError::Config(format!(
                "cannot create log directory {}: {e}",
                config.log_dir.display()
            ))
        })?;
        if change_set.is_empty() {
            info!(run_id = %run_id, "No changed recipes");
        }

        let builds = dispatcher.dispatch(&change_set).await;
        let pushes = publisher.publish(&builds).await;

        if !config.keep_images {
            remove_images(&builds);
        }

        let report = BuildReport::aggregate(&builds, &pushes);
        let duration_ms = start.elapsed().as_millis() as u64;
        let counts = report.counts();
        if report.is_success() {
            info!(run_id = %run_id, built = counts.built, pushed = counts.pushed, duration_ms, "Autobuild run succeeded");
        } else {
            warn!(
                run_id = %run_id,
                build_failed = counts.build_failed,
                push_failed = counts.push_failed,
                duration_ms,
                "Autobuild run failed"
            );
        }

        Ok(RunOutcome {
            run_id,
            catalog_size: catalog.len(),
            naming_issues: catalog.diagnostics().len(),
            change_set,
            report,
            duration_ms,
        })
    }
}
