//! Sequential recipe builds.

use std::path::PathBuf;
use std::time::Instant;

use autobuild_core::{AutobuildConfig, BuildResult, ChangeSet, Recipe};
use tracing::{info, warn};

use crate::runner::{append_note, CommandRunner, Invocation};

/// Runs the build tool once per changed recipe.
pub struct BuildDispatcher<'a> {
    config: &'a AutobuildConfig,
    runner: &'a dyn CommandRunner,
}

impl<'a> BuildDispatcher<'a> {
    pub fn new(config: &'a AutobuildConfig, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    /// Create the log directory.
    pub fn prepare_log_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config.log_dir)
    }

    /// Log file for one recipe.
    pub fn log_path(&self, recipe: &Recipe) -> PathBuf {
        self.config.log_dir.join(recipe.log_file_name())
    }

    /// `{tool} build {image} {recipe}`
    pub fn build_command(&self, recipe: &Recipe) -> Vec<String> {
        vec![
            self.config.build.program.clone(),
            "build".to_string(),
            recipe
                .image_path(&self.config.image_type)
                .to_string_lossy()
                .into_owned(),
            recipe.path.to_string_lossy().into_owned(),
        ]
    }

    /// Build every recipe in order, one at a time.
    ///
    /// Returns exactly one result per recipe; a failed build never stops the
    /// ones after it.
    pub async fn dispatch(&self, change_set: &ChangeSet) -> Vec<BuildResult> {
        let mut results = Vec::with_capacity(change_set.len());
        for (index, recipe) in change_set.iter().enumerate() {
            info!(
                recipe = %recipe,
                position = index + 1,
                total = change_set.len(),
                "Building recipe"
            );
            let result = self.build_one(recipe).await;
            if result.is_built() {
                info!(recipe = %recipe, duration_ms = result.duration_ms, "Build succeeded");
            } else {
                warn!(
                    recipe = %recipe,
                    exit_code = result.exit_code,
                    timed_out = result.timed_out,
                    log = %result.log_path.display(),
                    "Build failed"
                );
            }
            results.push(result);
        }
        results
    }

    async fn build_one(&self, recipe: &Recipe) -> BuildResult {
        let start = Instant::now();
        let log_path = self.log_path(recipe);
        let image_path = recipe.image_path(&self.config.image_type);

        let invocation = Invocation::new(
            format!("build {}", recipe.tag()),
            self.build_command(recipe),
            self.config.build.timeout_secs,
        )
        .in_dir(recipe.directory())
        .output_to(&log_path);

        let output = match self.runner.run(&invocation).await {
            Ok(output) => output,
            Err(e) => {
                append_note(&log_path, &format!("build could not run: {e}"));
                return BuildResult::failed(
                    recipe.clone(),
                    -1,
                    log_path,
                    start.elapsed().as_millis() as u64,
                );
            }
        };

        if output.timed_out {
            return BuildResult::failed(recipe.clone(), -1, log_path, output.duration_ms)
                .with_timeout();
        }
        if output.exit_code != 0 {
            return BuildResult::failed(
                recipe.clone(),
                output.exit_code,
                log_path,
                output.duration_ms,
            );
        }

        if !image_path.exists() {
            warn!(
                recipe = %recipe,
                image = %image_path.display(),
                "Build tool exited 0 but the image file is missing"
            );
        }
        BuildResult::built(recipe.clone(), log_path, image_path, output.duration_ms)
    }
}
