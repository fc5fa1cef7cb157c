//! Registry publication through the push tool.

use std::path::Path;

use autobuild_core::{BuildResult, PushOutcome, PushResult, Recipe, RegistryConfig};
use tracing::{debug, info, warn};

use crate::runner::{CommandOutput, CommandRunner, Invocation};

/// Pushes built images and queries the registry.
pub struct RegistryPublisher<'a> {
    config: &'a RegistryConfig,
    runner: &'a dyn CommandRunner,
}

impl<'a> RegistryPublisher<'a> {
    pub fn new(config: &'a RegistryConfig, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    /// `{tool} push --name {collection}/{name} --tag {version} {image}`
    pub fn push_command(&self, recipe: &Recipe, image: &Path) -> Vec<String> {
        vec![
            self.config.push.program.clone(),
            "push".to_string(),
            "--name".to_string(),
            recipe.repository(),
            "--tag".to_string(),
            recipe.version.clone(),
            image.to_string_lossy().into_owned(),
        ]
    }

    /// `{tool} search {collection}/{name}:{version}`
    pub fn search_command(&self, recipe: &Recipe) -> Vec<String> {
        vec![
            self.config.push.program.clone(),
            "search".to_string(),
            recipe.tag(),
        ]
    }

    fn invocation(&self, name: String, command: Vec<String>, timeout_secs: u64) -> Invocation {
        Invocation::new(name, command, timeout_secs)
            .env("SREGISTRY_CLIENT", &self.config.client_mode)
            .env(
                "SREGISTRY_CLIENT_SECRETS",
                self.config.credentials_path.to_string_lossy(),
            )
    }

    /// Push every built image, in build order. Failed builds are skipped and
    /// get no push result.
    pub async fn publish(&self, builds: &[BuildResult]) -> Vec<PushResult> {
        let mut results = Vec::new();
        for build in builds {
            let Some(image) = build.image_path.as_deref().filter(|_| build.is_built()) else {
                debug!(recipe = %build.recipe, "Skipping push of failed build");
                continue;
            };
            let result = self.push_one(&build.recipe, image).await;
            if result.is_pushed() {
                info!(tag = %result.tag, attempts = result.attempts, "Pushed image");
            } else {
                warn!(
                    tag = %result.tag,
                    attempts = result.attempts,
                    exit_code = result.exit_code,
                    timed_out = result.timed_out,
                    "Push failed"
                );
            }
            results.push(result);
        }
        results
    }

    async fn push_one(&self, recipe: &Recipe, image: &Path) -> PushResult {
        let invocation = self.invocation(
            format!("push {}", recipe.tag()),
            self.push_command(recipe, image),
            self.config.push.timeout_secs,
        );

        let mut last = failed_attempt();
        let mut attempts = 0;
        while attempts < self.config.push_attempts {
            attempts += 1;
            last = match self.runner.run(&invocation).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(tag = %recipe.tag(), attempt = attempts, error = %e, "Push tool could not run");
                    failed_attempt()
                }
            };
            if last.success() {
                break;
            }
            debug!(
                tag = %recipe.tag(),
                attempt = attempts,
                exit_code = last.exit_code,
                output = %last.output.trim(),
                "Push attempt failed"
            );
        }

        PushResult {
            recipe: recipe.clone(),
            outcome: if last.success() {
                PushOutcome::Pushed
            } else {
                PushOutcome::PushFailed
            },
            tag: recipe.tag(),
            exit_code: last.exit_code,
            attempts,
            timed_out: last.timed_out,
        }
    }

    /// Whether the registry already holds this recipe's tag, judged by the
    /// exit status of `search`. Any failure to ask counts as "not present".
    pub async fn exists(&self, recipe: &Recipe) -> bool {
        let invocation = self.invocation(
            format!("search {}", recipe.tag()),
            self.search_command(recipe),
            self.config.search_timeout_secs,
        );
        match self.runner.run(&invocation).await {
            Ok(output) => {
                debug!(tag = %recipe.tag(), exit_code = output.exit_code, timed_out = output.timed_out, "Registry search");
                output.success()
            }
            Err(e) => {
                warn!(tag = %recipe.tag(), error = %e, "Registry search could not run");
                false
            }
        }
    }
}

/// Delete local images after publication. Missing files are logged only.
pub fn remove_images(builds: &[BuildResult]) {
    for path in builds.iter().filter_map(|b| b.image_path.as_deref()) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(image = %path.display(), "Removed image"),
            Err(e) => warn!(image = %path.display(), error = %e, "Could not remove image"),
        }
    }
}

fn failed_attempt() -> CommandOutput {
    CommandOutput {
        exit_code: -1,
        output: String::new(),
        duration_ms: 0,
        timed_out: false,
    }
}
