//! Whole runs against a real git repository and a scripted command runner.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};

use autobuild_ci::fakes::{Scripted, ScriptedRunner};
use autobuild_ci::AutobuildPipeline;
use autobuild_core::{
    AutobuildConfig, AutobuildError, BuildOutcome, ChangeSource, LocalDiff, PushOutcome,
    RunStatus,
};

static CLOCK: AtomicU32 = AtomicU32::new(0);

fn run_git(repo_dir: &Path, args: &[&str]) -> String {
    let tick = CLOCK.fetch_add(1, Ordering::SeqCst);
    let date = format!("2021-06-01T00:{:02}:{:02}Z", tick / 60 % 60, tick % 60);
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .env("GIT_AUTHOR_DATE", &date)
        .env("GIT_COMMITTER_DATE", &date)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Repository with a recipe tree and two commits; returns (dir, base, head).
struct Fixture {
    dir: tempfile::TempDir,
    base: String,
    head: String,
}

impl Fixture {
    /// `initial` is committed first, then `changed` is written on top.
    fn new(initial: &[&str], changed: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path();
        run_git(repo, &["init"]);
        run_git(repo, &["config", "user.name", "test-user"]);
        run_git(repo, &["config", "user.email", "test@example.com"]);
        run_git(repo, &["config", "commit.gpgsign", "false"]);

        for rel in initial {
            write(repo, rel, "Bootstrap: docker\n");
        }
        write(repo, "README.md", "recipes\n");
        let base = commit_all(repo, "initial");

        for rel in changed {
            write(repo, rel, "Bootstrap: docker\nFrom: changed\n");
        }
        write(repo, "README.md", "recipes, changed\n");
        let head = commit_all(repo, "change");

        Self { dir, base, head }
    }

    fn repo(&self) -> &Path {
        self.dir.path()
    }

    fn config(&self) -> AutobuildConfig {
        let mut config = AutobuildConfig::new(self.repo().join("recipes"));
        config.log_dir = self.repo().join("build_logs");
        config
    }

    fn source(&self) -> ChangeSource {
        ChangeSource::LocalDiff(LocalDiff::new(self.repo(), &self.base, &self.head))
    }

    fn recipe_dir(&self, collection: &str) -> PathBuf {
        self.repo()
            .join("recipes")
            .join(collection)
            .canonicalize()
            .unwrap()
    }
}

fn write(repo: &Path, rel: &str, content: &str) {
    let path = repo.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn commit_all(repo: &Path, message: &str) -> String {
    run_git(repo, &["add", "-A"]);
    run_git(repo, &["commit", "-m", message]);
    run_git(repo, &["rev-parse", "HEAD"])
}

#[tokio::test]
async fn changed_recipe_is_built_pushed_and_cleaned_up() {
    let fixture = Fixture::new(
        &["recipes/app/nginx.1.1.recipe", "recipes/app/nginx.1.2.recipe"],
        &["recipes/app/nginx.1.2.recipe"],
    );
    let config = fixture.config();
    let runner = ScriptedRunner::new().creating_images();

    let outcome = AutobuildPipeline::run(&config, &fixture.source(), &runner)
        .await
        .unwrap();

    assert_eq!(outcome.catalog_size, 2);
    assert_eq!(outcome.change_set.len(), 1);
    let report = &outcome.report;
    assert_eq!(report.status(), RunStatus::Success);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.counts().built, 1);
    assert_eq!(report.counts().pushed, 1);

    let entry = &report.entries()[0];
    assert_eq!(entry.build.recipe.tag(), "app/nginx:1.2");
    assert_eq!(entry.push.as_ref().unwrap().tag, "app/nginx:1.2");
    assert!(config.log_dir.join("app.nginx.1.2.log").exists());

    let builds = runner.calls_matching(" build ");
    assert_eq!(builds.len(), 1);
    assert!(builds[0].command_line().ends_with("nginx.1.2.recipe"));
    let pushes = runner.calls_matching(" push ");
    assert_eq!(pushes.len(), 1);
    assert!(pushes[0]
        .command_line()
        .contains("push --name app/nginx --tag 1.2"));

    assert!(!fixture.recipe_dir("app").join("nginx.1.2.simg").exists());
}

#[tokio::test]
async fn failed_build_is_not_pushed_and_fails_the_run() {
    let fixture = Fixture::new(
        &[],
        &["recipes/app/r1.1.0.recipe", "recipes/app/r2.1.0.recipe"],
    );
    let config = fixture.config();
    let runner = ScriptedRunner::new().on("r2.1.0.recipe", Scripted::Exit(1));

    let outcome = AutobuildPipeline::run(&config, &fixture.source(), &runner)
        .await
        .unwrap();
    let report = &outcome.report;

    assert_eq!(report.status(), RunStatus::Failure);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.entries().len(), 2);
    assert_eq!(report.entries()[0].build.outcome, BuildOutcome::Built);
    assert_eq!(
        report.entries()[0].push.as_ref().map(|p| p.outcome),
        Some(PushOutcome::Pushed)
    );
    assert_eq!(report.entries()[1].build.outcome, BuildOutcome::BuildFailed);
    assert!(report.entries()[1].push.is_none());
    assert!(runner.calls_matching("--name app/r2").is_empty());
}

#[tokio::test]
async fn push_failure_fails_the_run() {
    let fixture = Fixture::new(&[], &["recipes/app/nginx.1.2.recipe"]);
    let mut config = fixture.config();
    config.registry.push_attempts = 2;
    let runner = ScriptedRunner::new().on(" push ", Scripted::Exit(1));

    let outcome = AutobuildPipeline::run(&config, &fixture.source(), &runner)
        .await
        .unwrap();
    let report = &outcome.report;

    assert_eq!(report.status(), RunStatus::Failure);
    assert_eq!(report.counts().built, 1);
    assert_eq!(report.counts().push_failed, 1);
    assert_eq!(report.entries()[0].push.as_ref().unwrap().attempts, 2);
}

#[tokio::test]
async fn no_changed_recipes_is_success_without_tool_calls() {
    let fixture = Fixture::new(&["recipes/app/nginx.1.1.recipe"], &[]);
    let config = fixture.config();
    let runner = ScriptedRunner::new();

    let outcome = AutobuildPipeline::run(&config, &fixture.source(), &runner)
        .await
        .unwrap();

    assert!(outcome.change_set.is_empty());
    assert!(outcome.report.is_success());
    assert!(runner.calls().is_empty());
    assert!(config.log_dir.is_dir());
    assert!(outcome
        .report
        .render_summary()
        .contains("No changed recipes"));
}

#[tokio::test]
async fn build_timeout_is_a_build_failure() {
    let fixture = Fixture::new(&[], &["recipes/app/slow.1.0.recipe"]);
    let config = fixture.config();
    let runner = ScriptedRunner::new().on(" build ", Scripted::Timeout);

    let outcome = AutobuildPipeline::run(&config, &fixture.source(), &runner)
        .await
        .unwrap();

    let entry = &outcome.report.entries()[0];
    assert_eq!(entry.build.outcome, BuildOutcome::BuildFailed);
    assert!(entry.build.timed_out);
    assert!(entry.push.is_none());
    assert!(outcome.report.render_summary().contains("build timed out"));
}

#[tokio::test]
async fn backfill_adds_recipes_missing_from_registry() {
    let fixture = Fixture::new(
        &["recipes/app/nginx.1.1.recipe", "recipes/tools/samtools.1.9.recipe"],
        &["recipes/app/nginx.1.2.recipe"],
    );
    let mut config = fixture.config();
    config.backfill_missing = true;
    let runner = ScriptedRunner::new().on("search tools/samtools:1.9", Scripted::Exit(1));

    let outcome = AutobuildPipeline::run(&config, &fixture.source(), &runner)
        .await
        .unwrap();

    let tags: Vec<String> = outcome.change_set.iter().map(|r| r.tag()).collect();
    assert_eq!(tags, vec!["app/nginx:1.2", "tools/samtools:1.9"]);
    assert_eq!(runner.calls_matching(" search ").len(), 2);
}

#[tokio::test]
async fn keep_images_leaves_images_on_disk() {
    let fixture = Fixture::new(&[], &["recipes/app/nginx.1.2.recipe"]);
    let mut config = fixture.config();
    config.keep_images = true;
    let runner = ScriptedRunner::new().creating_images();

    let outcome = AutobuildPipeline::run(&config, &fixture.source(), &runner)
        .await
        .unwrap();

    assert!(outcome.report.is_success());
    assert!(fixture.recipe_dir("app").join("nginx.1.2.simg").exists());
}

#[tokio::test]
async fn invalid_configuration_aborts_before_any_build() {
    let fixture = Fixture::new(&[], &["recipes/app/nginx.1.2.recipe"]);
    let mut config = fixture.config();
    config.registry.push_attempts = 0;
    let runner = ScriptedRunner::new();

    let err = AutobuildPipeline::run(&config, &fixture.source(), &runner)
        .await
        .unwrap_err();
    assert!(err.is_config());
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn missing_recipe_root_is_fatal() {
    let fixture = Fixture::new(&[], &["recipes/app/nginx.1.2.recipe"]);
    let mut config = fixture.config();
    config.recipe_root = fixture.repo().join("does-not-exist");
    let runner = ScriptedRunner::new();

    let err = AutobuildPipeline::run(&config, &fixture.source(), &runner)
        .await
        .unwrap_err();
    assert!(matches!(err, AutobuildError::Config(_)));
}
