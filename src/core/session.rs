//! Explicit session state: configuration, collaborators and the selected
//! project. Every orchestration step reads from here; nothing is global.

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::artifacts::ArtifactVerifier;
use crate::build::{eligible_commands, BuildOutcome, BuildProbe};
use crate::cleaner::{CleanOutcome, DirRemover, DirectoryCleaner, FsRemover};
use crate::defaults::{Defaults, RelmanConfig};
use crate::error::{Error, Result};
use crate::project::{ProjectContext, ProjectStatus};
use crate::queue::{CancelToken, CommandQueue, TaskHandle};
use crate::reaper::{ProcessReaper, ProcessTable, ReapReport, SystemProcessTable};
use crate::release::{
    CreateOutput, DeleteReport, ReleasePublisher, ReleaseSummary, ReleaseTask, UpdateOutput,
};
use crate::reporter::Reporter;
use crate::runner::{CommandRunner, SystemRunner};
use crate::version::{tag_for, version_from_tag, ReleaseKind};


pub struct Session {
    config: RelmanConfig,
    reporter: Arc<dyn Reporter>,
    runner: Arc<dyn CommandRunner>,
    processes: Arc<dyn ProcessTable>,
    remover: Arc<dyn DirRemover>,
    project_root: Option<PathBuf>,
    project: Mutex<Option<ProjectContext>>,
    /// Set once a release advanced the version past the manifest's.
    released_version: Mutex<Option<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoReleaseOutput {
    pub build: BuildOutcome,
    pub release: CreateOutput,
}

impl Session {
    pub fn new(config: RelmanConfig, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            config,
            reporter,
            runner: Arc::new(SystemRunner::new()),
            processes: Arc::new(SystemProcessTable::new()),
            remover: Arc::new(FsRemover),
            project_root: None,
            project: Mutex::new(None),
            released_version: Mutex::new(None),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_process_table(mut self, processes: Arc<dyn ProcessTable>) -> Self {
        self.processes = processes;
        self
    }

    pub fn with_remover(mut self, remover: Arc<dyn DirRemover>) -> Self {
        self.remover = remover;
        self
    }

    pub fn with_project(mut self, root: Option<PathBuf>) -> Self {
        self.project_root = root;
        self
    }

    pub fn defaults(&self) -> &Defaults {
        &self.config.defaults
    }

    pub fn reporter(&self) -> &Arc<dyn Reporter> {
        &self.reporter
    }

    /// Queue sharing this session's reporter and runner, so stop-all can
    /// terminate whatever the session is running.
    pub fn queue(&self) -> CommandQueue {
        CommandQueue::new(Arc::clone(&self.reporter), Arc::clone(&self.runner))
    }

    // === Project ===

    /// Current project, with package.json re-read. Precondition failures
    /// surface here before any side effect.
    pub fn context(&self) -> Result<ProjectContext> {
        let mut slot = self.project.lock().unwrap_or_else(|p| p.into_inner());
        let mut ctx = match slot.take() {
            Some(mut ctx) => {
                ctx.reload_manifest()?;
                ctx
            }
            None => ProjectContext::load(self.project_root.as_deref())?,
        };

        if let Some(version) = self.released_version.lock().ok().and_then(|v| v.clone()) {
            ctx.set_version(version);
        }
        *slot = Some(ctx.clone());
        Ok(ctx)
    }

    fn record_version(&self, version: &str) {
        if let Ok(mut released) = self.released_version.lock() {
            *released = Some(version.to_string());
        }
        if let Ok(mut slot) = self.project.lock() {
            if let Some(ctx) = slot.as_mut() {
                ctx.set_version(version);
            }
        }
    }

    fn product(&self, ctx: Option<&ProjectContext>) -> String {
        let fallback = self.config.defaults.product_name.as_str();
        ctx.map(|c| c.product(fallback)).unwrap_or(fallback).to_string()
    }

    fn verifier(&self, ctx: &ProjectContext) -> ArtifactVerifier {
        let d = &self.config.defaults;
        ArtifactVerifier::from_config(
            &ctx.output_dir(&d.cleanup.output_dir),
            &d.artifacts,
            &self.product(Some(ctx)),
        )
    }

    fn publisher<'a>(&'a self, root: &'a Path, cancel: &'a CancelToken) -> ReleasePublisher<'a> {
        ReleasePublisher::new(self.runner.as_ref(), root)
            .with_tool(&self.config.defaults.release.tool)
            .with_notes_prefix(&self.config.defaults.release.notes_file_prefix)
            .with_cancel(cancel)
    }

    pub fn status(&self) -> Result<ProjectStatus> {
        let ctx = self.context()?;
        let eligible = eligible_commands(&self.config.defaults.build.candidates, &ctx.scripts);
        let is_git_repo = ctx.is_git_repo();
        Ok(ProjectStatus {
            path: ctx.root.display().to_string(),
            version: ctx.version.clone(),
            has_manifest: ctx.manifest_path().is_file(),
            is_git_repo,
            scripts: ctx.scripts.keys().cloned().collect(),
            eligible_build_commands: eligible.into_iter().map(|c| c.name).collect(),
            artifacts_ready: self.verifier(&ctx).is_ready(),
            label: if is_git_repo { "Ready (Git)" } else { "Ready (No Git)" }.to_string(),
        })
    }

    // === Kill / Clean / Build ===

    /// Terminate stale app processes. Works without a project.
    pub fn kill(&self, cancel: &CancelToken) -> ReapReport {
        let ctx = self.context().ok();
        self.reap_with(ctx.as_ref(), cancel)
    }

    fn reap_with(&self, ctx: Option<&ProjectContext>, cancel: &CancelToken) -> ReapReport {
        let reaper_config = &self.config.defaults.reaper;
        let targets = reaper_config.resolved_targets(&self.product(ctx));
        ProcessReaper::new(self.processes.as_ref(), &targets)
            .with_settle(reaper_config.settle(), reaper_config.poll())
            .with_cancel(cancel)
            .terminate(self.reporter.as_ref())
    }

    pub fn clean(&self, cancel: &CancelToken) -> Result<CleanOutcome> {
        let ctx = self.context()?;
        self.clean_with(&ctx, cancel)
    }

    fn clean_with(&self, ctx: &ProjectContext, cancel: &CancelToken) -> Result<CleanOutcome> {
        cancel.checkpoint("clean")?;
        let d = &self.config.defaults;
        let dir = ctx.output_dir(&d.cleanup.output_dir);
        self.reporter.info(&format!("🧹 Cleaning {}...", dir.display()));

        let targets = d.reaper.resolved_targets(&self.product(Some(ctx)));
        let reaper = ProcessReaper::new(self.processes.as_ref(), &targets)
            .with_settle(d.reaper.settle(), d.reaper.poll())
            .with_cancel(cancel);
        DirectoryCleaner::new(self.remover.as_ref(), &reaper)
            .with_retries(d.cleanup.max_retries, d.cleanup.backoff())
            .with_cancel(cancel)
            .clean(&dir, self.reporter.as_ref())
    }

    /// kill -> clean -> settle -> probe candidates until one leaves artifacts.
    pub fn build(&self, cancel: &CancelToken) -> Result<BuildOutcome> {
        let ctx = self.context()?;
        let d = &self.config.defaults;
        let commands = eligible_commands(&d.build.candidates, &ctx.scripts);
        if commands.is_empty() {
            return Err(Error::build_failed(Vec::new()));
        }

        self.reporter.info("🔨 Starting safe build...");
        self.reap_with(Some(&ctx), cancel);
        cancel.checkpoint("build")?;

        self.clean_with(&ctx, cancel)?;
        cancel.sleep(d.build.pre_build_delay(), "build")?;

        let names: Vec<&str> = commands.iter().map(|c| c.name.as_str()).collect();
        self.reporter.info(&format!("📋 Build commands: {}", names.join(", ")));

        let verifier = self.verifier(&ctx);
        BuildProbe::new(self.runner.as_ref(), &verifier, &ctx.root)
            .with_command_timeout(d.build.command_timeout())
            .with_artifact_wait(d.build.artifact_timeout(), d.build.poll())
            .with_cancel(cancel)
            .probe(&commands, self.reporter.as_ref())
    }

    // === Releases ===

    pub fn create_release(
        &self,
        kind: ReleaseKind,
        title: Option<&str>,
        notes: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<CreateOutput> {
        let ctx = self.context()?;
        ctx.require_git()?;

        let verifier = self.verifier(&ctx);
        let files = verifier.upload_set()?;
        let task = ReleaseTask::for_create(&ctx.version, kind, title, notes, files);

        let output = self
            .publisher(&ctx.root, cancel)
            .create(&task, &ctx.version, self.reporter.as_ref())?;
        self.record_version(&output.version);
        Ok(output)
    }

    /// Build, wait for artifacts, then create the release.
    pub fn auto_release(
        &self,
        kind: ReleaseKind,
        title: Option<&str>,
        notes: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<AutoReleaseOutput> {
        self.context()?.require_git()?;

        self.reporter.info(&format!("🤖 Auto {} release", kind.label()));
        let build = self.build(cancel)?;
        cancel.checkpoint("auto release")?;

        let release = self.create_release(kind, title, notes, cancel)?;
        self.reporter.success("🎉 Auto release complete!");
        Ok(AutoReleaseOutput { build, release })
    }

    /// Edit the given release, or the session version's release when none
    /// is named (the latest published one when the version is unknown).
    pub fn update_release(
        &self,
        version: Option<&str>,
        title: Option<&str>,
        notes: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<UpdateOutput> {
        let ctx = self.context()?;
        ctx.require_git()?;

        let files = self.verifier(&ctx).upload_set()?;
        let version = self.target_version(&ctx, version, cancel)?;
        let task = ReleaseTask::for_update(&version, title, notes, files)?;

        self.publisher(&ctx.root, cancel)
            .update(&task, self.reporter.as_ref())
    }

    /// Three best-effort steps; `Err` when any of them failed.
    pub fn delete_release(&self, version: Option<&str>, cancel: &CancelToken) -> Result<DeleteReport> {
        let ctx = self.context()?;
        ctx.require_git()?;

        let version = self.target_version(&ctx, version, cancel)?;
        self.publisher(&ctx.root, cancel)
            .delete(&tag_for(&version), self.reporter.as_ref())?
            .into_result()
    }

    pub fn list_releases(&self, cancel: &CancelToken) -> Result<Vec<ReleaseSummary>> {
        let ctx = self.context()?;
        ctx.require_git()?;
        self.publisher(&ctx.root, cancel)
            .list(self.config.defaults.release.list_limit, self.reporter.as_ref())
    }

    pub fn latest_release(&self, cancel: &CancelToken) -> Result<Option<ReleaseSummary>> {
        let ctx = self.context()?;
        ctx.require_git()?;
        self.publisher(&ctx.root, cancel)
            .latest(self.config.defaults.release.list_limit, self.reporter.as_ref())
    }

    fn target_version(&self, ctx: &ProjectContext, explicit: Option<&str>, cancel: &CancelToken) -> Result<String> {
        if let Some(v) = explicit.map(str::trim).filter(|v| !v.is_empty()) {
            return version_from_tag(v).ok_or_else(|| {
                Error::validation_invalid_argument(
                    "version",
                    format!("Expected X.Y.Z or vX.Y.Z, got '{}'", v),
                    Some(v.to_string()),
                    None,
                )
            });
        }
        if let Some(v) = version_from_tag(&ctx.version) {
            return Ok(v);
        }
        let latest = self
            .publisher(&ctx.root, cancel)
            .latest(self.config.defaults.release.list_limit, self.reporter.as_ref())?;
        latest
            .and_then(|r| version_from_tag(&r.tag_name))
            .ok_or_else(|| Error::validation_missing_argument(vec!["version".to_string()]))
    }

    // === Queue integration ===

    /// Run one operation synchronously, serializing its output.
    pub fn run(&self, op: &Operation, cancel: &CancelToken) -> Result<Value> {
        match op {
            Operation::Status => to_value(self.status()?),
            Operation::Kill => to_value(self.kill(cancel)),
            Operation::Clean => to_value(self.clean(cancel)?),
            Operation::Build => to_value(self.build(cancel)?),
            Operation::Auto { kind, title, notes } => {
                to_value(self.auto_release(*kind, title.as_deref(), notes.as_deref(), cancel)?)
            }
            Operation::Create { kind, title, notes } => {
                to_value(self.create_release(*kind, title.as_deref(), notes.as_deref(), cancel)?)
            }
            Operation::Update { version, title, notes } => to_value(self.update_release(
                version.as_deref(),
                title.as_deref(),
                notes.as_deref(),
                cancel,
            )?),
            Operation::Delete { version } => to_value(self.delete_release(version.as_deref(), cancel)?),
            Operation::List => to_value(self.list_releases(cancel)?),
            Operation::Latest => to_value(self.latest_release(cancel)?),
        }
    }

    /// Enqueue `op`; it runs when every earlier submission has finished.
    pub fn submit(self: &Arc<Self>, queue: &CommandQueue, op: Operation) -> TaskHandle {
        let session = Arc::clone(self);
        queue.submit(op.name(), move |ctx| session.run(&op, &ctx.cancel))
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize output".to_string())))
}

/// Sleep in short slices so stop-all is observed promptly.

// === Operations ===

/// Everything a presentation layer can submit to the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Status,
    Kill,
    Clean,
    Build,
    Auto {
        kind: ReleaseKind,
        title: Option<String>,
        notes: Option<String>,
    },
    Create {
        kind: ReleaseKind,
        title: Option<String>,
        notes: Option<String>,
    },
    Update {
        version: Option<String>,
        title: Option<String>,
        notes: Option<String>,
    },
    Delete {
        version: Option<String>,
    },
    List,
    Latest,
}

impl Operation {
    pub fn name(&self) -> String {
        match self {
            Operation::Status => "status".to_string(),
            Operation::Kill => "kill".to_string(),
            Operation::Clean => "clean".to_string(),
            Operation::Build => "build".to_string(),
            Operation::Auto { kind, .. } => format!("auto:{}", kind),
            Operation::Create { kind, .. } => format!("create:{}", kind),
            Operation::Update { version, .. } => match version {
                Some(v) => format!("update:{}", v),
                None => "update".to_string(),
            },
            Operation::Delete { version } => match version {
                Some(v) => format!("delete:{}", v),
                None => "delete".to_string(),
            },
            Operation::List => "list".to_string(),
            Operation::Latest => "latest".to_string(),
        }
    }
}

/// `kill`, `clean`, `build`, `status`, `list`, `latest`, `auto[:kind]`,
/// `create[:kind]`. Update and delete need title/notes or confirmation and
/// are not accepted in this short form.
impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, arg) = match s.split_once(':') {
            Some((n, a)) => (n, Some(a)),
            None => (s, None),
        };
        let kind = || -> Result<ReleaseKind> { arg.map(str::parse).unwrap_or(Ok(ReleaseKind::Patch)) };

        match name.trim().to_lowercase().as_str() {
            "status" => Ok(Operation::Status),
            "kill" => Ok(Operation::Kill),
            "clean" => Ok(Operation::Clean),
            "build" => Ok(Operation::Build),
            "list" => Ok(Operation::List),
            "latest" => Ok(Operation::Latest),
            "auto" => Ok(Operation::Auto {
                kind: kind()?,
                title: None,
                notes: None,
            }),
            "create" => Ok(Operation::Create {
                kind: kind()?,
                title: None,
                notes: None,
            }),
            _ => Err(Error::validation_invalid_argument(
                "operation",
                format!("Unknown operation '{}'", s),
                Some(s.to_string()),
                Some(
                    ["status", "kill", "clean", "build", "list", "latest", "auto[:kind]", "create[:kind]"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                ),
            )),
        }
    }
}
