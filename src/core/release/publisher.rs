use std::path::{Path, PathBuf};

use super::notes::NotesFile;
use super::types::{CreateOutput, DeleteReport, ReleaseSummary, ReleaseTask, StepResult, UpdateOutput};
use crate::error::{CommandFailedDetails, Error, Result};
use crate::queue::CancelToken;
use crate::reporter::Reporter;
use crate::runner::{run_logged, CommandRunner, CommandSpec, ExecutionResult};

const LIST_FIELDS: &str = "tagName,name,isLatest,isDraft,isPrerelease,publishedAt";

/// Drives the release tool (`gh`) and git for create, update and delete.
pub struct ReleasePublisher<'a> {
    runner: &'a dyn CommandRunner,
    project_root: &'a Path,
    tool: String,
    notes_prefix: String,
    cancel: Option<&'a CancelToken>,
}

impl<'a> ReleasePublisher<'a> {
    pub fn new(runner: &'a dyn CommandRunner, project_root: &'a Path) -> Self {
        Self {
            runner,
            project_root,
            tool: "gh".to_string(),
            notes_prefix: "temp_release_notes".to_string(),
            cancel: None,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    pub fn with_notes_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.notes_prefix = prefix.into();
        self
    }

    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn checkpoint(&self, operation: &str) -> Result<()> {
        match self.cancel {
            Some(token) => token.checkpoint(operation),
            None => Ok(()),
        }
    }

    fn tool_command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new(&self.tool, args).in_dir(self.project_root)
    }

    fn run(&self, spec: &CommandSpec, reporter: &dyn Reporter) -> Result<ExecutionResult> {
        let result = run_logged(self.runner, spec, reporter);
        if result.stopped {
            return Err(Error::queue_stopped("release"));
        }
        if !result.success {
            return Err(Error::release_command_failed(CommandFailedDetails {
                command: spec.display(),
                exit_code: result.exit_code,
                output: result.tail(15),
            }));
        }
        Ok(result)
    }

    // === Create ===

    /// Publish a new tagged release with the task's artifacts attached.
    /// The notes file is removed whether or not the tool succeeds.
    pub fn create(&self, task: &ReleaseTask, previous_version: &str, reporter: &dyn Reporter) -> Result<CreateOutput> {
        require_artifacts(&task.artifacts, self.project_root)?;
        self.checkpoint("release create")?;

        reporter.info(&format!("🚀 Creating release {}...", task.tag));

        let notes = NotesFile::create(self.project_root, &self.notes_prefix, &task.notes)?;
        let mut args = vec!["release".to_string(), "create".to_string(), task.tag.clone()];
        args.extend(task.artifacts.iter().map(|p| p.display().to_string()));
        args.extend([
            "--title".to_string(),
            task.title.clone(),
            "--notes-file".to_string(),
            notes.arg(),
        ]);

        let outcome = self.run(&self.tool_command(args), reporter);
        drop(notes);
        outcome?;

        reporter.success(&format!("🎉 Release {} created!", task.tag));
        Ok(CreateOutput {
            tag: task.tag.clone(),
            previous_version: previous_version.to_string(),
            version: task.version.clone(),
            title: task.title.clone(),
            files: display_paths(&task.artifacts),
        })
    }

    // === Update ===

    /// Edit title/notes, then re-upload artifacts with overwrite. The upload
    /// only runs after the edit is accepted.
    pub fn update(&self, task: &ReleaseTask, reporter: &dyn Reporter) -> Result<UpdateOutput> {
        require_artifacts(&task.artifacts, self.project_root)?;
        self.checkpoint("release update")?;

        reporter.info(&format!("📝 Updating release {}...", task.tag));

        let notes = NotesFile::create(self.project_root, &self.notes_prefix, &task.notes)?;
        let edit = self.tool_command([
            "release".to_string(),
            "edit".to_string(),
            task.tag.clone(),
            "--title".to_string(),
            task.title.clone(),
            "--notes-file".to_string(),
            notes.arg(),
        ]);
        let edited = self.run(&edit, reporter);
        drop(notes);
        edited?;

        self.checkpoint("release update")?;

        reporter.info("📤 Uploading files...");
        let mut args = vec!["release".to_string(), "upload".to_string(), task.tag.clone()];
        args.extend(task.artifacts.iter().map(|p| p.display().to_string()));
        args.push("--clobber".to_string());
        self.run(&self.tool_command(args), reporter)?;

        reporter.success(&format!("✅ Release {} updated", task.tag));
        Ok(UpdateOutput {
            tag: task.tag.clone(),
            title: task.title.clone(),
            edited: true,
            uploaded: true,
            files: display_paths(&task.artifacts),
        })
    }

    // === Delete ===

    /// Remote release, local tag, remote tag. Every step runs even when an
    /// earlier one fails; the report says which did not succeed.
    pub fn delete(&self, tag: &str, reporter: &dyn Reporter) -> Result<DeleteReport> {
        reporter.warning(&format!("🗑️ Deleting release {}...", tag));

        let steps = [
            ("release", self.tool_command(["release", "delete", tag, "--yes"])),
            ("local_tag", CommandSpec::new("git", ["tag", "-d", tag]).in_dir(self.project_root)),
            (
                "remote_tag",
                CommandSpec::new("git", ["push", "origin", "--delete", tag]).in_dir(self.project_root),
            ),
        ];

        let mut results = Vec::with_capacity(steps.len());
        for (step, spec) in steps {
            self.checkpoint("release delete")?;
            let result = run_logged(self.runner, &spec, reporter);
            if result.stopped {
                return Err(Error::queue_stopped("release delete"));
            }
            if !result.success {
                reporter.warning(&format!("⚠️ {} step failed, continuing", step));
            }
            results.push(StepResult {
                step: step.to_string(),
                command: spec.display(),
                success: result.success,
                exit_code: result.exit_code,
            });
        }

        let success = results.iter().all(|r| r.success);
        if success {
            reporter.success(&format!("✅ Release {} deleted", tag));
        } else {
            reporter.error(&format!("❌ Delete of {} finished with errors", tag));
        }

        Ok(DeleteReport {
            tag: tag.to_string(),
            steps: results,
            success,
        })
    }

    // === Queries ===

    pub fn list(&self, limit: u32, reporter: &dyn Reporter) -> Result<Vec<ReleaseSummary>> {
        let spec = self.tool_command([
            "release".to_string(),
            "list".to_string(),
            "--json".to_string(),
            LIST_FIELDS.to_string(),
            "--limit".to_string(),
            limit.to_string(),
        ]);
        let result = self.run(&spec, reporter)?;
        parse_release_list(&result.output)
    }

    /// Entry flagged latest, else the newest listed.
    pub fn latest(&self, limit: u32, reporter: &dyn Reporter) -> Result<Option<ReleaseSummary>> {
        let releases = self.list(limit, reporter)?;
        Ok(pick_latest(releases))
    }
}

fn require_artifacts(artifacts: &[PathBuf], project_root: &Path) -> Result<()> {
    if artifacts.is_empty() {
        return Err(Error::build_artifacts_missing(project_root.display().to_string()));
    }
    Ok(())
}

fn display_paths(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}

/// The tool may print warnings around the JSON; parse from the first `[`.
pub(crate) fn parse_release_list(output: &str) -> Result<Vec<ReleaseSummary>> {
    let Some(start) = output.find('[') else {
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }
        return Err(Error::internal_json(
            "no JSON array in release list output",
            Some("parse release list".to_string()),
        ));
    };

    serde_json::Deserializer::from_str(&output[start..])
        .into_iter::<Vec<ReleaseSummary>>()
        .next()
        .unwrap_or_else(|| Ok(Vec::new()))
        .map_err(|e| Error::internal_json(e.to_string(), Some("parse release list".to_string())))
}

fn pick_latest(releases: Vec<ReleaseSummary>) -> Option<ReleaseSummary> {
    let flagged = releases.iter().position(|r| r.is_latest);
    match flagged {
        Some(i) => releases.into_iter().nth(i),
        None => releases.into_iter().next(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::MemoryReporter;
    use crate::runner::fake::FakeRunner;
    use crate::version::ReleaseKind;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn artifacts(root: &Path) -> Vec<PathBuf> {
        let dist = root.join("dist");
        fs::create_dir_all(&dist).unwrap();
        let exe = dist.join("App-1.0.1.exe");
        let yml = dist.join("latest.yml");
        fs::write(&exe, "bin").unwrap();
        fs::write(&yml, "version: 1.0.1").unwrap();
        vec![exe, yml]
    }

    fn notes_files(root: &Path) -> Vec<PathBuf> {
        fs::read_dir(root)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with("temp_release_notes"))
            .collect()
    }

    fn notes_arg(spec: &CommandSpec) -> PathBuf {
        let i = spec.args.iter().position(|a| a == "--notes-file").unwrap();
        PathBuf::from(&spec.args[i + 1])
    }

    #[test]
    fn create_passes_tag_files_title_and_notes() {
        let root = TempDir::new().unwrap();
        let files = artifacts(root.path());
        let runner = FakeRunner::new();
        let seen = Arc::new(Mutex::new(String::new()));
        let s = Arc::clone(&seen);
        runner.on_run_prefix("gh release create", move |spec| {
            *s.lock().unwrap() = fs::read_to_string(notes_arg(spec)).unwrap();
        });

        let task = ReleaseTask::for_create("1.0.0", ReleaseKind::Patch, None, None, files.clone());
        let out = ReleasePublisher::new(&runner, root.path())
            .create(&task, "1.0.0", &MemoryReporter::new())
            .unwrap();

        assert_eq!(out.tag, "v1.0.1");
        assert_eq!(*seen.lock().unwrap(), "Patch release");
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].args[..3], ["release", "create", "v1.0.1"]);
        assert!(calls[0].args.contains(&files[0].display().to_string()));
        assert!(calls[0].args.contains(&"v1.0.1 - Patch".to_string()));
        assert!(notes_files(root.path()).is_empty());
    }

    #[test]
    fn failed_create_still_removes_notes_file() {
        let root = TempDir::new().unwrap();
        let files = artifacts(root.path());
        let runner = FakeRunner::new();
        runner.respond_prefix("gh release create", false, "HTTP 422: tag exists");

        let task = ReleaseTask::for_create("1.0.0", ReleaseKind::Patch, None, None, files);
        let err = ReleasePublisher::new(&runner, root.path())
            .create(&task, "1.0.0", &MemoryReporter::new())
            .unwrap_err();

        assert_eq!(err.code.as_str(), "release.command_failed");
        let notes = notes_arg(&runner.calls.lock().unwrap()[0]);
        assert!(!notes.exists());
        assert!(notes_files(root.path()).is_empty());
    }

    #[test]
    fn create_without_artifacts_runs_nothing() {
        let root = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        let task = ReleaseTask::for_create("1.0.0", ReleaseKind::Patch, None, None, vec![]);
        let err = ReleasePublisher::new(&runner, root.path())
            .create(&task, "1.0.0", &MemoryReporter::new())
            .unwrap_err();
        assert_eq!(err.code.as_str(), "build.artifacts_missing");
        assert!(runner.displays().is_empty());
    }

    #[test]
    fn update_edits_then_uploads_with_clobber() {
        let root = TempDir::new().unwrap();
        let files = artifacts(root.path());
        let runner = FakeRunner::new();
        let task = ReleaseTask::for_update("1.0.1", Some("Title"), Some("Notes"), files).unwrap();

        let out = ReleasePublisher::new(&runner, root.path())
            .update(&task, &MemoryReporter::new())
            .unwrap();

        assert!(out.uploaded);
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args[..3], ["release", "edit", "v1.0.1"]);
        assert_eq!(calls[1].args[..3], ["release", "upload", "v1.0.1"]);
        assert_eq!(calls[1].args.last().unwrap(), "--clobber");
    }

    #[test]
    fn failed_edit_skips_upload() {
        let root = TempDir::new().unwrap();
        let files = artifacts(root.path());
        let runner = FakeRunner::new();
        runner.respond_prefix("gh release edit", false, "release not found");
        let task = ReleaseTask::for_update("1.0.1", Some("Title"), Some("Notes"), files).unwrap();

        let err = ReleasePublisher::new(&runner, root.path())
            .update(&task, &MemoryReporter::new())
            .unwrap_err();

        assert_eq!(err.code.as_str(), "release.command_failed");
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
        assert!(notes_files(root.path()).is_empty());
    }

    #[test]
    fn delete_runs_every_step_even_after_failure() {
        let root = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        runner.respond("gh release delete v1.0.0 --yes", false, "not found");
        let reporter = MemoryReporter::new();

        let report = ReleasePublisher::new(&runner, root.path())
            .delete("v1.0.0", &reporter)
            .unwrap();

        assert_eq!(
            runner.displays(),
            vec![
                "gh release delete v1.0.0 --yes",
                "git tag -d v1.0.0",
                "git push origin --delete v1.0.0",
            ]
        );
        assert!(!report.success);
        assert_eq!(report.failed_steps(), vec!["release"]);
        assert!(reporter.contains("finished with errors"));
    }

    #[test]
    fn delete_succeeds_when_all_steps_do() {
        let root = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        let report = ReleasePublisher::new(&runner, root.path())
            .delete("v2.0.0", &MemoryReporter::new())
            .unwrap();
        assert!(report.success);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn list_parses_json_and_latest_prefers_flag() {
        let root = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        runner.respond(
            &format!("gh release list --json {} --limit 30", LIST_FIELDS),
            true,
            r#"[{"tagName":"v1.1.0","name":"draft","isLatest":false,"isDraft":true,"isPrerelease":false},
                {"tagName":"v1.0.0","name":"v1.0.0 - Patch","isLatest":true,"isDraft":false,"isPrerelease":false}]"#,
        );
        let publisher = ReleasePublisher::new(&runner, root.path());
        let reporter = MemoryReporter::new();

        assert_eq!(publisher.list(30, &reporter).unwrap().len(), 2);
        assert_eq!(publisher.latest(30, &reporter).unwrap().unwrap().tag_name, "v1.0.0");
    }

    #[test]
    fn release_list_tolerates_surrounding_text() {
        let rows = parse_release_list("warning: update available\n[]\n").unwrap();
        assert!(rows.is_empty());
        assert!(parse_release_list("").unwrap().is_empty());
        assert!(parse_release_list("not json").is_err());
        assert_eq!(pick_latest(vec![]), None);
    }
}
