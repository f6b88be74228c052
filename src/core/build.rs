use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::artifacts::{ArtifactReport, ArtifactVerifier};
use crate::defaults::BuildCandidateConfig;
use crate::error::{Error, Result};
use crate::queue::CancelToken;
use crate::reporter::Reporter;
use crate::runner::{run_logged, CommandRunner, CommandSpec};

// === Candidate Resolution ===

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildCommand {
    /// `build`, `dist`, `npx electron-builder`, ...
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    /// Position in the master list; lower runs first.
    pub rank: usize,
    /// Standalone tools run regardless of declared scripts.
    pub standalone: bool,
}

impl BuildCommand {
    fn from_candidate(rank: usize, candidate: &BuildCandidateConfig) -> Self {
        let name = match &candidate.script {
            Some(script) => script.clone(),
            None => std::iter::once(candidate.program.as_str())
                .chain(candidate.args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" "),
        };
        Self {
            name,
            program: candidate.program.clone(),
            args: candidate.args.clone(),
            rank,
            standalone: candidate.script.is_none(),
        }
    }

    pub fn invocation(&self, project_root: &Path) -> CommandSpec {
        CommandSpec::new(&self.program, self.args.iter().cloned()).in_dir(project_root)
    }
}

/// Master list intersected with the declared scripts, order preserved.
pub fn eligible_commands(
    candidates: &[BuildCandidateConfig],
    scripts: &BTreeMap<String, String>,
) -> Vec<BuildCommand> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| match &c.script {
            Some(script) => scripts.contains_key(script),
            None => true,
        })
        .map(|(rank, c)| BuildCommand::from_candidate(rank, c))
        .collect()
}

// === Probe ===

#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub winner: String,
    pub tried: Vec<String>,
    pub artifacts: ArtifactReport,
}

pub struct BuildProbe<'a> {
    runner: &'a dyn CommandRunner,
    verifier: &'a ArtifactVerifier,
    project_root: &'a Path,
    command_timeout: Option<Duration>,
    artifact_timeout: Duration,
    poll: Duration,
    cancel: Option<&'a CancelToken>,
}

impl<'a> BuildProbe<'a> {
    pub fn new(runner: &'a dyn CommandRunner, verifier: &'a ArtifactVerifier, project_root: &'a Path) -> Self {
        Self {
            runner,
            verifier,
            project_root,
            command_timeout: None,
            artifact_timeout: Duration::ZERO,
            poll: Duration::from_millis(250),
            cancel: None,
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn with_artifact_wait(mut self, timeout: Duration, poll: Duration) -> Self {
        self.artifact_timeout = timeout;
        self.poll = poll;
        self
    }

    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn checkpoint(&self) -> Result<()> {
        match self.cancel {
            Some(token) => token.checkpoint("build"),
            None => Ok(()),
        }
    }

    /// Run candidates in order until one exits successfully and leaves
    /// verified artifacts behind. Nothing runs after the winner.
    pub fn probe(&self, commands: &[BuildCommand], reporter: &dyn Reporter) -> Result<BuildOutcome> {
        let mut tried = Vec::new();

        for command in commands {
            self.checkpoint()?;

            reporter.info(&format!("🔨 Trying: {}", command.name));
            tried.push(command.name.clone());

            let mut spec = command.invocation(self.project_root);
            if let Some(timeout) = self.command_timeout {
                spec = spec.with_timeout(timeout);
            }

            let result = run_logged(self.runner, &spec, reporter);
            if result.stopped {
                return Err(Error::queue_stopped("build"));
            }
            if !result.success {
                reporter.warning(&format!("⚠️ {} failed, trying next", command.name));
                continue;
            }

            let artifacts = self.verifier.wait_for(self.artifact_timeout, self.poll);
            if artifacts.is_complete() {
                reporter.success(&format!("✅ Build completed with: {}", command.name));
                return Ok(BuildOutcome {
                    winner: command.name.clone(),
                    tried,
                    artifacts,
                });
            }

            reporter.warning(&format!(
                "⚠️ {} exited successfully but no artifacts in {}",
                command.name,
                self.verifier.dir().display()
            ));
        }

        reporter.error("❌ All build commands failed");
        Err(Error::build_failed(tried))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::default_candidates;
    use crate::reporter::MemoryReporter;
    use crate::runner::fake::FakeRunner;
    use std::fs;
    use tempfile::TempDir;

    fn scripts(names: &[&str]) -> BTreeMap<String, String> {
        names.iter().map(|n| (n.to_string(), "x".to_string())).collect()
    }

    fn names(commands: &[BuildCommand]) -> Vec<String> {
        commands.iter().map(|c| c.name.clone()).collect()
    }

    fn verifier(dist: &Path) -> ArtifactVerifier {
        ArtifactVerifier::new(dist, vec!["*.exe".to_string()], "latest.yml")
    }

    fn write_artifacts(dist: &Path) {
        fs::create_dir_all(dist).unwrap();
        fs::write(dist.join("App-1.0.0.exe"), "bin").unwrap();
        fs::write(dist.join("latest.yml"), "version: 1.0.0").unwrap();
    }

    #[test]
    fn filters_by_declared_scripts_keeping_order() {
        let eligible = eligible_commands(&default_candidates(), &scripts(&["dist", "build"]));
        assert_eq!(names(&eligible), vec!["build", "dist", "npx electron-builder"]);
    }

    #[test]
    fn standalone_builder_always_eligible() {
        let eligible = eligible_commands(&default_candidates(), &BTreeMap::new());
        assert_eq!(names(&eligible), vec!["npx electron-builder"]);
        assert!(eligible[0].standalone);
        assert_eq!(eligible[0].rank, 6);
    }

    #[test]
    fn make_sorts_after_generic_builder() {
        let eligible = eligible_commands(&default_candidates(), &scripts(&["make", "build-all"]));
        assert_eq!(names(&eligible), vec!["build-all", "npx electron-builder", "make"]);
    }

    #[test]
    fn stops_at_first_verified_candidate() {
        let root = TempDir::new().unwrap();
        let dist = root.path().join("dist");
        let runner = FakeRunner::new();
        let target = dist.clone();
        runner.on_run("npm run dist", move || write_artifacts(&target));

        let commands = eligible_commands(&default_candidates(), &scripts(&["build", "dist"]));
        let verifier = verifier(&dist);
        let reporter = MemoryReporter::new();
        let outcome = BuildProbe::new(&runner, &verifier, root.path())
            .probe(&commands, &reporter)
            .unwrap();

        assert_eq!(outcome.winner, "dist");
        assert_eq!(outcome.tried, vec!["build", "dist"]);
        assert_eq!(runner.displays(), vec!["npm run build", "npm run dist"]);
    }

    #[test]
    fn exit_zero_without_artifacts_is_not_success() {
        let root = TempDir::new().unwrap();
        let dist = root.path().join("dist");
        let runner = FakeRunner::new();
        let commands = eligible_commands(&default_candidates(), &scripts(&["build"]));
        let verifier = verifier(&dist);
        let reporter = MemoryReporter::new();

        let err = BuildProbe::new(&runner, &verifier, root.path())
            .probe(&commands, &reporter)
            .unwrap_err();

        assert_eq!(err.code.as_str(), "build.failed");
        assert_eq!(runner.displays(), vec!["npm run build", "npx electron-builder"]);
        assert!(reporter.contains("no artifacts"));
    }

    #[test]
    fn failed_exit_skips_verification_and_continues() {
        let root = TempDir::new().unwrap();
        let dist = root.path().join("dist");
        write_artifacts(&dist);
        let runner = FakeRunner::new();
        runner.respond("npm run build", false, "boom");

        let commands = eligible_commands(&default_candidates(), &scripts(&["build"]));
        let verifier = verifier(&dist);
        let reporter = MemoryReporter::new();
        let outcome = BuildProbe::new(&runner, &verifier, root.path())
            .probe(&commands, &reporter)
            .unwrap();

        assert_eq!(outcome.winner, "npx electron-builder");
    }

    #[test]
    fn commands_run_in_the_project_root() {
        let root = TempDir::new().unwrap();
        let dist = root.path().join("dist");
        write_artifacts(&dist);
        let runner = FakeRunner::new();
        let commands = eligible_commands(&default_candidates(), &BTreeMap::new());
        let verifier = verifier(&dist);

        BuildProbe::new(&runner, &verifier, root.path())
            .with_command_timeout(Duration::from_secs(60))
            .probe(&commands, &MemoryReporter::new())
            .unwrap();

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].cwd.as_deref(), Some(root.path()));
        assert_eq!(calls[0].timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn cancelled_probe_runs_nothing() {
        let root = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        let commands = eligible_commands(&default_candidates(), &BTreeMap::new());
        let verifier = verifier(&root.path().join("dist"));
        let token = CancelToken::new();
        token.cancel();

        let err = BuildProbe::new(&runner, &verifier, root.path())
            .with_cancel(&token)
            .probe(&commands, &MemoryReporter::new())
            .unwrap_err();

        assert_eq!(err.code.as_str(), "queue.stopped");
        assert!(runner.displays().is_empty());
    }
}
