//! Build output verification with glob pattern support.
//!
//! A build is considered real only when the output directory holds at least
//! one executable and the update manifest. Executable patterns are tried in
//! order and the first pattern with matches wins.

use glob::Pattern;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::defaults::ArtifactsConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArtifactReport {
    pub dir: String,
    /// Pattern that produced the executable matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable_pattern: Option<String>,
    pub executables: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_manifest: Option<PathBuf>,
}

impl ArtifactReport {
    pub fn is_complete(&self) -> bool {
        !self.executables.is_empty() && self.update_manifest.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactVerifier {
    dir: PathBuf,
    executable_patterns: Vec<String>,
    update_manifest: String,
    extra_upload_patterns: Vec<String>,
}

impl ArtifactVerifier {
    pub fn new(dir: &Path, executable_patterns: Vec<String>, update_manifest: impl Into<String>) -> Self {
        Self {
            dir: dir.to_path_buf(),
            executable_patterns,
            update_manifest: update_manifest.into(),
            extra_upload_patterns: Vec::new(),
        }
    }

    /// Verifier for `dir` with `{{product}}` rendered into the configured patterns.
    pub fn from_config(dir: &Path, config: &ArtifactsConfig, product: &str) -> Self {
        Self::new(dir, config.resolved_executable_patterns(product), &config.update_manifest)
            .with_extra_uploads(config.extra_upload_patterns.clone())
    }

    pub fn with_extra_uploads(mut self, patterns: Vec<String>) -> Self {
        self.extra_upload_patterns = patterns;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Single pass over the output directory. No side effects.
    pub fn verify(&self) -> ArtifactReport {
        let mut report = ArtifactReport {
            dir: self.dir.display().to_string(),
            ..Default::default()
        };

        if !self.dir.is_dir() {
            return report;
        }

        for pattern in &self.executable_patterns {
            let matches = self.matches(pattern);
            if !matches.is_empty() {
                report.executable_pattern = Some(pattern.clone());
                report.executables = matches;
                break;
            }
        }

        let manifest = self.dir.join(&self.update_manifest);
        if manifest.is_file() {
            report.update_manifest = Some(manifest);
        }

        report
    }

    pub fn is_ready(&self) -> bool {
        self.verify().is_complete()
    }

    /// Poll until artifacts are complete or `timeout` elapses.
    pub fn wait_for(&self, timeout: Duration, poll: Duration) -> ArtifactReport {
        let started = Instant::now();
        loop {
            let report = self.verify();
            if report.is_complete() || started.elapsed() >= timeout {
                return report;
            }
            thread::sleep(poll.max(Duration::from_millis(1)));
        }
    }

    /// Files attached to a release: executables, the update manifest, and
    /// any extra matches (blockmaps). Fails when the artifact set is incomplete.
    pub fn upload_set(&self) -> Result<Vec<PathBuf>> {
        let report = self.verify();
        if !report.is_complete() {
            return Err(Error::build_artifacts_missing(report.dir));
        }

        let mut files = report.executables;
        if let Some(manifest) = report.update_manifest {
            files.push(manifest);
        }
        for pattern in &self.extra_upload_patterns {
            for path in self.matches(pattern) {
                if !files.contains(&path) {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }

    fn matches(&self, pattern: &str) -> Vec<PathBuf> {
        let escaped_dir = Pattern::escape(&self.dir.to_string_lossy());
        let full = Path::new(&escaped_dir).join(pattern);

        let Ok(entries) = glob::glob(&full.to_string_lossy()) else {
            log_status!("artifacts", "Invalid glob pattern '{}'", pattern);
            return Vec::new();
        };

        let mut found: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .collect();
        found.sort();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn verifier(dir: &Path) -> ArtifactVerifier {
        ArtifactVerifier::new(
            dir,
            vec![
                "MakeYourLifeEasier-*.exe".to_string(),
                "*.exe".to_string(),
                "*.AppImage".to_string(),
            ],
            "latest.yml",
        )
        .with_extra_uploads(vec!["*.blockmap".to_string()])
    }

    #[test]
    fn missing_directory_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let report = verifier(&dir.path().join("dist")).verify();
        assert!(!report.is_complete());
        assert!(report.executables.is_empty());
    }

    #[test]
    fn executable_without_manifest_is_incomplete() {
        let dir = TempDir::new().unwrap();
        File::create(dir.path().join("App.exe")).unwrap();
        let report = verifier(dir.path()).verify();
        assert_eq!(report.executables.len(), 1);
        assert!(!report.is_complete());
    }

    #[test]
    fn manifest_without_executable_is_incomplete() {
        let dir = TempDir::new().unwrap();
        File::create(dir.path().join("latest.yml")).unwrap();
        assert!(!verifier(dir.path()).is_ready());
    }

    #[test]
    fn first_matching_pattern_wins() {
        let dir = TempDir::new().unwrap();
        File::create(dir.path().join("MakeYourLifeEasier-1.2.3.exe")).unwrap();
        File::create(dir.path().join("uninstaller.exe")).unwrap();
        File::create(dir.path().join("latest.yml")).unwrap();

        let report = verifier(dir.path()).verify();
        assert!(report.is_complete());
        assert_eq!(report.executable_pattern.as_deref(), Some("MakeYourLifeEasier-*.exe"));
        assert_eq!(report.executables.len(), 1);
    }

    #[test]
    fn later_patterns_used_when_earlier_miss() {
        let dir = TempDir::new().unwrap();
        File::create(dir.path().join("app-1.0.0.AppImage")).unwrap();
        File::create(dir.path().join("latest.yml")).unwrap();

        let report = verifier(dir.path()).verify();
        assert!(report.is_complete());
        assert_eq!(report.executable_pattern.as_deref(), Some("*.AppImage"));
    }

    #[test]
    fn directories_named_like_artifacts_are_ignored() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("win-unpacked.exe")).unwrap();
        File::create(dir.path().join("latest.yml")).unwrap();
        assert!(!verifier(dir.path()).is_ready());
    }

    #[test]
    fn upload_set_includes_manifest_and_blockmaps() {
        let dir = TempDir::new().unwrap();
        File::create(dir.path().join("MakeYourLifeEasier-1.0.0.exe")).unwrap();
        File::create(dir.path().join("MakeYourLifeEasier-1.0.0.exe.blockmap")).unwrap();
        File::create(dir.path().join("latest.yml")).unwrap();
        File::create(dir.path().join("builder-debug.yml")).unwrap();

        let files = verifier(dir.path()).upload_set().unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "MakeYourLifeEasier-1.0.0.exe",
                "latest.yml",
                "MakeYourLifeEasier-1.0.0.exe.blockmap",
            ]
        );
    }

    #[test]
    fn upload_set_requires_complete_artifacts() {
        let dir = TempDir::new().unwrap();
        let err = verifier(dir.path()).upload_set().unwrap_err();
        assert_eq!(err.code.as_str(), "build.artifacts_missing");
    }

    #[test]
    fn wait_for_sees_late_artifacts() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            File::create(root.join("App.exe")).unwrap();
            File::create(root.join("latest.yml")).unwrap();
        });

        let report = verifier(dir.path()).wait_for(Duration::from_secs(5), Duration::from_millis(20));
        writer.join().unwrap();
        assert!(report.is_complete());
    }

    #[test]
    fn wait_for_gives_up_after_timeout() {
        let dir = TempDir::new().unwrap();
        let started = Instant::now();
        let report = verifier(dir.path()).wait_for(Duration::from_millis(80), Duration::from_millis(20));
        assert!(!report.is_complete());
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
