use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, ErrorCode, Result};
use crate::version::{calculate_new_version, tag_for, ReleaseKind};

/// One publish attempt; consumed by a single create or update.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseTask {
    pub version: String,
    pub tag: String,
    pub title: String,
    pub notes: String,
    pub artifacts: Vec<PathBuf>,
}

impl ReleaseTask {
    /// Next release after `current`. Empty title/notes fall back to
    /// `v<new> - <Kind>` and `<Kind> release`.
    pub fn for_create(
        current: &str,
        kind: ReleaseKind,
        title: Option<&str>,
        notes: Option<&str>,
        artifacts: Vec<PathBuf>,
    ) -> Self {
        let version = calculate_new_version(current, kind);
        let tag = tag_for(&version);
        let title = non_empty(title).unwrap_or_else(|| format!("{} - {}", tag, kind.label()));
        let notes = non_empty(notes).unwrap_or_else(|| format!("{} release", kind.label()));
        Self {
            version,
            tag,
            title,
            notes,
            artifacts,
        }
    }

    /// Edit of an existing release. Title and notes are both required.
    pub fn for_update(
        version: &str,
        title: Option<&str>,
        notes: Option<&str>,
        artifacts: Vec<PathBuf>,
    ) -> Result<Self> {
        let mut missing = Vec::new();
        let title = non_empty(title);
        let notes = non_empty(notes);
        if title.is_none() {
            missing.push("title".to_string());
        }
        if notes.is_none() {
            missing.push("notes".to_string());
        }
        match (title, notes) {
            (Some(title), Some(notes)) => Ok(Self {
                version: version.trim_start_matches('v').to_string(),
                tag: tag_for(version),
                title,
                notes,
                artifacts,
            }),
            _ => Err(Error::validation_missing_argument(missing)),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Row of `gh release list --json ...`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSummary {
    pub tag_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_latest: bool,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default)]
    pub is_prerelease: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOutput {
    pub tag: String,
    pub previous_version: String,
    pub version: String,
    pub title: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutput {
    pub tag: String,
    pub title: String,
    pub edited: bool,
    pub uploaded: bool,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step: String,
    pub command: String,
    pub success: bool,
    pub exit_code: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub tag: String,
    pub steps: Vec<StepResult>,
    pub success: bool,
}

impl DeleteReport {
    pub fn failed_steps(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| !s.success)
            .map(|s| s.step.clone())
            .collect()
    }

    /// `Err` carrying the full report when any sub-step failed.
    pub fn into_result(self) -> Result<Self> {
        if self.success {
            return Ok(self);
        }
        let message = format!("Delete of {} incomplete: {}", self.tag, self.failed_steps().join(", "));
        let details = serde_json::to_value(&self).unwrap_or_default();
        Err(Error::new(ErrorCode::ReleaseCommandFailed, message, details))
    }
}
