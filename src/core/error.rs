use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,

    ProjectNotSelected,
    ProjectPathMissing,
    ProjectManifestMissing,
    ProjectManifestInvalid,
    ProjectNotGitRepo,

    CleanupFailed,
    BuildFailed,
    BuildArtifactsMissing,
    ReleaseCommandFailed,

    QueueStopped,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::ProjectNotSelected => "project.not_selected",
            ErrorCode::ProjectPathMissing => "project.path_missing",
            ErrorCode::ProjectManifestMissing => "project.manifest_missing",
            ErrorCode::ProjectManifestInvalid => "project.manifest_invalid",
            ErrorCode::ProjectNotGitRepo => "project.not_git_repo",

            ErrorCode::CleanupFailed => "cleanup.failed",
            ErrorCode::BuildFailed => "build.failed",
            ErrorCode::BuildArtifactsMissing => "build.artifacts_missing",
            ErrorCode::ReleaseCommandFailed => "release.command_failed",

            ErrorCode::QueueStopped => "queue.stopped",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidJsonDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPathDetails {
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupFailedDetails {
    pub path: String,
    pub attempts: u32,
    pub last_error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildFailedDetails {
    pub tried: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub output: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            to_details(MissingArgumentDetails { args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.clone(),
            id,
            tried,
        });

        Self::new(ErrorCode::ValidationInvalidArgument, problem, details)
    }

    pub fn project_not_selected() -> Self {
        Self::new(
            ErrorCode::ProjectNotSelected,
            "Select project path first",
            Value::Object(serde_json::Map::new()),
        )
        .with_hint("Pass --project <dir> or run relman from the project directory")
    }

    pub fn project_path_missing(path: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ProjectPathMissing,
            "Project path does not exist",
            to_details(ProjectPathDetails { path: path.into() }),
        )
    }

    pub fn project_manifest_missing(path: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ProjectManifestMissing,
            "package.json not found",
            to_details(ProjectPathDetails { path: path.into() }),
        )
    }

    pub fn project_manifest_invalid(path: impl Into<String>, err: serde_json::Error) -> Self {
        Self::new(
            ErrorCode::ProjectManifestInvalid,
            format!("package.json error: {}", err),
            serde_json::json!({ "path": path.into(), "error": err.to_string() }),
        )
    }

    pub fn project_not_git_repo(path: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ProjectNotGitRepo,
            "Not a git repository",
            to_details(ProjectPathDetails { path: path.into() }),
        )
        .with_hint("Run 'git init' and add a GitHub remote before releasing")
    }

    pub fn cleanup_failed(path: impl Into<String>, attempts: u32, last_error: impl Into<String>) -> Self {
        let path = path.into();
        let mut err = Self::new(
            ErrorCode::CleanupFailed,
            format!("Could not delete {} after {} attempt(s)", path, attempts),
            to_details(CleanupFailedDetails {
                path,
                attempts,
                last_error: last_error.into(),
            }),
        )
        .with_hint("Close the running application or any tool holding files in the output directory");
        err.retryable = Some(true);
        err
    }

    pub fn build_failed(tried: Vec<String>) -> Self {
        let message = if tried.is_empty() {
            "No eligible build command found in package.json".to_string()
        } else {
            format!("No build command produced artifacts ({} tried)", tried.len())
        };
        Self::new(
            ErrorCode::BuildFailed,
            message,
            to_details(BuildFailedDetails { tried }),
        )
    }

    pub fn build_artifacts_missing(dir: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::BuildArtifactsMissing,
            "Files missing",
            to_details(ProjectPathDetails { path: dir.into() }),
        )
        .with_hint("Run 'relman build' to produce an executable and latest.yml")
    }

    pub fn release_command_failed(details: CommandFailedDetails) -> Self {
        let message = format!("Failed: {}", details.exit_code);
        Self::new(ErrorCode::ReleaseCommandFailed, message, to_details(details))
    }

    pub fn queue_stopped(operation: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::QueueStopped,
            "Commands stopped",
            serde_json::json!({ "operation": operation.into() }),
        )
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        Self::new(
            ErrorCode::ConfigMissingKey,
            "Missing required configuration key",
            to_details(ConfigMissingKeyDetails {
                key: key.into(),
                path,
            }),
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            to_details(ConfigInvalidJsonDetails {
                path: path.into(),
                error: err.to_string(),
            }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            to_details(ConfigInvalidValueDetails {
                key: key.into(),
                value,
                problem: problem.into(),
            }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            to_details(InternalIoErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            to_details(InternalJsonErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    /// Text used when an error crosses a task boundary into the log sink.
    pub fn log_text(&self) -> String {
        match self.details.get("error").and_then(|v| v.as_str()) {
            Some(detail) if !detail.is_empty() && detail != self.message => {
                format!("{}: {}", self.message, detail)
            }
            _ => self.message.clone(),
        }
    }
}
