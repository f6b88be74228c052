use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::paths;
use crate::template::{self, TemplateVars};

/// Root configuration structure for relman.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelmanConfig {
    #[serde(default)]
    pub defaults: Defaults,
}

/// All configurable defaults that can be overridden via relman.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Substituted for `{{product}}` in reaper targets and artifact patterns
    /// when the project manifest does not declare a product name.
    #[serde(default = "default_product_name")]
    pub product_name: String,

    #[serde(default = "default_reaper")]
    pub reaper: ReaperConfig,

    #[serde(default = "default_cleanup")]
    pub cleanup: CleanupConfig,

    #[serde(default = "default_build")]
    pub build: BuildConfig,

    #[serde(default = "default_artifacts")]
    pub artifacts: ArtifactsConfig,

    #[serde(default = "default_release")]
    pub release: ReleaseConfig,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            product_name: default_product_name(),
            reaper: default_reaper(),
            cleanup: default_cleanup(),
            build: default_build(),
            artifacts: default_artifacts(),
            release: default_release(),
        }
    }
}

/// Process termination before touching the output directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    #[serde(default = "default_reaper_targets")]
    pub targets: Vec<String>,
    /// Upper bound on waiting for killed processes to disappear
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_candidates")]
    pub candidates: Vec<BuildCandidateConfig>,
    #[serde(default = "default_pre_build_delay_ms")]
    pub pre_build_delay_ms: u64,
    /// Upper bound on waiting for artifacts after a build exits
    #[serde(default = "default_artifact_timeout_ms")]
    pub artifact_timeout_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

/// One entry of the prioritized build command list.
///
/// `script` set: eligible only when package.json declares that script.
/// `script` unset: a standalone tool, always eligible.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildCandidateConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_executable_patterns")]
    pub executable_patterns: Vec<String>,
    #[serde(default = "default_update_manifest")]
    pub update_manifest: String,
    #[serde(default = "default_extra_upload_patterns")]
    pub extra_upload_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    #[serde(default = "default_release_tool")]
    pub tool: String,
    #[serde(default = "default_notes_file_prefix")]
    pub notes_file_prefix: String,
    #[serde(default = "default_list_limit")]
    pub list_limit: u32,
}

impl ReaperConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(1))
    }

    /// Targets with `{{product}}` rendered.
    pub fn resolved_targets(&self, product: &str) -> Vec<String> {
        self.targets
            .iter()
            .map(|t| template::render(t, &[(TemplateVars::PRODUCT, product)]))
            .collect()
    }
}

impl CleanupConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl BuildConfig {
    pub fn pre_build_delay(&self) -> Duration {
        Duration::from_millis(self.pre_build_delay_ms)
    }

    pub fn artifact_timeout(&self) -> Duration {
        Duration::from_millis(self.artifact_timeout_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(1))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl ArtifactsConfig {
    pub fn resolved_executable_patterns(&self, product: &str) -> Vec<String> {
        self.executable_patterns
            .iter()
            .map(|p| template::render(p, &[(TemplateVars::PRODUCT, product)]))
            .collect()
    }
}

// =============================================================================
// Default value functions (match the observed release manager behavior)
// =============================================================================

fn default_product_name() -> String {
    "MakeYourLifeEasier".to_string()
}

fn default_reaper() -> ReaperConfig {
    ReaperConfig {
        targets: default_reaper_targets(),
        settle_ms: default_settle_ms(),
        poll_ms: default_poll_ms(),
    }
}

fn default_reaper_targets() -> Vec<String> {
    vec![
        "electron.exe".to_string(),
        "{{product}}.exe".to_string(),
        "node.exe".to_string(),
    ]
}

fn default_settle_ms() -> u64 {
    3000
}

fn default_poll_ms() -> u64 {
    250
}

fn default_cleanup() -> CleanupConfig {
    CleanupConfig {
        output_dir: default_output_dir(),
        max_retries: default_max_retries(),
        backoff_ms: default_backoff_ms(),
    }
}

fn default_output_dir() -> String {
    "dist".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    3000
}

fn default_build() -> BuildConfig {
    BuildConfig {
        candidates: default_candidates(),
        pre_build_delay_ms: default_pre_build_delay_ms(),
        artifact_timeout_ms: default_artifact_timeout_ms(),
        poll_ms: default_poll_ms(),
        command_timeout_secs: default_command_timeout_secs(),
    }
}

fn npm_script(name: &str) -> BuildCandidateConfig {
    BuildCandidateConfig {
        program: "npm".to_string(),
        args: vec!["run".to_string(), name.to_string()],
        script: Some(name.to_string()),
    }
}

/// Most comprehensive scripts first, generic fallbacks last.
pub fn default_candidates() -> Vec<BuildCandidateConfig> {
    vec![
        npm_script("build-all"),
        npm_script("build-portable"),
        npm_script("build-installer"),
        npm_script("build"),
        npm_script("dist"),
        npm_script("electron:build"),
        BuildCandidateConfig {
            program: "npx".to_string(),
            args: vec!["electron-builder".to_string()],
            script: None,
        },
        npm_script("make"),
    ]
}

fn default_pre_build_delay_ms() -> u64 {
    2000
}

fn default_artifact_timeout_ms() -> u64 {
    5000
}

fn default_command_timeout_secs() -> u64 {
    300
}

fn default_artifacts() -> ArtifactsConfig {
    ArtifactsConfig {
        executable_patterns: default_executable_patterns(),
        update_manifest: default_update_manifest(),
        extra_upload_patterns: default_extra_upload_patterns(),
    }
}

fn default_executable_patterns() -> Vec<String> {
    vec![
        "{{product}}-*.exe".to_string(),
        "*.exe".to_string(),
        "*.AppImage".to_string(),
        "*.dmg".to_string(),
        "*.deb".to_string(),
    ]
}

fn default_update_manifest() -> String {
    "latest.yml".to_string()
}

fn default_extra_upload_patterns() -> Vec<String> {
    vec!["*.blockmap".to_string()]
}

fn default_release() -> ReleaseConfig {
    ReleaseConfig {
        tool: default_release_tool(),
        notes_file_prefix: default_notes_file_prefix(),
        list_limit: default_list_limit(),
    }
}

fn default_release_tool() -> String {
    "gh".to_string()
}

fn default_notes_file_prefix() -> String {
    "temp_release_notes".to_string()
}

fn default_list_limit() -> u32 {
    30
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load the config from an explicit path, or from relman.json.
///
/// An explicit path must exist and parse. The global relman.json is optional:
/// when missing or invalid, built-in defaults are used.
pub fn load_config(explicit: Option<&Path>) -> crate::Result<RelmanConfig> {
    match explicit {
        Some(path) => load_config_from_file(path),
        None => Ok(paths::relman_json()
            .and_then(|path| load_config_from_file(&path))
            .unwrap_or_default()),
    }
}

fn load_config_from_file(path: &Path) -> crate::Result<RelmanConfig> {
    if !path.exists() {
        return Err(crate::Error::config_missing_key(
            "config",
            Some(path.display().to_string()),
        ));
    }

    let content = crate::io::read_file(path, &format!("read {}", path.display()))?;

    let config: RelmanConfig = serde_json::from_str(&content)
        .map_err(|e| crate::Error::config_invalid_json(path.display().to_string(), e))?;

    validate(&config.defaults)?;
    Ok(config)
}

fn validate(defaults: &Defaults) -> crate::Result<()> {
    if defaults.cleanup.max_retries == 0 {
        return Err(crate::Error::config_invalid_value(
            "defaults.cleanup.max_retries",
            Some("0".to_string()),
            "must be at least 1",
        ));
    }
    if defaults.cleanup.output_dir.trim().is_empty() {
        return Err(crate::Error::config_invalid_value(
            "defaults.cleanup.output_dir",
            None,
            "must not be empty",
        ));
    }
    if defaults.artifacts.executable_patterns.is_empty() {
        return Err(crate::Error::config_invalid_value(
            "defaults.artifacts.executable_patterns",
            None,
            "at least one pattern is required",
        ));
    }
    Ok(())
}

/// Save config to relman.json file (creates if missing).
pub fn save_config(config: &RelmanConfig) -> crate::Result<String> {
    let path = paths::relman_json()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            crate::Error::internal_io(e.to_string(), Some(format!("create {}", parent.display())))
        })?;
    }

    let content = serde_json::to_string_pretty(config).map_err(|e| {
        crate::Error::internal_json(e.to_string(), Some("serialize relman.json".to_string()))
    })?;

    crate::io::write_file_atomic(&path, &content, "write relman.json")?;

    Ok(path.display().to_string())
}
