//! The selected project directory and what its `package.json` declares.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::io;
use crate::paths;

/// Displayed when package.json carries no version.
pub const UNKNOWN_VERSION: &str = "Unknown";

#[derive(Debug, Clone, Serialize)]
pub struct ProjectContext {
    pub root: PathBuf,
    /// Script name -> command, from package.json `scripts`.
    pub scripts: BTreeMap<String, String>,
    /// Session version. Starts at the manifest value and advances after a
    /// successful release; never written back to package.json.
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageManifest {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    scripts: BTreeMap<String, Value>,
    #[serde(default)]
    product_name: Option<String>,
    #[serde(default)]
    build: Option<BuildSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildSection {
    #[serde(default)]
    product_name: Option<String>,
}

impl ProjectContext {
    /// Validate the project preconditions and read its manifest.
    pub fn load(root: Option<&Path>) -> Result<Self> {
        let root = match root {
            Some(r) if !r.as_os_str().is_empty() => r.to_path_buf(),
            _ => return Err(Error::project_not_selected()),
        };

        if !root.is_dir() {
            return Err(Error::project_path_missing(root.display().to_string()));
        }

        let mut ctx = Self {
            root,
            scripts: BTreeMap::new(),
            version: UNKNOWN_VERSION.to_string(),
            product_name: None,
        };
        ctx.reload_manifest()?;
        Ok(ctx)
    }

    /// Re-read package.json; replaces scripts, version and product name.
    pub fn reload_manifest(&mut self) -> Result<()> {
        let manifest = read_manifest(&self.root)?;

        self.scripts = manifest
            .scripts
            .into_iter()
            .filter_map(|(name, cmd)| cmd.as_str().map(|c| (name, c.to_string())))
            .collect();
        self.version = manifest
            .version
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        self.product_name = manifest
            .product_name
            .or_else(|| manifest.build.and_then(|b| b.product_name))
            .filter(|p| !p.trim().is_empty());
        Ok(())
    }

    pub fn manifest_path(&self) -> PathBuf {
        paths::manifest(&self.root)
    }

    pub fn is_git_repo(&self) -> bool {
        self.root.join(".git").exists()
    }

    pub fn require_git(&self) -> Result<()> {
        if self.is_git_repo() {
            Ok(())
        } else {
            Err(Error::project_not_git_repo(self.root.display().to_string()))
        }
    }

    /// Product name from the manifest, falling back to the configured one.
    pub fn product<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.product_name.as_deref().unwrap_or(fallback)
    }

    pub fn output_dir(&self, relative: &str) -> PathBuf {
        paths::output_dir(&self.root, relative)
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }
}

fn read_manifest(root: &Path) -> Result<PackageManifest> {
    let path = paths::manifest(root);
    if !path.is_file() {
        return Err(Error::project_manifest_missing(path.display().to_string()));
    }

    let content = io::read_file(&path, "read package.json")?;

    serde_json::from_str(&content)
        .map_err(|e| Error::project_manifest_invalid(path.display().to_string(), e))
}

/// Snapshot shown by `relman status`.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    pub path: String,
    pub version: String,
    pub has_manifest: bool,
    pub is_git_repo: bool,
    pub scripts: Vec<String>,
    pub eligible_build_commands: Vec<String>,
    pub artifacts_ready: bool,
    /// "Ready (Git)" / "Ready (No Git)"
    pub label: String,
}
