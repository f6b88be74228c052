use crate::error::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Base relman config directory (universal ~/.config/relman/ on all platforms)
pub fn relman() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("relman"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("relman"))
    }
}

/// Global relman.json config file path
pub fn relman_json() -> Result<PathBuf> {
    Ok(relman()?.join("relman.json"))
}

/// Project manifest path (`package.json` under the project root)
pub fn manifest(project_root: &Path) -> PathBuf {
    project_root.join("package.json")
}

/// Build output directory under the project root
pub fn output_dir(project_root: &Path, relative: &str) -> PathBuf {
    project_root.join(relative)
}

/// Expand `~` and environment variables in a user-supplied path.
pub fn expand(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_lives_at_project_root() {
        let root = Path::new("/work/app");
        assert_eq!(manifest(root), PathBuf::from("/work/app/package.json"));
        assert_eq!(output_dir(root, "dist"), PathBuf::from("/work/app/dist"));
    }

    #[test]
    fn expand_leaves_absolute_paths_alone() {
        assert_eq!(expand("/srv/app"), PathBuf::from("/srv/app"));
    }
}
