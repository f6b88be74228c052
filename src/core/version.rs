use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Baseline used whenever the current version cannot be parsed.
pub const FALLBACK_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseKind {
    Patch,
    Minor,
    Major,
}

impl ReleaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseKind::Patch => "patch",
            ReleaseKind::Minor => "minor",
            ReleaseKind::Major => "major",
        }
    }

    /// Capitalized form used in default titles and notes.
    pub fn label(&self) -> &'static str {
        match self {
            ReleaseKind::Patch => "Patch",
            ReleaseKind::Minor => "Minor",
            ReleaseKind::Major => "Major",
        }
    }
}

impl fmt::Display for ReleaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReleaseKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "patch" => Ok(ReleaseKind::Patch),
            "minor" => Ok(ReleaseKind::Minor),
            "major" => Ok(ReleaseKind::Major),
            _ => Err(Error::validation_invalid_argument(
                "kind",
                format!("Unknown release kind '{}'", s),
                Some(s.to_string()),
                Some(vec!["patch".into(), "minor".into(), "major".into()]),
            )),
        }
    }
}

/// Increment semver version.
/// bump_type: "patch", "minor", or "major"
pub fn increment_version(version: &str, bump_type: &str) -> Option<String> {
    let parts: Vec<&str> = version.trim().split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    let major: u32 = parts[0].parse().ok()?;
    let minor: u32 = parts[1].parse().ok()?;
    let patch: u32 = parts[2].parse().ok()?;

    let (new_major, new_minor, new_patch) = match bump_type {
        "patch" => (major, minor, patch.checked_add(1)?),
        "minor" => (major, minor.checked_add(1)?, 0),
        "major" => (major.checked_add(1)?, 0, 0),
        _ => return None,
    };

    Some(format!("{}.{}.{}", new_major, new_minor, new_patch))
}

/// Next version for a release. Malformed input yields [`FALLBACK_VERSION`].
pub fn calculate_new_version(current: &str, kind: ReleaseKind) -> String {
    increment_version(current, kind.as_str()).unwrap_or_else(|| FALLBACK_VERSION.to_string())
}

pub fn tag_for(version: &str) -> String {
    format!("v{}", version.trim().trim_start_matches('v'))
}

/// Extract `X.Y.Z` from a tag such as `v1.2.3`.
pub fn version_from_tag(tag: &str) -> Option<String> {
    let re = Regex::new(r"^v?(\d+\.\d+\.\d+)$").ok()?;
    re.captures(tag.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct BumpOutput {
    pub current: String,
    pub kind: ReleaseKind,
    pub new_version: String,
    pub tag: String,
    /// True when `current` was malformed and the baseline was used.
    pub fell_back: bool,
}

pub fn bump(current: &str, kind: ReleaseKind) -> BumpOutput {
    let bumped = increment_version(current, kind.as_str());
    let fell_back = bumped.is_none();
    let new_version = bumped.unwrap_or_else(|| FALLBACK_VERSION.to_string());
    BumpOutput {
        current: current.to_string(),
        kind,
        tag: tag_for(&new_version),
        new_version,
        fell_back,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bumps_each_component() {
        assert_eq!(calculate_new_version("1.2.3", ReleaseKind::Patch), "1.2.4");
        assert_eq!(calculate_new_version("1.2.3", ReleaseKind::Minor), "1.3.0");
        assert_eq!(calculate_new_version("1.2.3", ReleaseKind::Major), "2.0.0");
    }

    #[test]
    fn malformed_versions_fail_closed() {
        for bad in ["abc", "1.2", "1.2.3.4", "", "Unknown", "1.x.3", "-1.0.0"] {
            assert_eq!(calculate_new_version(bad, ReleaseKind::Patch), FALLBACK_VERSION, "{bad}");
        }
    }

    #[test]
    fn overflow_fails_closed() {
        let max = format!("1.2.{}", u32::MAX);
        assert_eq!(calculate_new_version(&max, ReleaseKind::Patch), FALLBACK_VERSION);
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Minor".parse::<ReleaseKind>().unwrap(), ReleaseKind::Minor);
        assert!("hotfix".parse::<ReleaseKind>().is_err());
    }

    #[test]
    fn tags_round_trip_through_versions() {
        assert_eq!(tag_for("1.4.0"), "v1.4.0");
        assert_eq!(tag_for("v1.4.0"), "v1.4.0");
        assert_eq!(version_from_tag("v1.4.0").as_deref(), Some("1.4.0"));
        assert_eq!(version_from_tag("release-7"), None);
    }

    #[test]
    fn bump_reports_fallback() {
        let out = bump("abc", ReleaseKind::Patch);
        assert!(out.fell_back);
        assert_eq!(out.tag, "v1.0.0");
        assert!(!bump("0.9.9", ReleaseKind::Minor).fell_back);
    }
}
