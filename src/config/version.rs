//! Version gating of patch sets.
//!
//! A patch set can declare `version_range = ">=0.1.0, <0.2.0"` in its
//! `[meta]` table; the set only runs when the target project's
//! `package.json` version satisfies it.

use semver::{Version, VersionReq};
use std::fmt;

#[derive(Debug, Clone)]
pub enum VersionError {
    InvalidVersion { value: String, source: String },
    InvalidRequirement { value: String, source: String },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::InvalidVersion { value, source } => {
                write!(f, "invalid project version '{}': {}", value, source)
            }
            VersionError::InvalidRequirement { value, source } => {
                write!(f, "invalid version_range '{}': {}", value, source)
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// Whether `version` satisfies `requirement`. No requirement, or a blank
/// one, accepts every version.
///
/// npm-style leading `v` (`v1.2.3`) is tolerated on the version.
///
/// ```
/// use route_patcher::config::version::matches_requirement;
///
/// assert!(matches_requirement("0.1.0", Some(">=0.1.0")).unwrap());
/// assert!(!matches_requirement("0.2.0", Some("~0.1")).unwrap());
/// assert!(matches_requirement("15.0.0", None).unwrap());
/// ```
pub fn matches_requirement(
    version: &str,
    requirement: Option<&str>,
) -> Result<bool, VersionError> {
    let Some(requirement) = requirement.map(str::trim).filter(|req| !req.is_empty()) else {
        return Ok(true);
    };

    let trimmed = version.trim();
    let parsed = Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed)).map_err(|e| {
        VersionError::InvalidVersion {
            value: version.to_string(),
            source: e.to_string(),
        }
    })?;

    let req = VersionReq::parse(requirement).map_err(|e| VersionError::InvalidRequirement {
        value: requirement.to_string(),
        source: e.to_string(),
    })?;

    Ok(req.matches(&parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_or_blank_requirement_accepts_all() {
        assert!(matches_requirement("0.1.0", None).unwrap());
        assert!(matches_requirement("not even a version", None).unwrap());
        assert!(matches_requirement("0.1.0", Some("  ")).unwrap());
    }

    #[test]
    fn bounded_range() {
        let req = Some(">=0.1.0, <0.3.0");
        assert!(matches_requirement("0.1.0", req).unwrap());
        assert!(matches_requirement("0.2.9", req).unwrap());
        assert!(!matches_requirement("0.3.0", req).unwrap());
        assert!(!matches_requirement("0.0.9", req).unwrap());
    }

    #[test]
    fn leading_v_is_accepted() {
        assert!(matches_requirement("v1.4.0", Some("^1.2")).unwrap());
    }

    #[test]
    fn prerelease_needs_matching_prerelease_bound() {
        assert!(!matches_requirement("1.0.0-beta.1", Some(">=0.9.0")).unwrap());
        assert!(matches_requirement("1.0.0-beta.2", Some(">=1.0.0-beta.1")).unwrap());
    }

    #[test]
    fn parse_failures_are_distinguished() {
        assert!(matches!(
            matches_requirement("latest", Some(">=1.0.0")),
            Err(VersionError::InvalidVersion { .. })
        ));
        assert!(matches!(
            matches_requirement("1.0.0", Some(">=one")),
            Err(VersionError::InvalidRequirement { .. })
        ));
    }
}
