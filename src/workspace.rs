//! Locating the target web project and reading its version.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the project root.
pub const WORKSPACE_ENV: &str = "ROUTE_PATCHER_WORKSPACE";

const MANIFEST: &str = "package.json";

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} has no version field")]
    MissingVersion { path: PathBuf },
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    version: Option<String>,
}

/// Nearest ancestor of `start` (inclusive) holding a `package.json`.
pub fn detect_from(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(MANIFEST).is_file())
        .map(Path::to_path_buf)
}

/// The `version` field of `<root>/package.json`.
pub fn read_package_version(root: &Path) -> Result<String, WorkspaceError> {
    let path = root.join(MANIFEST);
    let raw = fs::read_to_string(&path).map_err(|source| WorkspaceError::Io {
        path: path.clone(),
        source,
    })?;
    let manifest: PackageManifest =
        serde_json::from_str(&raw).map_err(|source| WorkspaceError::Json {
            path: path.clone(),
            source,
        })?;

    manifest
        .version
        .filter(|version| !version.trim().is_empty())
        .ok_or(WorkspaceError::MissingVersion { path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_walks_up_to_package_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST), r#"{"name":"site"}"#).unwrap();
        let nested = dir.path().join("src/app/api/chat");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(detect_from(&nested), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn reads_version() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(MANIFEST),
            r#"{"name":"portfolio","version":"0.1.0","private":true}"#,
        )
        .unwrap();

        assert_eq!(read_package_version(dir.path()).unwrap(), "0.1.0");
    }

    #[test]
    fn missing_or_broken_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_package_version(dir.path()),
            Err(WorkspaceError::Io { .. })
        ));

        fs::write(dir.path().join(MANIFEST), "{ not json").unwrap();
        assert!(matches!(
            read_package_version(dir.path()),
            Err(WorkspaceError::Json { .. })
        ));

        fs::write(dir.path().join(MANIFEST), r#"{"name":"site"}"#).unwrap();
        assert!(matches!(
            read_package_version(dir.path()),
            Err(WorkspaceError::MissingVersion { .. })
        ));
    }
}
