use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directories inside a web project that are never patch targets: installed
/// packages, build output and VCS metadata.
pub const FORBIDDEN_DIRS: &[&str] = &["node_modules", ".next", ".git"];

/// Keeps patch targets inside the project and out of generated directories.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    workspace_root: PathBuf,
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl Clone for SafetyError {
    fn clone(&self) -> Self {
        match self {
            SafetyError::OutsideWorkspace { path, workspace } => SafetyError::OutsideWorkspace {
                path: path.clone(),
                workspace: workspace.clone(),
            },
            SafetyError::ForbiddenPath { path, forbidden } => SafetyError::ForbiddenPath {
                path: path.clone(),
                forbidden: forbidden.clone(),
            },
            SafetyError::Canonicalize(e) => {
                SafetyError::Canonicalize(std::io::Error::new(e.kind(), e.to_string()))
            }
        }
    }
}

impl WorkspaceGuard {
    /// Guard rooted at `workspace_root`, which must exist.
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let workspace_root = workspace_root.as_ref().canonicalize()?;
        let forbidden_paths = FORBIDDEN_DIRS
            .iter()
            .map(|dir| workspace_root.join(dir))
            .collect();

        Ok(Self {
            workspace_root,
            forbidden_paths,
        })
    }

    /// Canonical absolute path of `path` if it is safe to patch.
    ///
    /// Relative paths resolve against the workspace root. Symlinks are
    /// followed, so a link escaping the workspace is rejected.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };

        let canonical = absolute.canonicalize()?;

        if !canonical.starts_with(&self.workspace_root) {
            return Err(SafetyError::OutsideWorkspace {
                path: canonical,
                workspace: self.workspace_root.clone(),
            });
        }

        if let Some(forbidden) = self
            .forbidden_paths
            .iter()
            .find(|forbidden| canonical.starts_with(forbidden))
        {
            return Err(SafetyError::ForbiddenPath {
                path: canonical.clone(),
                forbidden: forbidden.clone(),
            });
        }

        Ok(canonical)
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn route_inside_workspace_is_allowed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let guard = WorkspaceGuard::new(temp_dir.path()).unwrap();

        let route = temp_dir.path().join("src/app/api/chat/route.ts");
        touch(&route);

        assert!(guard.validate_path(&route).is_ok());
        assert!(guard.validate_path("src/app/api/chat/route.ts").is_ok());
    }

    #[test]
    fn file_outside_workspace_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = temp_dir.path().join("site");
        fs::create_dir_all(&workspace).unwrap();
        let guard = WorkspaceGuard::new(&workspace).unwrap();

        let outside = temp_dir.path().join("route.ts");
        touch(&outside);

        assert!(matches!(
            guard.validate_path(&outside),
            Err(SafetyError::OutsideWorkspace { .. })
        ));
        assert!(matches!(
            guard.validate_path("../route.ts"),
            Err(SafetyError::OutsideWorkspace { .. })
        ));
    }

    #[test]
    fn generated_directories_are_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let guard = WorkspaceGuard::new(temp_dir.path()).unwrap();

        for rel in [
            "node_modules/openai/index.ts",
            ".next/server/app/api/chat/route.js",
        ] {
            touch(&temp_dir.path().join(rel));
            assert!(
                matches!(
                    guard.validate_path(rel),
                    Err(SafetyError::ForbiddenPath { .. })
                ),
                "{rel} should be forbidden"
            );
        }
    }

    #[test]
    fn missing_file_fails_canonicalize() {
        let temp_dir = tempfile::tempdir().unwrap();
        let guard = WorkspaceGuard::new(temp_dir.path()).unwrap();

        assert!(matches!(
            guard.validate_path("src/missing.ts"),
            Err(SafetyError::Canonicalize(_))
        ));
    }

    #[test]
    #[cfg(unix)]
    fn symlink_escape_is_rejected() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = temp_dir.path().join("site");
        fs::create_dir_all(&workspace).unwrap();

        let outside = temp_dir.path().join("outside.ts");
        touch(&outside);
        symlink(&outside, workspace.join("escape.ts")).unwrap();

        let guard = WorkspaceGuard::new(&workspace).unwrap();
        assert!(matches!(
            guard.validate_path("escape.ts"),
            Err(SafetyError::OutsideWorkspace { .. })
        ));
    }
}
