use crate::anchor::AnchorLocator;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// A patch set: metadata plus an ordered list of targets.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

impl PatchConfig {
    /// Collect every problem in the set instead of stopping at the first.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        let mut seen = HashSet::new();

        for patch in &self.patches {
            let patch_id = (!patch.id.trim().is_empty()).then(|| patch.id.clone());

            if patch_id.is_none() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
            } else if !seen.insert(patch.id.as_str()) {
                issues.push(ValidationIssue::DuplicateId {
                    patch_id: patch.id.clone(),
                });
            }

            if patch.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: patch_id.clone(),
                    field: "file",
                });
            }

            if let Some(marker) = &patch.marker {
                if marker.trim().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        patch_id: patch_id.clone(),
                        field: "marker",
                    });
                }
            }

            if let Err(err) = AnchorLocator::compile(&patch.anchor) {
                issues.push(ValidationIssue::InvalidPattern {
                    patch_id: patch_id.clone(),
                    field: patch.anchor.pattern_field(),
                    message: err.to_string(),
                });
            }

            if patch.operation.text().trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: patch_id.clone(),
                    field: "operation.text",
                });
            }

            if let Operation::Relocate { remove, .. } = &patch.operation {
                if remove.trim().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        patch_id: patch_id.clone(),
                        field: "operation.remove",
                    });
                } else if let Err(err) = regex::Regex::new(remove) {
                    issues.push(ValidationIssue::InvalidPattern {
                        patch_id: patch_id.clone(),
                        field: "operation.remove",
                        message: err.to_string(),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Where `patch` lives on disk for a given workspace.
    ///
    /// With `workspace_relative = false` a relative `file` is taken from the
    /// current directory, so the existence check and the workspace guard see
    /// the same path.
    pub fn resolve_file(&self, patch: &PatchDefinition, workspace_root: &Path) -> PathBuf {
        if self.meta.workspace_relative {
            workspace_root.join(&patch.file)
        } else {
            let file = Path::new(&patch.file);
            std::path::absolute(file).unwrap_or_else(|_| file.to_path_buf())
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// semver requirement checked against the project's package.json version
    #[serde(default)]
    pub version_range: Option<String>,
    #[serde(default = "default_true")]
    pub workspace_relative: bool,
    /// Refuse patches that add syntax errors to the target
    #[serde(default)]
    pub check_syntax: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            version_range: None,
            workspace_relative: true,
            check_syntax: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    pub file: String,
    /// Substring whose presence means "already patched"
    #[serde(default)]
    pub marker: Option<String>,
    #[serde(default)]
    pub occurrences: Occurrences,
    pub anchor: Anchor,
    pub operation: Operation,
}

impl PatchDefinition {
    /// The explicit marker, or the inserted snippet without surrounding whitespace.
    pub fn effective_marker(&self) -> &str {
        match &self.marker {
            Some(marker) => marker.as_str(),
            None => self.operation.text().trim(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Anchor {
    /// Raw regex; capture group 1, when present, ends at the insertion point
    Regex { pattern: String },
    /// `if (<condition>) { ... }` block bounded by its first `}`
    Guard {
        condition: String,
        #[serde(default)]
        contains: Option<String>,
    },
    /// Structural ast-grep pattern
    AstGrep { pattern: String },
}

impl Anchor {
    fn pattern_field(&self) -> &'static str {
        match self {
            Anchor::Regex { .. } | Anchor::AstGrep { .. } => "anchor.pattern",
            Anchor::Guard { .. } => "anchor.condition",
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Operation {
    /// Re-emit the anchor followed by `text`
    InsertAfter { text: String },
    /// Delete every match of `remove`, then insert `text` after the anchor
    Relocate { text: String, remove: String },
}

impl Operation {
    pub fn text(&self) -> &str {
        match self {
            Operation::InsertAfter { text } | Operation::Relocate { text, .. } => text,
        }
    }
}

/// What to do when an anchor matches more than once.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Occurrences {
    /// More than one match is an error
    #[default]
    Unique,
    First,
    All,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    DuplicateId {
        patch_id: String,
    },
    InvalidPattern {
        patch_id: Option<String>,
        field: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch set contains no patches"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::DuplicateId { patch_id } => {
                write!(f, "patch id '{patch_id}' is used more than once")
            }
            ValidationIssue::InvalidPattern {
                patch_id,
                field,
                message,
            } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid '{field}': {message}"),
                None => write!(f, "patch has invalid '{field}': {message}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(id: &str) -> PatchDefinition {
        PatchDefinition {
            id: id.to_string(),
            file: "src/app/api/chat/route.ts".to_string(),
            marker: None,
            occurrences: Occurrences::default(),
            anchor: Anchor::Guard {
                condition: "!process.env.OPENAI_API_KEY".to_string(),
                contains: None,
            },
            operation: Operation::InsertAfter {
                text: "\n    const openai = new OpenAI();\n".to_string(),
            },
        }
    }

    #[test]
    fn effective_marker_defaults_to_trimmed_text() {
        let mut patch = definition("chat");
        assert_eq!(patch.effective_marker(), "const openai = new OpenAI();");

        patch.marker = Some("new OpenAI(".to_string());
        assert_eq!(patch.effective_marker(), "new OpenAI(");
    }

    #[test]
    fn validate_reports_every_issue() {
        let mut bad = definition("chat");
        bad.anchor = Anchor::Regex {
            pattern: "(open".to_string(),
        };
        bad.operation = Operation::Relocate {
            text: "   ".to_string(),
            remove: String::new(),
        };

        let config = PatchConfig {
            meta: Metadata::default(),
            patches: vec![definition("dup"), definition("dup"), bad],
        };

        let err = config.validate().unwrap_err();
        assert_eq!(err.issues.len(), 4);
        let rendered = err.to_string();
        assert!(rendered.contains("'dup' is used more than once"));
        assert!(rendered.contains("anchor.pattern"));
        assert!(rendered.contains("operation.text"));
        assert!(rendered.contains("operation.remove"));
    }

    #[test]
    fn empty_set_is_invalid() {
        let err = PatchConfig::default().validate().unwrap_err();
        assert!(matches!(err.issues[0], ValidationIssue::EmptyPatchList));
    }

    #[test]
    fn resolve_file_respects_workspace_relative() {
        let mut config = PatchConfig {
            meta: Metadata::default(),
            patches: vec![definition("chat")],
        };
        let root = Path::new("/srv/site");

        assert_eq!(
            config.resolve_file(&config.patches[0], root),
            PathBuf::from("/srv/site/src/app/api/chat/route.ts")
        );

        config.meta.workspace_relative = false;
        let resolved = config.resolve_file(&config.patches[0], root);
        assert!(resolved.is_absolute());
        assert_eq!(
            resolved,
            std::env::current_dir()
                .unwrap()
                .join("src/app/api/chat/route.ts")
        );
    }

    #[test]
    fn validate_rejects_multi_statement_ast_grep_pattern() {
        let mut bad = definition("chat");
        bad.anchor = Anchor::AstGrep {
            pattern: "foo(); bar();".to_string(),
        };
        let config = PatchConfig {
            meta: Metadata::default(),
            patches: vec![bad],
        };

        let err = config.validate().unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert!(matches!(
            &err.issues[0],
            ValidationIssue::InvalidPattern { field: "anchor.pattern", .. }
        ));
    }
}
