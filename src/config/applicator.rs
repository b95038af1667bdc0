//! Patch applicator - the idempotent patcher.
//!
//! Every target goes through the same steps:
//! - a missing file is reported `NotFound`, nothing is created
//! - a file already containing the marker is `AlreadyApplied` and left byte-for-byte
//!   intact, unless a `relocate` still finds stale statements to delete
//! - the anchor is searched; no match is `Unmatched` and the file is not rewritten
//! - the snippet is inserted at the end of each selected anchor, stale
//!   statements are deleted for `relocate`
//! - the result is written atomically, one write per file, through symlinks
//!
//! Targets sharing a file are planned against the same original content and
//! written together. No target failure stops the run.

use crate::anchor::{lang_for_path, AnchorError, AnchorLocator, AnchorMatch, SupportLang};
use crate::config::schema::{Occurrences, Operation, PatchConfig, PatchDefinition};
use crate::config::version::{matches_requirement, VersionError};
use crate::edit::{self, Edit};
use crate::safety::{SafetyError, WorkspaceGuard};
use crate::syntax::{self, SyntaxCheckError};
use log::{debug, info};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult should be checked for success/failure"]
pub enum PatchResult {
    /// Snippet inserted (or, in a read-only check, would be)
    Applied { file: PathBuf },
    /// Marker already present
    AlreadyApplied { file: PathBuf },
    /// Target path is not a file
    NotFound { file: PathBuf },
    /// Anchor not found; file left untouched
    Unmatched { file: PathBuf },
    /// Patch set's version_range excludes the project
    SkippedVersion { reason: String },
}

impl PatchResult {
    pub fn status_word(&self) -> &'static str {
        match self {
            PatchResult::Applied { .. } => "patched",
            PatchResult::AlreadyApplied { .. } => "already patched",
            PatchResult::NotFound { .. } => "not found",
            PatchResult::Unmatched { .. } => "unmatched",
            PatchResult::SkippedVersion { .. } => "skipped",
        }
    }

    pub fn file(&self) -> Option<&Path> {
        match self {
            PatchResult::Applied { file }
            | PatchResult::AlreadyApplied { file }
            | PatchResult::NotFound { file }
            | PatchResult::Unmatched { file } => Some(file),
            PatchResult::SkippedVersion { .. } => None,
        }
    }
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::SkippedVersion { reason } => write!(f, "skipped: {}", reason),
            other => {
                let file = other.file().map(Path::display);
                match file {
                    Some(file) => write!(f, "{} {}", file, other.status_word()),
                    None => write!(f, "{}", other.status_word()),
                }
            }
        }
    }
}

/// Errors during patch application
#[derive(Debug)]
pub enum ApplicationError {
    Version(VersionError),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Safety(SafetyError),
    Anchor(AnchorError),
    /// Anchor matched several blocks under `occurrences = "unique"`
    AmbiguousMatch { file: PathBuf, count: usize },
    Syntax {
        file: PathBuf,
        source: SyntaxCheckError,
    },
    /// Splicing or writing the file failed
    Edit { file: PathBuf, reason: String },
}

impl Clone for ApplicationError {
    fn clone(&self) -> Self {
        match self {
            ApplicationError::Version(e) => ApplicationError::Version(e.clone()),
            ApplicationError::Io { path, source } => ApplicationError::Io {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            ApplicationError::Safety(e) => ApplicationError::Safety(e.clone()),
            ApplicationError::Anchor(e) => ApplicationError::Anchor(e.clone()),
            ApplicationError::AmbiguousMatch { file, count } => ApplicationError::AmbiguousMatch {
                file: file.clone(),
                count: *count,
            },
            ApplicationError::Syntax { file, source } => ApplicationError::Syntax {
                file: file.clone(),
                source: source.clone(),
            },
            ApplicationError::Edit { file, reason } => ApplicationError::Edit {
                file: file.clone(),
                reason: reason.clone(),
            },
        }
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::Version(e) => write!(f, "version error: {}", e),
            ApplicationError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            ApplicationError::Safety(e) => write!(f, "unsafe target: {}", e),
            ApplicationError::Anchor(e) => write!(f, "anchor error: {}", e),
            ApplicationError::AmbiguousMatch { file, count } => write!(
                f,
                "ambiguous anchor in {} ({} matches, expected 1)",
                file.display(),
                count
            ),
            ApplicationError::Syntax { file, source } => {
                write!(f, "{} rejected: {}", file.display(), source)
            }
            ApplicationError::Edit { file, reason } => {
                write!(f, "edit failed on {}: {}", file.display(), reason)
            }
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Version(e) => Some(e),
            ApplicationError::Io { source, .. } => Some(source),
            ApplicationError::Safety(e) => Some(e),
            ApplicationError::Anchor(e) => Some(e),
            ApplicationError::Syntax { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<VersionError> for ApplicationError {
    fn from(e: VersionError) -> Self {
        ApplicationError::Version(e)
    }
}

impl From<AnchorError> for ApplicationError {
    fn from(e: AnchorError) -> Self {
        ApplicationError::Anchor(e)
    }
}

/// Run-wide switches layered over the patch set's own metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Reject patches that add syntax errors, even if the set does not ask to
    pub check_syntax: bool,
}

/// Before/after text of one file a run would change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePreview {
    pub file: PathBuf,
    pub before: String,
    pub after: String,
}

pub type PatchOutcome = (String, Result<PatchResult, ApplicationError>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Write,
    Check,
}

/// Apply a patch set to a workspace.
///
/// Returns one `(patch id, result)` per definition, in definition order.
pub fn apply_patches(
    config: &PatchConfig,
    workspace_root: &Path,
    workspace_version: &str,
    options: ApplyOptions,
) -> Vec<PatchOutcome> {
    run(
        config,
        workspace_root,
        workspace_version,
        options,
        Mode::Write,
        None,
    )
}

/// Read-only twin of [`apply_patches`]: `Applied` means "would patch".
pub fn check_patches(
    config: &PatchConfig,
    workspace_root: &Path,
    workspace_version: &str,
    options: ApplyOptions,
) -> Vec<PatchOutcome> {
    run(
        config,
        workspace_root,
        workspace_version,
        options,
        Mode::Check,
        None,
    )
}

/// Patched text of every file a run would change, without writing anything.
pub fn preview_patches(
    config: &PatchConfig,
    workspace_root: &Path,
    workspace_version: &str,
    options: ApplyOptions,
) -> Vec<FilePreview> {
    let mut previews = Vec::new();
    let _ = run(
        config,
        workspace_root,
        workspace_version,
        options,
        Mode::Check,
        Some(&mut previews),
    );
    previews
}

fn run(
    config: &PatchConfig,
    workspace_root: &Path,
    workspace_version: &str,
    options: ApplyOptions,
    mode: Mode,
    previews: Option<&mut Vec<FilePreview>>,
) -> Vec<PatchOutcome> {
    let range = config.meta.version_range.as_deref();
    match matches_requirement(workspace_version, range) {
        Ok(true) => {}
        Ok(false) => {
            let reason = format!(
                "project version {} does not satisfy version_range {}",
                workspace_version,
                range.unwrap_or("").trim()
            );
            return every_patch(config, Ok(PatchResult::SkippedVersion { reason }));
        }
        Err(e) => return every_patch(config, Err(ApplicationError::Version(e))),
    }

    let guard = match WorkspaceGuard::new(workspace_root) {
        Ok(guard) => guard,
        Err(e) => return every_patch(config, Err(ApplicationError::Safety(e))),
    };

    let check_syntax = options.check_syntax || config.meta.check_syntax;
    run_batched(config, &guard, check_syntax, mode, previews)
}

fn every_patch(
    config: &PatchConfig,
    result: Result<PatchResult, ApplicationError>,
) -> Vec<PatchOutcome> {
    config
        .patches
        .iter()
        .map(|patch| (patch.id.clone(), result.clone()))
        .collect()
}

type Indexed<'a> = (usize, &'a PatchDefinition);

fn run_batched(
    config: &PatchConfig,
    guard: &WorkspaceGuard,
    check_syntax: bool,
    mode: Mode,
    mut previews: Option<&mut Vec<FilePreview>>,
) -> Vec<PatchOutcome> {
    // Group by resolved path, keeping first-seen order
    let mut groups: Vec<(PathBuf, Vec<Indexed<'_>>)> = Vec::new();
    let mut slots: HashMap<PathBuf, usize> = HashMap::new();

    for (idx, patch) in config.patches.iter().enumerate() {
        let path = config.resolve_file(patch, guard.workspace_root());
        let slot = *slots.entry(path.clone()).or_insert_with(|| {
            groups.push((path, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push((idx, patch));
    }

    let mut results: Vec<(usize, Result<PatchResult, ApplicationError>)> = Vec::new();

    for (file_path, patches) in &groups {
        let file_results = process_file(
            file_path,
            patches,
            guard,
            check_syntax,
            mode,
            previews.as_deref_mut(),
        );
        results.extend(file_results);
    }

    results.sort_by_key(|(idx, _)| *idx);
    results
        .into_iter()
        .map(|(idx, result)| (config.patches[idx].id.clone(), result))
        .collect()
}

fn same_for_all(
    patches: &[Indexed<'_>],
    result: Result<PatchResult, ApplicationError>,
) -> Vec<(usize, Result<PatchResult, ApplicationError>)> {
    patches
        .iter()
        .map(|(idx, _)| (*idx, result.clone()))
        .collect()
}

enum Plan {
    AlreadyApplied,
    Unmatched,
    Edits(Vec<Edit>),
}

fn process_file(
    file_path: &Path,
    patches: &[Indexed<'_>],
    guard: &WorkspaceGuard,
    check_syntax: bool,
    mode: Mode,
    previews: Option<&mut Vec<FilePreview>>,
) -> Vec<(usize, Result<PatchResult, ApplicationError>)> {
    if !file_path.is_file() {
        debug!("{} does not exist, skipping", file_path.display());
        return same_for_all(
            patches,
            Ok(PatchResult::NotFound {
                file: file_path.to_path_buf(),
            }),
        );
    }

    // Reads and writes go to the canonical path so a symlinked route stays a symlink
    let target = match guard.validate_path(file_path) {
        Ok(target) => target,
        Err(e) => return same_for_all(patches, Err(ApplicationError::Safety(e))),
    };

    let content = match fs::read_to_string(&target) {
        Ok(content) => content,
        Err(source) => {
            return same_for_all(
                patches,
                Err(ApplicationError::Io {
                    path: target,
                    source,
                }),
            )
        }
    };

    let lang = lang_for_path(file_path);
    let mut results = Vec::with_capacity(patches.len());
    let mut editing: Vec<usize> = Vec::new();
    let mut edits: Vec<Edit> = Vec::new();

    for (idx, patch) in patches {
        match plan_patch(patch, &target, &content, lang) {
            Ok(Plan::AlreadyApplied) => results.push((
                *idx,
                Ok(PatchResult::AlreadyApplied {
                    file: file_path.to_path_buf(),
                }),
            )),
            Ok(Plan::Unmatched) => results.push((
                *idx,
                Ok(PatchResult::Unmatched {
                    file: file_path.to_path_buf(),
                }),
            )),
            Ok(Plan::Edits(patch_edits)) => {
                editing.push(*idx);
                edits.extend(patch_edits);
            }
            Err(e) => results.push((*idx, Err(e))),
        }
    }

    if edits.is_empty() {
        return results;
    }

    let outcome = finish_file(file_path, &content, edits, lang, check_syntax, mode, previews);
    results.extend(editing.into_iter().map(|idx| (idx, outcome.clone())));
    results
}

/// Splice, optionally syntax-check, then write (or just preview) one file.
fn finish_file(
    file_path: &Path,
    content: &str,
    edits: Vec<Edit>,
    lang: SupportLang,
    check_syntax: bool,
    mode: Mode,
    previews: Option<&mut Vec<FilePreview>>,
) -> Result<PatchResult, ApplicationError> {
    let patched = edit::splice(content, &edits).map_err(|e| ApplicationError::Edit {
        file: file_path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if check_syntax {
        syntax::check_no_regression(content, &patched, lang).map_err(|source| {
            ApplicationError::Syntax {
                file: file_path.to_path_buf(),
                source,
            }
        })?;
    }

    if let Some(previews) = previews {
        previews.push(FilePreview {
            file: file_path.to_path_buf(),
            before: content.to_string(),
            after: patched,
        });
    }

    if mode == Mode::Write {
        let count = edits.len();
        Edit::apply_batch(edits).map_err(|e| ApplicationError::Edit {
            file: file_path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!("patched {} ({} edits)", file_path.display(), count);
    }

    Ok(PatchResult::Applied {
        file: file_path.to_path_buf(),
    })
}

/// Decide what one patch does to `content`, without touching the file.
fn plan_patch(
    patch: &PatchDefinition,
    file_path: &Path,
    content: &str,
    lang: SupportLang,
) -> Result<Plan, ApplicationError> {
    let marker = patch.effective_marker();
    let removals = stale_removals(patch, file_path, content, marker)?;

    if content.contains(marker) {
        debug!("{}: marker present in {}", patch.id, file_path.display());
        if removals.is_empty() {
            return Ok(Plan::AlreadyApplied);
        }
        debug!(
            "{}: removing {} leftover stale statement(s)",
            patch.id,
            removals.len()
        );
        return Ok(Plan::Edits(removals));
    }

    let locator = AnchorLocator::compile(&patch.anchor)?;
    let matches = locator.find_all(content, lang)?;
    debug!(
        "{}: {} anchor match(es) in {}",
        patch.id,
        matches.len(),
        file_path.display()
    );

    let selected: &[AnchorMatch] = match (matches.len(), patch.occurrences) {
        (0, _) => return Ok(Plan::Unmatched),
        (1, _) | (_, Occurrences::All) => &matches,
        (_, Occurrences::First) => &matches[..1],
        (count, Occurrences::Unique) => {
            return Err(ApplicationError::AmbiguousMatch {
                file: file_path.to_path_buf(),
                count,
            })
        }
    };

    let text = patch.operation.text();
    let mut edits: Vec<Edit> = selected
        .iter()
        .map(|m| Edit::insertion(file_path, m.insert_at, text))
        .collect();

    if !removals.is_empty() {
        debug!(
            "{}: removing {} stale statement(s)",
            patch.id,
            removals.len()
        );
    }
    edits.extend(removals);

    Ok(Plan::Edits(edits))
}

/// Deletions for a relocate's stale statements.
///
/// Matches inside an occurrence of the marker are the relocated statement
/// itself and are kept.
fn stale_removals(
    patch: &PatchDefinition,
    file_path: &Path,
    content: &str,
    marker: &str,
) -> Result<Vec<Edit>, ApplicationError> {
    let Operation::Relocate { remove, .. } = &patch.operation else {
        return Ok(Vec::new());
    };

    let stale = Regex::new(remove).map_err(|source| AnchorError::InvalidRegex {
        pattern: remove.clone(),
        source,
    })?;
    let relocated: Vec<(usize, usize)> = content
        .match_indices(marker)
        .map(|(at, found)| (at, at + found.len()))
        .collect();

    Ok(stale
        .find_iter(content)
        .filter(|m| !m.is_empty())
        .filter(|m| {
            !relocated
                .iter()
                .any(|&(start, end)| m.start() < end && start < m.end())
        })
        .map(|m| Edit::deletion(file_path, m.start(), m.end(), m.as_str()))
        .collect())
}
