use std::cmp::Ordering;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Spans above this size are verified by xxh3 hash instead of a text copy.
const HASH_THRESHOLD: usize = 1024;

/// A verified byte-span replacement.
///
/// Every patch the applicator plans ends up as one or more of these: a
/// zero-width insertion of the snippet at the end of an anchor, or a stale
/// statement replaced by nothing. The span's current text is checked against `expected_before`
/// right before the write, so a file that changed after it was planned is
/// rejected instead of clobbered.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until applied with apply_batch()"]
pub struct Edit {
    /// Path to the file to edit
    pub file: PathBuf,
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// Text written over [byte_start, byte_end)
    pub new_text: String,
    /// What the span must contain when the edit is applied
    pub expected_before: EditVerification,
}

/// How the before-text of an edit is verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    ExactMatch(String),
    /// xxh3 of the expected text
    Hash(u64),
}

impl EditVerification {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected) => xxh3_64(text.as_bytes()) == *expected,
        }
    }

    /// Exact match for short spans, hash above 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > HASH_THRESHOLD {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("Before-text verification failed at {file}:{byte_start}")]
    BeforeTextMismatch {
        file: PathBuf,
        byte_start: usize,
        byte_end: usize,
        expected: String,
        found: String,
    },

    #[error("Invalid byte range: [{byte_start}, {byte_end}) in file of length {file_len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        file_len: usize,
    },

    #[error("Overlapping edits at [{byte_start}, {byte_end}) in {file}")]
    Overlap {
        file: PathBuf,
        byte_start: usize,
        byte_end: usize,
    },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 validation error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Invalid edit would create malformed UTF-8")]
    InvalidUtf8Edit,
}

/// Result of applying an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "EditResult should be checked for success/already-applied"]
pub enum EditResult {
    Applied { file: PathBuf, bytes_changed: usize },
    /// The span already held `new_text`
    AlreadyApplied { file: PathBuf },
}

impl Edit {
    /// Create an edit whose verification is derived from `expected_before`.
    pub fn new(
        file: impl Into<PathBuf>,
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: impl Into<String>,
    ) -> Self {
        let expected = expected_before.into();
        Self {
            file: file.into(),
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(&expected),
        }
    }

    /// Insert `text` at `offset` without replacing anything.
    pub fn insertion(file: impl Into<PathBuf>, offset: usize, text: impl Into<String>) -> Self {
        Self::new(file, offset, offset, text, "")
    }

    /// Delete [byte_start, byte_end), which must currently hold `current`.
    pub fn deletion(
        file: impl Into<PathBuf>,
        byte_start: usize,
        byte_end: usize,
        current: impl Into<String>,
    ) -> Self {
        Self::new(file, byte_start, byte_end, String::new(), current)
    }

    /// Check the edit against `content` and return the text currently in the span.
    fn validate<'a>(&self, content: &'a [u8]) -> Result<&'a str, EditError> {
        if self.byte_start > self.byte_end || self.byte_end > content.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                file_len: content.len(),
            });
        }

        let current = std::str::from_utf8(&content[self.byte_start..self.byte_end])?;

        if current == self.new_text {
            return Ok(current);
        }

        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                file: self.file.clone(),
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                expected: format!("{:?}", self.expected_before),
                found: current.to_string(),
            });
        }

        Ok(current)
    }

    /// Apply edits grouped per file, one atomic write per file.
    ///
    /// Results come back ordered by file, then by descending `byte_start`.
    pub fn apply_batch(mut edits: Vec<Edit>) -> Result<Vec<EditResult>, EditError> {
        sort_for_splice(&mut edits);

        let mut results = Vec::with_capacity(edits.len());
        let mut start = 0;
        while start < edits.len() {
            let file = &edits[start].file;
            let len = edits[start..]
                .iter()
                .take_while(|edit| &edit.file == file)
                .count();
            results.extend(apply_file_edits(&edits[start..start + len])?);
            start += len;
        }

        Ok(results)
    }
}

/// Apply `edits` to in-memory `content` and return the new text.
///
/// Used for previews and dry runs. The edits' `file` fields are ignored.
pub fn splice(content: &str, edits: &[Edit]) -> Result<String, EditError> {
    let mut sorted = edits.to_vec();
    sorted.reverse();
    sorted.sort_by(bottom_up);
    let (bytes, _) = splice_sorted(content.as_bytes(), &sorted)?;
    String::from_utf8(bytes).map_err(|_| EditError::InvalidUtf8Edit)
}

/// Bottom-to-top order. Ties on `byte_start` put the wider span first so a
/// deletion and an insertion at the same offset do not register as
/// overlapping.
fn bottom_up(a: &Edit, b: &Edit) -> Ordering {
    b.byte_start
        .cmp(&a.byte_start)
        .then(b.byte_end.cmp(&a.byte_end))
}

/// Order edits by file, then bottom-to-top.
///
/// The sort is stable over the reversed input, so edits with identical spans
/// are spliced last-first and their text ends up in input order.
fn sort_for_splice(edits: &mut [Edit]) {
    edits.reverse();
    edits.sort_by(|a, b| a.file.cmp(&b.file).then_with(|| bottom_up(a, b)));
}

/// Assumes edits target one file and are sorted by `sort_for_splice`.
fn splice_sorted(
    original: &[u8],
    edits: &[Edit],
) -> Result<(Vec<u8>, Vec<EditResult>), EditError> {
    for edit in edits {
        edit.validate(original)?;
    }

    for window in edits.windows(2) {
        let (later, earlier) = (&window[0], &window[1]);
        if earlier.byte_end > later.byte_start {
            return Err(EditError::Overlap {
                file: later.file.clone(),
                byte_start: earlier.byte_start,
                byte_end: later.byte_end,
            });
        }
    }

    let mut content = original.to_vec();
    let mut results = Vec::with_capacity(edits.len());

    for edit in edits {
        let current = std::str::from_utf8(&content[edit.byte_start..edit.byte_end])?;
        if current == edit.new_text {
            results.push(EditResult::AlreadyApplied {
                file: edit.file.clone(),
            });
            continue;
        }

        content.splice(
            edit.byte_start..edit.byte_end,
            edit.new_text.as_bytes().iter().copied(),
        );
        results.push(EditResult::Applied {
            file: edit.file.clone(),
            bytes_changed: edit.new_text.len(),
        });
    }

    std::str::from_utf8(&content).map_err(|_| EditError::InvalidUtf8Edit)?;

    Ok((content, results))
}

fn apply_file_edits(edits: &[Edit]) -> Result<Vec<EditResult>, EditError> {
    let Some(first) = edits.first() else {
        return Ok(Vec::new());
    };
    let file = &first.file;

    let original = fs::read(file)?;
    let (content, results) = splice_sorted(&original, edits)?;

    if content == original {
        return Ok(results);
    }

    atomic_write(file, &content)?;

    // Bump mtime so file watchers (next dev, tsc --watch) pick the change up
    filetime::set_file_mtime(file, filetime::FileTime::now())?;

    Ok(results)
}

/// Write through a sibling tempfile, fsync, then rename over `path`.
fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    let parent = path.parent().ok_or_else(|| {
        EditError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path has no parent directory",
        ))
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_exact_and_hash() {
        let exact = EditVerification::ExactMatch("guard".to_string());
        assert!(exact.matches("guard"));
        assert!(!exact.matches("guards"));

        let hashed = EditVerification::Hash(xxh3_64(b"guard"));
        assert!(hashed.matches("guard"));
        assert!(!hashed.matches("other"));
    }

    #[test]
    fn test_verification_switches_to_hash_for_large_spans() {
        assert!(matches!(
            EditVerification::from_text("short"),
            EditVerification::ExactMatch(_)
        ));
        assert!(matches!(
            EditVerification::from_text(&"x".repeat(2000)),
            EditVerification::Hash(_)
        ));
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let content = b"if (!KEY) { return; }";
        let past_end = Edit::new("route.ts", 5, 40, "x", "");
        assert!(matches!(
            past_end.validate(content),
            Err(EditError::InvalidByteRange { .. })
        ));

        let inverted = Edit::new("route.ts", 10, 5, "x", "");
        assert!(matches!(
            inverted.validate(content),
            Err(EditError::InvalidByteRange { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_changed_before_text() {
        let edit = Edit::deletion("route.ts", 0, 5, "const");
        let result = edit.validate(b"let x = 1;");
        assert!(matches!(result, Err(EditError::BeforeTextMismatch { .. })));
    }

    #[test]
    fn test_splice_insertion_and_deletion() {
        let content = "const a = 1;\nif (!KEY) {\n  return;\n}\nrest();\n";
        let edits = vec![
            Edit::deletion("route.ts", 0, 13, "const a = 1;\n"),
            Edit::insertion("route.ts", 37, "init();\n"),
        ];

        let spliced = splice(content, &edits).unwrap();
        assert_eq!(spliced, "if (!KEY) {\n  return;\n}\ninit();\nrest();\n");
    }

    #[test]
    fn test_splice_deletion_and_insertion_at_same_offset() {
        let content = "abcdef";
        let edits = vec![
            Edit::insertion("f", 2, "XY"),
            Edit::deletion("f", 2, 4, "cd"),
        ];

        assert_eq!(splice(content, &edits).unwrap(), "abXYef");
    }

    #[test]
    fn test_splice_insertions_at_same_offset_keep_input_order() {
        let content = "guard();\nrest();\n";
        let edits = vec![
            Edit::insertion("f", 9, "first();\n"),
            Edit::insertion("f", 9, "second();\n"),
        ];

        assert_eq!(
            splice(content, &edits).unwrap(),
            "guard();\nfirst();\nsecond();\nrest();\n"
        );
    }

    #[test]
    fn test_splice_rejects_overlap() {
        let content = "abcdef";
        let edits = vec![
            Edit::deletion("f", 0, 4, "abcd"),
            Edit::deletion("f", 2, 6, "cdef"),
        ];

        assert!(matches!(
            splice(content, &edits),
            Err(EditError::Overlap { .. })
        ));
    }

    #[test]
    fn test_apply_writes_atomically() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("route.ts");
        fs::write(&file_path, "if (!KEY) { return; }\n").unwrap();

        let edit = Edit::insertion(&file_path, 22, "init();\n");
        let results = Edit::apply_batch(vec![edit]).unwrap();

        assert!(matches!(results[0], EditResult::Applied { .. }));
        assert_eq!(
            fs::read_to_string(&file_path).unwrap(),
            "if (!KEY) { return; }\ninit();\n"
        );
    }

    #[test]
    fn test_apply_already_applied_leaves_file_alone() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("route.ts");
        fs::write(&file_path, "hello world").unwrap();

        let edit = Edit::new(&file_path, 0, 5, "hello", "hello");
        let results = Edit::apply_batch(vec![edit]).unwrap();

        assert!(matches!(results[0], EditResult::AlreadyApplied { .. }));
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "hello world");
    }

    #[test]
    fn test_apply_batch_same_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("route.ts");
        fs::write(&file_path, "line1\nline2\nline3\n").unwrap();

        let edits = vec![
            Edit::new(&file_path, 0, 5, "LINE1", "line1"),
            Edit::new(&file_path, 12, 17, "LINE3", "line3"),
        ];

        let results = Edit::apply_batch(edits).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(
            fs::read_to_string(&file_path).unwrap(),
            "LINE1\nline2\nLINE3\n"
        );
    }
}
