//! Grammar selection for structural anchors and syntax checks.
//!
//! Route handlers are TypeScript almost everywhere; the extension decides
//! between the TypeScript, TSX and JavaScript grammars bundled with
//! ast-grep-language.

pub use ast_grep_language::SupportLang;
use std::path::Path;

/// Pick the grammar for a target file by extension, defaulting to TypeScript.
pub fn lang_for_path(path: &Path) -> SupportLang {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("tsx") => SupportLang::Tsx,
        Some("js" | "jsx" | "mjs" | "cjs") => SupportLang::JavaScript,
        _ => SupportLang::TypeScript,
    }
}
