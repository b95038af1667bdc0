//! Syntax regression check for patched files.
//!
//! The anchor regexes know nothing about the target grammar, so a match on
//! the wrong span can produce a broken file. When enabled, the patched text
//! is parsed with tree-sitter and rejected if it carries more ERROR/MISSING
//! nodes than the original. Positions are not compared: an insertion shifts
//! every later error, so only the counts are meaningful.

use ast_grep_language::{LanguageExt, SupportLang};
use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

#[derive(Error, Debug, Clone)]
pub enum SyntaxCheckError {
    #[error("failed to set tree-sitter language {0:?}")]
    LanguageSet(SupportLang),

    #[error("failed to parse source")]
    ParseFailed,

    #[error("patch introduces syntax errors ({before} error nodes before, {after} after)")]
    Regression { before: usize, after: usize },
}

fn parse(source: &str, lang: SupportLang) -> Result<Tree, SyntaxCheckError> {
    let mut parser = Parser::new();
    parser
        .set_language(&lang.get_ts_language())
        .map_err(|_| SyntaxCheckError::LanguageSet(lang))?;
    parser
        .parse(source, None)
        .ok_or(SyntaxCheckError::ParseFailed)
}

fn count_error_nodes(node: Node<'_>) -> usize {
    let own = usize::from(node.is_error() || node.is_missing());
    let mut cursor = node.walk();
    let children: usize = node
        .children(&mut cursor)
        .map(count_error_nodes)
        .sum();
    own + children
}

/// Number of ERROR and MISSING nodes in `source`.
pub fn count_syntax_errors(source: &str, lang: SupportLang) -> Result<usize, SyntaxCheckError> {
    let tree = parse(source, lang)?;
    Ok(count_error_nodes(tree.root_node()))
}

/// Fail if `after` parses worse than `before`.
pub fn check_no_regression(
    before: &str,
    after: &str,
    lang: SupportLang,
) -> Result<(), SyntaxCheckError> {
    let before_errors = count_syntax_errors(before, lang)?;
    let after_errors = count_syntax_errors(after, lang)?;

    if after_errors > before_errors {
        return Err(SyntaxCheckError::Regression {
            before: before_errors,
            after: after_errors,
        });
    }
    Ok(())
}
