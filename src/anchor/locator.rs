use crate::anchor::errors::AnchorError;
use crate::anchor::lang::SupportLang;
use crate::cache;
use crate::config::schema::Anchor;
use ast_grep_core::AstGrep;
use regex::{Regex, RegexBuilder};

/// One located anchor block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorMatch {
    /// Start of the anchor block
    pub start: usize,
    /// End of the whole match
    pub end: usize,
    /// Where the snippet goes: end of capture group 1, else `end`
    pub insert_at: usize,
}

/// A compiled anchor, ready to search any number of files.
#[derive(Debug, Clone)]
pub enum AnchorLocator {
    Regex(Regex),
    Structural(String),
}

/// Build the guard regex for `if (<condition>) { ... }`.
///
/// The body is `[^}]+`, optionally split around a literal `contains` text,
/// and the block must be followed by a newline:
///
/// ```
/// use route_patcher::anchor::guard_pattern;
///
/// assert_eq!(
///     guard_pattern("!KEY", None),
///     r"(if \(!KEY\) \{[^}]+\}\s*\n)"
/// );
/// ```
pub fn guard_pattern(condition: &str, contains: Option<&str>) -> String {
    let mut pattern = format!(r"(if \({}\) \{{[^}}]+", regex::escape(condition.trim()));
    if let Some(text) = contains {
        pattern.push_str(&regex::escape(text));
        pattern.push_str("[^}]+");
    }
    pattern.push_str(r"\}\s*\n)");
    pattern
}

fn compile_regex(pattern: &str) -> Result<Regex, AnchorError> {
    if pattern.trim().is_empty() {
        return Err(AnchorError::EmptyPattern);
    }
    RegexBuilder::new(pattern)
        .multi_line(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|source| AnchorError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })
}

impl AnchorLocator {
    pub fn compile(anchor: &Anchor) -> Result<Self, AnchorError> {
        match anchor {
            Anchor::Regex { pattern } => compile_regex(pattern).map(AnchorLocator::Regex),
            Anchor::Guard {
                condition,
                contains,
            } => {
                if condition.trim().is_empty() {
                    return Err(AnchorError::EmptyPattern);
                }
                compile_regex(&guard_pattern(condition, contains.as_deref()))
                    .map(AnchorLocator::Regex)
            }
            Anchor::AstGrep { pattern } => {
                if pattern.trim().is_empty() {
                    return Err(AnchorError::EmptyPattern);
                }
                // Route handlers default to TypeScript; other grammars are
                // compiled when a target needs them
                cache::get_or_compile_pattern(pattern, SupportLang::TypeScript)?;
                Ok(AnchorLocator::Structural(pattern.clone()))
            }
        }
    }

    /// All anchor matches in `source`, in source order.
    ///
    /// `lang` is only consulted by structural anchors, which fail when the
    /// pattern does not compile for that grammar.
    pub fn find_all(
        &self,
        source: &str,
        lang: SupportLang,
    ) -> Result<Vec<AnchorMatch>, AnchorError> {
        match self {
            AnchorLocator::Regex(regex) => Ok(regex
                .captures_iter(source)
                .filter_map(|caps| {
                    let whole = caps.get(0)?;
                    let insert_at = caps.get(1).map_or(whole.end(), |group| group.end());
                    Some(AnchorMatch {
                        start: whole.start(),
                        end: whole.end(),
                        insert_at,
                    })
                })
                .collect()),
            AnchorLocator::Structural(pattern) => find_structural(source, pattern, lang),
        }
    }
}

fn find_structural(
    source: &str,
    pattern: &str,
    lang: SupportLang,
) -> Result<Vec<AnchorMatch>, AnchorError> {
    let compiled = cache::get_or_compile_pattern(pattern, lang)?;
    let sg = AstGrep::new(source, lang);

    let mut matches: Vec<AnchorMatch> = sg
        .root()
        .find_all(&compiled)
        .map(|m| {
            let range = m.get_node().range();
            let end = extend_to_line_end(source, range.end);
            AnchorMatch {
                start: range.start,
                end,
                insert_at: end,
            }
        })
        .collect();

    matches.sort_by_key(|m| m.start);
    Ok(matches)
}

/// Mirror the guard regex's trailing `\s*\n`: swallow whitespace after
/// `pos` up to and including the last newline in it.
fn extend_to_line_end(source: &str, pos: usize) -> usize {
    let rest = &source[pos..];
    let whitespace = &rest[..rest.len() - rest.trim_start().len()];
    match whitespace.rfind('\n') {
        Some(idx) => pos + idx + 1,
        None => pos,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(condition: &str) -> AnchorLocator {
        AnchorLocator::compile(&Anchor::Guard {
            condition: condition.to_string(),
            contains: None,
        })
        .unwrap()
    }

    #[test]
    fn guard_matches_single_line_block() {
        let source = "if (!CONFIG_PRESENT) { return fallback; }\nnext();\n";
        let matches = guard("!CONFIG_PRESENT")
            .find_all(source, SupportLang::TypeScript)
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].start, 0);
        assert_eq!(
            &source[..matches[0].insert_at],
            "if (!CONFIG_PRESENT) { return fallback; }\n"
        );
    }

    #[test]
    fn guard_swallows_blank_lines_after_block() {
        let source = "  if (!KEY) {\n    return x;\n  }\n\n  work();\n";
        let matches = guard("!KEY").find_all(source, SupportLang::TypeScript).unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(&source[matches[0].insert_at..], "  work();\n");
    }

    #[test]
    fn guard_stops_at_first_closing_brace() {
        let source = "if (!KEY) {\n  return json({ ok: false });\n}\n";
        let matches = guard("!KEY").find_all(source, SupportLang::TypeScript).unwrap();

        assert!(matches.is_empty());
    }

    #[test]
    fn guard_contains_narrows_match() {
        let source = "if (!KEY) {\n  return a;\n}\nif (!KEY) {\n  return b;\n}\n";
        let locator = AnchorLocator::compile(&Anchor::Guard {
            condition: "!KEY".to_string(),
            contains: Some("return b".to_string()),
        })
        .unwrap();

        let matches = locator.find_all(source, SupportLang::TypeScript).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(&source[matches[0].start..matches[0].end], "if (!KEY) {\n  return b;\n}\n");
    }

    #[test]
    fn regex_insert_point_follows_capture_group() {
        let locator = AnchorLocator::compile(&Anchor::Regex {
            pattern: r"(start;\n)trailer".to_string(),
        })
        .unwrap();

        let source = "start;\ntrailer";
        let matches = locator.find_all(source, SupportLang::TypeScript).unwrap();
        assert_eq!(
            matches,
            vec![AnchorMatch {
                start: 0,
                end: source.len(),
                insert_at: 7,
            }]
        );
    }

    #[test]
    fn regex_without_group_inserts_after_match() {
        let locator = AnchorLocator::compile(&Anchor::Regex {
            pattern: r"ready\(\);\n".to_string(),
        })
        .unwrap();

        let matches = locator
            .find_all("ready();\ngo();\n", SupportLang::TypeScript)
            .unwrap();
        assert_eq!(matches[0].insert_at, 9);
    }

    #[test]
    fn invalid_regex_is_reported() {
        let result = AnchorLocator::compile(&Anchor::Regex {
            pattern: "(unclosed".to_string(),
        });
        assert!(matches!(result, Err(AnchorError::InvalidRegex { .. })));
    }

    #[test]
    fn empty_patterns_are_rejected() {
        let result = AnchorLocator::compile(&Anchor::AstGrep {
            pattern: "  ".to_string(),
        });
        assert!(matches!(result, Err(AnchorError::EmptyPattern)));

        let result = AnchorLocator::compile(&Anchor::Guard {
            condition: String::new(),
            contains: None,
        });
        assert!(matches!(result, Err(AnchorError::EmptyPattern)));
    }

    #[test]
    fn uncompilable_structural_pattern_is_rejected() {
        let result = AnchorLocator::compile(&Anchor::AstGrep {
            pattern: "foo(); bar();".to_string(),
        });
        assert!(matches!(
            result,
            Err(AnchorError::InvalidStructuralPattern { .. })
        ));
    }

    #[test]
    fn structural_handles_nested_braces() {
        let source = r#"export async function POST() {
  if (!process.env.OPENAI_API_KEY) {
    return NextResponse.json({ fortune: 'later' });
  }

  return NextResponse.json({});
}
"#;
        let locator = AnchorLocator::compile(&Anchor::AstGrep {
            pattern: "if (!process.env.OPENAI_API_KEY) { $$$BODY }".to_string(),
        })
        .unwrap();

        let matches = locator.find_all(source, SupportLang::TypeScript).unwrap();
        assert_eq!(matches.len(), 1);

        let anchor = &source[matches[0].start..matches[0].insert_at];
        assert!(anchor.starts_with("if (!process.env.OPENAI_API_KEY) {"));
        assert!(anchor.ends_with("  }\n\n"));
        assert_eq!(
            &source[matches[0].insert_at..],
            "  return NextResponse.json({});\n}\n"
        );
    }

    #[test]
    fn extend_to_line_end_stops_at_last_newline() {
        assert_eq!(extend_to_line_end("}\n\n  x", 1), 3);
        assert_eq!(extend_to_line_end("} x", 1), 1);
        assert_eq!(extend_to_line_end("}", 1), 1);
    }
}
