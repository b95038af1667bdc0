//! Thread-local cache of compiled ast-grep patterns.
//!
//! A patch set usually repeats one structural anchor across many route
//! files, so each pattern is compiled once per grammar and reused. The cache
//! holds at most 256 entries and is cleared wholesale when full.

use crate::anchor::AnchorError;
use ast_grep_core::Pattern;
use ast_grep_language::SupportLang;
use std::cell::RefCell;
use std::collections::HashMap;

const MAX_CACHE_ENTRIES: usize = 256;

thread_local! {
    static PATTERN_CACHE: RefCell<HashMap<(SupportLang, String), Pattern>> =
        RefCell::new(HashMap::new());
}

/// Compiled pattern for `(lang, pattern)`, compiling on first use.
///
/// The grammar is part of the key: `.ts` and `.tsx` targets parse the same
/// pattern text differently. Patterns that fail to compile are not cached.
pub fn get_or_compile_pattern(pattern: &str, lang: SupportLang) -> Result<Pattern, AnchorError> {
    PATTERN_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        let key = (lang, pattern.to_string());

        if let Some(compiled) = cache.get(&key) {
            return Ok(compiled.clone());
        }

        if cache.len() >= MAX_CACHE_ENTRIES {
            log::debug!("ast-grep pattern cache full, clearing {} entries", cache.len());
            cache.clear();
        }

        let compiled = Pattern::try_new(pattern, lang).map_err(|e| {
            AnchorError::InvalidStructuralPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            }
        })?;
        cache.insert(key, compiled.clone());
        Ok(compiled)
    })
}

pub fn clear_cache() {
    PATTERN_CACHE.with(|cache| cache.borrow_mut().clear());
}

pub fn cache_size() -> usize {
    PATTERN_CACHE.with(|cache| cache.borrow().len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_are_cached_per_language() {
        clear_cache();
        let pattern = "if (!process.env.OPENAI_API_KEY) { $$$BODY }";

        get_or_compile_pattern(pattern, SupportLang::TypeScript).unwrap();
        get_or_compile_pattern(pattern, SupportLang::TypeScript).unwrap();
        assert_eq!(cache_size(), 1);

        get_or_compile_pattern(pattern, SupportLang::Tsx).unwrap();
        assert_eq!(cache_size(), 2);

        clear_cache();
        assert_eq!(cache_size(), 0);
    }

    #[test]
    fn multi_statement_pattern_is_an_error_not_a_panic() {
        clear_cache();
        let err = get_or_compile_pattern("foo(); bar();", SupportLang::TypeScript).unwrap_err();

        assert!(matches!(err, AnchorError::InvalidStructuralPattern { .. }));
        assert!(err.to_string().contains("foo(); bar();"));
        assert_eq!(cache_size(), 0);
    }
}
