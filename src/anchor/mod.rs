//! Anchor location: finding the block a snippet is inserted after.
//!
//! Three strategies are available, all producing the same [`AnchorMatch`]
//! spans:
//!
//! - `regex`: a raw regular expression. The insertion point is the end of
//!   capture group 1 when the pattern has one, else the end of the match.
//! - `guard`: builds the classic `if (<condition>) { ... }` guard regex. The
//!   body is matched with `[^}]+`, so the block ends at the *first* `}`; a
//!   body containing a nested brace does not match at all.
//! - `ast-grep`: structural search over a TypeScript/TSX/JavaScript parse,
//!   immune to nested braces. The span is extended over trailing whitespace
//!   up to the last newline, the same span the guard regex would produce.

pub mod errors;
pub mod lang;
pub mod locator;

pub use errors::AnchorError;
pub use lang::{lang_for_path, SupportLang};
pub use locator::{guard_pattern, AnchorLocator, AnchorMatch};
