use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AnchorError {
    #[error("invalid anchor regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid ast-grep pattern '{pattern}': {message}")]
    InvalidStructuralPattern { pattern: String, message: String },

    #[error("anchor pattern is empty")]
    EmptyPattern,
}
