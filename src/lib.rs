//! Route Patcher: idempotent insertion of runtime client initialization into
//! web route handlers.
//!
//! Each target route has an environment guard (`if (!process.env.X) { ... }`)
//! and needs a client constructed right after it, at request time instead of
//! module load time. A patch set names the targets; the patcher finds each
//! guard, appends the snippet, and leaves files that already carry the
//! marker untouched, so running it any number of times converges.
//!
//! # Architecture
//!
//! - [`anchor`] finds where a snippet goes (regex, guard block, or ast-grep)
//! - [`edit`] is the verified byte-span replacement every change compiles to
//! - [`config`] loads patch sets, gates them by version and applies them
//! - [`safety`] keeps targets inside the project
//! - [`syntax`] optionally rejects patches that break the parse
//!
//! # Example
//!
//! ```no_run
//! use route_patcher::config::{apply_patches, presets, ApplyOptions, PatchResult};
//! use std::path::Path;
//!
//! let config = presets::find("runtime-client").unwrap().load().unwrap();
//! let results = apply_patches(&config, Path::new("/srv/site"), "0.1.0", ApplyOptions::default());
//!
//! for (id, result) in results {
//!     match result {
//!         Ok(PatchResult::Applied { file }) => println!("{id}: patched {}", file.display()),
//!         Ok(other) => println!("{id}: {other}"),
//!         Err(e) => eprintln!("{id}: {e}"),
//!     }
//! }
//! ```

pub mod anchor;
pub mod cache;
pub mod config;
pub mod edit;
pub mod safety;
pub mod syntax;
pub mod workspace;

// Re-exports
pub use anchor::{AnchorError, AnchorLocator, AnchorMatch};
pub use config::{
    apply_patches, check_patches, load_from_path, load_from_str, matches_requirement,
    ApplicationError, ApplyOptions, ConfigError, PatchConfig, PatchResult, VersionError,
};
pub use edit::{Edit, EditError, EditResult, EditVerification};
pub use safety::{SafetyError, WorkspaceGuard};
pub use syntax::SyntaxCheckError;
pub use workspace::WorkspaceError;
