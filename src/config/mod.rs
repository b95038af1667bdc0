pub mod applicator;
pub mod loader;
pub mod presets;
pub mod schema;
pub mod version;

pub use applicator::{
    apply_patches, check_patches, preview_patches, ApplicationError, ApplyOptions, FilePreview,
    PatchOutcome, PatchResult,
};
pub use loader::{discover_patch_files, load_from_path, load_from_str, ConfigError};
pub use presets::{Preset, DEFAULT_PRESET, PRESETS};
pub use schema::{
    Anchor, Metadata, Occurrences, Operation, PatchConfig, PatchDefinition, ValidationError,
    ValidationIssue,
};
pub use version::{matches_requirement, VersionError};
