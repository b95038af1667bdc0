use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use log::{debug, warn};
use route_patcher::config::{
    apply_patches, check_patches, discover_patch_files, load_from_path, presets,
    preview_patches, ApplicationError, ApplyOptions, PatchConfig, PatchResult, DEFAULT_PRESET,
    PRESETS,
};
use route_patcher::workspace::{detect_from, read_package_version, WORKSPACE_ENV};
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "route-patcher")]
#[command(
    about = "Idempotent patcher for Next.js API route handlers",
    long_about = "Inserts a runtime client initialization after the environment guard of \
                  each target route. Running with no subcommand is the same as `apply`."
)]
#[command(version)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Default)]
struct SourceArgs {
    /// Path to the web project root (auto-detected if not specified)
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Patch set file to use (otherwise <workspace>/patches/*.toml, then the default preset)
    #[arg(short, long, conflicts_with = "preset")]
    patches: Option<PathBuf>,

    /// Built-in patch set to use (see `list`)
    #[arg(long)]
    preset: Option<String>,
}

#[derive(Args, Default)]
struct ApplyFlags {
    /// Dry run - show what would be changed without modifying files
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Show unified diff of changes
    #[arg(short, long)]
    diff: bool,

    /// Reject patches that introduce syntax errors
    #[arg(long)]
    check_syntax: bool,

    /// Exit non-zero when any target is unmatched or fails
    #[arg(long)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patches to a workspace
    Apply {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        flags: ApplyFlags,
    },

    /// Check status of patches without applying
    Status {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Verify every patch is already applied
    Verify {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// List built-in patch sets and their targets
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        None => cmd_apply(SourceArgs::default(), ApplyFlags::default()),

        Some(Commands::Apply { source, flags }) => cmd_apply(source, flags),

        Some(Commands::Status { source }) => cmd_status(source),

        Some(Commands::Verify { source }) => cmd_verify(source),

        Some(Commands::List) => cmd_list(),
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

/// Resolve workspace path
///
/// Priority order:
/// 1. Explicit --workspace flag
/// 2. ROUTE_PATCHER_WORKSPACE environment variable
/// 3. Nearest ancestor of the current directory holding a package.json
fn resolve_workspace(cli_workspace: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_workspace {
        return path
            .canonicalize()
            .with_context(|| format!("workspace {} does not exist", path.display()));
    }

    if let Ok(env_path) = env::var(WORKSPACE_ENV) {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        warn!("{WORKSPACE_ENV} is set but path doesn't exist: {env_path}");
    }

    if let Some(path) = env::current_dir().ok().and_then(|cwd| detect_from(&cwd)) {
        println!(
            "{}",
            format!("Auto-detected workspace: {}", path.display()).dimmed()
        );
        return Ok(path);
    }

    bail!(
        "{}\n{}\n  {}\n  {}\n  {}",
        "Could not find the web project.".red(),
        "Try one of:".bold(),
        "1. cd into the project (any directory below package.json) and rerun",
        "2. Specify explicitly: route-patcher apply --workspace /path/to/site",
        "3. Set environment variable: export ROUTE_PATCHER_WORKSPACE=/path/to/site"
    )
}

fn workspace_version(workspace: &Path) -> String {
    read_package_version(workspace).unwrap_or_else(|e| {
        warn!("{e}; using version 0.0.0");
        "0.0.0".to_string()
    })
}

struct PatchSet {
    label: String,
    config: PatchConfig,
}

fn load_preset(name: &str) -> Result<PatchSet> {
    let Some(preset) = presets::find(name) else {
        bail!(
            "unknown preset '{}' (available: {})",
            name,
            presets::names().join(", ")
        );
    };
    let config = preset
        .load()
        .with_context(|| format!("built-in preset {} is invalid", preset.name))?;
    Ok(PatchSet {
        label: format!("preset {}", preset.name),
        config,
    })
}

/// Patch sets to run: `--patches`, then `--preset`, then
/// `<workspace>/patches/*.toml`, then the default preset.
fn load_patch_sets(workspace: &Path, source: SourceArgs) -> Result<Vec<PatchSet>> {
    if let Some(path) = source.patches {
        let config = load_from_path(&path)?;
        return Ok(vec![PatchSet {
            label: path.display().to_string(),
            config,
        }]);
    }

    if let Some(name) = source.preset {
        return Ok(vec![load_preset(&name)?]);
    }

    let files = discover_patch_files(&workspace.join("patches"))?;
    if files.is_empty() {
        debug!(
            "no patch files under {}/patches, using preset {}",
            workspace.display(),
            DEFAULT_PRESET
        );
        return Ok(vec![load_preset(DEFAULT_PRESET)?]);
    }

    files
        .into_iter()
        .map(|path| {
            let config = load_from_path(&path)?;
            Ok(PatchSet {
                label: path.display().to_string(),
                config,
            })
        })
        .collect()
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn print_header(title: Option<&str>, workspace: &Path, version: &str) {
    if let Some(title) = title {
        println!("{}", title.bold());
    }
    println!("Workspace: {}", workspace.display());
    println!("Version: {}", version);
    println!();
}

#[derive(Default)]
struct ApplySummary {
    patched: usize,
    already_patched: usize,
    not_found: usize,
    unmatched: usize,
    skipped: usize,
    failed: usize,
}

fn cmd_apply(source: SourceArgs, flags: ApplyFlags) -> Result<()> {
    let workspace = resolve_workspace(source.workspace.clone())?;
    let patch_sets = load_patch_sets(&workspace, source)?;
    let version = workspace_version(&workspace);
    let options = ApplyOptions {
        check_syntax: flags.check_syntax,
    };

    print_header(None, &workspace, &version);

    let mut summary = ApplySummary::default();

    for set in patch_sets {
        println!("Loading patches from {}...", set.label);

        if flags.dry_run {
            println!("{}", "  [DRY RUN - nothing will be written]".cyan());
        }

        // Computed before applying so the diff shows the pre-patch text
        let previews = if flags.diff {
            preview_patches(&set.config, &workspace, &version, options)
        } else {
            Vec::new()
        };

        let results = if flags.dry_run {
            check_patches(&set.config, &workspace, &version, options)
        } else {
            apply_patches(&set.config, &workspace, &version, options)
        };

        for (patch_id, result) in results {
            match result {
                Ok(PatchResult::Applied { file }) => {
                    let verb = if flags.dry_run { "Would patch" } else { "Patched" };
                    println!("{} {}: {} {}", "✓".green(), patch_id, verb, file.display());
                    summary.patched += 1;
                }
                Ok(PatchResult::AlreadyApplied { file }) => {
                    println!(
                        "{} {}: Already patched {}",
                        "⊙".yellow(),
                        patch_id,
                        file.display()
                    );
                    summary.already_patched += 1;
                }
                Ok(PatchResult::NotFound { file }) => {
                    println!(
                        "{} {}: Not found: {}",
                        "⊘".yellow(),
                        patch_id,
                        file.display()
                    );
                    summary.not_found += 1;
                }
                Ok(PatchResult::Unmatched { file }) => {
                    println!(
                        "{} {}: Anchor not found, left unchanged: {}",
                        "✗".yellow(),
                        patch_id,
                        file.display()
                    );
                    summary.unmatched += 1;
                }
                Ok(PatchResult::SkippedVersion { reason }) => {
                    println!("{} {}: Skipped ({})", "⊘".cyan(), patch_id, reason);
                    summary.skipped += 1;
                }
                Err(e) => {
                    eprintln!("{} {}: Error - {}", "✗".red(), patch_id, e);
                    summary.failed += 1;
                    explain_error(&e);
                }
            }
        }

        for preview in &previews {
            display_diff(&preview.file, &preview.before, &preview.after);
        }

        println!();
    }

    println!("{}", "Summary:".bold());
    println!("  {} patched", format!("{}", summary.patched).green());
    println!(
        "  {} already patched",
        format!("{}", summary.already_patched).yellow()
    );
    println!("  {} not found", format!("{}", summary.not_found).yellow());
    println!("  {} unmatched", format!("{}", summary.unmatched).yellow());
    println!("  {} skipped", format!("{}", summary.skipped).cyan());
    println!("  {} failed", format!("{}", summary.failed).red());

    if flags.strict && summary.unmatched + summary.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn explain_error(error: &ApplicationError) {
    match error {
        ApplicationError::AmbiguousMatch { file, count } => {
            eprintln!(
                "  {}",
                format!("CONFLICT: Anchor matched {} locations (expected 1)", count).red()
            );
            eprintln!("  File: {}", file.display());
            eprintln!("  Action: Narrow the anchor, or set occurrences = \"first\" or \"all\"");
        }
        ApplicationError::Syntax { file, source } => {
            eprintln!("  {}", "Patched file would not parse cleanly".red());
            eprintln!("  File: {}", file.display());
            eprintln!("  {}", source);
        }
        ApplicationError::Safety(e) => {
            eprintln!("  Target refused: {}", e);
        }
        _ => {}
    }
}

fn cmd_status(source: SourceArgs) -> Result<()> {
    let workspace = resolve_workspace(source.workspace.clone())?;
    let patch_sets = load_patch_sets(&workspace, source)?;
    let version = workspace_version(&workspace);

    print_header(Some("Patch Status Report"), &workspace, &version);

    let mut applied = Vec::new();
    let mut not_applied = Vec::new();
    let mut skipped = Vec::new();

    // Read-only; never touches workspace files
    for set in patch_sets {
        let results = check_patches(&set.config, &workspace, &version, ApplyOptions::default());

        for (patch_id, result) in results {
            match result {
                Ok(PatchResult::AlreadyApplied { .. }) => applied.push(patch_id),
                Ok(PatchResult::Applied { .. }) => {
                    not_applied.push((patch_id, "anchor found, ready to patch".to_string()));
                }
                Ok(PatchResult::Unmatched { .. }) => {
                    not_applied.push((patch_id, "anchor not found".to_string()));
                }
                Ok(PatchResult::NotFound { file }) => {
                    skipped.push((patch_id, format!("missing {}", file.display())));
                }
                Ok(PatchResult::SkippedVersion { reason }) => skipped.push((patch_id, reason)),
                Err(e) => not_applied.push((patch_id, e.to_string())),
            }
        }
    }

    if !applied.is_empty() {
        println!(
            "{} {} ({} patches)",
            "✓".green(),
            "APPLIED".green().bold(),
            applied.len()
        );
        for id in &applied {
            println!("  - {}", id);
        }
        println!();
    }

    if !not_applied.is_empty() {
        println!(
            "{} {} ({} patches)",
            "⊙".yellow(),
            "NOT APPLIED".yellow().bold(),
            not_applied.len()
        );
        for (id, reason) in &not_applied {
            println!("  - {} ({})", id, reason.dimmed());
        }
        println!();
    }

    if !skipped.is_empty() {
        println!(
            "{} {} ({} patches)",
            "⊘".cyan(),
            "SKIPPED".cyan().bold(),
            skipped.len()
        );
        for (id, reason) in &skipped {
            println!("  - {} ({})", id, reason.dimmed());
        }
        println!();
    }

    Ok(())
}

fn cmd_verify(source: SourceArgs) -> Result<()> {
    let workspace = resolve_workspace(source.workspace.clone())?;
    let patch_sets = load_patch_sets(&workspace, source)?;
    let version = workspace_version(&workspace);

    print_header(Some("Verifying patches..."), &workspace, &version);

    let mut verified = 0;
    let mut mismatch = 0;
    let mut skipped = 0;

    for set in patch_sets {
        let results = check_patches(&set.config, &workspace, &version, ApplyOptions::default());

        for (patch_id, result) in results {
            match result {
                Ok(PatchResult::AlreadyApplied { .. }) => {
                    println!("{} {}: Verified (already patched)", "✓".green(), patch_id);
                    verified += 1;
                }
                Ok(PatchResult::Applied { file }) | Ok(PatchResult::Unmatched { file }) => {
                    eprintln!("{} {}: MISMATCH", "✗".red(), patch_id);
                    eprintln!("  Expected: patch already applied");
                    eprintln!("  Found: patch not yet applied");
                    eprintln!("  Location: {}", file.display());
                    mismatch += 1;
                }
                Ok(PatchResult::NotFound { file }) => {
                    println!(
                        "{} {}: Skipped (missing {})",
                        "⊘".cyan(),
                        patch_id,
                        file.display()
                    );
                    skipped += 1;
                }
                Ok(PatchResult::SkippedVersion { reason }) => {
                    println!("{} {}: Skipped ({})", "⊘".cyan(), patch_id, reason);
                    skipped += 1;
                }
                Err(ref e) => {
                    eprintln!("{} {}: MISMATCH", "✗".red(), patch_id);
                    eprintln!("  Error: {}", e);
                    mismatch += 1;
                }
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} verified", format!("{}", verified).green());
    println!("  {} mismatch", format!("{}", mismatch).red());
    println!("  {} skipped", format!("{}", skipped).cyan());

    if mismatch > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list() -> Result<()> {
    println!("{}", "Built-in patch sets:".bold());
    println!();

    for preset in PRESETS {
        let config = preset.load()?;
        let default_tag = if preset.name == DEFAULT_PRESET {
            " (default)".dimmed().to_string()
        } else {
            String::new()
        };
        println!("{}{}", preset.name.green().bold(), default_tag);
        println!("  {}", preset.summary);
        if let Some(range) = &config.meta.version_range {
            println!("  version: {}", range);
        }
        for patch in &config.patches {
            println!("  - {} {}", patch.id, patch.file.dimmed());
        }
        println!();
    }

    Ok(())
}
