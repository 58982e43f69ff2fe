//! CLI argument parsing using clap.

use clap::Parser;
use clap::Subcommand;
use forgescript_core::loader::DEFAULT_SCRIPT;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "forgescript")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Runtime directory bundles are extracted under
    #[arg(long, global = true, value_name = "DIR")]
    pub runtime_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output results in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List bundle contents without extraction
    List(ListArgs),
    /// Extract a bundle into a directory
    Extract(ExtractArgs),
    /// Extract a bundle and run its alias script
    Load(LoadArgs),
    /// Invoke an alias callback and print the resulting command
    Invoke(InvokeArgs),
    /// Remove the runtime and cache directories
    Clean,
}

/// Extraction limits shared by every command that reads a bundle.
#[derive(clap::Args)]
pub struct LimitArgs {
    /// Maximum number of files to extract
    #[arg(long, default_value = "10000")]
    pub max_files: usize,

    /// Maximum single file size in bytes
    #[arg(long, value_parser = parse_byte_size)]
    pub max_file_size: Option<u64>,

    /// Maximum total bytes produced by unwrapping compression envelopes
    #[arg(long, value_parser = parse_byte_size)]
    pub max_decompressed_size: Option<u64>,

    /// Maximum number of nested compression envelopes
    #[arg(long, default_value = "4")]
    pub max_unwrap_depth: usize,
}

#[derive(clap::Args)]
pub struct ListArgs {
    /// Path to the bundle file
    #[arg(value_name = "BUNDLE")]
    pub bundle: PathBuf,

    #[command(flatten)]
    pub limits: LimitArgs,
}

#[derive(clap::Args)]
pub struct ExtractArgs {
    /// Path to the bundle file
    #[arg(value_name = "BUNDLE")]
    pub bundle: PathBuf,

    /// Output directory (default: current directory)
    #[arg(value_name = "OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Do not apply permission bits from the bundle
    #[arg(long)]
    pub no_preserve_permissions: bool,

    #[command(flatten)]
    pub limits: LimitArgs,
}

#[derive(clap::Args)]
pub struct LoadArgs {
    /// Path to the bundle file
    #[arg(value_name = "BUNDLE")]
    pub bundle: PathBuf,

    /// Script inside the bundle to run
    #[arg(long, default_value = DEFAULT_SCRIPT)]
    pub script: String,

    /// Extraction directory name (default: bundle file stem)
    #[arg(long)]
    pub file_id: Option<String>,

    /// Callback the aliases are registered for
    #[arg(long, default_value = "0")]
    pub callback_id: i64,

    /// Task id reported to the script
    #[arg(long, default_value = "0")]
    pub task_id: i64,

    /// Operator name used as the default alias author
    #[arg(long, default_value = "")]
    pub operator: String,

    /// Abandon the script after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    #[command(flatten)]
    pub limits: LimitArgs,
}

#[derive(clap::Args)]
pub struct InvokeArgs {
    /// Alias script, usually inside an extracted bundle
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// Alias to invoke
    #[arg(value_name = "ALIAS")]
    pub alias: String,

    /// JSON file holding the task (callback, args, command_line)
    #[arg(long, value_name = "FILE")]
    pub task: Option<PathBuf>,

    /// Task id reported to the script
    #[arg(long, default_value = "0")]
    pub task_id: i64,

    /// Abandon the callback after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

/// Parse byte size with optional suffix (K, M, G, T)
#[allow(clippy::option_if_let_else)]
fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty byte size".to_string());
    }

    let (num_str, multiplier) = if let Some(stripped) = s.strip_suffix('T') {
        (stripped, 1024_u64.pow(4))
    } else if let Some(stripped) = s.strip_suffix('G') {
        (stripped, 1024_u64.pow(3))
    } else if let Some(stripped) = s.strip_suffix('M') {
        (stripped, 1024_u64.pow(2))
    } else if let Some(stripped) = s.strip_suffix('K') {
        (stripped, 1024)
    } else {
        (s, 1)
    };

    num_str
        .parse::<u64>()
        .map_err(|_| format!("invalid byte size: {s}"))
        .and_then(|n| {
            n.checked_mul(multiplier)
                .ok_or_else(|| format!("byte size overflow: {s}"))
        })
}
