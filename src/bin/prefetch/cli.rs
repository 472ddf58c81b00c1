//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// prefetch - build offline dependency mirrors for hermetic builds
#[derive(Parser)]
#[command(name = "prefetch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Extra config file, applied over the global and project config
    #[arg(long, global = true, env = "PREFETCH_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch dependencies into an offline mirror
    FetchDeps(FetchDepsArgs),

    /// Write generated config files into the source tree
    ApplyConfigs(ApplyConfigsArgs),
}

#[derive(Args)]
pub struct FetchDepsArgs {
    /// Package to process: `type[:path]` or a JSON object (repeatable)
    #[arg(long = "package", value_name = "SPEC", conflicts_with = "packagelist")]
    pub packages: Vec<String>,

    /// Comma-separated `type[:path]` list or a JSON list of packages
    #[arg(long, value_name = "LIST")]
    pub packagelist: Option<String>,

    /// Source tree the package paths are relative to
    #[arg(long, default_value = ".")]
    pub source: PathBuf,

    /// Directory for the mirror and the generated outputs
    #[arg(long, default_value = "./prefetch-output")]
    pub output_dir: PathBuf,
}

#[derive(Args)]
pub struct ApplyConfigsArgs {
    /// Output directory of a previous `fetch-deps` run
    #[arg(long, default_value = "./prefetch-output")]
    pub from_output_dir: PathBuf,

    /// Only write files under this directory (repeatable)
    #[arg(long = "to-dir", value_name = "DIR")]
    pub to_dirs: Vec<PathBuf>,
}
