use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the penwell binary.
#[derive(Debug, Parser)]
#[command(name = "penwell", version, about = "Penwell cache maintenance")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PENWELL_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Apply pending database migrations.
    Migrate,
    /// Run one cache maintenance pass and exit.
    Cleanup,
    /// Run cache maintenance on a fixed cadence until interrupted.
    Maintain(MaintainArgs),
    /// Drop cached entries by tag, by key, or all of them.
    Invalidate(InvalidateArgs),
    /// Derive a slug for every post that lacks one.
    BackfillSlugs,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MaintainArgs {
    /// Override the maintenance cadence.
    #[arg(long = "cadence-seconds", value_name = "SECONDS")]
    pub cadence_seconds: Option<u64>,
}

#[derive(Debug, Args, Clone)]
#[group(required = true, multiple = true)]
pub struct InvalidateArgs {
    /// Tag whose entries are dropped; may be repeated.
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Key to drop; may be repeated.
    #[arg(long = "key", value_name = "KEY")]
    pub keys: Vec<String>,

    /// Drop every cached entry.
    #[arg(long, action = clap::ArgAction::SetTrue, conflicts_with_all = ["tags", "keys"])]
    pub all: bool,
}
