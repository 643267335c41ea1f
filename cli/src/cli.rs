//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;
use rewatch_directory_watcher::PathPattern;

/// Rerun a command whenever a file matching REGEXP is created or written.
#[derive(Debug, Parser)]
#[command(name = "rewatch", version, about, long_about = None)]
pub struct Cli {
    /// Regular expression matched against changed path names
    #[arg(value_name = "REGEXP", value_parser = parse_pattern)]
    pub pattern: PathPattern,

    /// Command to run, followed by its arguments
    #[arg(
        value_name = "COMMAND",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,

    /// Directory tree to watch
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Configuration file (default: <config dir>/rewatch/config.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Do not read Get/Del requests from stdin
    #[arg(long)]
    pub no_input: bool,

    /// Do not clear the terminal before each run
    #[arg(long)]
    pub no_clear: bool,

    /// Log watcher and run details to stderr
    #[arg(long)]
    pub debug: bool,
}

fn parse_pattern(s: &str) -> Result<PathPattern, String> {
    PathPattern::new(s).map_err(|e| e.to_string())
}
