//! CLI argument definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "tsqlscope")]
#[command(author, version, about = "T-SQL static analysis tool")]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Resolve every script against the catalog built from all of them
    Check {
        /// SQL files or directories to check (supports glob patterns)
        files: Vec<PathBuf>,

        /// Configuration file (defaults to the nearest tsqlscope.toml)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Issue codes or names to suppress (e.g. E0002, duplicate-alias)
        #[arg(long, value_name = "CODE")]
        disable: Vec<String>,

        /// Schema assumed for one-part object names
        #[arg(long, value_name = "SCHEMA", env = "TSQLSCOPE_DEFAULT_SCHEMA")]
        default_schema: Option<String>,

        /// Database assumed before any USE statement
        #[arg(long, value_name = "DATABASE", env = "TSQLSCOPE_DEFAULT_DATABASE")]
        default_database: Option<String>,

        /// Number of worker threads (defaults to available parallelism)
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Display the catalog built from the given scripts
    Catalog {
        /// SQL files or directories (supports glob patterns)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Configuration file (defaults to the nearest tsqlscope.toml)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Schema assumed for one-part object names
        #[arg(long, value_name = "SCHEMA", env = "TSQLSCOPE_DEFAULT_SCHEMA")]
        default_schema: Option<String>,

        /// Database assumed before any USE statement
        #[arg(long, value_name = "DATABASE", env = "TSQLSCOPE_DEFAULT_DATABASE")]
        default_database: Option<String>,

        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse a script and display its syntax tree (for debugging)
    Tree {
        /// SQL file to parse
        file: PathBuf,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON output
    Json,
    /// SARIF output (for GitHub Code Scanning)
    Sarif,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            "sarif" => Ok(OutputFormat::Sarif),
            _ => Err(format!(
                "Unknown output format: '{}'. Supported formats: human, json, sarif.",
                s
            )),
        }
    }
}
