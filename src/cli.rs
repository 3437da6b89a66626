use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show critical errors
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show detailed information
    Verbose,
}

/// Output format for driver results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text, one line per run or diagnostic
    Human,
    /// One JSON object per run
    Json,
}

/// RELAX NG validation driver
#[derive(Parser, Debug, Clone)]
#[command(name = "validate-rng")]
#[command(about = "Validate XML documents against RELAX NG schemas")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Size of the diagnostics buffer in bytes
    #[arg(long = "buffer-size", global = true)]
    pub buffer_size: Option<usize>,

    /// Output format
    #[arg(long = "format", value_enum, global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(
        short = 'q',
        long = "quiet",
        global = true,
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run session commands, one per line: `load NAME PATH COMPACT`,
    /// `unload NAME`, `validate NAME PATH`
    Script {
        /// Command file; standard input when omitted
        file: Option<PathBuf>,
    },

    /// Validate files against one schema
    Check {
        /// Schema file (`.rnc` is read as compact syntax)
        schema: PathBuf,

        /// Documents to validate
        files: Vec<PathBuf>,

        /// Force compact syntax
        #[arg(long, conflicts_with = "xml")]
        compact: bool,

        /// Force XML syntax
        #[arg(long)]
        xml: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}
