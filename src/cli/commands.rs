//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::planner::DiffScope;

/// stackctl - Dependency-ordered deployment of multi-stack projects.
#[derive(Parser, Debug)]
#[command(name = "stackctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "STACKCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Approve every confirmation prompt.
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Context and optional stack a command operates on.
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Context (environment) name.
    pub context: String,

    /// Stack name (defaults to every stack in the context).
    pub stack: Option<String>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or update stacks in dependency order.
    Deploy {
        /// Target context and stack.
        #[command(flatten)]
        target: Target,

        /// Seconds to wait for each stack to settle.
        #[arg(long, default_value = "3600")]
        timeout: u64,
    },

    /// Show what a deployment would change.
    Diff {
        /// Target context and stack.
        #[command(flatten)]
        target: Target,

        /// Compare templates and resource changes only.
        #[arg(long, conflicts_with_all = ["parameters", "tags"])]
        template: bool,

        /// Compare parameters only.
        #[arg(long, conflicts_with = "tags")]
        parameters: bool,

        /// Compare tags only.
        #[arg(long)]
        tags: bool,
    },

    /// Delete stacks in reverse dependency order.
    Delete {
        /// Target context and stack.
        #[command(flatten)]
        target: Target,

        /// Seconds to wait for each stack to settle.
        #[arg(long, default_value = "3600")]
        timeout: u64,
    },

    /// Show the deployed state of stacks.
    Describe {
        /// Target context and stack.
        #[command(flatten)]
        target: Target,
    },

    /// Validate configuration and templates.
    Validate {
        /// Target context and stack.
        #[command(flatten)]
        target: Target,
    },

    /// List contexts and stacks.
    List,
}

impl Commands {
    /// Returns the diff scope selected by the `diff` flags.
    #[must_use]
    pub const fn diff_scope(template: bool, parameters: bool, tags: bool) -> DiffScope {
        match (template, parameters, tags) {
            (true, _, _) => DiffScope::TemplateOnly,
            (_, true, _) => DiffScope::ParametersOnly,
            (_, _, true) => DiffScope::TagsOnly,
            _ => DiffScope::Full,
        }
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
