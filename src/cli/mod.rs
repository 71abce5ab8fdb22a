//! CLI module for the stackctl deployment tool.
//!
//! This module provides the command-line interface and output formatting.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat, Target};
pub use output::OutputFormatter;
