//! CLI module for nagstack
//!
//! This module provides the command-line interface for nagstack,
//! including argument parsing and subcommand handling.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// nagstack - declare, check and synthesize the workshop stack
#[derive(Parser, Debug, Clone)]
#[command(name = "nagstack")]
#[command(author = "Nagstack Contributors")]
#[command(version)]
#[command(about = "Synthesizes a single-instance AWS workshop stack checked against AwsSolutions rules", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute (defaults to `synth`)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "NAGSTACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Write the cloud assembly
    Synth(commands::synth::SynthArgs),

    /// Run the AwsSolutions checks and print the report
    Nag(commands::nag::NagArgs),

    /// Print the resource dependency graph in DOT format
    Graph(commands::graph::GraphArgs),

    /// List stacks and their resources
    List(commands::list::ListArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// The command to run; `synth` when none was given.
    pub fn command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Synth(commands::synth::SynthArgs::default()))
    }
}
