//! Subcommands module for nagstack CLI
//!
//! This module contains all the subcommand implementations.

pub mod graph;
pub mod list;
pub mod nag;
pub mod synth;

use crate::cli::output::OutputFormatter;
use crate::cli::Cli;
use nagstack::config::{Config, Settings};
use nagstack::construct::App;
use nagstack::workshop::{build_app, WorkshopStack};

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration plus environment-sourced values
    pub settings: Settings,
    /// Output formatter
    pub output: OutputFormatter,
    /// Resolved once for both output and log lines
    pub use_color: bool,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &Cli, config: Config) -> Self {
        let use_color = Self::resolve_color(cli, &config);
        colored::control::set_override(use_color);
        let output = OutputFormatter::new(use_color, cli.verbosity());

        Self {
            settings: Settings::from_env(config),
            output,
            use_color,
        }
    }

    /// `--no-color` and `colors.enabled` (cleared by `NO_COLOR`) both disable color.
    pub fn resolve_color(cli: &Cli, config: &Config) -> bool {
        !cli.no_color && config.colors.enabled
    }

    /// Declare the app as configured.
    pub fn build_app(&self) -> nagstack::Result<(App, WorkshopStack)> {
        build_app(&self.settings)
    }

    /// Declare the app without registering the rule pack.
    pub fn build_app_unchecked(&self) -> nagstack::Result<(App, WorkshopStack)> {
        let mut settings = self.settings.clone();
        settings.config.nag.enabled = false;
        build_app(&settings)
    }
}
