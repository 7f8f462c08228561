//! nagstack - the workshop stack as a command-line app
//!
//! This is the main entry point for the nagstack CLI. Without a subcommand it
//! behaves like a CDK app: it reads `SSH_PUB_KEY`, `CDK_DEFAULT_ACCOUNT` and
//! `CDK_DEFAULT_REGION`, declares the stack and writes the cloud assembly.

mod cli;

use anyhow::Result;
use cli::commands::CommandContext;
use cli::{Cli, Commands};
use nagstack::config::Config;

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            e.downcast_ref::<nagstack::Error>()
                .map(nagstack::Error::exit_code)
                .unwrap_or(1)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration; a broken config file is fatal
    let config = Config::load(cli.config.as_ref())?;

    let mut ctx = CommandContext::new(&cli, config);
    nagstack::logging::init(cli.verbosity(), &ctx.settings.config.logging, ctx.use_color)?;

    // Display version if verbose
    if cli.verbosity() >= 2 {
        eprintln!("nagstack v{} by {}", VERSION, AUTHORS);
    }

    let exit_code = match cli.command() {
        Commands::Synth(args) => args.execute(&mut ctx)?,
        Commands::Nag(args) => args.execute(&mut ctx)?,
        Commands::Graph(args) => args.execute(&mut ctx)?,
        Commands::List(args) => args.execute(&mut ctx)?,
    };
    Ok(exit_code)
}
