//! Nag command
//!
//! Runs the AwsSolutions checks without writing an assembly.

use super::CommandContext;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use nagstack::nag::{NagPack, NagPackOptions, ReportFormat};

/// Report format for the nag command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum NagFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// JSON report
    Json,
    /// CSV report
    Csv,
}

impl From<NagFormat> for ReportFormat {
    fn from(format: NagFormat) -> Self {
        match format {
            NagFormat::Text => ReportFormat::Text,
            NagFormat::Json => ReportFormat::Json,
            NagFormat::Csv => ReportFormat::Csv,
        }
    }
}

/// Arguments for the nag command
#[derive(Parser, Debug, Clone, Default)]
pub struct NagArgs {
    /// Report format
    #[arg(long, short = 'f', value_enum, default_value_t = NagFormat::Text)]
    pub format: NagFormat,
}

impl NagArgs {
    /// Execute the nag command; exits with 1 when unsuppressed errors remain
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let (mut app, workshop) = ctx.build_app_unchecked()?;
        let mut pack = NagPack::aws_solutions(NagPackOptions::from(&ctx.settings.config.nag));
        app.apply_aspect(&mut pack)?;

        let stack = workshop.stack(&app)?;
        let report = pack.report(stack);
        ctx.output.result(&report.render(self.format.into())?)?;

        let blocking: Vec<_> = report.blocking_lines().collect();
        if blocking.is_empty() {
            return Ok(0);
        }
        for line in &blocking {
            ctx.output
                .error(&format!("{} on {}: {}", line.rule_id, line.resource_id, line.rule_info));
        }
        Ok(1)
    }
}
