//! Synth command
//!
//! Declares the stack, runs the rule pack and writes the cloud assembly.

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use nagstack::Error;
use std::path::PathBuf;

/// Arguments for the synth command
#[derive(Parser, Debug, Clone, Default)]
pub struct SynthArgs {
    /// Assembly output directory (defaults to `app.output_dir`, or CDK_OUTDIR)
    #[arg(short = 'o', long)]
    pub out: Option<PathBuf>,

    /// Print the template as JSON instead of YAML
    #[arg(long)]
    pub json: bool,

    /// Do not print the template
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

impl SynthArgs {
    /// Execute the synth command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let outdir = self
            .out
            .clone()
            .unwrap_or_else(|| ctx.settings.config.app.output_dir.clone());

        let (mut app, workshop) = ctx.build_app()?;
        let assembly = match app.synth(&outdir) {
            Ok(assembly) => assembly,
            Err(Error::SynthesisBlocked(errors)) => {
                ctx.output.section("Synthesis blocked");
                for error in &errors {
                    ctx.output.error(error);
                }
                ctx.output.warning(&format!(
                    "Reports were written to {}",
                    outdir.display()
                ));
                return Ok(Error::SynthesisBlocked(errors).exit_code());
            }
            Err(e) => return Err(e.into()),
        };

        let artifact = assembly.stack(workshop.id())?;
        if !self.quiet {
            let rendered = if self.json {
                artifact.template.to_json()?
            } else {
                artifact.template.to_yaml()?
            };
            ctx.output.result(&rendered)?;
        }

        ctx.output.info(&format!(
            "Wrote {} files to {}",
            assembly.files.len(),
            assembly.directory.display()
        ));
        ctx.output.success(&format!(
            "{} synthesized to {}",
            artifact.stack_name,
            assembly.path(&artifact.template_file).display()
        ));
        Ok(0)
    }
}
