//! List command

use super::CommandContext;
use anyhow::Result;
use clap::Parser;

/// Arguments for the list command
#[derive(Parser, Debug, Clone, Default)]
pub struct ListArgs {
    /// Also list every resource with its type and path
    #[arg(short = 'l', long)]
    pub long: bool,
}

impl ListArgs {
    /// Execute the list command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let (app, _) = ctx.build_app_unchecked()?;

        let stacks: Vec<String> = app
            .stacks()
            .iter()
            .map(|s| format!("{} ({})", s.stack_name(), s.environment()))
            .collect();
        ctx.output.list("Stacks", &stacks);

        if self.long {
            for stack in app.stacks() {
                let rows: Vec<Vec<String>> = stack
                    .to_template()
                    .resources
                    .iter()
                    .map(|(logical_id, resource)| {
                        vec![
                            logical_id.clone(),
                            resource.resource_type.clone(),
                            resource.path().unwrap_or_default().to_string(),
                        ]
                    })
                    .collect();
                println!();
                ctx.output.table(&["Logical ID", "Type", "Path"], &rows);
            }
        }
        Ok(0)
    }
}
