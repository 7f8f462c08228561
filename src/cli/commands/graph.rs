//! Graph command

use super::CommandContext;
use anyhow::Result;
use clap::Parser;

/// Arguments for the graph command
#[derive(Parser, Debug, Clone, Default)]
pub struct GraphArgs {
    /// Print the deployment order instead of the DOT graph
    #[arg(long)]
    pub order: bool,
}

impl GraphArgs {
    /// Execute the graph command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let (app, workshop) = ctx.build_app_unchecked()?;
        let graph = workshop.stack(&app)?.dependency_graph()?;

        if self.order {
            ctx.output.result(&graph.get_deployment_order()?.join("\n"))?;
        } else {
            ctx.output.result(&graph.to_dot())?;
        }
        ctx.output.info(&format!(
            "{} resources, {} dependencies",
            graph.node_count(),
            graph.edge_count()
        ));
        Ok(0)
    }
}
