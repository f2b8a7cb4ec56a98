//! Render the stack templates.

use anyhow::{Context as _, Result};
use serde_json::json;
use stack_graph::DeploymentGraph;

use super::SynthArgs;
use crate::context::Context;
use crate::output::format_bytes;

/// Run the synth command.
pub async fn run(args: SynthArgs, ctx: &Context) -> Result<()> {
    let config = ctx.config.for_environment(&args.env);

    ctx.output.header(&format!("Synthesizing {}", config.app.name));

    ctx.output.step(1, 2, "Composing deployment graph");
    let graph = DeploymentGraph::compose(&ctx.stack_config(&config))
        .context("Stack declaration is invalid")?;

    let out = match args.out {
        Some(ref out) => ctx.resolve_path(out),
        None => ctx.template_dir(&config),
    };

    ctx.output.step(2, 2, "Writing templates");
    let written = graph.write_templates(&out)?;
    let stacks = graph.synthesize();

    if ctx.output.is_json() {
        ctx.output.json(&json!({
            "out": out,
            "stacks": stacks,
            "publication": graph.delivery().publication(),
        }));
        return Ok(());
    }

    for stack in &stacks {
        ctx.output.list_item(&stack.name);
        ctx.output.kv("Region", &stack.region);
        if !stack.dependencies.is_empty() {
            ctx.output.kv("Depends on", &stack.dependencies.join(", "));
        }
        ctx.output.kv("Outputs", &stack.outputs.join(", "));
    }

    let assets = graph.assets();
    ctx.output.info("");
    ctx.output.kv(
        "Assets",
        &format!(
            "{} file(s), {}",
            assets.len(),
            format_bytes(assets.total_bytes() as u64)
        ),
    );
    ctx.output
        .kv("Content hash", &graph.delivery().publication().content_hash);

    ctx.output.success(&format!(
        "Wrote {} file(s) to {}",
        written.len(),
        out.display()
    ));

    Ok(())
}
