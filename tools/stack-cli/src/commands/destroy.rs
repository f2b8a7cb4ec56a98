//! Delete the deployed stacks.

use anyhow::{Context as _, Result};
use dialoguer::Confirm;
use serde_json::json;
use stack_graph::{destroy, DeploymentGraph, DryRunProvisioner};

use super::DestroyArgs;
use crate::context::Context;
use crate::output::format_elapsed;

/// Run the destroy command.
pub async fn run(args: DestroyArgs, ctx: &Context) -> Result<()> {
    let config = ctx.config.for_environment(&args.env);

    ctx.output.header(&format!("Destroying {}", args.env));

    ctx.output.step(1, 3, "Composing deployment graph");
    let graph = DeploymentGraph::compose(&ctx.stack_config(&config))
        .context("Stack declaration is invalid")?;

    let order: Vec<&str> = graph.stack_names().into_iter().rev().collect();
    ctx.output.kv("Application", &config.app.name);
    ctx.output.kv("Stacks", &order.join(" -> "));
    if graph.delivery().store().retain_on_teardown {
        ctx.output.kv("Assets bucket", "retained");
    } else {
        ctx.output.kv("Assets bucket", "emptied and deleted");
    }

    if !args.yes && !args.dry_run {
        ctx.output.step(2, 3, "Confirming");
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete every stack of {}?", config.app.name))
            .default(false)
            .interact()?;

        if !confirmed {
            ctx.output.warn("Teardown cancelled");
            return Ok(());
        }
    } else {
        ctx.output.step(2, 3, "Skipping confirmation");
    }

    let spinner = if args.dry_run {
        ctx.output.step(3, 3, "Dry run - nothing is deleted");
        ctx.output.spinner("Walking the graph...")
    } else {
        ctx.output.step(3, 3, "Deleting stacks");
        ctx.output.spinner("Destroying...")
    };

    let result = if args.dry_run {
        destroy(&graph, &DryRunProvisioner::new()).await
    } else {
        destroy(&graph, &ctx.provisioner(&config, args.profile.clone())).await
    };

    spinner.finish_and_clear();
    let report = result.context("Teardown failed")?;

    if ctx.output.is_json() {
        ctx.output.json(&json!({
            "environment": args.env,
            "dry_run": args.dry_run,
            "deleted": report.deleted,
            "skipped": report.skipped,
            "emptied": report.emptied,
        }));
        return Ok(());
    }

    ctx.output.timeline(&report.timeline);
    for bucket in &report.emptied {
        ctx.output.kv("Emptied", bucket);
    }
    for stack in &report.skipped {
        ctx.output.kv("Not deployed", stack);
    }

    if report.deleted.is_empty() {
        ctx.output.info("Nothing to delete");
    } else if args.dry_run {
        ctx.output.success("Dry run completed successfully");
    } else {
        ctx.output
            .success(&format!("Deleted {} stack(s)", report.deleted.len()));
    }
    ctx.output
        .kv("Elapsed", &format_elapsed(report.timeline.elapsed().as_millis()));

    Ok(())
}
