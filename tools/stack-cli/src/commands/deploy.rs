//! Deploy the stacks and publish the site.

use anyhow::{Context as _, Result};
use chrono::Utc;
use dialoguer::Confirm;
use stack_graph::{deploy, DeploymentGraph, DryRunProvisioner};

use super::DeployArgs;
use crate::context::Context;
use crate::output::{format_bytes, format_elapsed};
use crate::record::{self, DeploymentRecord};

/// Run the deploy command.
pub async fn run(args: DeployArgs, ctx: &Context) -> Result<()> {
    let config = ctx.config.for_environment(&args.env);

    ctx.output.header(&format!("Deploying to {}", args.env));

    // Step 1: Compose and validate every declaration
    ctx.output.step(1, 4, "Composing deployment graph");
    let graph = DeploymentGraph::compose(&ctx.stack_config(&config))
        .context("Stack declaration is invalid")?;

    ctx.output.kv("Application", &config.app.name);
    ctx.output.kv("Environment", &args.env);
    ctx.output.kv("Region", &config.app.region);
    ctx.output.kv("Stacks", &graph.stack_names().join(" -> "));
    ctx.output.kv("Functions", &graph.api().packages().len().to_string());
    ctx.output.kv(
        "Assets",
        &format!(
            "{} file(s), {}",
            graph.assets().len(),
            format_bytes(graph.assets().total_bytes() as u64)
        ),
    );

    // Step 2: Confirmation
    if !args.yes && !args.dry_run {
        ctx.output.step(2, 4, "Confirming");
        let confirmed = Confirm::new()
            .with_prompt("Proceed with deployment?")
            .default(true)
            .interact()?;

        if !confirmed {
            ctx.output.warn("Deployment cancelled");
            return Ok(());
        }
    } else {
        ctx.output.step(2, 4, "Skipping confirmation");
    }

    // Step 3: Provision in order, then publish
    let spinner = if args.dry_run {
        ctx.output.step(3, 4, "Dry run - nothing is provisioned");
        ctx.output.spinner("Walking the graph...")
    } else {
        ctx.output.step(3, 4, "Uploading function code and provisioning stacks");
        ctx.output.spinner("Deploying...")
    };

    let result = if args.dry_run {
        deploy(&graph, &DryRunProvisioner::new()).await
    } else {
        deploy(&graph, &ctx.provisioner(&config, args.profile.clone())).await
    };

    spinner.finish_and_clear();
    let report = result.context("Deployment failed")?;

    ctx.output.timeline(&report.timeline);
    for (parameter, key) in &report.code_keys {
        ctx.output.debug(&format!("{} = {}", parameter, key));
    }

    // Step 4: Record deployment
    ctx.output.step(4, 4, "Recording deployment");
    let record = DeploymentRecord::new(
        &args.env,
        &config.app.name,
        &report,
        graph.delivery().publication(),
        args.dry_run,
        Utc::now(),
    );
    let dir = ctx.deployments_dir();
    let path = record::save(&dir, &record)?;
    ctx.output
        .debug(&format!("Saved deployment record: {}", path.display()));

    let pruned = record::prune(&dir, &args.env, config.deploy.records_to_keep.max(1))?;
    if pruned > 0 {
        ctx.output
            .debug(&format!("Pruned {} old deployment record(s)", pruned));
    }

    if ctx.output.is_json() {
        ctx.output.json(&record);
        return Ok(());
    }

    if args.dry_run {
        ctx.output.success("Dry run completed successfully");
    } else {
        ctx.output.success("Deployment successful!");
    }
    ctx.output.kv("Deployment", &record.id);
    ctx.output.kv("URL", &record.url);
    ctx.output
        .kv("Elapsed", &format_elapsed(report.timeline.elapsed().as_millis()));

    Ok(())
}
