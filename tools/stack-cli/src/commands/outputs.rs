//! Recorded deployments and their stack outputs.

use anyhow::{bail, Result};

use super::{OutputsArgs, OutputsCommand};
use crate::context::Context;
use crate::output::status_badge;
use crate::record::{self, DeploymentRecord};

/// Run the outputs command.
pub async fn run(args: OutputsArgs, ctx: &Context) -> Result<()> {
    match args.command {
        Some(OutputsCommand::List) | None => list_deployments(&args, ctx).await,
        Some(OutputsCommand::Show { ref id }) => {
            let Some(record) = record::find(&ctx.deployments_dir(), id)? else {
                bail!("Deployment '{}' not found", id);
            };
            show_deployment(&record, ctx);
            Ok(())
        }
        Some(OutputsCommand::Latest) => {
            let records = record::load_all(&ctx.deployments_dir(), args.env.as_deref())?;
            let Some(record) = records.first() else {
                bail!("No deployments recorded. Run `stack deploy` first.");
            };
            show_deployment(record, ctx);
            Ok(())
        }
    }
}

async fn list_deployments(args: &OutputsArgs, ctx: &Context) -> Result<()> {
    let mut records = record::load_all(&ctx.deployments_dir(), args.env.as_deref())?;

    if let Some(limit) = args.limit {
        records.truncate(limit);
    }

    if ctx.output.is_json() {
        ctx.output.json(&records);
        return Ok(());
    }

    ctx.output.header("Deployments");

    if records.is_empty() {
        ctx.output.info("No deployments found.");
        ctx.output.info("Run `stack deploy` to create your first deployment.");
        return Ok(());
    }

    let widths = [32, 20, 10, 40];
    ctx.output
        .table_row(&["ID", "TIMESTAMP", "STATUS", "URL"], &widths);
    ctx.output.info(&"-".repeat(108));

    for record in &records {
        let timestamp = record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
        let status = status_badge(&record.status);
        ctx.output
            .table_row(&[&record.id, &timestamp, &status, &record.url], &widths);
    }

    ctx.output.info("");
    ctx.output
        .info(&format!("Total: {} deployment(s)", records.len()));

    Ok(())
}

fn show_deployment(record: &DeploymentRecord, ctx: &Context) {
    if ctx.output.is_json() {
        ctx.output.json(record);
        return;
    }

    ctx.output.header(&format!("Deployment: {}", record.id));
    ctx.output.kv("Environment", &record.environment);
    ctx.output.kv("Application", &record.app_name);
    ctx.output.kv(
        "Deployed",
        &record.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    ctx.output.kv("Status", &status_badge(&record.status));
    ctx.output.kv("URL", &record.url);
    ctx.output.kv(
        "Site",
        &format!("{} file(s), {}", record.file_count, record.content_hash),
    );

    for (stack, outputs) in &record.stacks {
        ctx.output.info("");
        ctx.output.info(stack);
        for (key, value) in outputs {
            ctx.output.kv(key, value);
        }
    }
}
