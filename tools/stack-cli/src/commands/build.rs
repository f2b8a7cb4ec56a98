//! Build and archive the function code.

use anyhow::{bail, Context as _, Result};
use serde_json::json;
use stack_graph::DeploymentGraph;

use super::BuildArgs;
use crate::context::Context;
use crate::output::format_bytes;

/// Run the build command.
pub async fn run(args: BuildArgs, ctx: &Context) -> Result<()> {
    let config = ctx.config.for_environment(&args.env);

    ctx.output.header("Building functions");

    ctx.output.step(1, 2, "Composing deployment graph");
    let graph = DeploymentGraph::compose(&ctx.stack_config(&config))
        .context("Stack declaration is invalid")?;

    let mut packages = graph.api().packages();
    if let Some(ref only) = args.function {
        packages.retain(|p| &p.endpoint_id == only);
        if packages.is_empty() {
            bail!("No function named '{}'", only);
        }
    }

    let out = match args.out {
        Some(ref out) => ctx.resolve_path(out),
        None => ctx.template_dir(&config),
    };
    let builder = ctx.function_builder(&config, &out);
    ctx.output.kv("Target", builder.target());

    ctx.output
        .step(2, 2, &format!("Compiling {} function(s)", packages.len()));
    let mut built = Vec::with_capacity(packages.len());
    for package in &packages {
        let spinner = ctx.output.spinner(&format!("Building {}...", package.endpoint_id));
        let result = builder.build(package).await;
        spinner.finish_and_clear();
        built.push(result.with_context(|| format!("Failed to build {}", package.endpoint_id))?);
    }

    if ctx.output.is_json() {
        let functions: Vec<_> = built
            .iter()
            .map(|f| {
                json!({
                    "function": f.endpoint_id,
                    "archive": f.archive,
                    "sha256": f.sha256,
                    "bytes": f.bytes,
                    "key": f.key,
                })
            })
            .collect();
        ctx.output.json(&json!({ "out": out, "functions": functions }));
        return Ok(());
    }

    for function in &built {
        ctx.output.list_item(&function.endpoint_id);
        ctx.output.kv("Archive", &function.archive.display().to_string());
        ctx.output.kv("Size", &format_bytes(function.bytes));
        ctx.output.kv("Key", &function.key);
    }
    ctx.output.success("Build completed");

    Ok(())
}
