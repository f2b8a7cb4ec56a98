//! Configuration management commands.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Result};
use stack_core::GLOBAL_EDGE_REGION;
use stack_graph::DeploymentGraph;

use super::{ConfigArgs, ConfigCommand};
use crate::config::{generate_default_config, CliConfig, CONFIG_FILES};
use crate::context::Context;

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(ctx).await,
        ConfigCommand::Get { key } => get_config(&key, ctx).await,
        ConfigCommand::Set { key, value } => set_config(&key, &value, ctx).await,
        ConfigCommand::Init { force } => init_config(force, ctx).await,
        ConfigCommand::Validate => validate_config(ctx).await,
    }
}

async fn show_config(ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    ctx.output.header("Current Configuration");
    match ctx.config_path {
        Some(ref path) => ctx.output.kv("file", &path.display().to_string()),
        None => ctx.output.kv("file", "(defaults)"),
    }

    let config = &ctx.config;

    ctx.output.info("");
    ctx.output.info("[app]");
    ctx.output.kv("name", &config.app.name);
    ctx.output.kv("region", &config.app.region);
    if let Some(ref account) = config.app.account {
        ctx.output.kv("account", account);
    }

    ctx.output.info("");
    ctx.output.info("[security]");
    ctx.output.kv("web_acl_name", &config.security.web_acl_name);
    for rule in &config.security.rules {
        ctx.output.list_item(&format!(
            "{} (priority {}, limit {}, {})",
            rule.name, rule.priority, rule.rate_limit, rule.action
        ));
    }

    ctx.output.info("");
    ctx.output.info("[api]");
    ctx.output.kv("api_name", &config.api.api_name);
    if let Some(ref bucket) = config.api.package_bucket {
        ctx.output.kv("package_bucket", bucket);
    }
    for route in &config.api.routes {
        ctx.output
            .list_item(&format!("{} {} -> {}", route.method, route.path, route.target));
    }

    ctx.output.info("");
    ctx.output.info("[delivery]");
    ctx.output
        .kv("site_dir", &config.delivery.site_dir.display().to_string());
    ctx.output
        .kv("default_root_object", &config.delivery.default_root_object);
    if let Some(ref doc) = config.delivery.error_document {
        ctx.output.kv("error_document", doc);
    }
    ctx.output.kv("price_class", &config.delivery.price_class);
    ctx.output
        .kv("api_path_pattern", &config.delivery.api_path_pattern);
    ctx.output.kv(
        "invalidation_paths",
        &config.delivery.invalidation_paths.join(", "),
    );

    ctx.output.info("");
    ctx.output.info("[build]");
    ctx.output.kv("target", &config.build.target);
    ctx.output.kv("cargo", &config.build.cargo);
    if !config.build.cargo_args.is_empty() {
        ctx.output.kv("cargo_args", &config.build.cargo_args.join(" "));
    }

    ctx.output.info("");
    ctx.output.info("[deploy]");
    if let Some(ref profile) = config.deploy.profile {
        ctx.output.kv("profile", profile);
    }
    ctx.output
        .kv("template_dir", &config.deploy.template_dir.display().to_string());
    ctx.output
        .kv("records_to_keep", &config.deploy.records_to_keep.to_string());

    if !config.environments.is_empty() {
        ctx.output.info("");
        ctx.output.info("Environments:");
        let mut names: Vec<&String> = config.environments.keys().collect();
        names.sort();
        for env in names {
            ctx.output.list_item(env);
        }
    }

    Ok(())
}

async fn get_config(key: &str, ctx: &Context) -> Result<()> {
    let value = get_config_value(&ctx.config, key)?;

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "key": key, "value": value }));
    } else {
        println!("{}", value);
    }

    Ok(())
}

async fn set_config(key: &str, value: &str, ctx: &Context) -> Result<()> {
    let Some(ref config_path) = ctx.config_path else {
        bail!("No config file found. Run `stack config init` to create one.");
    };

    // Reload so values from the file, not merged defaults, are rewritten
    let mut config = CliConfig::load(config_path)?;
    set_config_value(&mut config, key, value)?;
    config.save(config_path)?;

    ctx.output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

async fn init_config(force: bool, ctx: &Context) -> Result<()> {
    let config_path = ctx.cwd.join(CONFIG_FILES[0]);

    if config_path.exists() && !force {
        bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let name = ctx
        .cwd
        .file_name()
        .and_then(|n| n.to_str())
        .map(sanitize_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "edge-app".to_string());

    fs::write(&config_path, generate_default_config(&name))?;

    ctx.output
        .success(&format!("Created: {}", config_path.display()));

    Ok(())
}

async fn validate_config(ctx: &Context) -> Result<()> {
    ctx.output.header("Validating configuration");

    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    if ctx.config_path.is_none() {
        warnings.push("no config file found, validating defaults".to_string());
    }

    let mut environments: Vec<&str> = ctx.config.environments.keys().map(String::as_str).collect();
    environments.sort_unstable();

    let base = std::iter::once(None);
    for env in base.chain(environments.into_iter().map(Some)) {
        let config = match env {
            Some(env) => ctx.config.for_environment(env),
            None => ctx.config.clone(),
        };
        let label = env.map_or_else(|| "base".to_string(), |e| format!("environments.{}", e));

        if config.deploy.records_to_keep == 0 {
            warnings.push(format!(
                "{}: deploy.records_to_keep is 0, the newest record is always kept",
                label
            ));
        }

        if let Err(e) = DeploymentGraph::compose(&ctx.stack_config(&config)) {
            errors.push(format!("{}: {}", label, e));
        }
    }

    // Print results
    if errors.is_empty() && warnings.is_empty() {
        ctx.output.success("Configuration is valid");
        return Ok(());
    }

    for error in &errors {
        ctx.output.error(&format!("Error: {}", error));
    }

    for warning in &warnings {
        ctx.output.warn(&format!("Warning: {}", warning));
    }

    if !errors.is_empty() {
        bail!("Configuration has {} error(s)", errors.len());
    }

    ctx.output.success("Configuration is valid (with warnings)");

    Ok(())
}

fn get_config_value(config: &CliConfig, key: &str) -> Result<String> {
    let parts: Vec<&str> = key.split('.').collect();
    let quoted = |s: &str| format!("\"{}\"", s);
    let optional = |s: &Option<String>| s.as_deref().map(quoted).unwrap_or_else(|| "null".to_string());

    match parts.as_slice() {
        ["app", "name"] => Ok(quoted(&config.app.name)),
        ["app", "region"] => Ok(quoted(&config.app.region)),
        ["app", "account"] => Ok(optional(&config.app.account)),
        ["security", "web_acl_name"] => Ok(quoted(&config.security.web_acl_name)),
        ["api", "api_name"] => Ok(quoted(&config.api.api_name)),
        ["api", "package_bucket"] => Ok(optional(&config.api.package_bucket)),
        ["delivery", "site_dir"] => Ok(quoted(&config.delivery.site_dir.display().to_string())),
        ["delivery", "default_root_object"] => Ok(quoted(&config.delivery.default_root_object)),
        ["delivery", "error_document"] => Ok(optional(&config.delivery.error_document)),
        ["delivery", "price_class"] => Ok(quoted(&config.delivery.price_class)),
        ["delivery", "api_path_pattern"] => Ok(quoted(&config.delivery.api_path_pattern)),
        ["delivery", "retain_store"] => Ok(config.delivery.retain_store.to_string()),
        ["build", "target"] => Ok(quoted(&config.build.target)),
        ["build", "cargo"] => Ok(quoted(&config.build.cargo)),
        ["deploy", "profile"] => Ok(optional(&config.deploy.profile)),
        ["deploy", "program"] => Ok(quoted(&config.deploy.program)),
        ["deploy", "template_dir"] => Ok(quoted(&config.deploy.template_dir.display().to_string())),
        ["deploy", "records_to_keep"] => Ok(config.deploy.records_to_keep.to_string()),
        _ => bail!("Unknown config key: {}", key),
    }
}

fn set_config_value(config: &mut CliConfig, key: &str, value: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["app", "name"] => config.app.name = value.to_string(),
        ["app", "region"] => {
            if value != GLOBAL_EDGE_REGION {
                bail!(
                    "app.region is fixed to {}: the distribution imports the firewall, \
                     which only deploys there",
                    GLOBAL_EDGE_REGION
                );
            }
            config.app.region = value.to_string()
        }
        ["app", "account"] => config.app.account = Some(value.to_string()),
        ["security", "web_acl_name"] => config.security.web_acl_name = value.to_string(),
        ["api", "api_name"] => config.api.api_name = value.to_string(),
        ["api", "package_bucket"] => config.api.package_bucket = Some(value.to_string()),
        ["delivery", "site_dir"] => config.delivery.site_dir = PathBuf::from(value),
        ["delivery", "default_root_object"] => {
            config.delivery.default_root_object = value.to_string()
        }
        ["delivery", "error_document"] => config.delivery.error_document = Some(value.to_string()),
        ["delivery", "price_class"] => config.delivery.price_class = value.to_string(),
        ["delivery", "api_path_pattern"] => config.delivery.api_path_pattern = value.to_string(),
        ["delivery", "retain_store"] => config.delivery.retain_store = value.parse()?,
        ["build", "target"] => config.build.target = value.to_string(),
        ["build", "cargo"] => config.build.cargo = value.to_string(),
        ["deploy", "profile"] => config.deploy.profile = Some(value.to_string()),
        ["deploy", "program"] => config.deploy.program = value.to_string(),
        ["deploy", "template_dir"] => config.deploy.template_dir = PathBuf::from(value),
        ["deploy", "records_to_keep"] => config.deploy.records_to_keep = value.parse()?,
        _ => bail!("Unknown or read-only config key: {}", key),
    }

    Ok(())
}

/// Lowercase alphanumerics and dashes, as stack names allow.
fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| c.to_ascii_lowercase())
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}
