//! Stack CLI - Command line tool for the serverless edge stacks.
//!
//! Commands:
//! - `stack synth` - Render every stack template
//! - `stack build` - Compile and archive the function code
//! - `stack deploy` - Upload function code, provision the stacks in order and publish the site
//! - `stack destroy` - Empty the assets bucket and delete the stacks
//! - `stack outputs` - List recorded deployments and their outputs
//! - `stack config` - Manage configuration

mod commands;
mod config;
mod context;
mod output;
mod record;

use anyhow::Result;
use clap::{Parser, Subcommand};
use stack_observability::{init_logging, LogFormat};

use commands::{BuildArgs, ConfigArgs, DeployArgs, DestroyArgs, OutputsArgs, SynthArgs};

/// Stack CLI - Synthesize and deploy the serverless edge stacks
#[derive(Parser)]
#[command(name = "stack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Log format (human or json)
    #[arg(long, global = true, default_value_t = LogFormat::Human)]
    log_format: LogFormat,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render every stack template without deploying
    Synth(SynthArgs),

    /// Compile and archive the function code
    Build(BuildArgs),

    /// Provision the stacks and publish the site
    Deploy(DeployArgs),

    /// Delete every stack
    Destroy(DestroyArgs),

    /// List recorded deployments
    Outputs(OutputsArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format)?;

    // Setup output formatting
    let output = output::Output::new(cli.verbose, cli.json);

    // Load config
    let config_path = cli.config.as_deref();
    let ctx = context::Context::load(config_path, output)?;

    let result = match cli.command {
        Commands::Synth(args) => commands::synth::run(args, &ctx).await,
        Commands::Build(args) => commands::build::run(args, &ctx).await,
        Commands::Deploy(args) => commands::deploy::run(args, &ctx).await,
        Commands::Destroy(args) => commands::destroy::run(args, &ctx).await,
        Commands::Outputs(args) => commands::outputs::run(args, &ctx).await,
        Commands::Config(args) => commands::config::run(args, &ctx).await,
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
