//! CLI command implementations.

pub mod build;
pub mod config;
pub mod deploy;
pub mod destroy;
pub mod outputs;
pub mod synth;

use clap::{Args, Subcommand};

/// Arguments for the synth command.
#[derive(Args)]
pub struct SynthArgs {
    /// Environment whose overrides apply.
    #[arg(short, long, default_value = "production")]
    pub env: String,

    /// Output directory (default: deploy.template_dir).
    #[arg(short, long)]
    pub out: Option<String>,
}

/// Arguments for the build command.
#[derive(Args)]
pub struct BuildArgs {
    /// Environment whose overrides apply.
    #[arg(short, long, default_value = "production")]
    pub env: String,

    /// Build only this function.
    #[arg(short, long)]
    pub function: Option<String>,

    /// Output directory (default: deploy.template_dir).
    #[arg(short, long)]
    pub out: Option<String>,
}

/// Arguments for the deploy command.
#[derive(Args)]
pub struct DeployArgs {
    /// Environment to deploy to.
    #[arg(short, long, default_value = "production")]
    pub env: String,

    /// Credentials profile (overrides deploy.profile).
    #[arg(long)]
    pub profile: Option<String>,

    /// Skip confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,

    /// Dry run (don't actually deploy).
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the destroy command.
#[derive(Args)]
pub struct DestroyArgs {
    /// Environment to tear down.
    #[arg(short, long, default_value = "production")]
    pub env: String,

    /// Credentials profile (overrides deploy.profile).
    #[arg(long)]
    pub profile: Option<String>,

    /// Skip confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,

    /// Dry run (don't actually delete).
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the outputs command.
#[derive(Args)]
pub struct OutputsArgs {
    #[command(subcommand)]
    pub command: Option<OutputsCommand>,

    /// Only list deployments of this environment.
    #[arg(short, long)]
    pub env: Option<String>,

    /// Show only the last N deployments.
    #[arg(short, long)]
    pub limit: Option<usize>,
}

#[derive(Subcommand)]
pub enum OutputsCommand {
    /// List recorded deployments.
    List,
    /// Show the stack outputs of one deployment.
    Show {
        /// Deployment id.
        id: String,
    },
    /// Show the stack outputs of the newest deployment.
    Latest,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,
    /// Get a config value.
    Get {
        /// Config key (dot-separated).
        key: String,
    },
    /// Set a config value.
    Set {
        /// Config key (dot-separated).
        key: String,
        /// Value to set.
        value: String,
    },
    /// Initialize a new config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate the config file.
    Validate,
}
