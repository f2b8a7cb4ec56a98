//! CLI configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stack_api::ApiConfig;
use stack_delivery::DeliveryConfig;
use stack_graph::{AppConfig, StackConfig, DEFAULT_BUILD_TARGET};
use stack_security::SecurityConfig;

/// File names searched for, in order, in each directory.
pub const CONFIG_FILES: [&str; 3] = ["stack.toml", ".stack.toml", "stack.json"];

/// CLI configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Application naming and placement.
    #[serde(default)]
    pub app: AppConfig,

    /// Edge filter settings.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Compute and front door settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Bucket and distribution settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Function build configuration.
    #[serde(default)]
    pub build: BuildConfig,

    /// Deployment configuration.
    #[serde(default)]
    pub deploy: DeployConfig,

    /// Environment-specific overrides.
    #[serde(default)]
    pub environments: HashMap<String, EnvironmentConfig>,
}

impl CliConfig {
    /// Load config from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        if is_json(path) {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
        }
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Get environment-specific config.
    pub fn for_environment(&self, env: &str) -> CliConfig {
        let mut config = self.clone();

        if let Some(env_config) = self.environments.get(env) {
            if let Some(ref app) = env_config.app {
                config.app = app.clone();
            }
            if let Some(ref delivery) = env_config.delivery {
                config.delivery = delivery.clone();
            }
            if let Some(ref deploy) = env_config.deploy {
                config.deploy = deploy.clone();
            }
        }

        config
    }

    /// Settings of the three units.
    pub fn stack_config(&self) -> StackConfig {
        StackConfig {
            app: self.app.clone(),
            security: self.security.clone(),
            api: self.api.clone(),
            delivery: self.delivery.clone(),
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

/// How function crates are compiled before upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Compilation target of Rust functions.
    #[serde(default = "default_build_target")]
    pub target: String,

    /// Cargo executable (for example `cross`).
    #[serde(default = "default_cargo")]
    pub cargo: String,

    /// Extra cargo arguments.
    #[serde(default)]
    pub cargo_args: Vec<String>,
}

fn default_build_target() -> String {
    DEFAULT_BUILD_TARGET.to_string()
}

fn default_cargo() -> String {
    "cargo".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            target: default_build_target(),
            cargo: default_cargo(),
            cargo_args: Vec::new(),
        }
    }
}

/// Deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Credentials profile passed to the provider CLI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Where synthesized templates are written.
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,

    /// Provider CLI executable.
    #[serde(default = "default_program")]
    pub program: String,

    /// Number of deployment records to keep per environment.
    #[serde(default = "default_records_to_keep")]
    pub records_to_keep: usize,
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("stack.out")
}

fn default_program() -> String {
    "aws".to_string()
}

fn default_records_to_keep() -> usize {
    10
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            profile: None,
            template_dir: default_template_dir(),
            program: default_program(),
            records_to_keep: default_records_to_keep(),
        }
    }
}

/// Environment-specific configuration overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<AppConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryConfig>,

    /// Deploy config override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployConfig>,
}

/// Generate a default stack.toml config file.
pub fn generate_default_config(name: &str) -> String {
    format!(
        r#"# Serverless edge stack configuration

[app]
name = "{name}"
# Fixed: the distribution imports the firewall, which lives in us-east-1.
region = "us-east-1"

[security]
web_acl_name = "{name}-web-acl"

[[security.rules]]
name = "RateLimitRule"
priority = 1
rate_limit = 2000

[api]
api_name = "{name}-http-api"
# package_bucket = "{name}-packages"

[delivery]
site_dir = "site"
default_root_object = "index.html"
api_path_pattern = "/api/*"

[build]
target = "x86_64-unknown-linux-musl"
# cargo = "cross"

[deploy]
template_dir = "stack.out"
# profile = "default"
records_to_keep = 10

[environments.staging.app]
name = "{name}-staging"
"#,
        name = name
    )
}
