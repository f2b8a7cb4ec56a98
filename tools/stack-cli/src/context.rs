//! CLI execution context.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use stack_graph::{CliProvisioner, FunctionBuilder, StackConfig};

use crate::config::{CliConfig, CONFIG_FILES};
use crate::output::Output;

/// Execution context for CLI commands.
pub struct Context {
    /// CLI configuration.
    pub config: CliConfig,
    /// File the configuration was loaded from, if any.
    pub config_path: Option<PathBuf>,
    /// Output handler.
    pub output: Output,
    /// Working directory.
    pub cwd: PathBuf,
}

impl Context {
    /// Load context from config file.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let (config, config_path) = if let Some(path) = config_path {
            let path = resolve(&cwd, path);
            (CliConfig::load(&path)?, Some(path))
        } else {
            // Try to find config in current directory or parent directories
            match find_config(&cwd) {
                Some((config, path)) => (config, Some(path)),
                None => (CliConfig::default(), None),
            }
        };

        if let Some(ref path) = config_path {
            output.debug(&format!("Using config: {}", path.display()));
        }

        Ok(Self {
            config,
            config_path,
            output,
            cwd,
        })
    }

    /// Directory relative paths in the config are resolved against.
    pub fn project_dir(&self) -> PathBuf {
        self.config_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.cwd.clone())
    }

    /// Unit settings for `config`, with the site directory made absolute.
    pub fn stack_config(&self, config: &CliConfig) -> StackConfig {
        let mut stack = config.stack_config();
        stack.delivery.site_dir = resolve(&self.project_dir(), &stack.delivery.site_dir);
        stack
    }

    /// Where templates are written for `config`.
    pub fn template_dir(&self, config: &CliConfig) -> PathBuf {
        resolve(&self.project_dir(), &config.deploy.template_dir)
    }

    /// Builder compiling function crates from the project into `out_dir`.
    pub fn function_builder(&self, config: &CliConfig, out_dir: impl Into<PathBuf>) -> FunctionBuilder {
        FunctionBuilder::new(self.project_dir(), out_dir)
            .with_target(config.build.target.clone())
            .with_cargo(config.build.cargo.clone())
            .with_cargo_args(config.build.cargo_args.clone())
    }

    /// Provisioner driving the provider CLI for `config`. A `profile` given on
    /// the command line wins over `deploy.profile`.
    pub fn provisioner(&self, config: &CliConfig, profile: Option<String>) -> CliProvisioner {
        let template_dir = self.template_dir(config);
        let mut provisioner = CliProvisioner::new(&template_dir)
            .with_program(config.deploy.program.clone())
            .with_builder(self.function_builder(config, template_dir));
        if let Some(profile) = profile.or_else(|| config.deploy.profile.clone()) {
            provisioner = provisioner.with_profile(profile);
        }
        if let Some(ref account) = config.app.account {
            provisioner = provisioner.with_account(account.clone());
        }
        provisioner
    }

    /// Get the deployment records directory.
    pub fn deployments_dir(&self) -> PathBuf {
        self.project_dir().join(".stack").join("deployments")
    }

    /// Resolve a path relative to the working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        resolve(&self.cwd, path)
    }
}

fn resolve(base: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Find config file in directory tree.
fn find_config(start: &Path) -> Option<(CliConfig, PathBuf)> {
    let mut current = start.to_path_buf();
    loop {
        for name in CONFIG_FILES {
            let config_path = current.join(name);
            if config_path.exists() {
                if let Ok(config) = CliConfig::load(&config_path) {
                    return Some((config, config_path));
                }
            }
        }

        if !current.pop() {
            break;
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_config_in_parent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stack.toml"), "[app]\nname = \"found\"\n").unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, path) = find_config(&nested).unwrap();
        assert_eq!(config.app.name, "found");
        assert_eq!(path, dir.path().join("stack.toml"));
    }

    #[test]
    fn test_paths_relative_to_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context {
            config: CliConfig::default(),
            config_path: Some(dir.path().join("stack.toml")),
            output: Output::new(false, true),
            cwd: PathBuf::from("/elsewhere"),
        };

        let stack = ctx.stack_config(&ctx.config);
        assert_eq!(stack.delivery.site_dir, dir.path().join("site"));
        assert_eq!(ctx.template_dir(&ctx.config), dir.path().join("stack.out"));
        assert_eq!(
            ctx.deployments_dir(),
            dir.path().join(".stack").join("deployments")
        );
        assert_eq!(ctx.resolve_path("out"), PathBuf::from("/elsewhere/out"));
    }

    #[test]
    fn test_function_builder_uses_build_section() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CliConfig::default();
        config.build.target = "aarch64-unknown-linux-musl".into();
        config.build.cargo_args = vec!["--locked".into()];
        let ctx = Context {
            config: config.clone(),
            config_path: Some(dir.path().join("stack.toml")),
            output: Output::new(false, true),
            cwd: PathBuf::from("/elsewhere"),
        };

        let builder = ctx.function_builder(&config, dir.path().join("out"));
        assert_eq!(builder.target(), "aarch64-unknown-linux-musl");

        let graph = stack_graph::DeploymentGraph::compose_with_assets(
            &ctx.stack_config(&config),
            stack_delivery::AssetSet::from_files([("index.html", "<h1>hi</h1>")]),
        )
        .unwrap();
        let package = &graph.api().packages()[0];
        let args = builder.cargo_args(package);
        assert!(args.windows(2).any(|w| w == ["--target", "aarch64-unknown-linux-musl"]));
        assert_eq!(args.last().map(String::as_str), Some("--locked"));
    }
}
