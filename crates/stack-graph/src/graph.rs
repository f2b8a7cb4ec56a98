//! Composition of the three units into one deployable graph.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use stack_api::ApiComputeUnit;
use stack_core::{EmptyUnit, ExportRef, StackEnv, StackUnit};
use stack_delivery::{AssetPublication, AssetSet, DeliveryUnit};
use stack_security::EdgeSecurityUnit;

use crate::config::{AppConfig, StackConfig};
use crate::error::{GraphError, GraphResult};
use crate::package::StackParameters;

/// File listing every synthesized stack.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Rendered template of one stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesizedStack {
    pub name: String,
    pub region: String,
    /// Stacks that must be provisioned first.
    pub dependencies: Vec<String>,
    /// Output keys the stack declares.
    pub outputs: Vec<String>,
    /// Parameter values passed to the deploy call; unset ones keep their defaults.
    #[serde(skip_serializing_if = "StackParameters::is_empty")]
    pub parameters: StackParameters,
    #[serde(skip)]
    pub template: Value,
}

impl SynthesizedStack {
    fn from_unit(unit: &dyn StackUnit) -> Self {
        Self {
            name: unit.stack_name().to_string(),
            region: unit.env().region.clone(),
            dependencies: unit.dependencies(),
            outputs: unit.outputs().into_iter().map(|o| o.key).collect(),
            parameters: StackParameters::new(),
            template: unit.to_template(),
        }
    }

    /// File name the template is written under.
    pub fn template_file(&self) -> String {
        format!("{}.template.json", self.name)
    }
}

#[derive(Serialize)]
struct ManifestEntry<'a> {
    #[serde(flatten)]
    stack: &'a SynthesizedStack,
    template: String,
}

#[derive(Serialize)]
struct Manifest<'a> {
    app: &'a str,
    stacks: Vec<ManifestEntry<'a>>,
    publication: &'a AssetPublication,
}

/// The security, API and delivery units, composed in dependency order.
#[derive(Debug, Clone)]
pub struct DeploymentGraph {
    app: AppConfig,
    security: EdgeSecurityUnit,
    api: ApiComputeUnit,
    delivery: DeliveryUnit,
    assets: AssetSet,
}

impl DeploymentGraph {
    /// Compose the graph, loading the static site from the configured directory.
    pub fn compose(config: &StackConfig) -> GraphResult<Self> {
        let assets = AssetSet::load(&config.delivery.site_dir)?;
        Self::compose_with_assets(config, assets)
    }

    /// Compose the graph over an already loaded asset set.
    ///
    /// Every declaration is validated here; nothing is provisioned.
    pub fn compose_with_assets(config: &StackConfig, assets: AssetSet) -> GraphResult<Self> {
        let app = config.app.clone();

        let security = EdgeSecurityUnit::new(app.security_stack(), &config.security)?;
        let api = ApiComputeUnit::new(app.api_stack(), app.env(), &config.api)?;
        let delivery = DeliveryUnit::new(
            app.delivery_stack(),
            app.env(),
            &config.delivery,
            &security.policy_handle(),
            &api.api_handle(),
            &assets,
        )?;

        let graph = Self {
            app,
            security,
            api,
            delivery,
            assets,
        };
        graph.check_dependencies()?;

        tracing::info!(
            app = %graph.app.name,
            stacks = ?graph.stack_names(),
            "composed deployment graph"
        );
        Ok(graph)
    }

    /// Units in provisioning order.
    pub fn units(&self) -> Vec<&dyn StackUnit> {
        let units: [&dyn StackUnit; 3] = [&self.security, &self.api, &self.delivery];
        units.to_vec()
    }

    pub fn stack_names(&self) -> Vec<&str> {
        self.units().into_iter().map(|u| u.stack_name()).collect()
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    pub fn security(&self) -> &EdgeSecurityUnit {
        &self.security
    }

    pub fn api(&self) -> &ApiComputeUnit {
        &self.api
    }

    pub fn delivery(&self) -> &DeliveryUnit {
        &self.delivery
    }

    pub fn assets(&self) -> &AssetSet {
        &self.assets
    }

    /// Exports each stack reads from other stacks.
    pub fn imports(&self) -> Vec<(&str, &ExportRef)> {
        let consumer = self.delivery.stack_name();
        vec![
            (consumer, self.delivery.policy_handle().export()),
            (consumer, self.delivery.api_handle().export()),
        ]
    }

    fn check_dependencies(&self) -> GraphResult<()> {
        let mut seen: HashMap<&str, &StackEnv> = HashMap::new();

        for unit in self.units() {
            for dependency in unit.dependencies() {
                let Some(env) = seen.get(dependency.as_str()) else {
                    return Err(GraphError::UnorderedDependency {
                        stack: unit.stack_name().to_string(),
                        dependency,
                    });
                };
                if env.region != unit.env().region {
                    return Err(GraphError::RegionMismatch {
                        stack: unit.stack_name().to_string(),
                        region: unit.env().region.clone(),
                        dependency,
                        dependency_region: env.region.clone(),
                    });
                }
            }
            seen.insert(unit.stack_name(), unit.env());
        }
        Ok(())
    }

    /// Render every stack's template, in provisioning order.
    pub fn synthesize(&self) -> Vec<SynthesizedStack> {
        self.units()
            .into_iter()
            .map(SynthesizedStack::from_unit)
            .collect()
    }

    /// Write each template plus a manifest into `dir`. Returns the paths written.
    pub fn write_templates(&self, dir: impl AsRef<Path>) -> GraphResult<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| write_error(dir, e))?;

        let stacks = self.synthesize();
        let mut written = Vec::with_capacity(stacks.len() + 1);

        for stack in &stacks {
            let path = dir.join(stack.template_file());
            write_json(&path, &stack.template)?;
            written.push(path);
        }

        let manifest = Manifest {
            app: &self.app.name,
            stacks: stacks
                .iter()
                .map(|stack| ManifestEntry {
                    stack,
                    template: stack.template_file(),
                })
                .collect(),
            publication: self.delivery.publication(),
        };
        let path = dir.join(MANIFEST_FILE);
        write_json(&path, &manifest)?;
        written.push(path);

        tracing::debug!(dir = %dir.display(), files = written.len(), "wrote templates");
        Ok(written)
    }
}

/// Entry point kept so deployments that still reference the retired shared
/// stack resolve. It declares nothing.
pub fn legacy_stack(app: &AppConfig) -> EmptyUnit {
    EmptyUnit::new(app.legacy_stack(), app.env())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> GraphResult<()> {
    let content = serde_json::to_string_pretty(value).map_err(|e| GraphError::Write {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    std::fs::write(path, content).map_err(|e| write_error(path, e))
}

fn write_error(path: &Path, e: std::io::Error) -> GraphError {
    GraphError::Write {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}
