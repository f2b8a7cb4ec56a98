//! Deployable units and the values they hand to each other.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::resource::{intrinsic, ResourceSet};

/// Region every CDN-scoped resource must live in.
pub const GLOBAL_EDGE_REGION: &str = "us-east-1";

/// Where a unit is deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEnv {
    /// Deployment region.
    pub region: String,
    /// Optional account id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

impl StackEnv {
    /// Create an environment for a region.
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account: None,
        }
    }

    /// Environment for CDN-scoped resources.
    pub fn global_edge() -> Self {
        Self::new(GLOBAL_EDGE_REGION)
    }

    /// Set the account id.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }
}

impl Default for StackEnv {
    fn default() -> Self {
        Self::global_edge()
    }
}

/// A value one stack publishes for others to consume.
///
/// Handles passed between units wrap these; the consumer only ever sees the
/// import expression, never a mutable reference to the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRef {
    /// Stack that owns the value.
    pub stack: String,
    /// Output key within the owning stack.
    pub output_key: String,
    /// Expression producing the value inside the owning stack.
    pub value: Value,
}

impl ExportRef {
    /// Create a new export.
    pub fn new(stack: impl Into<String>, output_key: impl Into<String>, value: Value) -> Self {
        Self {
            stack: stack.into(),
            output_key: output_key.into(),
            value,
        }
    }

    /// Globally unique export name.
    pub fn export_name(&self) -> String {
        format!("{}:{}", self.stack, self.output_key)
    }

    /// Expression a consuming stack uses to read the value.
    pub fn import(&self) -> Value {
        intrinsic::import_value(&self.export_name())
    }

    /// Output declaration on the owning stack.
    pub fn as_output(&self) -> StackOutput {
        StackOutput {
            key: self.output_key.clone(),
            value: self.value.clone(),
            export_name: Some(self.export_name()),
            description: None,
        }
    }
}

/// An output declared by a stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackOutput {
    /// Output key.
    pub key: String,
    /// Expression producing the output.
    pub value: Value,
    /// Export name when other stacks import it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_name: Option<String>,
    /// Human description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl StackOutput {
    /// Create a plain (non-exported) output.
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            export_name: None,
            description: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Template fragment for this output.
    pub fn to_template(&self) -> Value {
        let mut body = json!({ "Value": self.value });
        if let Some(ref description) = self.description {
            body["Description"] = json!(description);
        }
        if let Some(ref name) = self.export_name {
            body["Export"] = json!({ "Name": name });
        }
        body
    }
}

/// Output values resolved after a stack has been provisioned.
pub type ResolvedOutputs = BTreeMap<String, String>;

/// A string parameter whose value can be overridden at deploy time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackParameter {
    pub name: String,
    /// Value used when the deploy call passes none.
    pub default: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl StackParameter {
    pub fn new(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
            description: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Template fragment for this parameter.
    pub fn to_template(&self) -> Value {
        let mut body = json!({ "Type": "String", "Default": self.default });
        if let Some(ref description) = self.description {
            body["Description"] = json!(description);
        }
        body
    }
}

/// A deployable unit of the topology.
pub trait StackUnit {
    /// Stack name.
    fn stack_name(&self) -> &str;

    /// Deployment environment.
    fn env(&self) -> &StackEnv;

    /// Declared resources.
    fn resources(&self) -> &ResourceSet;

    /// Declared outputs, exported ones included.
    fn outputs(&self) -> Vec<StackOutput>;

    /// Parameters the deploy call may override.
    fn parameters(&self) -> Vec<StackParameter> {
        Vec::new()
    }

    /// Names of stacks this one imports values from.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Template metadata, for actions that run outside the provider.
    fn metadata(&self) -> Option<Value> {
        None
    }

    /// Full template for this unit.
    fn to_template(&self) -> Value {
        let mut resources = serde_json::Map::new();
        for resource in self.resources().iter() {
            resources.insert(resource.logical_id.clone(), resource.to_template());
        }

        let mut outputs = serde_json::Map::new();
        for output in self.outputs() {
            outputs.insert(output.key.clone(), output.to_template());
        }

        let mut template = json!({
            "AWSTemplateFormatVersion": "2010-09-09",
            "Description": format!("{} ({})", self.stack_name(), self.env().region),
            "Resources": resources,
        });
        let parameters = self.parameters();
        if !parameters.is_empty() {
            template["Parameters"] = parameters
                .iter()
                .map(|p| (p.name.clone(), p.to_template()))
                .collect::<serde_json::Map<String, Value>>()
                .into();
        }
        if !outputs.is_empty() {
            template["Outputs"] = Value::Object(outputs);
        }
        if let Some(metadata) = self.metadata() {
            template["Metadata"] = metadata;
        }
        template
    }
}

/// Unit kept only so existing deployments referencing its name still resolve.
///
/// It never declares resources; re-adding any would resurrect resources that
/// were moved to other stacks.
#[derive(Debug, Clone)]
pub struct EmptyUnit {
    name: String,
    env: StackEnv,
    resources: ResourceSet,
}

impl EmptyUnit {
    /// Create an empty unit.
    pub fn new(name: impl Into<String>, env: StackEnv) -> Self {
        Self {
            name: name.into(),
            env,
            resources: ResourceSet::new(),
        }
    }
}

impl StackUnit for EmptyUnit {
    fn stack_name(&self) -> &str {
        &self.name
    }

    fn env(&self) -> &StackEnv {
        &self.env
    }

    fn resources(&self) -> &ResourceSet {
        &self.resources
    }

    fn outputs(&self) -> Vec<StackOutput> {
        Vec::new()
    }
}
