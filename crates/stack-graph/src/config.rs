//! Declarative settings for the whole topology.

use serde::{Deserialize, Serialize};
use stack_api::ApiConfig;
use stack_core::{StackEnv, GLOBAL_EDGE_REGION};
use stack_delivery::DeliveryConfig;
use stack_security::SecurityConfig;

/// Application-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Prefix of every stack name.
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Region of the API and delivery stacks.
    ///
    /// Only `us-east-1` composes: the distribution imports the firewall's
    /// export, and exports resolve within one region.
    #[serde(default = "default_region")]
    pub region: String,

    /// Target account, if pinned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

fn default_app_name() -> String {
    "edge-app".to_string()
}

fn default_region() -> String {
    GLOBAL_EDGE_REGION.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            region: default_region(),
            account: None,
        }
    }
}

impl AppConfig {
    pub fn security_stack(&self) -> String {
        format!("{}-waf", self.name)
    }

    pub fn api_stack(&self) -> String {
        format!("{}-backend", self.name)
    }

    pub fn delivery_stack(&self) -> String {
        format!("{}-frontend", self.name)
    }

    /// Name of the retired shared stack.
    pub fn legacy_stack(&self) -> String {
        format!("{}-shared", self.name)
    }

    /// Environment of the regional stacks.
    pub fn env(&self) -> StackEnv {
        let env = StackEnv::new(self.region.clone());
        match self.account {
            Some(ref account) => env.with_account(account.clone()),
            None => env,
        }
    }
}

/// Settings of all three units. Every field has a default, so an empty
/// document describes the standard topology.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,
}
