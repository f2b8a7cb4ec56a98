//! The edge security stack.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stack_core::{
    intrinsic, ExportRef, Resource, ResourceKind, ResourceSet, StackEnv, StackOutput, StackUnit,
};

use crate::policy::{
    AggregateKey, FilterAction, FilterPolicy, FilterRule, MatchCondition, SecurityError,
    SecurityResult,
};

/// Logical id of the web ACL inside the security stack.
pub const WEB_ACL_ID: &str = "WebAcl";

/// Output key under which the web ACL ARN is exported.
pub const WEB_ACL_ARN_OUTPUT: &str = "WebAclArn";

/// Declarative rule settings as they appear in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Rule name.
    pub name: String,
    /// Evaluation priority.
    pub priority: u32,
    /// Requests per evaluation window before the rule matches.
    pub rate_limit: u64,
    /// Aggregation key.
    #[serde(default)]
    pub aggregate_key: AggregateKey,
    /// Action on match.
    #[serde(default = "default_rule_action")]
    pub action: FilterAction,
}

fn default_rule_action() -> FilterAction {
    FilterAction::Block
}

impl RuleConfig {
    /// Rate rule blocking a client address above `limit`.
    pub fn rate_limit(name: impl Into<String>, priority: u32, limit: u64) -> Self {
        Self {
            name: name.into(),
            priority,
            rate_limit: limit,
            aggregate_key: AggregateKey::SourceIp,
            action: FilterAction::Block,
        }
    }

    fn to_rule(&self) -> FilterRule {
        FilterRule::new(
            self.name.clone(),
            self.priority,
            MatchCondition::RateBased {
                limit: self.rate_limit,
                aggregate_key: self.aggregate_key,
            },
            self.action,
        )
    }
}

/// Security stack configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Name of the web ACL.
    #[serde(default = "default_web_acl_name")]
    pub web_acl_name: String,

    /// Action for requests no rule matches.
    #[serde(default = "default_action")]
    pub default_action: Option<FilterAction>,

    /// Filter rules.
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleConfig>,
}

fn default_web_acl_name() -> String {
    "edge-web-acl".to_string()
}

fn default_action() -> Option<FilterAction> {
    Some(FilterAction::Allow)
}

fn default_rules() -> Vec<RuleConfig> {
    vec![RuleConfig::rate_limit("RateLimitRule", 1, 2000)]
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            web_acl_name: default_web_acl_name(),
            default_action: default_action(),
            rules: default_rules(),
        }
    }
}

impl SecurityConfig {
    /// Build the validated policy this configuration describes.
    pub fn to_policy(&self) -> SecurityResult<FilterPolicy> {
        let mut builder = FilterPolicy::builder(metric_name(&self.web_acl_name));
        if let Some(action) = self.default_action {
            builder = builder.default_action(action);
        }
        for rule in &self.rules {
            builder = builder.rule(rule.to_rule());
        }
        builder.build()
    }
}

fn metric_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Read-only reference to the deployed policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyHandle {
    export: ExportRef,
    policy: FilterPolicy,
}

impl PolicyHandle {
    /// Stack that owns the policy.
    pub fn stack(&self) -> &str {
        &self.export.stack
    }

    /// Export carrying the web ACL ARN.
    pub fn export(&self) -> &ExportRef {
        &self.export
    }

    /// Expression a consuming stack uses for the web ACL ARN.
    pub fn arn_import(&self) -> Value {
        self.export.import()
    }

    /// The policy as declared.
    pub fn policy(&self) -> &FilterPolicy {
        &self.policy
    }
}

/// Stack declaring the CDN-scoped filtering policy.
#[derive(Debug, Clone)]
pub struct EdgeSecurityUnit {
    name: String,
    env: StackEnv,
    policy: FilterPolicy,
    resources: ResourceSet,
    arn: ExportRef,
}

impl EdgeSecurityUnit {
    /// Declare the unit. CDN-scoped ACLs always live in the global edge region.
    pub fn new(name: impl Into<String>, config: &SecurityConfig) -> Result<Self, SecurityError> {
        let name = name.into();
        let policy = config.to_policy()?;

        let mut resources = ResourceSet::new();
        resources.add(Resource::new(
            WEB_ACL_ID,
            ResourceKind::WebAcl,
            policy.to_properties(&config.web_acl_name),
        ))?;

        let arn = ExportRef::new(
            name.clone(),
            WEB_ACL_ARN_OUTPUT,
            intrinsic::get_att(WEB_ACL_ID, "Arn"),
        );

        tracing::debug!(
            stack = %name,
            rules = policy.rules().len(),
            default_action = %policy.default_action(),
            "declared edge security unit"
        );

        Ok(Self {
            name,
            env: StackEnv::global_edge(),
            policy,
            resources,
            arn,
        })
    }

    /// Handle passed to dependent units.
    pub fn policy_handle(&self) -> PolicyHandle {
        PolicyHandle {
            export: self.arn.clone(),
            policy: self.policy.clone(),
        }
    }

    /// The declared policy.
    pub fn policy(&self) -> &FilterPolicy {
        &self.policy
    }
}

impl StackUnit for EdgeSecurityUnit {
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
        vec![self
            .arn
            .as_output()
            .with_description("ARN of the edge web ACL")]
    }
}
