//! Filter policies and their rules.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Result type for policy operations.
pub type SecurityResult<T> = Result<T, SecurityError>;

/// Errors from declaring a filter policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecurityError {
    #[error("filter policy has no default action")]
    MissingDefaultAction,

    #[error("rules '{first}' and '{second}' share priority {priority}")]
    DuplicatePriority {
        priority: u32,
        first: String,
        second: String,
    },

    #[error("rule name '{0}' is declared more than once")]
    DuplicateRuleName(String),

    #[error("invalid rule name '{0}': must be 1-128 characters of [A-Za-z0-9_-]")]
    InvalidRuleName(String),

    #[error("rule '{rule}' has invalid rate limit {limit}: must be between {min} and {max}")]
    InvalidRateLimit {
        rule: String,
        limit: u64,
        min: u64,
        max: u64,
    },

    #[error("invalid metric name '{0}'")]
    InvalidMetricName(String),

    #[error(transparent)]
    Declaration(#[from] stack_core::CoreError),
}

/// Action taken on a matching request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    Allow,
    Block,
}

impl FilterAction {
    fn to_template(self) -> Value {
        match self {
            Self::Allow => json!({ "Allow": {} }),
            Self::Block => json!({ "Block": {} }),
        }
    }
}

impl fmt::Display for FilterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Block => write!(f, "block"),
        }
    }
}

/// Key requests are grouped by when counting toward a rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKey {
    /// Client address seen by the edge.
    #[default]
    SourceIp,
    /// First address in the forwarded-for header.
    ForwardedIp,
}

impl AggregateKey {
    fn type_name(&self) -> &'static str {
        match self {
            Self::SourceIp => "IP",
            Self::ForwardedIp => "FORWARDED_IP",
        }
    }
}

/// Condition a rule matches on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchCondition {
    /// Matches once a key exceeds `limit` requests in the evaluation window.
    RateBased { limit: u64, aggregate_key: AggregateKey },
}

/// Smallest rate limit the managed firewall accepts.
pub const MIN_RATE_LIMIT: u64 = 100;

/// Largest rate limit the managed firewall accepts.
pub const MAX_RATE_LIMIT: u64 = 2_000_000_000;

impl MatchCondition {
    /// Rate-based condition keyed on the client address.
    pub fn rate_per_ip(limit: u64) -> Self {
        Self::RateBased {
            limit,
            aggregate_key: AggregateKey::SourceIp,
        }
    }

    fn to_template(&self) -> Value {
        match self {
            Self::RateBased {
                limit,
                aggregate_key,
            } => {
                let mut statement = json!({
                    "Limit": limit,
                    "AggregateKeyType": aggregate_key.type_name(),
                });
                if *aggregate_key == AggregateKey::ForwardedIp {
                    statement["ForwardedIPConfig"] = json!({
                        "HeaderName": "X-Forwarded-For",
                        "FallbackBehavior": "MATCH",
                    });
                }
                json!({ "RateBasedStatement": statement })
            }
        }
    }
}

/// Metrics and sampling settings for a rule or policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityConfig {
    /// Metric name.
    pub metric_name: String,
    /// Whether metrics are published.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    /// Whether matching requests are sampled.
    #[serde(default = "default_true")]
    pub sampled_requests: bool,
}

fn default_true() -> bool {
    true
}

impl VisibilityConfig {
    /// Fully enabled visibility under a metric name.
    pub fn new(metric_name: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            metrics_enabled: true,
            sampled_requests: true,
        }
    }

    fn validate(&self) -> SecurityResult<()> {
        if !is_valid_name(&self.metric_name) {
            return Err(SecurityError::InvalidMetricName(self.metric_name.clone()));
        }
        Ok(())
    }

    fn to_template(&self) -> Value {
        json!({
            "MetricName": self.metric_name,
            "CloudWatchMetricsEnabled": self.metrics_enabled,
            "SampledRequestsEnabled": self.sampled_requests,
        })
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// A single filter rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    /// Rule name, unique within its policy.
    pub name: String,
    /// Evaluation order, lower first.
    pub priority: u32,
    /// Match condition.
    pub condition: MatchCondition,
    /// Action on match.
    pub action: FilterAction,
    /// Metrics settings.
    pub visibility: VisibilityConfig,
}

impl FilterRule {
    /// Create a rule; visibility defaults to the rule name.
    pub fn new(
        name: impl Into<String>,
        priority: u32,
        condition: MatchCondition,
        action: FilterAction,
    ) -> Self {
        let name = name.into();
        Self {
            visibility: VisibilityConfig::new(name.clone()),
            name,
            priority,
            condition,
            action,
        }
    }

    /// Override the visibility settings.
    pub fn with_visibility(mut self, visibility: VisibilityConfig) -> Self {
        self.visibility = visibility;
        self
    }

    fn validate(&self) -> SecurityResult<()> {
        if !is_valid_name(&self.name) {
            return Err(SecurityError::InvalidRuleName(self.name.clone()));
        }
        match self.condition {
            MatchCondition::RateBased { limit, .. } => {
                if !(MIN_RATE_LIMIT..=MAX_RATE_LIMIT).contains(&limit) {
                    return Err(SecurityError::InvalidRateLimit {
                        rule: self.name.clone(),
                        limit,
                        min: MIN_RATE_LIMIT,
                        max: MAX_RATE_LIMIT,
                    });
                }
            }
        }
        self.visibility.validate()
    }

    fn to_template(&self) -> Value {
        json!({
            "Name": self.name,
            "Priority": self.priority,
            "Statement": self.condition.to_template(),
            "Action": self.action.to_template(),
            "VisibilityConfig": self.visibility.to_template(),
        })
    }
}

/// A validated filter policy.
///
/// Rules are kept sorted by priority; priorities and names are unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterPolicy {
    default_action: FilterAction,
    rules: Vec<FilterRule>,
    visibility: VisibilityConfig,
}

impl FilterPolicy {
    /// Start building a policy.
    pub fn builder(metric_name: impl Into<String>) -> FilterPolicyBuilder {
        FilterPolicyBuilder {
            default_action: None,
            rules: Vec::new(),
            visibility: VisibilityConfig::new(metric_name),
        }
    }

    /// Action for requests no rule matches.
    pub fn default_action(&self) -> FilterAction {
        self.default_action
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    /// Look up a rule by name.
    pub fn rule(&self, name: &str) -> Option<&FilterRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Policy-level metrics settings.
    pub fn visibility(&self) -> &VisibilityConfig {
        &self.visibility
    }

    /// Provider properties for a CDN-scoped web ACL.
    pub fn to_properties(&self, name: &str) -> Value {
        json!({
            "Name": name,
            "Scope": "CLOUDFRONT",
            "DefaultAction": self.default_action.to_template(),
            "Rules": self.rules.iter().map(FilterRule::to_template).collect::<Vec<_>>(),
            "VisibilityConfig": self.visibility.to_template(),
        })
    }
}

/// Builder collecting policy declarations before validation.
#[derive(Debug, Clone)]
pub struct FilterPolicyBuilder {
    default_action: Option<FilterAction>,
    rules: Vec<FilterRule>,
    visibility: VisibilityConfig,
}

impl FilterPolicyBuilder {
    /// Set the default action.
    pub fn default_action(mut self, action: FilterAction) -> Self {
        self.default_action = Some(action);
        self
    }

    /// Add a rule.
    pub fn rule(mut self, rule: FilterRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Validate and build the policy.
    pub fn build(self) -> SecurityResult<FilterPolicy> {
        let default_action = self
            .default_action
            .ok_or(SecurityError::MissingDefaultAction)?;
        self.visibility.validate()?;

        let mut names = HashSet::new();
        for rule in &self.rules {
            rule.validate()?;
            if !names.insert(rule.name.as_str()) {
                return Err(SecurityError::DuplicateRuleName(rule.name.clone()));
            }
        }

        let mut rules = self.rules;
        rules.sort_by_key(|r| r.priority);
        for pair in rules.windows(2) {
            if pair[0].priority == pair[1].priority {
                return Err(SecurityError::DuplicatePriority {
                    priority: pair[0].priority,
                    first: pair[0].name.clone(),
                    second: pair[1].name.clone(),
                });
            }
        }

        Ok(FilterPolicy {
            default_action,
            rules,
            visibility: self.visibility,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate_rule(name: &str, priority: u32) -> FilterRule {
        FilterRule::new(
            name,
            priority,
            MatchCondition::rate_per_ip(2000),
            FilterAction::Block,
        )
    }

    #[test]
    fn test_rules_sorted_by_priority() {
        let policy = FilterPolicy::builder("WebAcl")
            .default_action(FilterAction::Allow)
            .rule(rate_rule("Second", 5))
            .rule(rate_rule("First", 1))
            .build()
            .unwrap();

        let names: Vec<&str> = policy.rules().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Second"]);
        assert_eq!(policy.default_action(), FilterAction::Allow);
    }

    #[test]
    fn test_duplicate_priority_rejected() {
        let err = FilterPolicy::builder("WebAcl")
            .default_action(FilterAction::Allow)
            .rule(rate_rule("A", 1))
            .rule(rate_rule("B", 1))
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            SecurityError::DuplicatePriority { priority: 1, .. }
        ));
    }

    #[test]
    fn test_missing_default_action_rejected() {
        let err = FilterPolicy::builder("WebAcl")
            .rule(rate_rule("A", 1))
            .build()
            .unwrap_err();
        assert_eq!(err, SecurityError::MissingDefaultAction);
    }

    #[test]
    fn test_duplicate_rule_name_rejected() {
        let err = FilterPolicy::builder("WebAcl")
            .default_action(FilterAction::Block)
            .rule(rate_rule("Same", 1))
            .rule(rate_rule("Same", 2))
            .build()
            .unwrap_err();
        assert_eq!(err, SecurityError::DuplicateRuleName("Same".into()));
    }

    #[test]
    fn test_rate_limit_bounds() {
        let rule = FilterRule::new(
            "TooLow",
            1,
            MatchCondition::rate_per_ip(10),
            FilterAction::Block,
        );
        let err = FilterPolicy::builder("WebAcl")
            .default_action(FilterAction::Allow)
            .rule(rule)
            .build()
            .unwrap_err();
        assert!(matches!(err, SecurityError::InvalidRateLimit { limit: 10, .. }));
    }

    #[test]
    fn test_properties_shape() {
        let policy = FilterPolicy::builder("WebAcl")
            .default_action(FilterAction::Allow)
            .rule(rate_rule("RateLimitRule", 1))
            .build()
            .unwrap();

        let props = policy.to_properties("app-web-acl");
        assert_eq!(props["Scope"], "CLOUDFRONT");
        assert_eq!(props["DefaultAction"], json!({ "Allow": {} }));
        let rule = &props["Rules"][0];
        assert_eq!(rule["Priority"], 1);
        assert_eq!(rule["Action"], json!({ "Block": {} }));
        assert_eq!(rule["Statement"]["RateBasedStatement"]["Limit"], 2000);
        assert_eq!(
            rule["Statement"]["RateBasedStatement"]["AggregateKeyType"],
            "IP"
        );
    }
}
