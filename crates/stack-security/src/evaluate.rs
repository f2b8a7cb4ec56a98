//! Local evaluation of a filter policy against request samples.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::{AggregateKey, FilterAction, FilterPolicy, MatchCondition};

/// Trailing window the managed firewall counts rate-based rules over.
pub const RATE_EVALUATION_WINDOW: Duration = Duration::from_secs(300);

/// The parts of a request the policy looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSample {
    /// Client address seen by the edge.
    pub source_ip: IpAddr,
    /// First address of the forwarded-for header, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwarded_ip: Option<IpAddr>,
    /// Request path.
    pub path: String,
}

impl RequestSample {
    /// Sample for a client address and path.
    pub fn new(source_ip: IpAddr, path: impl Into<String>) -> Self {
        Self {
            source_ip,
            forwarded_ip: None,
            path: path.into(),
        }
    }

    /// Set the forwarded-for address.
    pub fn with_forwarded_ip(mut self, ip: IpAddr) -> Self {
        self.forwarded_ip = Some(ip);
        self
    }

    fn key(&self, aggregate: AggregateKey) -> IpAddr {
        match aggregate {
            AggregateKey::SourceIp => self.source_ip,
            // Missing header falls back to the client address.
            AggregateKey::ForwardedIp => self.forwarded_ip.unwrap_or(self.source_ip),
        }
    }
}

/// Outcome of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Action applied.
    pub action: FilterAction,
    /// Rule that decided, or `None` for the default action.
    pub terminating_rule: Option<String>,
}

/// Evaluates requests against a policy, rules in priority order.
///
/// Time is supplied by the caller in whole seconds so evaluation is
/// deterministic.
#[derive(Debug)]
pub struct PolicyEvaluator {
    policy: FilterPolicy,
    window_secs: u64,
    /// Request timestamps per (rule index, aggregation key).
    seen: HashMap<(usize, IpAddr), VecDeque<u64>>,
}

impl PolicyEvaluator {
    /// Create an evaluator with the managed firewall's window.
    pub fn new(policy: FilterPolicy) -> Self {
        Self {
            policy,
            window_secs: RATE_EVALUATION_WINDOW.as_secs(),
            seen: HashMap::new(),
        }
    }

    /// Override the evaluation window.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window_secs = window.as_secs().max(1);
        self
    }

    /// The policy being evaluated.
    pub fn policy(&self) -> &FilterPolicy {
        &self.policy
    }

    /// Evaluate a request arriving at `now_secs`.
    pub fn evaluate(&mut self, request: &RequestSample, now_secs: u64) -> Verdict {
        let window = self.window_secs;
        let mut decided: Option<Verdict> = None;

        // Every rate rule counts the request even after an earlier rule decided.
        for (index, rule) in self.policy.rules().iter().enumerate() {
            let matched = match rule.condition {
                MatchCondition::RateBased {
                    limit,
                    aggregate_key,
                } => {
                    let key = request.key(aggregate_key);
                    let times = self.seen.entry((index, key)).or_default();
                    while times
                        .front()
                        .is_some_and(|t| now_secs.saturating_sub(*t) >= window)
                    {
                        times.pop_front();
                    }
                    times.push_back(now_secs);
                    times.len() as u64 > limit
                }
            };

            if matched && decided.is_none() {
                tracing::debug!(
                    rule = %rule.name,
                    action = %rule.action,
                    ip = %request.source_ip,
                    "filter rule matched"
                );
                decided = Some(Verdict {
                    action: rule.action,
                    terminating_rule: Some(rule.name.clone()),
                });
            }
        }

        decided.unwrap_or(Verdict {
            action: self.policy.default_action(),
            terminating_rule: None,
        })
    }

    /// Requests counted for a key by a rule inside the current window.
    pub fn counted(&self, rule: &str, key: IpAddr) -> usize {
        self.policy
            .rules()
            .iter()
            .position(|r| r.name == rule)
            .and_then(|index| self.seen.get(&(index, key)))
            .map_or(0, VecDeque::len)
    }
}
