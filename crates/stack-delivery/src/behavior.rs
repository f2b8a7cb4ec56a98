//! Distribution behaviors and path-pattern matching.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cache::{CachePolicy, ALL_VIEWER_EXCEPT_HOST_POLICY_ID};
use crate::error::{DeliveryError, DeliveryResult};

/// Pattern of the default behavior.
pub const DEFAULT_PATH_PATTERN: &str = "*";

/// Origin id of the object store.
pub const STORE_ORIGIN_ID: &str = "StoreOrigin";

/// Origin id of the API front door.
pub const API_ORIGIN_ID: &str = "ApiOrigin";

/// Backing resource a behavior forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    /// Private object store through origin access control.
    ObjectStore,
    /// HTTP API front door.
    ApiEndpoint,
}

impl OriginKind {
    pub fn origin_id(&self) -> &'static str {
        match self {
            Self::ObjectStore => STORE_ORIGIN_ID,
            Self::ApiEndpoint => API_ORIGIN_ID,
        }
    }
}

/// What the edge does with plain-HTTP viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolPolicy {
    /// Redirect HTTP requests to HTTPS.
    #[default]
    RedirectToHttps,
    /// Reject HTTP requests.
    HttpsOnly,
}

impl ProtocolPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RedirectToHttps => "redirect-to-https",
            Self::HttpsOnly => "https-only",
        }
    }
}

/// One routing behavior of a distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionBehavior {
    /// Path pattern (`*` for the default behavior).
    pub path_pattern: String,
    /// Origin requests are forwarded to.
    pub origin: OriginKind,
    /// Viewer protocol policy.
    #[serde(default)]
    pub protocol: ProtocolPolicy,
    /// Edge cache policy.
    #[serde(default)]
    pub cache: CachePolicy,
    /// Whether every HTTP method is forwarded (otherwise GET/HEAD only).
    #[serde(default)]
    pub all_methods: bool,
}

impl DistributionBehavior {
    /// Default behavior serving the object store.
    pub fn default_store() -> Self {
        Self {
            path_pattern: DEFAULT_PATH_PATTERN.to_string(),
            origin: OriginKind::ObjectStore,
            protocol: ProtocolPolicy::RedirectToHttps,
            cache: CachePolicy::default(),
            all_methods: false,
        }
    }

    /// Uncached behavior forwarding a path pattern to the API front door.
    pub fn api(path_pattern: impl Into<String>) -> Self {
        Self {
            path_pattern: path_pattern.into(),
            origin: OriginKind::ApiEndpoint,
            protocol: ProtocolPolicy::RedirectToHttps,
            cache: CachePolicy::Uncachable,
            all_methods: true,
        }
    }

    /// Whether this is the default (`*`) behavior.
    pub fn is_default(&self) -> bool {
        self.path_pattern == DEFAULT_PATH_PATTERN
    }

    /// Whether the behavior forwards a method.
    pub fn allows_method(&self, method: &str) -> bool {
        self.all_methods || matches!(method, "GET" | "HEAD")
    }

    /// Check the pattern is well formed.
    pub fn validate(&self) -> DeliveryResult<()> {
        if self.is_default() {
            return Ok(());
        }
        if !self.path_pattern.starts_with('/') || self.path_pattern.len() > 255 {
            return Err(DeliveryError::InvalidPathPattern(self.path_pattern.clone()));
        }
        Ok(())
    }

    /// Whether the behavior's pattern matches a request path.
    pub fn matches(&self, path: &str) -> bool {
        glob_match(self.path_pattern.as_bytes(), path.as_bytes())
    }

    /// Number of literal characters in the pattern; higher is more specific.
    pub fn specificity(&self) -> usize {
        self.path_pattern
            .chars()
            .filter(|c| *c != '*' && *c != '?')
            .count()
    }

    /// Provider properties for this behavior.
    pub fn to_properties(&self) -> Value {
        let methods = if self.all_methods {
            json!(["GET", "HEAD", "OPTIONS", "PUT", "PATCH", "POST", "DELETE"])
        } else {
            json!(["GET", "HEAD"])
        };

        let mut props = json!({
            "TargetOriginId": self.origin.origin_id(),
            "ViewerProtocolPolicy": self.protocol.as_str(),
            "AllowedMethods": methods,
            "CachedMethods": ["GET", "HEAD"],
            "CachePolicyId": self.cache.managed_policy_id(),
            "Compress": true,
        });
        if !self.is_default() {
            props["PathPattern"] = json!(self.path_pattern);
        }
        if self.origin == OriginKind::ApiEndpoint {
            props["OriginRequestPolicyId"] = json!(ALL_VIEWER_EXCEPT_HOST_POLICY_ID);
        }
        props
    }
}

/// Case-sensitive match where `*` spans any run of characters (slashes included)
/// and `?` matches exactly one.
pub(crate) fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_everything() {
        let behavior = DistributionBehavior::default_store();
        assert!(behavior.is_default());
        assert!(behavior.matches("/"));
        assert!(behavior.matches("/index.html"));
        assert!(behavior.matches("/api/lambda-1"));
    }

    #[test]
    fn test_api_pattern() {
        let behavior = DistributionBehavior::api("/api/*");
        assert!(behavior.matches("/api/lambda-1"));
        assert!(behavior.matches("/api/"));
        assert!(behavior.matches("/api/nested/path"));
        assert!(!behavior.matches("/api"));
        assert!(!behavior.matches("/apix/lambda-1"));
        assert!(!behavior.matches("/API/lambda-1"));
    }

    #[test]
    fn test_question_mark_and_suffix() {
        let behavior = DistributionBehavior {
            path_pattern: "/img/?.png".into(),
            ..DistributionBehavior::default_store()
        };
        assert!(behavior.matches("/img/a.png"));
        assert!(!behavior.matches("/img/ab.png"));

        let suffix = DistributionBehavior {
            path_pattern: "/*.js".into(),
            ..DistributionBehavior::default_store()
        };
        assert!(suffix.matches("/static/app.js"));
        assert!(!suffix.matches("/static/app.json"));
    }

    #[test]
    fn test_specificity_orders_longer_first() {
        assert!(
            DistributionBehavior::api("/api/v2/*").specificity()
                > DistributionBehavior::api("/api/*").specificity()
        );
        assert_eq!(DistributionBehavior::default_store().specificity(), 0);
    }

    #[test]
    fn test_validate_pattern() {
        assert!(DistributionBehavior::api("/api/*").validate().is_ok());
        assert!(matches!(
            DistributionBehavior::api("api/*").validate(),
            Err(DeliveryError::InvalidPathPattern(_))
        ));
    }

    #[test]
    fn test_api_properties() {
        let props = DistributionBehavior::api("/api/*").to_properties();
        assert_eq!(props["PathPattern"], "/api/*");
        assert_eq!(props["TargetOriginId"], API_ORIGIN_ID);
        assert_eq!(props["ViewerProtocolPolicy"], "redirect-to-https");
        assert_eq!(
            props["CachePolicyId"],
            crate::cache::CACHING_DISABLED_POLICY_ID
        );
        assert_eq!(props["OriginRequestPolicyId"], ALL_VIEWER_EXCEPT_HOST_POLICY_ID);

        let default = DistributionBehavior::default_store().to_properties();
        assert!(default.get("PathPattern").is_none());
        assert!(default.get("OriginRequestPolicyId").is_none());
    }
}
