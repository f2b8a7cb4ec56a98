//! Edge cache policies attached to distribution behaviors.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Managed policy that caches with long TTLs and compresses responses.
pub const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";

/// Managed policy that disables edge caching.
pub const CACHING_DISABLED_POLICY_ID: &str = "4135ea2d-6df8-44a3-9df3-4b5a84be39ad";

/// Managed origin request policy forwarding every viewer header except Host.
pub const ALL_VIEWER_EXCEPT_HOST_POLICY_ID: &str = "b689b0a8-53d0-40ab-baf2-68738e2966ac";

/// TTL settings of a cacheable behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTtl {
    /// TTL when the origin sends no caching headers.
    pub default: Duration,
    /// Lower bound on origin-provided TTLs.
    pub min: Duration,
    /// Upper bound on origin-provided TTLs.
    pub max: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        // Values of the managed optimized policy.
        Self {
            default: Duration::from_secs(86_400),
            min: Duration::from_secs(1),
            max: Duration::from_secs(31_536_000),
        }
    }
}

/// Whether responses of a behavior may be stored at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CachePolicy {
    /// Responses are cached for the configured TTLs.
    Cacheable(CacheTtl),
    /// Responses are never cached.
    Uncachable,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::Cacheable(CacheTtl::default())
    }
}

impl CachePolicy {
    /// Check if this policy allows edge caching.
    pub fn allows_caching(&self) -> bool {
        matches!(self, Self::Cacheable(_))
    }

    /// TTL applied to responses without caching headers.
    pub fn default_ttl(&self) -> Option<Duration> {
        match self {
            Self::Cacheable(ttl) => Some(ttl.default),
            Self::Uncachable => None,
        }
    }

    /// Managed cache policy implementing this behavior.
    pub fn managed_policy_id(&self) -> &'static str {
        match self {
            Self::Cacheable(_) => CACHING_OPTIMIZED_POLICY_ID,
            Self::Uncachable => CACHING_DISABLED_POLICY_ID,
        }
    }

    /// Cache-Control value the edge effectively applies.
    pub fn cache_control_header(&self) -> String {
        match self {
            Self::Cacheable(ttl) => format!("public, max-age={}", ttl.default.as_secs()),
            Self::Uncachable => "no-store".to_string(),
        }
    }
}

/// Status of an edge cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Fresh cache hit.
    Hit,
    /// Cache miss, fetched from origin.
    Miss,
    /// Caching disabled for the behavior.
    Bypass,
    /// Answered at the edge without consulting cache or origin.
    Edge,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit => write!(f, "Hit from edge"),
            Self::Miss => write!(f, "Miss from edge"),
            Self::Bypass => write!(f, "Bypass from edge"),
            Self::Edge => write!(f, "Generated at edge"),
        }
    }
}
