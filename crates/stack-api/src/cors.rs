//! Cross-origin settings for the API front door.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Wildcard accepted in every CORS list.
pub const ANY: &str = "*";

/// Cross-origin configuration applied to every declared route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins.
    #[serde(default = "any")]
    pub allow_origins: Vec<String>,

    /// Methods allowed at the preflight level.
    #[serde(default = "any")]
    pub allow_methods: Vec<String>,

    /// Allowed request headers.
    #[serde(default = "any")]
    pub allow_headers: Vec<String>,

    /// Preflight cache lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_secs: Option<u32>,
}

fn any() -> Vec<String> {
    vec![ANY.to_string()]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl CorsConfig {
    /// Any origin, any method, any header.
    pub fn allow_all() -> Self {
        Self {
            allow_origins: any(),
            allow_methods: any(),
            allow_headers: any(),
            max_age_secs: None,
        }
    }

    /// Whether a request origin is allowed.
    pub fn allows_origin(&self, origin: &str) -> bool {
        self.allow_origins.iter().any(|o| o == ANY || o == origin)
    }

    /// Whether a method is allowed at the preflight level.
    pub fn allows_method(&self, method: &str) -> bool {
        self.allow_methods
            .iter()
            .any(|m| m == ANY || m.eq_ignore_ascii_case(method))
    }

    /// Headers of a preflight response, or `None` when the preflight is refused.
    pub fn preflight(&self, origin: &str, method: &str) -> Option<BTreeMap<String, String>> {
        if !self.allows_origin(origin) || !self.allows_method(method) {
            return None;
        }

        let allow_origin = if self.allow_origins.iter().any(|o| o == ANY) {
            ANY.to_string()
        } else {
            origin.to_string()
        };

        let mut headers = BTreeMap::new();
        headers.insert("access-control-allow-origin".to_string(), allow_origin);
        headers.insert(
            "access-control-allow-methods".to_string(),
            self.allow_methods.join(","),
        );
        headers.insert(
            "access-control-allow-headers".to_string(),
            self.allow_headers.join(","),
        );
        if let Some(max_age) = self.max_age_secs {
            headers.insert("access-control-max-age".to_string(), max_age.to_string());
        }
        Some(headers)
    }

    /// Provider properties for the front door's CORS configuration.
    pub fn to_properties(&self) -> Value {
        let mut props = json!({
            "AllowOrigins": self.allow_origins,
            "AllowMethods": self.allow_methods,
            "AllowHeaders": self.allow_headers,
        });
        if let Some(max_age) = self.max_age_secs {
            props["MaxAge"] = json!(max_age);
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all_preflight() {
        let cors = CorsConfig::allow_all();
        let headers = cors.preflight("https://example.com", "DELETE").unwrap();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-methods"], "*");
    }

    #[test]
    fn test_defaults_allow_everything() {
        let cors: CorsConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(cors, CorsConfig::default());
        assert_eq!(cors.allow_origins, vec!["*"]);
        assert_eq!(cors.allow_methods, vec!["*"]);
        assert_eq!(cors.allow_headers, vec!["*"]);
        assert!(cors.allows_method("PATCH"));
    }

    #[test]
    fn test_restricted_origin() {
        let cors = CorsConfig {
            allow_origins: vec!["https://app.example.com".into()],
            allow_methods: vec!["GET".into(), "OPTIONS".into()],
            ..CorsConfig::allow_all()
        };

        assert!(cors.preflight("https://evil.example.com", "GET").is_none());
        assert!(cors.preflight("https://app.example.com", "POST").is_none());

        let headers = cors.preflight("https://app.example.com", "get").unwrap();
        assert_eq!(
            headers["access-control-allow-origin"],
            "https://app.example.com"
        );
        assert_eq!(headers["access-control-allow-methods"], "GET,OPTIONS");
    }

    #[test]
    fn test_properties_shape() {
        let props = CorsConfig {
            max_age_secs: Some(600),
            ..Default::default()
        }
        .to_properties();
        assert_eq!(props["AllowOrigins"], json!(["*"]));
        assert_eq!(props["MaxAge"], 600);
    }
}
