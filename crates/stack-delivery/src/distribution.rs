//! Validated set of distribution behaviors.

use std::collections::HashSet;

use crate::behavior::DistributionBehavior;
use crate::error::{DeliveryError, DeliveryResult};

/// Ordered behaviors of a distribution.
///
/// Always holds exactly one default behavior, kept last; the others are
/// sorted most specific first so lookup returns the first match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    behaviors: Vec<DistributionBehavior>,
    default_root_object: String,
}

impl Distribution {
    /// Validate and order behaviors.
    pub fn new(
        behaviors: Vec<DistributionBehavior>,
        default_root_object: impl Into<String>,
    ) -> DeliveryResult<Self> {
        let mut seen = HashSet::new();
        let mut default = None;
        let mut ordered = Vec::with_capacity(behaviors.len());

        for behavior in behaviors {
            behavior.validate()?;
            if !seen.insert(behavior.path_pattern.clone()) {
                if behavior.is_default() {
                    return Err(DeliveryError::MultipleDefaultBehaviors);
                }
                return Err(DeliveryError::DuplicatePathPattern(behavior.path_pattern));
            }
            if behavior.is_default() {
                default = Some(behavior);
            } else {
                ordered.push(behavior);
            }
        }

        let default = default.ok_or(DeliveryError::MissingDefaultBehavior)?;
        ordered.sort_by(|a, b| b.specificity().cmp(&a.specificity()));
        ordered.push(default);

        Ok(Self {
            behaviors: ordered,
            default_root_object: default_root_object.into(),
        })
    }

    /// Behavior handling a request path.
    pub fn behavior_for(&self, path: &str) -> &DistributionBehavior {
        self.behaviors
            .iter()
            .find(|b| b.matches(path))
            .unwrap_or_else(|| self.default_behavior())
    }

    /// The `*` behavior.
    pub fn default_behavior(&self) -> &DistributionBehavior {
        // Construction guarantees the default is last.
        &self.behaviors[self.behaviors.len() - 1]
    }

    /// Behaviors other than the default, in lookup order.
    pub fn additional_behaviors(&self) -> &[DistributionBehavior] {
        &self.behaviors[..self.behaviors.len() - 1]
    }

    /// Object served for `/`.
    pub fn default_root_object(&self) -> &str {
        &self.default_root_object
    }

    /// Object key a viewer path maps to in the store.
    pub fn object_key(&self, path: &str) -> String {
        let key = path.trim_start_matches('/');
        if key.is_empty() {
            self.default_root_object.clone()
        } else {
            key.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::OriginKind;

    fn standard() -> Distribution {
        Distribution::new(
            vec![
                DistributionBehavior::default_store(),
                DistributionBehavior::api("/api/*"),
            ],
            "index.html",
        )
        .unwrap()
    }

    #[test]
    fn test_api_paths_route_to_api() {
        let distribution = standard();
        assert_eq!(
            distribution.behavior_for("/api/lambda-1").origin,
            OriginKind::ApiEndpoint
        );
        assert_eq!(distribution.behavior_for("/").origin, OriginKind::ObjectStore);
        assert_eq!(
            distribution.behavior_for("/index.html").origin,
            OriginKind::ObjectStore
        );
    }

    #[test]
    fn test_api_never_cached_root_may_be() {
        let distribution = standard();
        assert!(!distribution.behavior_for("/api/lambda-2").cache.allows_caching());
        assert!(distribution.behavior_for("/").cache.allows_caching());
    }

    #[test]
    fn test_default_kept_last() {
        let distribution = Distribution::new(
            vec![
                DistributionBehavior::api("/api/*"),
                DistributionBehavior::default_store(),
                DistributionBehavior::api("/api/v2/*"),
            ],
            "index.html",
        )
        .unwrap();

        assert!(distribution.default_behavior().is_default());
        assert_eq!(distribution.additional_behaviors()[0].path_pattern, "/api/v2/*");
        assert_eq!(distribution.additional_behaviors()[1].path_pattern, "/api/*");
    }

    #[test]
    fn test_missing_default_rejected() {
        let err = Distribution::new(vec![DistributionBehavior::api("/api/*")], "index.html")
            .unwrap_err();
        assert!(matches!(err, DeliveryError::MissingDefaultBehavior));
    }

    #[test]
    fn test_two_defaults_rejected() {
        let err = Distribution::new(
            vec![
                DistributionBehavior::default_store(),
                DistributionBehavior::default_store(),
            ],
            "index.html",
        )
        .unwrap_err();
        assert!(matches!(err, DeliveryError::MultipleDefaultBehaviors));
    }

    #[test]
    fn test_duplicate_pattern_rejected() {
        let err = Distribution::new(
            vec![
                DistributionBehavior::default_store(),
                DistributionBehavior::api("/api/*"),
                DistributionBehavior::api("/api/*"),
            ],
            "index.html",
        )
        .unwrap_err();
        assert!(matches!(err, DeliveryError::DuplicatePathPattern(p) if p == "/api/*"));
    }

    #[test]
    fn test_object_key() {
        let distribution = standard();
        assert_eq!(distribution.object_key("/"), "index.html");
        assert_eq!(distribution.object_key("/css/site.css"), "css/site.css");
    }
}
