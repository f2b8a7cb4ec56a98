//! Route table of the API front door.

use serde::{Deserialize, Serialize};

use crate::endpoint::{ApiError, ApiResult, HttpMethod};

/// Route settings as they appear in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Path the route matches exactly.
    pub path: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: HttpMethod,

    /// Endpoint identifier the route targets.
    pub target: String,
}

fn default_method() -> HttpMethod {
    HttpMethod::Get
}

impl RouteConfig {
    /// GET route to an endpoint.
    pub fn get(path: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: HttpMethod::Get,
            target: target.into(),
        }
    }
}

/// A declared route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub path: String,
    pub method: HttpMethod,
    pub target: String,
}

impl Route {
    /// Route key in the front door's `METHOD /path` notation.
    pub fn route_key(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Ordered set of routes; no two share `(path, method)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route, rejecting malformed paths and duplicate `(path, method)` pairs.
    pub fn add(&mut self, config: &RouteConfig) -> ApiResult<()> {
        if !config.path.starts_with('/') {
            return Err(ApiError::InvalidPath(config.path.clone()));
        }
        if self.find(config.method, &config.path).is_some() {
            return Err(ApiError::DuplicateRoute {
                method: config.method,
                path: config.path.clone(),
            });
        }
        self.routes.push(Route {
            path: config.path.clone(),
            method: config.method,
            target: config.target.clone(),
        });
        Ok(())
    }

    /// Endpoint serving `(method, path)`, if declared. Undeclared pairs are not routed.
    pub fn resolve(&self, method: HttpMethod, path: &str) -> Option<&str> {
        self.find(method, path).map(|r| r.target.as_str())
    }

    /// Whether any method is declared for a path.
    pub fn has_path(&self, path: &str) -> bool {
        self.routes.iter().any(|r| r.path == path)
    }

    fn find(&self, method: HttpMethod, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| r.method == method && r.path == path)
    }

    /// Routes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        let mut table = RouteTable::new();
        table
            .add(&RouteConfig::get("/api/lambda-1", "sample-lambda-1"))
            .unwrap();
        table
            .add(&RouteConfig::get("/api/lambda-2", "sample-lambda-2"))
            .unwrap();
        table
    }

    #[test]
    fn test_resolve_declared_routes() {
        let table = table();
        assert_eq!(
            table.resolve(HttpMethod::Get, "/api/lambda-1"),
            Some("sample-lambda-1")
        );
        assert_eq!(
            table.resolve(HttpMethod::Get, "/api/lambda-2"),
            Some("sample-lambda-2")
        );
    }

    #[test]
    fn test_undeclared_pairs_not_routed() {
        let table = table();
        assert_eq!(table.resolve(HttpMethod::Post, "/api/lambda-1"), None);
        assert_eq!(table.resolve(HttpMethod::Get, "/api/lambda-3"), None);
        assert_eq!(table.resolve(HttpMethod::Get, "/api/lambda-1/"), None);
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut table = table();
        let err = table
            .add(&RouteConfig::get("/api/lambda-1", "sample-lambda-2"))
            .unwrap_err();
        assert!(matches!(err, ApiError::DuplicateRoute { .. }));

        // Same path with another method is a different route.
        let post = RouteConfig {
            method: HttpMethod::Post,
            ..RouteConfig::get("/api/lambda-1", "sample-lambda-1")
        };
        assert!(table.add(&post).is_ok());
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_relative_path_rejected() {
        let mut table = RouteTable::new();
        assert_eq!(
            table.add(&RouteConfig::get("api/x", "fn")),
            Err(ApiError::InvalidPath("api/x".into()))
        );
    }

    #[test]
    fn test_route_key() {
        let table = table();
        let keys: Vec<String> = table.iter().map(Route::route_key).collect();
        assert_eq!(keys, vec!["GET /api/lambda-1", "GET /api/lambda-2"]);
    }
}
