//! Compute endpoint descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors from declaring the API unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("invalid endpoint identifier '{0}': use lowercase letters, digits and '-'")]
    InvalidEndpointId(String),

    #[error("endpoint '{0}' is declared more than once")]
    DuplicateEndpoint(String),

    #[error("route {method} {path} is declared more than once")]
    DuplicateRoute { method: HttpMethod, path: String },

    #[error("route {method} {path} targets undeclared endpoint '{target}'")]
    UnknownEndpoint {
        method: HttpMethod,
        path: String,
        target: String,
    },

    #[error("route path '{0}' must start with '/'")]
    InvalidPath(String),

    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("endpoint '{id}' has invalid {setting}: {value}")]
    InvalidSetting {
        id: String,
        setting: &'static str,
        value: u32,
    },

    #[error(transparent)]
    Declaration(#[from] stack_core::CoreError),
}

/// Result type for API declarations.
pub type ApiResult<T> = Result<T, ApiError>;

/// HTTP method a route accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&http::Method> for HttpMethod {
    type Error = ApiError;

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        match *method {
            http::Method::GET => Ok(Self::Get),
            http::Method::POST => Ok(Self::Post),
            http::Method::PUT => Ok(Self::Put),
            http::Method::DELETE => Ok(Self::Delete),
            http::Method::PATCH => Ok(Self::Patch),
            http::Method::HEAD => Ok(Self::Head),
            http::Method::OPTIONS => Ok(Self::Options),
            _ => Err(ApiError::UnsupportedMethod(method.to_string())),
        }
    }
}

impl From<HttpMethod> for http::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Delete => http::Method::DELETE,
            HttpMethod::Patch => http::Method::PATCH,
            HttpMethod::Head => http::Method::HEAD,
            HttpMethod::Options => http::Method::OPTIONS,
        }
    }
}

/// Function runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Runtime {
    /// Custom runtime on Amazon Linux 2023 (Rust binaries).
    #[default]
    #[serde(rename = "provided.al2023")]
    ProvidedAl2023,
    #[serde(rename = "nodejs20.x")]
    Nodejs20,
    #[serde(rename = "python3.12")]
    Python312,
}

impl Runtime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProvidedAl2023 => "provided.al2023",
            Self::Nodejs20 => "nodejs20.x",
            Self::Python312 => "python3.12",
        }
    }

    /// Entry point a function on this runtime uses by default.
    pub fn default_entry_point(&self) -> &'static str {
        match self {
            Self::ProvidedAl2023 => "bootstrap",
            Self::Nodejs20 => "index.handler",
            Self::Python312 => "index.handler",
        }
    }
}

/// One deployable compute function. Immutable once declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    id: String,
    runtime: Runtime,
    entry_point: String,
    source_asset: String,
    memory_mb: u32,
    timeout_secs: u32,
}

/// Memory given to a function unless configured otherwise.
pub const DEFAULT_MEMORY_MB: u32 = 128;

/// Timeout applied to a function unless configured otherwise.
pub const DEFAULT_TIMEOUT_SECS: u32 = 3;

impl EndpointDescriptor {
    /// Declare an endpoint from its settings.
    pub fn new(config: &EndpointConfig) -> ApiResult<Self> {
        if !is_valid_id(&config.id) {
            return Err(ApiError::InvalidEndpointId(config.id.clone()));
        }
        if !(128..=10_240).contains(&config.memory_mb) {
            return Err(ApiError::InvalidSetting {
                id: config.id.clone(),
                setting: "memory_mb",
                value: config.memory_mb,
            });
        }
        if !(1..=900).contains(&config.timeout_secs) {
            return Err(ApiError::InvalidSetting {
                id: config.id.clone(),
                setting: "timeout_secs",
                value: config.timeout_secs,
            });
        }

        Ok(Self {
            id: config.id.clone(),
            runtime: config.runtime,
            entry_point: config
                .entry_point
                .clone()
                .unwrap_or_else(|| config.runtime.default_entry_point().to_string()),
            source_asset: config
                .source_asset
                .clone()
                .unwrap_or_else(|| format!("workloads/{}", config.id)),
            memory_mb: config.memory_mb,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn runtime(&self) -> Runtime {
        self.runtime
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Directory holding the function's source.
    pub fn source_asset(&self) -> &str {
        &self.source_asset
    }

    pub fn memory_mb(&self) -> u32 {
        self.memory_mb
    }

    pub fn timeout_secs(&self) -> u32 {
        self.timeout_secs
    }

    /// Object key the template uses until a build is uploaded.
    pub fn package_key(&self) -> String {
        format!("functions/{}.zip", self.id)
    }

    /// Template parameter carrying the uploaded archive's key.
    pub fn code_key_parameter(&self) -> String {
        format!("{}CodeKey", self.logical_name())
    }

    /// Logical id prefix derived from the identifier (`sample-lambda-1` -> `SampleLambda1`).
    pub fn logical_name(&self) -> String {
        self.id
            .split('-')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect()
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && !id.starts_with('-')
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Endpoint settings as they appear in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Endpoint identifier.
    pub id: String,

    /// Runtime (default: provided.al2023).
    #[serde(default)]
    pub runtime: Runtime,

    /// Entry point (default: the runtime's convention).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,

    /// Source directory (default: `workloads/<id>`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_asset: Option<String>,

    /// Memory in MB.
    #[serde(default = "default_memory")]
    pub memory_mb: u32,

    /// Timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_memory() -> u32 {
    DEFAULT_MEMORY_MB
}

fn default_timeout() -> u32 {
    DEFAULT_TIMEOUT_SECS
}

impl EndpointConfig {
    /// Settings for an endpoint with all defaults.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            runtime: Runtime::default(),
            entry_point: None,
            source_asset: None,
            memory_mb: DEFAULT_MEMORY_MB,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_runtime() {
        let endpoint = EndpointDescriptor::new(&EndpointConfig::new("sample-lambda-1")).unwrap();
        assert_eq!(endpoint.runtime(), Runtime::ProvidedAl2023);
        assert_eq!(endpoint.entry_point(), "bootstrap");
        assert_eq!(endpoint.source_asset(), "workloads/sample-lambda-1");
        assert_eq!(endpoint.logical_name(), "SampleLambda1");
        assert_eq!(endpoint.package_key(), "functions/sample-lambda-1.zip");
    }

    #[test]
    fn test_invalid_identifier_rejected() {
        for id in ["", "Sample", "-lead", "has space"] {
            assert!(matches!(
                EndpointDescriptor::new(&EndpointConfig::new(id)),
                Err(ApiError::InvalidEndpointId(_))
            ));
        }
    }

    #[test]
    fn test_settings_bounds() {
        let mut config = EndpointConfig::new("fn");
        config.timeout_secs = 0;
        assert!(matches!(
            EndpointDescriptor::new(&config),
            Err(ApiError::InvalidSetting { setting: "timeout_secs", .. })
        ));
    }

    #[test]
    fn test_method_conversion() {
        assert_eq!(HttpMethod::try_from(&http::Method::GET).unwrap(), HttpMethod::Get);
        assert!(HttpMethod::try_from(&http::Method::CONNECT).is_err());
        assert_eq!(http::Method::from(HttpMethod::Options), http::Method::OPTIONS);
    }

    #[test]
    fn test_runtime_serde_names() {
        let runtime: Runtime = serde_json::from_str("\"nodejs20.x\"").unwrap();
        assert_eq!(runtime, Runtime::Nodejs20);
        assert_eq!(serde_json::to_string(&Runtime::ProvidedAl2023).unwrap(), "\"provided.al2023\"");
    }
}
