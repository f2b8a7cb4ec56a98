//! Contract between the front door and compute workloads.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request identifier reported when the invocation context carries none.
pub const UNKNOWN_REQUEST_ID: &str = "unknown";

/// Methods advertised on every handler response.
pub const RESPONSE_ALLOW_METHODS: &str = "OPTIONS,POST,GET";

/// Event delivered to a handler by the front door.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEvent {
    /// Request path.
    #[serde(default)]
    pub raw_path: String,
    /// Request method.
    #[serde(default)]
    pub method: String,
    /// Request headers, lowercase names.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Raw query string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_query_string: Option<String>,
}

impl InvocationEvent {
    /// Event for a method and path.
    pub fn new(method: impl Into<String>, raw_path: impl Into<String>) -> Self {
        Self {
            raw_path: raw_path.into(),
            method: method.into(),
            ..Default::default()
        }
    }

    /// Event from an HTTP API proxy payload (format 2.0).
    pub fn from_http_api(payload: &Value) -> Self {
        let text = |pointer: &str| payload.pointer(pointer).and_then(Value::as_str);

        let headers = payload
            .get("headers")
            .and_then(Value::as_object)
            .map(|headers| {
                headers
                    .iter()
                    .filter_map(|(name, value)| {
                        value
                            .as_str()
                            .map(|value| (name.to_ascii_lowercase(), value.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            raw_path: text("/rawPath").unwrap_or("/").to_string(),
            method: text("/requestContext/http/method").unwrap_or_default().to_string(),
            headers,
            raw_query_string: text("/rawQueryString")
                .filter(|query| !query.is_empty())
                .map(str::to_string),
        }
    }
}

/// Runtime context of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationContext {
    /// Request identifier assigned by the runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Name of the invoked function.
    #[serde(default)]
    pub function_name: String,
}

impl InvocationContext {
    /// Context for a function with a request id.
    pub fn new(function_name: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            function_name: function_name.into(),
        }
    }

    /// Context without a request id.
    pub fn anonymous(function_name: impl Into<String>) -> Self {
        Self {
            request_id: None,
            function_name: function_name.into(),
        }
    }

    /// Request id, or `"unknown"` when absent.
    pub fn request_id_or_unknown(&self) -> &str {
        self.request_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(UNKNOWN_REQUEST_ID)
    }
}

/// Structure a handler returns to the front door.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HandlerResponse {
    /// JSON response with the permissive CORS headers every endpoint sends.
    pub fn json<T: Serialize>(status_code: u16, body: &T) -> Result<Self, HandlerError> {
        let body = serde_json::to_string(body).map_err(|e| HandlerError::Encode(e.to_string()))?;

        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Access-Control-Allow-Origin".to_string(), "*".to_string());
        headers.insert(
            "Access-Control-Allow-Headers".to_string(),
            "Content-Type".to_string(),
        );
        headers.insert(
            "Access-Control-Allow-Methods".to_string(),
            RESPONSE_ALLOW_METHODS.to_string(),
        );

        Ok(Self {
            status_code,
            headers,
            body,
        })
    }

    /// Header value, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Body every sample endpoint returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GreetingBody {
    pub message: String,
    /// ISO-8601 timestamp of the invocation.
    pub timestamp: String,
    pub request_id: String,
}

impl GreetingBody {
    /// Body for a message at a given time.
    pub fn new(message: impl Into<String>, at: DateTime<Utc>, ctx: &InvocationContext) -> Self {
        Self {
            message: message.into(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            request_id: ctx.request_id_or_unknown().to_string(),
        }
    }
}

/// Errors a handler can surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("failed to encode response body: {0}")]
    Encode(String),

    #[error("handler failed: {0}")]
    Failed(String),
}

/// A compute workload reachable through the front door.
pub trait Handler: Send + Sync {
    /// Endpoint identifier this handler implements.
    fn endpoint_id(&self) -> &str;

    /// Handle one invocation.
    fn handle(
        &self,
        event: &InvocationEvent,
        ctx: &InvocationContext,
    ) -> Result<HandlerResponse, HandlerError>;
}

/// Run `handler` for one HTTP API invocation and encode its response as the
/// proxy result the front door expects.
pub fn invoke_http_api(
    handler: &dyn Handler,
    payload: &Value,
    request_id: &str,
) -> Result<Value, HandlerError> {
    let event = InvocationEvent::from_http_api(payload);
    let ctx = InvocationContext::new(handler.endpoint_id(), request_id);
    let response = handler.handle(&event, &ctx)?;
    serde_json::to_value(response).map_err(|e| HandlerError::Encode(e.to_string()))
}
