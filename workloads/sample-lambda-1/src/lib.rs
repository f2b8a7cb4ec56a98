//! Sample compute endpoint served at `/api/lambda-1`.
//!
//! Answers every invocation with a fixed greeting, the invocation time and
//! the runtime's request id.

use std::time::Instant;

use chrono::Utc;
use stack_api::{
    GreetingBody, Handler, HandlerError, HandlerResponse, InvocationContext, InvocationEvent,
};
use stack_observability::InvocationRecord;

/// Endpoint identifier this workload is declared under.
pub const ENDPOINT_ID: &str = "sample-lambda-1";

/// Greeting returned on every call.
pub const MESSAGE: &str = "Hello from sample-lambda-1!";

#[derive(Debug, Clone, Copy, Default)]
pub struct SampleLambda1;

impl Handler for SampleLambda1 {
    fn endpoint_id(&self) -> &str {
        ENDPOINT_ID
    }

    fn handle(
        &self,
        event: &InvocationEvent,
        ctx: &InvocationContext,
    ) -> Result<HandlerResponse, HandlerError> {
        let started = Instant::now();

        let body = GreetingBody::new(MESSAGE, Utc::now(), ctx);
        let response = HandlerResponse::json(200, &body)?;

        InvocationRecord::new(ENDPOINT_ID, ctx.request_id_or_unknown(), &event.raw_path)
            .with_status(response.status_code)
            .with_elapsed(started.elapsed())
            .emit();

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_response() {
        let event = InvocationEvent::new("GET", "/api/lambda-1");
        let ctx = InvocationContext::new(ENDPOINT_ID, "c6af9ac6-7b61-11e6-9a41-93e8deadbeef");

        let response = SampleLambda1.handle(&event, &ctx).unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
        assert_eq!(response.header("Access-Control-Allow-Headers"), Some("Content-Type"));

        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["message"], MESSAGE);
        assert_eq!(body["requestId"], "c6af9ac6-7b61-11e6-9a41-93e8deadbeef");
        assert!(chrono::DateTime::parse_from_rfc3339(body["timestamp"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_missing_request_id() {
        let response = SampleLambda1
            .handle(
                &InvocationEvent::default(),
                &InvocationContext::anonymous(ENDPOINT_ID),
            )
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["requestId"], "unknown");
    }

    #[test]
    fn test_http_api_invocation() {
        let payload = serde_json::json!({
            "version": "2.0",
            "rawPath": "/api/lambda-1",
            "requestContext": { "http": { "method": "GET" } },
        });
        let result = stack_api::invoke_http_api(&SampleLambda1, &payload, "8f5b2c1e").unwrap();

        assert_eq!(result["statusCode"], 200);
        let body: serde_json::Value = serde_json::from_str(result["body"].as_str().unwrap()).unwrap();
        assert_eq!(body["message"], MESSAGE);
        assert_eq!(body["requestId"], "8f5b2c1e");
    }
}
