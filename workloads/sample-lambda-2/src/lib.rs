//! Sample compute endpoint served at `/api/lambda-2`.

use std::time::Instant;

use chrono::{DateTime, Utc};
use stack_api::{
    GreetingBody, Handler, HandlerError, HandlerResponse, InvocationContext, InvocationEvent,
};
use stack_observability::InvocationRecord;

pub const ENDPOINT_ID: &str = "sample-lambda-2";

pub const MESSAGE: &str = "Hello from sample-lambda-2!";

/// Greeting handler with a replaceable clock.
#[derive(Debug, Clone, Copy)]
pub struct SampleLambda2 {
    clock: fn() -> DateTime<Utc>,
}

impl Default for SampleLambda2 {
    fn default() -> Self {
        Self { clock: Utc::now }
    }
}

impl SampleLambda2 {
    /// Handler stamping responses with `clock` instead of the system time.
    pub fn with_clock(clock: fn() -> DateTime<Utc>) -> Self {
        Self { clock }
    }
}

impl Handler for SampleLambda2 {
    fn endpoint_id(&self) -> &str {
        ENDPOINT_ID
    }

    fn handle(
        &self,
        event: &InvocationEvent,
        ctx: &InvocationContext,
    ) -> Result<HandlerResponse, HandlerError> {
        let started = Instant::now();
        let response = HandlerResponse::json(200, &GreetingBody::new(MESSAGE, (self.clock)(), ctx))?;

        InvocationRecord::new(ENDPOINT_ID, ctx.request_id_or_unknown(), &event.raw_path)
            .with_status(response.status_code)
            .with_elapsed(started.elapsed())
            .emit();

        Ok(response)
    }
}
