//! Runtime entry point. Packaged as `bootstrap` for the `provided.al2023` runtime.

use lambda_runtime::{service_fn, Error, LambdaEvent};
use sample_lambda_1::SampleLambda1;
use serde_json::Value;
use stack_observability::{init_logging, LogFormat};

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_logging(false, LogFormat::Json)?;
    lambda_runtime::run(service_fn(handle)).await
}

async fn handle(event: LambdaEvent<Value>) -> Result<Value, Error> {
    let (payload, context) = event.into_parts();
    Ok(stack_api::invoke_http_api(&SampleLambda1, &payload, &context.request_id)?)
}
