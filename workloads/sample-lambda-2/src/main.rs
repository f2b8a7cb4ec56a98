//! Runtime entry point. Packaged as `bootstrap` for the `provided.al2023` runtime.

use lambda_runtime::{service_fn, Error, LambdaEvent};
use sample_lambda_2::SampleLambda2;
use serde_json::Value;
use stack_observability::{init_logging, LogFormat};

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_logging(false, LogFormat::Json)?;

    let handler = &SampleLambda2::default();
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        let (payload, context) = event.into_parts();
        stack_api::invoke_http_api(handler, &payload, &context.request_id).map_err(Error::from)
    }))
    .await
}
