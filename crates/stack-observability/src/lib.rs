//! Observability for the serverless edge stack.
//!
//! This crate provides:
//! - `init_logging` - Global `tracing` subscriber with env filtering
//! - `LogFormat` - Human or JSON output
//! - `InvocationRecord` - One structured line per handler invocation

mod invocation;
mod logging;

pub use invocation::*;
pub use logging::*;
