//! API compute unit for the serverless edge stack.
//!
//! This crate provides:
//! - `EndpointDescriptor` - One deployable compute function
//! - `RouteTable` - `(path, method)` to endpoint mapping of the front door
//! - `CorsConfig` - Cross-origin settings applied to every route
//! - `ApiComputeUnit` / `ApiHandle` - The stack and its read-only handle
//! - `FunctionPackage` - Code archive of an endpoint and its package bucket
//! - `Handler` - Contract every compute workload implements

mod cors;
mod endpoint;
mod invoke;
mod package;
mod route;
mod unit;

pub use cors::*;
pub use endpoint::*;
pub use invoke::*;
pub use package::*;
pub use route::*;
pub use unit::*;
