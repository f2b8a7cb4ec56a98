//! Core abstractions for the serverless edge stack.
//!
//! This crate provides the fundamental types and traits:
//! - `Resource` / `ResourceSet` - Declared cloud resources of one stack
//! - `StackUnit` trait - A deployable unit with outputs and dependencies
//! - `ExportRef` - Cross-stack value passed between units as a handle
//! - `DeployPhase` / `DeployTimeline` - Deployment lifecycle tracking

mod error;
mod lifecycle;
mod resource;
mod unit;

pub use error::*;
pub use lifecycle::*;
pub use resource::*;
pub use unit::*;
