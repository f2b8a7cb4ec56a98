//! Deployment graph for the serverless edge stack.
//!
//! This crate provides:
//! - `StackConfig` - Declarative settings for all three units
//! - `DeploymentGraph` - Security, API and delivery units composed in order
//! - `Provisioner` - Async seam to the provider (`DryRunProvisioner`, `CliProvisioner`)
//! - `FunctionBuilder` - Compile and archive function code for upload
//! - `deploy` - Upload function code, provision every stack in order, then publish the site
//! - `destroy` - Empty the store and delete every stack in reverse order
//!
//! # Example
//!
//! ```ignore
//! use stack_graph::{deploy, DeploymentGraph, DryRunProvisioner, StackConfig};
//!
//! let graph = DeploymentGraph::compose(&StackConfig::default())?;
//! let report = deploy(&graph, &DryRunProvisioner::new()).await?;
//! println!("https://{}", report.domain_name);
//! ```

mod config;
mod deploy;
mod error;
mod graph;
mod package;
mod provision;

pub use config::*;
pub use deploy::*;
pub use error::*;
pub use graph::*;
pub use package::*;
pub use provision::*;
