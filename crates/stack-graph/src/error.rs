//! Errors raised while composing or deploying the graph.

use std::path::PathBuf;

use stack_api::ApiError;
use stack_delivery::DeliveryError;
use stack_security::SecurityError;

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors from composing, synthesizing or deploying the graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("security unit: {0}")]
    Security(#[from] SecurityError),

    #[error("api unit: {0}")]
    Api(#[from] ApiError),

    #[error("delivery unit: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("stack '{stack}' depends on '{dependency}', which is not composed before it")]
    UnorderedDependency { stack: String, dependency: String },

    #[error(
        "stack '{stack}' in {region} imports from '{dependency}' in {dependency_region}; \
         exports only resolve within one region"
    )]
    RegionMismatch {
        stack: String,
        region: String,
        dependency: String,
        dependency_region: String,
    },

    #[error("provisioning stack '{stack}' failed: {message}")]
    Provision { stack: String, message: String },

    #[error("stack '{stack}' did not report output '{output}'")]
    MissingOutput { stack: String, output: String },

    #[error("packaging endpoint '{endpoint}' failed: {message}")]
    Package { endpoint: String, message: String },

    #[error("uploading function code failed: {0}")]
    Stage(String),

    #[error("publishing assets failed: {0}")]
    Publish(String),

    #[error("tearing down stack '{stack}' failed: {message}")]
    Teardown { stack: String, message: String },

    #[error("failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },
}

impl GraphError {
    /// Whether the error was raised before any provisioning call.
    pub fn is_declaration(&self) -> bool {
        matches!(
            self,
            Self::Security(_)
                | Self::Api(_)
                | Self::Delivery(_)
                | Self::UnorderedDependency { .. }
                | Self::RegionMismatch { .. }
        )
    }
}
