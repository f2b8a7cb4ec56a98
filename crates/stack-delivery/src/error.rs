//! Errors raised while declaring the delivery unit.

use std::path::PathBuf;

/// Result type for delivery declarations.
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Errors from declaring the delivery unit.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("distribution has no default behavior")]
    MissingDefaultBehavior,

    #[error("distribution declares more than one default behavior")]
    MultipleDefaultBehaviors,

    #[error("path pattern '{0}' is declared more than once")]
    DuplicatePathPattern(String),

    #[error("invalid path pattern '{0}': must start with '/' and be at most 255 characters")]
    InvalidPathPattern(String),

    #[error("asset set does not contain the default root object '{0}'")]
    MissingRootObject(String),

    #[error("asset set is empty")]
    EmptyAssetSet,

    #[error("invalid invalidation path '{0}': must start with '/'")]
    InvalidInvalidationPath(String),

    #[error("stack output '{0}' required for publishing was not resolved")]
    MissingOutput(String),

    #[error("publication {expected} does not describe the given asset set ({actual})")]
    PublicationMismatch { expected: String, actual: String },

    #[error("failed to read assets from {path}: {message}")]
    AssetRead { path: PathBuf, message: String },

    #[error(transparent)]
    Declaration(#[from] stack_core::CoreError),
}
