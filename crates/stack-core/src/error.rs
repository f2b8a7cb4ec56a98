//! Errors raised while declaring resources.

/// Result type for declaration operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors from assembling a stack's resource set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("duplicate logical id '{0}' in stack")]
    DuplicateLogicalId(String),

    #[error("invalid logical id '{0}': must be non-empty and alphanumeric")]
    InvalidLogicalId(String),

    #[error("resource '{resource}' depends on undeclared resource '{missing}'")]
    UnknownDependency { resource: String, missing: String },
}
