//! Edge security unit for the serverless edge stack.
//!
//! This crate provides:
//! - `FilterPolicy` - Default action plus prioritized filter rules
//! - `PolicyEvaluator` - Local evaluation of a policy against request samples
//! - `EdgeSecurityUnit` - The stack declaring the CDN-scoped web ACL
//! - `PolicyHandle` - Read-only reference handed to the delivery unit
//!
//! # Example
//!
//! ```ignore
//! use stack_security::{EdgeSecurityUnit, SecurityConfig};
//!
//! let unit = EdgeSecurityUnit::new("WafStack", &SecurityConfig::default())?;
//! let handle = unit.policy_handle();
//! ```

mod evaluate;
mod policy;
mod unit;

pub use evaluate::*;
pub use policy::*;
pub use unit::*;
