//! Content delivery unit for the serverless edge stack.
//!
//! This crate provides:
//! - `ObjectStore` - Private bucket holding the static site
//! - `CachePolicy` - Cacheable vs. uncachable edge behavior
//! - `DistributionBehavior` / `Distribution` - Path-pattern routing to origins
//! - `AssetSet` / `AssetPublication` - Static files and their publish action
//! - `EdgeSimulator` - In-memory model of the edge for local verification
//! - `DeliveryUnit` - The stack wiring store, distribution, policy and API
//!
//! # Example
//!
//! ```ignore
//! use stack_delivery::{AssetSet, DeliveryConfig, DeliveryUnit};
//!
//! let assets = AssetSet::load("site")?;
//! let unit = DeliveryUnit::new("FrontendStack", env, &DeliveryConfig::default(),
//!     &policy_handle, &api_handle, &assets)?;
//! let publication = unit.publication();
//! ```

mod assets;
mod behavior;
mod cache;
mod distribution;
mod error;
mod publish;
mod simulator;
mod store;
mod unit;

pub use assets::*;
pub use behavior::*;
pub use cache::*;
pub use distribution::*;
pub use error::*;
pub use publish::*;
pub use simulator::*;
pub use store::*;
pub use unit::*;
