//! Post-provisioning action: upload the site and invalidate the edge cache.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stack_core::ResolvedOutputs;

use crate::assets::AssetSet;
use crate::error::{DeliveryError, DeliveryResult};

/// Path invalidated after every publish.
pub const INVALIDATE_ALL: &str = "/*";

/// Describes what gets published and where, by output key.
///
/// Bucket and distribution identifiers only exist once the delivery stack is
/// provisioned, so they are looked up in its resolved outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPublication {
    /// Aggregate hash of the asset set.
    pub content_hash: String,
    pub file_count: usize,
    /// Output carrying the bucket name.
    pub bucket_output: String,
    /// Output carrying the distribution id.
    pub distribution_output: String,
    /// Paths invalidated once the upload finishes.
    pub invalidation_paths: Vec<String>,
    /// Delete objects no longer in the asset set.
    pub prune: bool,
}

/// Concrete destination of a publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    pub bucket: String,
    pub distribution_id: String,
}

impl AssetPublication {
    /// Publication of `assets`, invalidating `paths`.
    pub fn new(
        assets: &AssetSet,
        bucket_output: impl Into<String>,
        distribution_output: impl Into<String>,
        invalidation_paths: Vec<String>,
    ) -> DeliveryResult<Self> {
        if assets.is_empty() {
            return Err(DeliveryError::EmptyAssetSet);
        }
        if let Some(bad) = invalidation_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(DeliveryError::InvalidInvalidationPath(bad.clone()));
        }

        Ok(Self {
            content_hash: assets.content_hash(),
            file_count: assets.len(),
            bucket_output: bucket_output.into(),
            distribution_output: distribution_output.into(),
            invalidation_paths,
            prune: true,
        })
    }

    /// Look up bucket and distribution in the delivery stack's outputs.
    pub fn resolve(&self, outputs: &ResolvedOutputs) -> DeliveryResult<PublishTarget> {
        let lookup = |key: &str| {
            outputs
                .get(key)
                .cloned()
                .ok_or_else(|| DeliveryError::MissingOutput(key.to_string()))
        };

        Ok(PublishTarget {
            bucket: lookup(&self.bucket_output)?,
            distribution_id: lookup(&self.distribution_output)?,
        })
    }

    /// Whether `assets` is the set this publication was declared for.
    pub fn matches(&self, assets: &AssetSet) -> bool {
        self.content_hash == assets.content_hash()
    }

    pub fn to_metadata(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
