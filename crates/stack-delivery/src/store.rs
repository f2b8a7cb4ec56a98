//! Private object store backing the distribution.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Settings of the bucket holding the static site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStore {
    /// Object served for the root path.
    pub index_document: String,
    /// Object served for missing keys, if any.
    pub error_document: Option<String>,
    /// Whether the bucket survives stack teardown.
    pub retain_on_teardown: bool,
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self {
            index_document: "index.html".to_string(),
            error_document: None,
            retain_on_teardown: false,
        }
    }
}

impl ObjectStore {
    /// Store with the given index document.
    pub fn new(index_document: impl Into<String>) -> Self {
        Self {
            index_document: index_document.into(),
            ..Default::default()
        }
    }

    /// Serve `document` for missing keys.
    pub fn with_error_document(mut self, document: impl Into<String>) -> Self {
        self.error_document = Some(document.into());
        self
    }

    /// Keep the bucket when the stack is torn down.
    pub fn retained(mut self) -> Self {
        self.retain_on_teardown = true;
        self
    }

    /// Provider properties. Every form of public access is blocked; the only
    /// reader is the distribution through origin access control.
    pub fn to_properties(&self) -> Value {
        json!({
            "PublicAccessBlockConfiguration": {
                "BlockPublicAcls": true,
                "BlockPublicPolicy": true,
                "IgnorePublicAcls": true,
                "RestrictPublicBuckets": true,
            },
            "OwnershipControls": {
                "Rules": [{ "ObjectOwnership": "BucketOwnerEnforced" }],
            },
            "BucketEncryption": {
                "ServerSideEncryptionConfiguration": [{
                    "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" },
                }],
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_access_fully_blocked() {
        let props = ObjectStore::default().to_properties();
        let block = &props["PublicAccessBlockConfiguration"];
        for key in [
            "BlockPublicAcls",
            "BlockPublicPolicy",
            "IgnorePublicAcls",
            "RestrictPublicBuckets",
        ] {
            assert_eq!(block[key], true, "{key} should be blocked");
        }
        assert!(props.get("WebsiteConfiguration").is_none());
    }

    #[test]
    fn test_defaults() {
        let store = ObjectStore::default();
        assert_eq!(store.index_document, "index.html");
        assert!(!store.retain_on_teardown);
        assert!(store.retained().retain_on_teardown);
    }
}
