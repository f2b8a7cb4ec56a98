//! Function code archives and the bucket they are uploaded to.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stack_core::intrinsic;

use crate::endpoint::{EndpointDescriptor, Runtime};

/// Name of the package bucket when none is configured; the provider fills in
/// the account and region.
pub const PACKAGE_BUCKET_PATTERN: &str = "edge-stack-packages-${AWS::AccountId}-${AWS::Region}";

/// Prefix of every uploaded archive.
pub const PACKAGE_PREFIX: &str = "functions/";

/// Bucket holding packaged function code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageBucket {
    /// Bucket named in configuration.
    Named(String),
    /// Per-account bucket named after [`PACKAGE_BUCKET_PATTERN`].
    AccountDefault,
}

impl PackageBucket {
    pub fn from_config(name: Option<&str>) -> Self {
        match name {
            Some(name) => Self::Named(name.to_string()),
            None => Self::AccountDefault,
        }
    }

    /// Whether resolving the name needs the account id.
    pub fn needs_account(&self) -> bool {
        matches!(self, Self::AccountDefault)
    }

    /// Concrete bucket name in an account and region.
    pub fn resolve(&self, account: &str, region: &str) -> String {
        match self {
            Self::Named(name) => name.clone(),
            Self::AccountDefault => PACKAGE_BUCKET_PATTERN
                .replace("${AWS::AccountId}", account)
                .replace("${AWS::Region}", region),
        }
    }

    /// Expression naming the bucket inside a template.
    pub fn to_template(&self) -> Value {
        match self {
            Self::Named(name) => json!(name),
            Self::AccountDefault => intrinsic::sub(PACKAGE_BUCKET_PATTERN),
        }
    }
}

/// How an endpoint's source becomes an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageSource {
    /// A cargo package compiled to one executable, stored under the entry point.
    CargoBinary,
    /// The source directory zipped as it is.
    Directory,
}

impl From<Runtime> for PackageSource {
    fn from(runtime: Runtime) -> Self {
        match runtime {
            Runtime::ProvidedAl2023 => Self::CargoBinary,
            Runtime::Nodejs20 | Runtime::Python312 => Self::Directory,
        }
    }
}

/// Code of one endpoint, before it is built and uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionPackage {
    pub endpoint_id: String,
    pub source: PackageSource,
    /// Source directory, relative to the project.
    pub source_asset: String,
    /// Cargo package and binary name, for [`PackageSource::CargoBinary`].
    pub crate_name: String,
    /// Archive entry the runtime starts.
    pub entry_point: String,
    pub bucket: PackageBucket,
    /// Template parameter carrying the archive's object key.
    pub key_parameter: String,
    /// Object key the template falls back to.
    pub default_key: String,
}

impl FunctionPackage {
    pub fn new(endpoint: &EndpointDescriptor, bucket: &PackageBucket) -> Self {
        let crate_name = endpoint
            .source_asset()
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(endpoint.id())
            .to_string();

        Self {
            endpoint_id: endpoint.id().to_string(),
            source: endpoint.runtime().into(),
            source_asset: endpoint.source_asset().to_string(),
            crate_name,
            entry_point: endpoint.entry_point().to_string(),
            bucket: bucket.clone(),
            key_parameter: endpoint.code_key_parameter(),
            default_key: endpoint.package_key(),
        }
    }

    /// Object key of an archive with the given content hash.
    ///
    /// A new hash means a new key, so the provider replaces the code.
    pub fn key_for(&self, sha256: &str) -> String {
        let short = sha256.get(..16).unwrap_or(sha256);
        format!("{}{}-{}.zip", PACKAGE_PREFIX, self.endpoint_id, short)
    }
}
