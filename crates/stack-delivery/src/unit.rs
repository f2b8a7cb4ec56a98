//! The delivery stack.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stack_api::ApiHandle;
use stack_core::{
    intrinsic, Resource, ResourceKind, ResourceSet, StackEnv, StackOutput, StackUnit,
};
use stack_security::PolicyHandle;

use crate::assets::AssetSet;
use crate::behavior::{DistributionBehavior, API_ORIGIN_ID, STORE_ORIGIN_ID};
use crate::distribution::Distribution;
use crate::error::{DeliveryError, DeliveryResult};
use crate::publish::{AssetPublication, INVALIDATE_ALL};
use crate::store::ObjectStore;

pub const ASSETS_BUCKET_ID: &str = "AssetsBucket";
pub const ASSETS_BUCKET_POLICY_ID: &str = "AssetsBucketPolicy";
pub const ORIGIN_ACCESS_CONTROL_ID: &str = "OriginAccessControl";
pub const DISTRIBUTION_ID: &str = "Distribution";

/// Output key of the distribution's public domain name.
pub const DISTRIBUTION_DOMAIN_OUTPUT: &str = "DistributionDomainName";
pub const DISTRIBUTION_ID_OUTPUT: &str = "DistributionId";
pub const ASSETS_BUCKET_OUTPUT: &str = "AssetsBucketName";

/// Origin statuses the error document replaces. The distribution applies
/// them to every behavior, the API included.
pub const ERROR_RESPONSE_CODES: [u16; 2] = [403, 404];

/// Delivery stack configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Directory holding the static site.
    #[serde(default = "default_site_dir")]
    pub site_dir: PathBuf,

    /// Object served for `/`.
    #[serde(default = "default_root_object")]
    pub default_root_object: String,

    /// Object served, with status 404, for missing keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_document: Option<String>,

    #[serde(default = "default_price_class")]
    pub price_class: String,

    /// Path pattern forwarded to the API front door.
    #[serde(default = "default_api_path_pattern")]
    pub api_path_pattern: String,

    /// Paths invalidated after each publish.
    #[serde(default = "default_invalidation_paths")]
    pub invalidation_paths: Vec<String>,

    /// Keep the bucket on teardown.
    #[serde(default)]
    pub retain_store: bool,
}

fn default_site_dir() -> PathBuf {
    PathBuf::from("site")
}

fn default_root_object() -> String {
    "index.html".to_string()
}

fn default_price_class() -> String {
    "PriceClass_100".to_string()
}

fn default_api_path_pattern() -> String {
    "/api/*".to_string()
}

fn default_invalidation_paths() -> Vec<String> {
    vec![INVALIDATE_ALL.to_string()]
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            site_dir: default_site_dir(),
            default_root_object: default_root_object(),
            error_document: None,
            price_class: default_price_class(),
            api_path_pattern: default_api_path_pattern(),
            invalidation_paths: default_invalidation_paths(),
            retain_store: false,
        }
    }
}

/// Stack declaring the private store, the distribution in front of it and
/// the publication of the static site.
#[derive(Debug, Clone)]
pub struct DeliveryUnit {
    name: String,
    env: StackEnv,
    store: ObjectStore,
    distribution: Distribution,
    policy: PolicyHandle,
    api: ApiHandle,
    publication: AssetPublication,
    resources: ResourceSet,
}

impl DeliveryUnit {
    /// Declare the unit against the security policy and API it fronts.
    pub fn new(
        name: impl Into<String>,
        env: StackEnv,
        config: &DeliveryConfig,
        policy: &PolicyHandle,
        api: &ApiHandle,
        assets: &AssetSet,
    ) -> DeliveryResult<Self> {
        let name = name.into();

        let mut store = ObjectStore::new(config.default_root_object.clone());
        if let Some(ref document) = config.error_document {
            store = store.with_error_document(document.clone());
        }
        if config.retain_store {
            store = store.retained();
        }

        let distribution = Distribution::new(
            vec![
                DistributionBehavior::default_store(),
                DistributionBehavior::api(config.api_path_pattern.clone()),
            ],
            config.default_root_object.clone(),
        )?;

        if assets.is_empty() {
            return Err(DeliveryError::EmptyAssetSet);
        }
        if !assets.contains(distribution.default_root_object()) {
            return Err(DeliveryError::MissingRootObject(
                distribution.default_root_object().to_string(),
            ));
        }

        let publication = AssetPublication::new(
            assets,
            ASSETS_BUCKET_OUTPUT,
            DISTRIBUTION_ID_OUTPUT,
            config.invalidation_paths.clone(),
        )?;

        let resources = declare_resources(config, &store, &distribution, policy, api)?;

        tracing::debug!(
            stack = %name,
            behaviors = distribution.additional_behaviors().len() + 1,
            assets = assets.len(),
            content_hash = %publication.content_hash,
            "declared delivery unit"
        );

        Ok(Self {
            name,
            env,
            store,
            distribution,
            policy: policy.clone(),
            api: api.clone(),
            publication,
            resources,
        })
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    /// Policy attached to the distribution.
    pub fn policy_handle(&self) -> &PolicyHandle {
        &self.policy
    }

    /// API the distribution forwards to.
    pub fn api_handle(&self) -> &ApiHandle {
        &self.api
    }

    /// Publish action to run after provisioning.
    pub fn publication(&self) -> &AssetPublication {
        &self.publication
    }
}

fn declare_resources(
    config: &DeliveryConfig,
    store: &ObjectStore,
    distribution: &Distribution,
    policy: &PolicyHandle,
    api: &ApiHandle,
) -> DeliveryResult<ResourceSet> {
    let mut resources = ResourceSet::new();

    let bucket = Resource::new(ASSETS_BUCKET_ID, ResourceKind::Bucket, store.to_properties());
    resources.add(if store.retain_on_teardown {
        bucket.retain_on_teardown()
    } else {
        bucket
    })?;

    resources.add(Resource::new(
        ORIGIN_ACCESS_CONTROL_ID,
        ResourceKind::OriginAccessControl,
        json!({
            "OriginAccessControlConfig": {
                "Name": intrinsic::sub("${AWS::StackName}-store-oac"),
                "OriginAccessControlOriginType": "s3",
                "SigningBehavior": "always",
                "SigningProtocol": "sigv4",
            },
        }),
    ))?;

    let mut distribution_config = json!({
        "Enabled": true,
        "Comment": intrinsic::sub("${AWS::StackName} static site and API"),
        "DefaultRootObject": distribution.default_root_object(),
        "PriceClass": config.price_class,
        "HttpVersion": "http2and3",
        "WebACLId": policy.arn_import(),
        "Origins": [
            {
                "Id": STORE_ORIGIN_ID,
                "DomainName": intrinsic::get_att(ASSETS_BUCKET_ID, "RegionalDomainName"),
                "S3OriginConfig": { "OriginAccessIdentity": "" },
                "OriginAccessControlId": intrinsic::get_att(ORIGIN_ACCESS_CONTROL_ID, "Id"),
            },
            {
                "Id": API_ORIGIN_ID,
                "DomainName": api.domain_import(),
                "CustomOriginConfig": {
                    "OriginProtocolPolicy": "https-only",
                    "HTTPSPort": 443,
                    "OriginSSLProtocols": ["TLSv1.2"],
                },
            },
        ],
        "DefaultCacheBehavior": distribution.default_behavior().to_properties(),
        "CacheBehaviors": distribution
            .additional_behaviors()
            .iter()
            .map(DistributionBehavior::to_properties)
            .collect::<Vec<Value>>(),
    });
    if let Some(ref document) = store.error_document {
        // The store answers 403 for missing keys since listing is not granted.
        let responses: Vec<Value> = ERROR_RESPONSE_CODES
            .iter()
            .map(|code| {
                json!({
                    "ErrorCode": code,
                    "ResponseCode": 404,
                    "ResponsePagePath": format!("/{}", document.trim_start_matches('/')),
                })
            })
            .collect();
        distribution_config["CustomErrorResponses"] = Value::Array(responses);
    }

    resources.add(
        Resource::new(
            DISTRIBUTION_ID,
            ResourceKind::Distribution,
            json!({ "DistributionConfig": distribution_config }),
        )
        .depends_on(ORIGIN_ACCESS_CONTROL_ID),
    )?;

    resources.add(
        Resource::new(
            ASSETS_BUCKET_POLICY_ID,
            ResourceKind::BucketPolicy,
            json!({
                "Bucket": intrinsic::reference(ASSETS_BUCKET_ID),
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Sid": "AllowDistributionRead",
                        "Effect": "Allow",
                        "Principal": { "Service": "cloudfront.amazonaws.com" },
                        "Action": "s3:GetObject",
                        "Resource": intrinsic::sub(&format!("${{{}.Arn}}/*", ASSETS_BUCKET_ID)),
                        "Condition": {
                            "StringEquals": {
                                "AWS:SourceArn": intrinsic::sub(&format!(
                                    "arn:${{AWS::Partition}}:cloudfront::${{AWS::AccountId}}:distribution/${{{}}}",
                                    DISTRIBUTION_ID
                                )),
                            },
                        },
                    }],
                },
            }),
        )
        .depends_on(DISTRIBUTION_ID),
    )?;

    resources.validate()?;
    Ok(resources)
}

impl StackUnit for DeliveryUnit {
    fn stack_name(&self) -> &str {
        &self.name
    }

    fn env(&self) -> &StackEnv {
        &self.env
    }

    fn resources(&self) -> &ResourceSet {
        &self.resources
    }

    fn outputs(&self) -> Vec<StackOutput> {
        vec![
            StackOutput::new(
                DISTRIBUTION_DOMAIN_OUTPUT,
                intrinsic::get_att(DISTRIBUTION_ID, "DomainName"),
            )
            .with_description("Public domain name of the distribution"),
            StackOutput::new(DISTRIBUTION_ID_OUTPUT, intrinsic::reference(DISTRIBUTION_ID)),
            StackOutput::new(ASSETS_BUCKET_OUTPUT, intrinsic::reference(ASSETS_BUCKET_ID)),
        ]
    }

    fn dependencies(&self) -> Vec<String> {
        let mut stacks = vec![self.policy.stack().to_string()];
        if self.api.stack() != self.policy.stack() {
            stacks.push(self.api.stack().to_string());
        }
        stacks
    }

    fn metadata(&self) -> Option<Value> {
        Some(json!({ "AssetPublication": self.publication.to_metadata() }))
    }
}

#[cfg(test)]
mod tests {
    use stack_api::{ApiComputeUnit, ApiConfig};
    use stack_security::{EdgeSecurityUnit, SecurityConfig};

    use super::*;
    use crate::cache::CACHING_DISABLED_POLICY_ID;

    fn handles() -> (PolicyHandle, ApiHandle) {
        let waf = EdgeSecurityUnit::new("WafStack", &SecurityConfig::default()).unwrap();
        let api =
            ApiComputeUnit::new("ApiStack", StackEnv::global_edge(), &ApiConfig::default()).unwrap();
        (waf.policy_handle(), api.api_handle())
    }

    fn site() -> AssetSet {
        AssetSet::from_files([("index.html", "<h1>hello</h1>")])
    }

    fn unit(config: &DeliveryConfig, assets: &AssetSet) -> DeliveryResult<DeliveryUnit> {
        let (policy, api) = handles();
        DeliveryUnit::new(
            "FrontendStack",
            StackEnv::global_edge(),
            config,
            &policy,
            &api,
            assets,
        )
    }

    #[test]
    fn test_default_unit_resources() {
        let unit = unit(&DeliveryConfig::default(), &site()).unwrap();
        let resources = unit.resources();

        assert_eq!(resources.len(), 4);
        assert!(resources.contains(ASSETS_BUCKET_ID));
        assert!(resources.contains(ORIGIN_ACCESS_CONTROL_ID));
        assert!(resources.contains(DISTRIBUTION_ID));
        assert!(resources.contains(ASSETS_BUCKET_POLICY_ID));
        assert!(resources.get(ASSETS_BUCKET_ID).unwrap().destroy_on_teardown);
    }

    #[test]
    fn test_distribution_imports_handles() {
        let unit = unit(&DeliveryConfig::default(), &site()).unwrap();
        let config = &unit.resources().get(DISTRIBUTION_ID).unwrap().properties["DistributionConfig"];

        assert_eq!(
            config["WebACLId"],
            json!({ "Fn::ImportValue": "WafStack:WebAclArn" })
        );
        assert_eq!(
            config["Origins"][1]["DomainName"],
            json!({ "Fn::ImportValue": "ApiStack:ApiDomain" })
        );
        assert_eq!(config["DefaultRootObject"], "index.html");
        assert_eq!(config["DefaultCacheBehavior"]["ViewerProtocolPolicy"], "redirect-to-https");
        assert_eq!(config["CacheBehaviors"][0]["PathPattern"], "/api/*");
        assert_eq!(
            config["CacheBehaviors"][0]["CachePolicyId"],
            CACHING_DISABLED_POLICY_ID
        );
        assert!(config.get("CustomErrorResponses").is_none());
    }

    #[test]
    fn test_dependencies_and_metadata() {
        let unit = unit(&DeliveryConfig::default(), &site()).unwrap();
        assert_eq!(unit.dependencies(), vec!["WafStack", "ApiStack"]);

        let template = unit.to_template();
        let publication = &template["Metadata"]["AssetPublication"];
        assert_eq!(publication["invalidation_paths"], json!(["/*"]));
        assert_eq!(publication["bucket_output"], ASSETS_BUCKET_OUTPUT);
        assert!(template["Outputs"][DISTRIBUTION_DOMAIN_OUTPUT].is_object());
    }

    #[test]
    fn test_missing_root_object_rejected() {
        let assets = AssetSet::from_files([("about.html", "about")]);
        assert!(matches!(
            unit(&DeliveryConfig::default(), &assets),
            Err(DeliveryError::MissingRootObject(obj)) if obj == "index.html"
        ));
    }

    #[test]
    fn test_invalid_api_pattern_rejected() {
        let config = DeliveryConfig {
            api_path_pattern: "api/*".into(),
            ..Default::default()
        };
        assert!(matches!(
            unit(&config, &site()),
            Err(DeliveryError::InvalidPathPattern(_))
        ));
    }

    #[test]
    fn test_error_document_and_retained_store() {
        let config = DeliveryConfig {
            error_document: Some("404.html".into()),
            retain_store: true,
            ..Default::default()
        };
        let unit = unit(&config, &site()).unwrap();

        let bucket = unit.resources().get(ASSETS_BUCKET_ID).unwrap();
        assert_eq!(bucket.to_template()["DeletionPolicy"], "Retain");

        let config = &unit.resources().get(DISTRIBUTION_ID).unwrap().properties["DistributionConfig"];
        assert_eq!(config["CustomErrorResponses"][0]["ErrorCode"], 403);
        assert_eq!(config["CustomErrorResponses"][1]["ResponsePagePath"], "/404.html");
    }
}
