//! Declared resources and the per-stack resource set.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{CoreError, CoreResult};

/// Kind of managed resource a descriptor declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Edge filtering policy (web ACL).
    WebAcl,
    /// Compute function.
    Function,
    /// Execution role assumed by a compute function.
    FunctionRole,
    /// Permission allowing the API front door to invoke a function.
    FunctionPermission,
    /// HTTP API front door.
    HttpApi,
    /// Integration binding a route to a function.
    ApiIntegration,
    /// Route on the HTTP API.
    ApiRoute,
    /// Stage of the HTTP API.
    ApiStage,
    /// Object store bucket.
    Bucket,
    /// Bucket access policy.
    BucketPolicy,
    /// Origin access control for a bucket origin.
    OriginAccessControl,
    /// Content-delivery distribution.
    Distribution,
}

impl ResourceKind {
    /// CloudFormation type name for this kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::WebAcl => "AWS::WAFv2::WebACL",
            Self::Function => "AWS::Lambda::Function",
            Self::FunctionRole => "AWS::IAM::Role",
            Self::FunctionPermission => "AWS::Lambda::Permission",
            Self::HttpApi => "AWS::ApiGatewayV2::Api",
            Self::ApiIntegration => "AWS::ApiGatewayV2::Integration",
            Self::ApiRoute => "AWS::ApiGatewayV2::Route",
            Self::ApiStage => "AWS::ApiGatewayV2::Stage",
            Self::Bucket => "AWS::S3::Bucket",
            Self::BucketPolicy => "AWS::S3::BucketPolicy",
            Self::OriginAccessControl => "AWS::CloudFront::OriginAccessControl",
            Self::Distribution => "AWS::CloudFront::Distribution",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A single declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Logical id, unique within its stack.
    pub logical_id: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Provider properties.
    pub properties: Value,
    /// Logical ids this resource must be created after.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Whether the resource is deleted when its stack is torn down.
    #[serde(default = "default_true")]
    pub destroy_on_teardown: bool,
}

fn default_true() -> bool {
    true
}

impl Resource {
    /// Create a new resource descriptor.
    pub fn new(logical_id: impl Into<String>, kind: ResourceKind, properties: Value) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind,
            properties,
            depends_on: Vec::new(),
            destroy_on_teardown: true,
        }
    }

    /// Add an explicit creation dependency.
    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }

    /// Keep the resource when the stack is torn down.
    pub fn retain_on_teardown(mut self) -> Self {
        self.destroy_on_teardown = false;
        self
    }

    /// Template fragment for this resource.
    pub fn to_template(&self) -> Value {
        let policy = if self.destroy_on_teardown { "Delete" } else { "Retain" };
        let mut body = json!({
            "Type": self.kind.type_name(),
            "Properties": self.properties,
            "DeletionPolicy": policy,
            "UpdateReplacePolicy": policy,
        });
        if !self.depends_on.is_empty() {
            body["DependsOn"] = json!(self.depends_on);
        }
        body
    }
}

/// Ordered set of resources belonging to one stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSet {
    resources: Vec<Resource>,
}

impl ResourceSet {
    /// Create an empty resource set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource, rejecting duplicate or malformed logical ids.
    pub fn add(&mut self, resource: Resource) -> CoreResult<()> {
        let id = &resource.logical_id;
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidLogicalId(id.clone()));
        }
        if self.contains(id) {
            return Err(CoreError::DuplicateLogicalId(id.clone()));
        }
        self.resources.push(resource);
        Ok(())
    }

    /// Check that every declared dependency points at a resource in this set.
    pub fn validate(&self) -> CoreResult<()> {
        for resource in &self.resources {
            for dep in &resource.depends_on {
                if !self.contains(dep) {
                    return Err(CoreError::UnknownDependency {
                        resource: resource.logical_id.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Look up a resource by logical id.
    pub fn get(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.logical_id == logical_id)
    }

    /// Check if a logical id is declared.
    pub fn contains(&self, logical_id: &str) -> bool {
        self.get(logical_id).is_some()
    }

    /// Resources of a given kind, in declaration order.
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(move |r| r.kind == kind)
    }

    /// Iterate over all resources in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Template intrinsic helpers.
pub mod intrinsic {
    use serde_json::{json, Value};

    /// Reference to a resource's primary identifier.
    pub fn reference(logical_id: &str) -> Value {
        json!({ "Ref": logical_id })
    }

    /// Attribute of a resource.
    pub fn get_att(logical_id: &str, attribute: &str) -> Value {
        json!({ "Fn::GetAtt": [logical_id, attribute] })
    }

    /// Value exported by another stack.
    pub fn import_value(export_name: &str) -> Value {
        json!({ "Fn::ImportValue": export_name })
    }

    /// String substitution with `${...}` placeholders.
    pub fn sub(template: &str) -> Value {
        json!({ "Fn::Sub": template })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_logical_id_rejected() {
        let mut set = ResourceSet::new();
        set.add(Resource::new("Bucket", ResourceKind::Bucket, json!({})))
            .unwrap();
        let err = set
            .add(Resource::new("Bucket", ResourceKind::Bucket, json!({})))
            .unwrap_err();
        assert_eq!(err, CoreError::DuplicateLogicalId("Bucket".into()));
    }

    #[test]
    fn test_invalid_logical_id_rejected() {
        let mut set = ResourceSet::new();
        assert!(set
            .add(Resource::new("my-bucket", ResourceKind::Bucket, json!({})))
            .is_err());
        assert!(set
            .add(Resource::new("", ResourceKind::Bucket, json!({})))
            .is_err());
    }

    #[test]
    fn test_unknown_dependency_detected() {
        let mut set = ResourceSet::new();
        set.add(
            Resource::new("Policy", ResourceKind::BucketPolicy, json!({})).depends_on("Bucket"),
        )
        .unwrap();
        assert!(matches!(
            set.validate(),
            Err(CoreError::UnknownDependency { .. })
        ));

        set.add(Resource::new("Bucket", ResourceKind::Bucket, json!({})))
            .unwrap();
        assert!(set.validate().is_ok());
    }

    #[test]
    fn test_template_deletion_policy() {
        let retained = Resource::new("Bucket", ResourceKind::Bucket, json!({})).retain_on_teardown();
        assert_eq!(retained.to_template()["DeletionPolicy"], "Retain");

        let destroyed = Resource::new("Bucket", ResourceKind::Bucket, json!({})).depends_on("Other");
        let template = destroyed.to_template();
        assert_eq!(template["DeletionPolicy"], "Delete");
        assert_eq!(template["DependsOn"], json!(["Other"]));
        assert_eq!(template["Type"], "AWS::S3::Bucket");
    }
}
