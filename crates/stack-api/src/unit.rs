//! The API compute stack.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stack_core::{
    intrinsic, ExportRef, Resource, ResourceKind, ResourceSet, StackEnv, StackOutput,
    StackParameter, StackUnit,
};

use crate::cors::CorsConfig;
use crate::endpoint::{ApiError, ApiResult, EndpointConfig, EndpointDescriptor};
use crate::package::{FunctionPackage, PackageBucket};
use crate::route::{RouteConfig, RouteTable};

/// Logical id of the HTTP API inside the API stack.
pub const HTTP_API_ID: &str = "HttpApi";

/// Output key under which the front door's domain is exported.
pub const API_DOMAIN_OUTPUT: &str = "ApiDomain";

/// Output key of the front door's invoke URL.
pub const API_URL_OUTPUT: &str = "ApiUrl";

/// API stack configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Name of the HTTP API.
    #[serde(default = "default_api_name")]
    pub api_name: String,

    /// Bucket holding packaged function code (default: one per account and region).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_bucket: Option<String>,

    /// Compute endpoints.
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<EndpointConfig>,

    /// Routes of the front door.
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteConfig>,

    /// Cross-origin settings for every route.
    #[serde(default)]
    pub cors: CorsConfig,
}

fn default_api_name() -> String {
    "edge-http-api".to_string()
}

fn default_endpoints() -> Vec<EndpointConfig> {
    vec![
        EndpointConfig::new("sample-lambda-1"),
        EndpointConfig::new("sample-lambda-2"),
    ]
}

fn default_routes() -> Vec<RouteConfig> {
    vec![
        RouteConfig::get("/api/lambda-1", "sample-lambda-1"),
        RouteConfig::get("/api/lambda-2", "sample-lambda-2"),
    ]
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_name: default_api_name(),
            package_bucket: None,
            endpoints: default_endpoints(),
            routes: default_routes(),
            cors: CorsConfig::default(),
        }
    }
}

/// Read-only reference to the deployed front door.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiHandle {
    domain: ExportRef,
    routes: RouteTable,
    cors: CorsConfig,
}

impl ApiHandle {
    /// Stack that owns the front door.
    pub fn stack(&self) -> &str {
        &self.domain.stack
    }

    /// Export carrying the front door's domain name.
    pub fn export(&self) -> &ExportRef {
        &self.domain
    }

    /// Expression a consuming stack uses for the domain name.
    pub fn domain_import(&self) -> Value {
        self.domain.import()
    }

    /// Routes served by the front door.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Cross-origin settings.
    pub fn cors(&self) -> &CorsConfig {
        &self.cors
    }
}

/// Stack declaring the compute endpoints and their front door.
#[derive(Debug, Clone)]
pub struct ApiComputeUnit {
    name: String,
    env: StackEnv,
    endpoints: Vec<EndpointDescriptor>,
    routes: RouteTable,
    cors: CorsConfig,
    bucket: PackageBucket,
    resources: ResourceSet,
    domain: ExportRef,
}

impl ApiComputeUnit {
    /// Declare the unit.
    pub fn new(name: impl Into<String>, env: StackEnv, config: &ApiConfig) -> ApiResult<Self> {
        let name = name.into();

        let mut endpoints = Vec::with_capacity(config.endpoints.len());
        let mut ids = HashSet::new();
        for endpoint in &config.endpoints {
            let descriptor = EndpointDescriptor::new(endpoint)?;
            if !ids.insert(descriptor.id().to_string()) {
                return Err(ApiError::DuplicateEndpoint(descriptor.id().to_string()));
            }
            endpoints.push(descriptor);
        }

        let mut routes = RouteTable::new();
        for route in &config.routes {
            if !ids.contains(&route.target) {
                return Err(ApiError::UnknownEndpoint {
                    method: route.method,
                    path: route.path.clone(),
                    target: route.target.clone(),
                });
            }
            routes.add(route)?;
        }

        let bucket = PackageBucket::from_config(config.package_bucket.as_deref());
        let resources = declare_resources(config, &bucket, &endpoints, &routes)?;

        let domain = ExportRef::new(
            name.clone(),
            API_DOMAIN_OUTPUT,
            intrinsic::sub(&format!(
                "${{{}}}.execute-api.${{AWS::Region}}.${{AWS::URLSuffix}}",
                HTTP_API_ID
            )),
        );

        tracing::debug!(
            stack = %name,
            endpoints = endpoints.len(),
            routes = routes.len(),
            "declared api compute unit"
        );

        Ok(Self {
            name,
            env,
            endpoints,
            routes,
            cors: config.cors.clone(),
            bucket,
            resources,
            domain,
        })
    }

    /// Handle passed to dependent units.
    pub fn api_handle(&self) -> ApiHandle {
        ApiHandle {
            domain: self.domain.clone(),
            routes: self.routes.clone(),
            cors: self.cors.clone(),
        }
    }

    /// Declared endpoints.
    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    /// Look up an endpoint.
    pub fn endpoint(&self, id: &str) -> Option<&EndpointDescriptor> {
        self.endpoints.iter().find(|e| e.id() == id)
    }

    /// Declared routes.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Bucket the function archives are read from.
    pub fn package_bucket(&self) -> &PackageBucket {
        &self.bucket
    }

    /// Code archives to build and upload before this stack is provisioned.
    pub fn packages(&self) -> Vec<FunctionPackage> {
        self.endpoints
            .iter()
            .map(|endpoint| FunctionPackage::new(endpoint, &self.bucket))
            .collect()
    }
}

fn declare_resources(
    config: &ApiConfig,
    bucket: &PackageBucket,
    endpoints: &[EndpointDescriptor],
    routes: &RouteTable,
) -> ApiResult<ResourceSet> {
    let mut resources = ResourceSet::new();

    resources.add(Resource::new(
        HTTP_API_ID,
        ResourceKind::HttpApi,
        json!({
            "Name": config.api_name,
            "ProtocolType": "HTTP",
            "CorsConfiguration": config.cors.to_properties(),
        }),
    ))?;

    let bucket = bucket.to_template();

    for endpoint in endpoints {
        let base = endpoint.logical_name();
        let role_id = format!("{}Role", base);
        let function_id = format!("{}Function", base);

        resources.add(Resource::new(
            role_id.clone(),
            ResourceKind::FunctionRole,
            json!({
                "AssumeRolePolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Principal": { "Service": "lambda.amazonaws.com" },
                        "Action": "sts:AssumeRole",
                    }],
                },
                "ManagedPolicyArns": [intrinsic::sub(
                    "arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"
                )],
            }),
        ))?;

        resources.add(
            Resource::new(
                function_id.clone(),
                ResourceKind::Function,
                json!({
                    "Runtime": endpoint.runtime().as_str(),
                    "Handler": endpoint.entry_point(),
                    "MemorySize": endpoint.memory_mb(),
                    "Timeout": endpoint.timeout_secs(),
                    "Role": intrinsic::get_att(&role_id, "Arn"),
                    "Code": {
                        "S3Bucket": bucket,
                        "S3Key": intrinsic::reference(&endpoint.code_key_parameter()),
                    },
                    "Tags": [{ "Key": "source-asset", "Value": endpoint.source_asset() }],
                }),
            )
            .depends_on(role_id),
        )?;

        resources.add(Resource::new(
            format!("{}InvokePermission", base),
            ResourceKind::FunctionPermission,
            json!({
                "Action": "lambda:InvokeFunction",
                "FunctionName": intrinsic::get_att(&function_id, "Arn"),
                "Principal": "apigateway.amazonaws.com",
                "SourceArn": intrinsic::sub(&format!(
                    "arn:${{AWS::Partition}}:execute-api:${{AWS::Region}}:${{AWS::AccountId}}:${{{}}}/*/*",
                    HTTP_API_ID
                )),
            }),
        ))?;

        resources.add(Resource::new(
            format!("{}Integration", base),
            ResourceKind::ApiIntegration,
            json!({
                "ApiId": intrinsic::reference(HTTP_API_ID),
                "IntegrationType": "AWS_PROXY",
                "IntegrationUri": intrinsic::get_att(&function_id, "Arn"),
                "PayloadFormatVersion": "2.0",
            }),
        ))?;
    }

    for (index, route) in routes.iter().enumerate() {
        let target = endpoints
            .iter()
            .find(|e| e.id() == route.target)
            .map(EndpointDescriptor::logical_name)
            .unwrap_or_default();
        let integration_id = format!("{}Integration", target);

        resources.add(
            Resource::new(
                format!("Route{}", index + 1),
                ResourceKind::ApiRoute,
                json!({
                    "ApiId": intrinsic::reference(HTTP_API_ID),
                    "RouteKey": route.route_key(),
                    "Target": intrinsic::sub(&format!("integrations/${{{}}}", integration_id)),
                }),
            )
            .depends_on(integration_id),
        )?;
    }

    resources.add(Resource::new(
        "DefaultStage",
        ResourceKind::ApiStage,
        json!({
            "ApiId": intrinsic::reference(HTTP_API_ID),
            "StageName": "$default",
            "AutoDeploy": true,
        }),
    ))?;

    resources.validate()?;
    Ok(resources)
}

impl StackUnit for ApiComputeUnit {
    fn stack_name(&self) -> &str {
        &self.name
    }

    fn env(&self) -> &StackEnv {
        &self.env
    }

    fn resources(&self) -> &ResourceSet {
        &self.resources
    }

    fn parameters(&self) -> Vec<StackParameter> {
        self.endpoints
            .iter()
            .map(|endpoint| {
                StackParameter::new(endpoint.code_key_parameter(), endpoint.package_key())
                    .with_description(format!("Object key of the {} archive", endpoint.id()))
            })
            .collect()
    }

    fn outputs(&self) -> Vec<StackOutput> {
        vec![
            self.domain
                .as_output()
                .with_description("Domain of the HTTP API front door"),
            StackOutput::new(
                API_URL_OUTPUT,
                intrinsic::sub(&format!(
                    "https://${{{}}}.execute-api.${{AWS::Region}}.${{AWS::URLSuffix}}/",
                    HTTP_API_ID
                )),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::HttpMethod;

    fn unit(config: &ApiConfig) -> ApiResult<ApiComputeUnit> {
        ApiComputeUnit::new("ApiStack", StackEnv::global_edge(), config)
    }

    #[test]
    fn test_default_unit_routes_two_endpoints() {
        let unit = unit(&ApiConfig::default()).unwrap();

        assert_eq!(unit.endpoints().len(), 2);
        assert_eq!(
            unit.routes().resolve(HttpMethod::Get, "/api/lambda-1"),
            Some("sample-lambda-1")
        );
        assert_eq!(
            unit.routes().resolve(HttpMethod::Get, "/api/lambda-2"),
            Some("sample-lambda-2")
        );

        let resources = unit.resources();
        assert!(resources.contains(HTTP_API_ID));
        assert!(resources.contains("SampleLambda1Function"));
        assert!(resources.contains("SampleLambda2Integration"));
        assert_eq!(resources.of_kind(ResourceKind::ApiRoute).count(), 2);
    }

    #[test]
    fn test_route_resource_targets_integration() {
        let unit = unit(&ApiConfig::default()).unwrap();
        let route = unit.resources().get("Route1").unwrap();

        assert_eq!(route.properties["RouteKey"], "GET /api/lambda-1");
        assert_eq!(
            route.properties["Target"],
            json!({ "Fn::Sub": "integrations/${SampleLambda1Integration}" })
        );
    }

    #[test]
    fn test_cors_allows_everything_by_default() {
        let unit = unit(&ApiConfig::default()).unwrap();
        let api = unit.resources().get(HTTP_API_ID).unwrap();
        assert_eq!(api.properties["CorsConfiguration"]["AllowOrigins"], json!(["*"]));
        assert_eq!(api.properties["CorsConfiguration"]["AllowMethods"], json!(["*"]));
    }

    #[test]
    fn test_function_code_read_from_package_parameter() {
        let unit = unit(&ApiConfig::default()).unwrap();
        let function = unit.resources().get("SampleLambda1Function").unwrap();

        assert_eq!(function.properties["Runtime"], "provided.al2023");
        assert_eq!(function.properties["Handler"], "bootstrap");
        assert_eq!(
            function.properties["Code"]["S3Key"],
            json!({ "Ref": "SampleLambda1CodeKey" })
        );
        assert_eq!(
            function.properties["Code"]["S3Bucket"],
            unit.package_bucket().to_template()
        );

        let template = unit.to_template();
        assert_eq!(
            template["Parameters"]["SampleLambda1CodeKey"]["Default"],
            "functions/sample-lambda-1.zip"
        );

        let packages = unit.packages();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[1].key_parameter, "SampleLambda2CodeKey");
        assert_eq!(packages[1].source_asset, "workloads/sample-lambda-2");
    }

    #[test]
    fn test_named_package_bucket() {
        let config = ApiConfig {
            package_bucket: Some("shop-packages".into()),
            ..Default::default()
        };
        let unit = unit(&config).unwrap();
        let function = unit.resources().get("SampleLambda2Function").unwrap();
        assert_eq!(function.properties["Code"]["S3Bucket"], "shop-packages");
        assert_eq!(
            unit.packages()[0].bucket,
            PackageBucket::Named("shop-packages".into())
        );
    }

    #[test]
    fn test_route_to_unknown_endpoint_rejected() {
        let mut config = ApiConfig::default();
        config
            .routes
            .push(RouteConfig::get("/api/lambda-3", "sample-lambda-3"));

        assert!(matches!(
            unit(&config),
            Err(ApiError::UnknownEndpoint { .. })
        ));
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut config = ApiConfig::default();
        config
            .routes
            .push(RouteConfig::get("/api/lambda-1", "sample-lambda-2"));

        assert!(matches!(unit(&config), Err(ApiError::DuplicateRoute { .. })));
    }

    #[test]
    fn test_duplicate_endpoint_rejected() {
        let mut config = ApiConfig::default();
        config.endpoints.push(EndpointConfig::new("sample-lambda-1"));

        assert_eq!(
            unit(&config).unwrap_err(),
            ApiError::DuplicateEndpoint("sample-lambda-1".into())
        );
    }

    #[test]
    fn test_handle_exports_domain() {
        let unit = unit(&ApiConfig::default()).unwrap();
        let handle = unit.api_handle();

        assert_eq!(handle.stack(), "ApiStack");
        assert_eq!(
            handle.domain_import(),
            json!({ "Fn::ImportValue": "ApiStack:ApiDomain" })
        );
        assert_eq!(handle.routes().len(), 2);

        let outputs = unit.outputs();
        assert!(outputs.iter().any(|o| o.key == API_URL_OUTPUT && o.export_name.is_none()));
    }
}
