//! End-to-end checks of the composed topology.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sample_lambda_1::SampleLambda1;
use sample_lambda_2::SampleLambda2;
use stack_api::FunctionPackage;
use stack_core::{DeployPhase, ResolvedOutputs};
use stack_delivery::{
    AssetPublication, AssetSet, CacheStatus, EdgeRequest, EdgeSimulator, DISTRIBUTION_DOMAIN_OUTPUT,
};
use stack_graph::{
    deploy, destroy, DeploymentGraph, DeploymentReport, DryRunProvisioner, GraphError,
    GraphResult, Provisioner, StackConfig, StackParameters, SynthesizedStack,
};
use stack_security::RuleConfig;

#[derive(Default)]
struct RecordingProvisioner {
    calls: Mutex<Vec<String>>,
    parameters: Mutex<BTreeMap<String, StackParameters>>,
    fail_on: Option<String>,
    missing: Vec<String>,
}

impl RecordingProvisioner {
    fn failing_on(stack: &str) -> Self {
        Self {
            fail_on: Some(stack.to_string()),
            ..Default::default()
        }
    }

    fn without(stack: &str) -> Self {
        Self {
            missing: vec![stack.to_string()],
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn parameters_of(&self, stack: &str) -> StackParameters {
        self.parameters
            .lock()
            .unwrap()
            .get(stack)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn fails(&self, target: &str) -> bool {
        self.fail_on.as_deref() == Some(target)
    }
}

#[async_trait]
impl Provisioner for RecordingProvisioner {
    async fn stage(
        &self,
        packages: &[FunctionPackage],
        region: &str,
    ) -> GraphResult<StackParameters> {
        let ids: Vec<&str> = packages.iter().map(|p| p.endpoint_id.as_str()).collect();
        self.record(format!("stage:{}:{}", region, ids.join(",")));

        if self.fails("stage") {
            return Err(GraphError::Stage("AccessDenied".into()));
        }
        Ok(packages
            .iter()
            .map(|p| (p.key_parameter.clone(), p.key_for("feedfacecafebeef")))
            .collect())
    }

    async fn provision(&self, stack: &SynthesizedStack) -> GraphResult<ResolvedOutputs> {
        self.record(format!("provision:{}", stack.name));
        self.parameters
            .lock()
            .unwrap()
            .insert(stack.name.clone(), stack.parameters.clone());

        if self.fails(&stack.name) {
            return Err(GraphError::Provision {
                stack: stack.name.clone(),
                message: "CREATE_FAILED".into(),
            });
        }

        Ok(stack
            .outputs
            .iter()
            .map(|key| (key.clone(), format!("{}-value", key)))
            .collect())
    }

    async fn publish(
        &self,
        publication: &AssetPublication,
        _assets: &AssetSet,
        outputs: &ResolvedOutputs,
    ) -> GraphResult<()> {
        let target = publication
            .resolve(outputs)
            .map_err(|e| GraphError::Publish(e.to_string()))?;
        self.record(format!(
            "publish:{}:{}:{}",
            target.bucket,
            target.distribution_id,
            publication.invalidation_paths.join(",")
        ));
        Ok(())
    }

    async fn describe(&self, stack: &SynthesizedStack) -> GraphResult<Option<ResolvedOutputs>> {
        if self.missing.contains(&stack.name) {
            return Ok(None);
        }
        Ok(Some(
            stack
                .outputs
                .iter()
                .map(|key| (key.clone(), format!("{}-value", key)))
                .collect(),
        ))
    }

    async fn empty_bucket(&self, bucket: &str, _region: &str) -> GraphResult<()> {
        self.record(format!("empty:{}", bucket));
        Ok(())
    }

    async fn teardown(&self, stack: &SynthesizedStack) -> GraphResult<()> {
        self.record(format!("teardown:{}", stack.name));
        if self.fails(&format!("teardown:{}", stack.name)) {
            return Err(GraphError::Teardown {
                stack: stack.name.clone(),
                message: "DELETE_FAILED".into(),
            });
        }
        Ok(())
    }
}

fn site(version: &str) -> AssetSet {
    AssetSet::from_files([("index.html", format!("<h1>{version}</h1>"))])
}

fn graph() -> DeploymentGraph {
    DeploymentGraph::compose_with_assets(&StackConfig::default(), site("v1")).unwrap()
}

async fn compose_and_deploy(
    config: &StackConfig,
    provisioner: &dyn Provisioner,
) -> GraphResult<DeploymentReport> {
    let graph = DeploymentGraph::compose_with_assets(config, site("v1"))?;
    deploy(&graph, provisioner).await
}

#[tokio::test]
async fn test_stacks_provisioned_in_order_then_published() {
    let provisioner = RecordingProvisioner::default();
    let report = deploy(&graph(), &provisioner).await.unwrap();

    assert_eq!(
        provisioner.calls(),
        vec![
            "stage:us-east-1:sample-lambda-1,sample-lambda-2",
            "provision:edge-app-waf",
            "provision:edge-app-backend",
            "provision:edge-app-frontend",
            "publish:AssetsBucketName-value:DistributionId-value:/*",
        ]
    );
    assert_eq!(report.domain_name, format!("{}-value", DISTRIBUTION_DOMAIN_OUTPUT));

    let phases: Vec<String> = report.timeline.phases().map(|p| p.to_string()).collect();
    assert_eq!(phases.first().map(String::as_str), Some("synthesize"));
    assert_eq!(phases.last().map(String::as_str), Some("complete"));
}

#[tokio::test]
async fn test_duplicate_priority_never_reaches_provisioner() {
    let mut config = StackConfig::default();
    config
        .security
        .rules
        .push(RuleConfig::rate_limit("BurstRule", 1, 500));

    let provisioner = RecordingProvisioner::default();
    let err = compose_and_deploy(&config, &provisioner).await.unwrap_err();

    assert!(err.is_declaration());
    assert!(err.to_string().contains("priority"));
    assert!(provisioner.calls().is_empty());

    // The same path with a valid declaration does reach the provisioner.
    compose_and_deploy(&StackConfig::default(), &provisioner)
        .await
        .unwrap();
    assert_eq!(provisioner.calls().len(), 5);
}

#[tokio::test]
async fn test_uploaded_code_keys_reach_backend_only() {
    let provisioner = RecordingProvisioner::default();
    let report = deploy(&graph(), &provisioner).await.unwrap();

    let backend = provisioner.parameters_of("edge-app-backend");
    assert_eq!(
        backend["SampleLambda1CodeKey"],
        "functions/sample-lambda-1-feedfacecafebeef.zip"
    );
    assert_eq!(
        backend["SampleLambda2CodeKey"],
        "functions/sample-lambda-2-feedfacecafebeef.zip"
    );
    assert!(provisioner.parameters_of("edge-app-waf").is_empty());
    assert!(provisioner.parameters_of("edge-app-frontend").is_empty());
    assert_eq!(report.code_keys, backend);
}

#[tokio::test]
async fn test_failed_upload_provisions_nothing() {
    let provisioner = RecordingProvisioner::failing_on("stage");
    let err = deploy(&graph(), &provisioner).await.unwrap_err();

    assert!(matches!(err, GraphError::Stage(_)));
    assert!(!err.is_declaration());
    assert_eq!(provisioner.calls().len(), 1);
}

#[tokio::test]
async fn test_destroy_empties_store_before_deleting_stacks() {
    let provisioner = RecordingProvisioner::default();
    let report = destroy(&graph(), &provisioner).await.unwrap();

    assert_eq!(
        provisioner.calls(),
        vec![
            "empty:AssetsBucketName-value",
            "teardown:edge-app-frontend",
            "teardown:edge-app-backend",
            "teardown:edge-app-waf",
        ]
    );
    assert_eq!(
        report.deleted,
        vec!["edge-app-frontend", "edge-app-backend", "edge-app-waf"]
    );
    assert!(report.timeline.is_complete());
}

#[tokio::test]
async fn test_destroy_keeps_retained_store_and_skips_missing_stacks() {
    let mut config = StackConfig::default();
    config.delivery.retain_store = true;
    let graph = DeploymentGraph::compose_with_assets(&config, site("v1")).unwrap();

    let provisioner = RecordingProvisioner::without("edge-app-backend");
    let report = destroy(&graph, &provisioner).await.unwrap();

    assert_eq!(
        provisioner.calls(),
        vec!["teardown:edge-app-frontend", "teardown:edge-app-waf"]
    );
    assert!(report.emptied.is_empty());
    assert_eq!(report.skipped, vec!["edge-app-backend"]);
}

#[tokio::test]
async fn test_destroy_stops_at_first_failure() {
    let provisioner = RecordingProvisioner::failing_on("teardown:edge-app-frontend");
    let err = destroy(&graph(), &provisioner).await.unwrap_err();

    assert!(matches!(err, GraphError::Teardown { ref stack, .. } if stack == "edge-app-frontend"));
    assert_eq!(
        provisioner.calls(),
        vec!["empty:AssetsBucketName-value", "teardown:edge-app-frontend"]
    );
}

#[tokio::test]
async fn test_failure_stops_later_stacks() {
    let provisioner = RecordingProvisioner::failing_on("edge-app-backend");
    let err = deploy(&graph(), &provisioner).await.unwrap_err();

    assert!(matches!(err, GraphError::Provision { ref stack, .. } if stack == "edge-app-backend"));
    assert_eq!(
        provisioner.calls(),
        vec![
            "stage:us-east-1:sample-lambda-1,sample-lambda-2",
            "provision:edge-app-waf",
            "provision:edge-app-backend"
        ]
    );
}

#[tokio::test]
async fn test_dry_run_writes_nothing_and_completes() {
    let provisioner = DryRunProvisioner::new();
    let report = deploy(&graph(), &provisioner).await.unwrap();

    assert!(report.timeline.is_complete());
    assert!(report
        .timeline
        .phases()
        .any(|p| *p == DeployPhase::Provision("edge-app-frontend".into())));
}

#[test]
fn test_compose_from_site_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>from disk</h1>").unwrap();

    let mut config = StackConfig::default();
    config.delivery.site_dir = dir.path().to_path_buf();

    let graph = DeploymentGraph::compose(&config).unwrap();
    assert_eq!(graph.assets().len(), 1);
    assert_eq!(graph.assets().source(), Some(dir.path()));
}

#[test]
fn test_lambda_reachable_through_edge() {
    let graph = graph();
    let mut edge = EdgeSimulator::new(graph.delivery());
    edge.register(SampleLambda1).register(SampleLambda2::default());
    edge.apply(graph.delivery().publication(), graph.assets())
        .unwrap();

    let response = edge.request(&EdgeRequest::get("/api/lambda-1"));
    assert_eq!(response.status, http::StatusCode::OK);
    assert_eq!(response.cache, CacheStatus::Bypass);
    assert_eq!(response.header("access-control-allow-origin"), Some("*"));

    let body = response.json().unwrap();
    assert_eq!(body["message"], "Hello from sample-lambda-1!");
    assert!(body["requestId"].as_str().is_some_and(|id| !id.is_empty()));
    let timestamp = body["timestamp"].as_str().unwrap();
    assert!(timestamp.ends_with('Z') && timestamp.contains('T'));

    let second = edge.request(&EdgeRequest::get("/api/lambda-2")).json().unwrap();
    assert_eq!(second["message"], "Hello from sample-lambda-2!");
}

#[test]
fn test_republish_replaces_cached_page() {
    let v1 = graph();
    let mut edge = EdgeSimulator::new(v1.delivery());
    edge.apply(v1.delivery().publication(), v1.assets()).unwrap();
    assert_eq!(edge.request(&EdgeRequest::get("/")).text(), "<h1>v1</h1>");
    assert_eq!(edge.request(&EdgeRequest::get("/")).cache, CacheStatus::Hit);

    let v2 = DeploymentGraph::compose_with_assets(&StackConfig::default(), site("v2")).unwrap();
    assert_ne!(
        v1.delivery().publication().content_hash,
        v2.delivery().publication().content_hash
    );
    edge.apply(v2.delivery().publication(), v2.assets()).unwrap();

    let fresh = edge.request(&EdgeRequest::get("/"));
    assert_eq!(fresh.cache, CacheStatus::Miss);
    assert_eq!(fresh.text(), "<h1>v2</h1>");
}
