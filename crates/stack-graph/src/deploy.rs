//! Ordered deployment of a composed graph.

use std::collections::BTreeMap;

use stack_core::{DeployPhase, DeployTimeline, ResolvedOutputs, StackUnit};
use stack_delivery::{ASSETS_BUCKET_OUTPUT, DISTRIBUTION_DOMAIN_OUTPUT};

use crate::error::{GraphError, GraphResult};
use crate::graph::{DeploymentGraph, SynthesizedStack};
use crate::package::StackParameters;
use crate::provision::Provisioner;

/// What a finished deployment reports.
#[derive(Debug, Clone)]
pub struct DeploymentReport {
    /// Public domain name of the distribution.
    pub domain_name: String,
    /// Resolved outputs per stack.
    pub outputs: BTreeMap<String, ResolvedOutputs>,
    /// Object keys of the uploaded function code, by template parameter.
    pub code_keys: StackParameters,
    pub timeline: DeployTimeline,
}

impl DeploymentReport {
    /// URL of the site.
    pub fn url(&self) -> String {
        format!("https://{}", self.domain_name)
    }
}

/// Upload function code, provision every stack in order, then publish the site.
///
/// A stack is only provisioned once every export it imports has resolved.
/// The first failure stops the deployment.
pub async fn deploy(
    graph: &DeploymentGraph,
    provisioner: &dyn Provisioner,
) -> GraphResult<DeploymentReport> {
    let mut timeline = DeployTimeline::new();
    timeline.mark(DeployPhase::Synthesize);
    let mut stacks = graph.synthesize();

    timeline.mark(DeployPhase::Package);
    let api = graph.api();
    let code_keys = match provisioner.stage(&api.packages(), &api.env().region).await {
        Ok(code_keys) => code_keys,
        Err(e) => {
            timeline.mark(DeployPhase::Failed(e.to_string()));
            tracing::error!(error = %e, "function packaging failed");
            return Err(e);
        }
    };
    if let Some(stack) = stacks.iter_mut().find(|s| s.name == api.stack_name()) {
        stack.parameters.extend(code_keys.clone());
    }

    let mut outputs: BTreeMap<String, ResolvedOutputs> = BTreeMap::new();
    for stack in &stacks {
        for (consumer, export) in graph.imports() {
            if consumer != stack.name {
                continue;
            }
            let resolved = outputs
                .get(&export.stack)
                .is_some_and(|o| o.contains_key(&export.output_key));
            if !resolved {
                let reason = format!("unresolved {}", export.export_name());
                timeline.mark(DeployPhase::Failed(reason));
                return Err(GraphError::MissingOutput {
                    stack: export.stack.clone(),
                    output: export.output_key.clone(),
                });
            }
        }

        timeline.mark(DeployPhase::Provision(stack.name.clone()));
        let resolved = match provisioner.provision(stack).await {
            Ok(resolved) => resolved,
            Err(e) => {
                timeline.mark(DeployPhase::Failed(e.to_string()));
                tracing::error!(
                    stack = %stack.name,
                    stacks_applied = outputs.len(),
                    error = %e,
                    "provisioning failed"
                );
                return Err(e);
            }
        };
        tracing::info!(stack = %stack.name, outputs = resolved.len(), "stack provisioned");
        outputs.insert(stack.name.clone(), resolved);
    }

    let delivery = graph.delivery();
    let delivery_outputs = outputs
        .get(delivery.stack_name())
        .cloned()
        .unwrap_or_default();
    let domain_name = delivery_outputs
        .get(DISTRIBUTION_DOMAIN_OUTPUT)
        .cloned()
        .ok_or_else(|| GraphError::MissingOutput {
            stack: delivery.stack_name().to_string(),
            output: DISTRIBUTION_DOMAIN_OUTPUT.to_string(),
        })?;

    timeline.mark(DeployPhase::Publish);
    if let Err(e) = provisioner
        .publish(delivery.publication(), graph.assets(), &delivery_outputs)
        .await
    {
        timeline.mark(DeployPhase::Failed(e.to_string()));
        return Err(e);
    }

    timeline.mark(DeployPhase::Complete);
    tracing::info!(
        domain = %domain_name,
        elapsed_ms = timeline.elapsed().as_millis() as u64,
        "deployment complete"
    );

    Ok(DeploymentReport {
        domain_name,
        outputs,
        code_keys,
        timeline,
    })
}

/// What a finished teardown reports.
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    /// Stacks deleted, in deletion order.
    pub deleted: Vec<String>,
    /// Stacks that did not exist.
    pub skipped: Vec<String>,
    /// Buckets emptied before their stack was deleted.
    pub emptied: Vec<String>,
    pub timeline: DeployTimeline,
}

/// Delete every stack in reverse provisioning order.
///
/// The provider only deletes empty buckets, so a store without retention is
/// emptied before its stack goes. The package bucket is left in place.
pub async fn destroy(
    graph: &DeploymentGraph,
    provisioner: &dyn Provisioner,
) -> GraphResult<TeardownReport> {
    let mut report = TeardownReport::default();
    report.timeline.mark(DeployPhase::Synthesize);

    for stack in graph.synthesize().iter().rev() {
        if let Err(e) = teardown_stack(graph, provisioner, stack, &mut report).await {
            report.timeline.mark(DeployPhase::Failed(e.to_string()));
            tracing::error!(
                stack = %stack.name,
                stacks_deleted = report.deleted.len(),
                error = %e,
                "teardown failed"
            );
            return Err(e);
        }
    }

    report.timeline.mark(DeployPhase::Complete);
    tracing::info!(
        deleted = report.deleted.len(),
        skipped = report.skipped.len(),
        "teardown complete"
    );
    Ok(report)
}

async fn teardown_stack(
    graph: &DeploymentGraph,
    provisioner: &dyn Provisioner,
    stack: &SynthesizedStack,
    report: &mut TeardownReport,
) -> GraphResult<()> {
    let Some(outputs) = provisioner.describe(stack).await? else {
        tracing::info!(stack = %stack.name, "stack not found, skipping");
        report.skipped.push(stack.name.clone());
        return Ok(());
    };

    report.timeline.mark(DeployPhase::Teardown(stack.name.clone()));

    let delivery = graph.delivery();
    if stack.name == delivery.stack_name() && !delivery.store().retain_on_teardown {
        let bucket = outputs
            .get(ASSETS_BUCKET_OUTPUT)
            .ok_or_else(|| GraphError::MissingOutput {
                stack: stack.name.clone(),
                output: ASSETS_BUCKET_OUTPUT.to_string(),
            })?;
        provisioner.empty_bucket(bucket, &stack.region).await?;
        report.emptied.push(bucket.clone());
    }

    provisioner.teardown(stack).await?;
    report.deleted.push(stack.name.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use stack_delivery::AssetSet;

    use super::*;
    use crate::config::StackConfig;
    use crate::provision::DryRunProvisioner;

    #[tokio::test]
    async fn test_dry_run_deploy() {
        let graph = DeploymentGraph::compose_with_assets(
            &StackConfig::default(),
            AssetSet::from_files([("index.html", "<h1>demo</h1>")]),
        )
        .unwrap();
        let provisioner = DryRunProvisioner::new();

        let report = deploy(&graph, &provisioner).await.unwrap();

        assert_eq!(
            provisioner.provisioned(),
            vec!["edge-app-waf", "edge-app-backend", "edge-app-frontend"]
        );
        assert_eq!(
            report.domain_name,
            "dry-run:edge-app-frontend:DistributionDomainName"
        );
        assert!(report.timeline.is_complete());
        assert!(report.outputs["edge-app-waf"].contains_key("WebAclArn"));
        assert!(report.url().starts_with("https://"));
        assert_eq!(
            report.code_keys["SampleLambda2CodeKey"],
            "functions/sample-lambda-2.zip"
        );
        assert!(report.timeline.reached_at(&DeployPhase::Package).is_some());
    }

    #[tokio::test]
    async fn test_dry_run_destroy_reverses_order() {
        let graph = DeploymentGraph::compose_with_assets(
            &StackConfig::default(),
            AssetSet::from_files([("index.html", "<h1>demo</h1>")]),
        )
        .unwrap();
        let provisioner = DryRunProvisioner::new();

        let report = destroy(&graph, &provisioner).await.unwrap();

        assert_eq!(
            provisioner.torn_down(),
            vec!["edge-app-frontend", "edge-app-backend", "edge-app-waf"]
        );
        assert_eq!(
            report.emptied,
            vec!["dry-run:edge-app-frontend:AssetsBucketName"]
        );
        assert!(report.timeline.is_complete());
    }
}
