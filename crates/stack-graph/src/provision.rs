//! Seam between the graph and the provider.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use stack_api::FunctionPackage;
use stack_core::ResolvedOutputs;
use stack_delivery::{AssetPublication, AssetSet};
use tokio::process::Command;

use crate::error::{GraphError, GraphResult};
use crate::graph::SynthesizedStack;
use crate::package::{FunctionBuilder, PackagedFunction, StackParameters};

/// Applies synthesized stacks, uploads function code and publishes the site.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Build and upload function code for stacks in `region`.
    ///
    /// Returns the template parameters naming each uploaded archive.
    async fn stage(
        &self,
        packages: &[FunctionPackage],
        region: &str,
    ) -> GraphResult<StackParameters>;

    /// Create or update a stack and return its resolved outputs.
    async fn provision(&self, stack: &SynthesizedStack) -> GraphResult<ResolvedOutputs>;

    /// Upload `assets` and invalidate the distribution named in `outputs`.
    async fn publish(
        &self,
        publication: &AssetPublication,
        assets: &AssetSet,
        outputs: &ResolvedOutputs,
    ) -> GraphResult<()>;

    /// Outputs of a deployed stack, or `None` when the stack does not exist.
    async fn describe(&self, stack: &SynthesizedStack) -> GraphResult<Option<ResolvedOutputs>>;

    /// Delete every object in a bucket.
    async fn empty_bucket(&self, bucket: &str, region: &str) -> GraphResult<()>;

    /// Delete a stack and wait until it is gone.
    async fn teardown(&self, stack: &SynthesizedStack) -> GraphResult<()>;
}

/// Provisioner with no side effects.
///
/// Every declared output resolves to a placeholder naming its stack and key.
#[derive(Debug, Default)]
pub struct DryRunProvisioner {
    provisioned: Mutex<Vec<String>>,
    torn_down: Mutex<Vec<String>>,
}

impl DryRunProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stacks provisioned so far, in order.
    pub fn provisioned(&self) -> Vec<String> {
        self.provisioned
            .lock()
            .map(|stacks| stacks.clone())
            .unwrap_or_default()
    }

    /// Stacks torn down so far, in order.
    pub fn torn_down(&self) -> Vec<String> {
        self.torn_down
            .lock()
            .map(|stacks| stacks.clone())
            .unwrap_or_default()
    }

    /// Placeholder value for an output.
    pub fn placeholder(stack: &str, output: &str) -> String {
        format!("dry-run:{}:{}", stack, output)
    }
}

#[async_trait]
impl Provisioner for DryRunProvisioner {
    async fn stage(
        &self,
        packages: &[FunctionPackage],
        region: &str,
    ) -> GraphResult<StackParameters> {
        for package in packages {
            tracing::info!(
                endpoint = %package.endpoint_id,
                source = %package.source_asset,
                region,
                "dry run: skipping function build"
            );
        }
        Ok(packages
            .iter()
            .map(|p| (p.key_parameter.clone(), p.default_key.clone()))
            .collect())
    }

    async fn provision(&self, stack: &SynthesizedStack) -> GraphResult<ResolvedOutputs> {
        tracing::info!(
            stack = %stack.name,
            region = %stack.region,
            "dry run: skipping provisioning"
        );
        if let Ok(mut provisioned) = self.provisioned.lock() {
            provisioned.push(stack.name.clone());
        }

        Ok(stack
            .outputs
            .iter()
            .map(|key| (key.clone(), Self::placeholder(&stack.name, key)))
            .collect())
    }

    async fn publish(
        &self,
        publication: &AssetPublication,
        assets: &AssetSet,
        outputs: &ResolvedOutputs,
    ) -> GraphResult<()> {
        let target = publication
            .resolve(outputs)
            .map_err(|e| GraphError::Publish(e.to_string()))?;
        tracing::info!(
            bucket = %target.bucket,
            distribution = %target.distribution_id,
            files = assets.len(),
            bytes = assets.total_bytes(),
            "dry run: skipping publish"
        );
        Ok(())
    }

    async fn describe(&self, stack: &SynthesizedStack) -> GraphResult<Option<ResolvedOutputs>> {
        Ok(Some(
            stack
                .outputs
                .iter()
                .map(|key| (key.clone(), Self::placeholder(&stack.name, key)))
                .collect(),
        ))
    }

    async fn empty_bucket(&self, bucket: &str, region: &str) -> GraphResult<()> {
        tracing::info!(bucket, region, "dry run: skipping bucket cleanup");
        Ok(())
    }

    async fn teardown(&self, stack: &SynthesizedStack) -> GraphResult<()> {
        tracing::info!(stack = %stack.name, "dry run: skipping teardown");
        if let Ok(mut torn_down) = self.torn_down.lock() {
            torn_down.push(stack.name.clone());
        }
        Ok(())
    }
}

/// Provisioner driving the `aws` command line.
#[derive(Debug, Clone)]
pub struct CliProvisioner {
    program: String,
    profile: Option<String>,
    account: Option<String>,
    template_dir: PathBuf,
    builder: FunctionBuilder,
}

impl CliProvisioner {
    /// Templates are written into `template_dir` before each deploy.
    ///
    /// Function code builds from the working directory unless
    /// [`with_builder`](Self::with_builder) says otherwise.
    pub fn new(template_dir: impl Into<PathBuf>) -> Self {
        let template_dir = template_dir.into();
        Self {
            program: "aws".to_string(),
            profile: None,
            account: None,
            builder: FunctionBuilder::new(".", template_dir.clone()),
            template_dir,
        }
    }

    /// Build function code with `builder`.
    pub fn with_builder(mut self, builder: FunctionBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Account the package bucket is named after; looked up when unset.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Use a named credentials profile.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Use a different executable (for example a wrapper script).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments of the create-or-update call for a stack.
    pub fn deploy_args(&self, stack: &SynthesizedStack) -> Vec<String> {
        let template = self.template_dir.join(stack.template_file());
        let mut args = vec![
            "cloudformation".to_string(),
            "deploy".to_string(),
            "--stack-name".to_string(),
            stack.name.clone(),
            "--template-file".to_string(),
            template.display().to_string(),
            "--region".to_string(),
            stack.region.clone(),
            "--capabilities".to_string(),
            "CAPABILITY_IAM".to_string(),
            "--no-fail-on-empty-changeset".to_string(),
        ];
        if !stack.parameters.is_empty() {
            args.push("--parameter-overrides".to_string());
            args.extend(stack.parameters.iter().map(|(k, v)| format!("{}={}", k, v)));
        }
        self.push_profile(&mut args);
        args
    }

    /// Arguments uploading one archive into the package bucket.
    pub fn upload_args(&self, packaged: &PackagedFunction, bucket: &str, region: &str) -> Vec<String> {
        let mut args = vec![
            "s3".to_string(),
            "cp".to_string(),
            packaged.archive.display().to_string(),
            format!("s3://{}/{}", bucket, packaged.key),
            "--region".to_string(),
            region.to_string(),
        ];
        self.push_profile(&mut args);
        args
    }

    /// Arguments deleting every object in a bucket.
    pub fn empty_bucket_args(&self, bucket: &str, region: &str) -> Vec<String> {
        let mut args = vec![
            "s3".to_string(),
            "rm".to_string(),
            format!("s3://{}", bucket),
            "--recursive".to_string(),
            "--region".to_string(),
            region.to_string(),
        ];
        self.push_profile(&mut args);
        args
    }

    /// Arguments of the delete call and of the wait for its completion.
    pub fn teardown_args(&self, stack: &SynthesizedStack) -> [Vec<String>; 2] {
        let target = |mut args: Vec<String>| {
            args.extend([
                "--stack-name".to_string(),
                stack.name.clone(),
                "--region".to_string(),
                stack.region.clone(),
            ]);
            self.push_profile(&mut args);
            args
        };
        [
            target(vec!["cloudformation".to_string(), "delete-stack".to_string()]),
            target(vec![
                "cloudformation".to_string(),
                "wait".to_string(),
                "stack-delete-complete".to_string(),
            ]),
        ]
    }

    fn describe_args(&self, stack: &SynthesizedStack) -> Vec<String> {
        let mut args = vec![
            "cloudformation".to_string(),
            "describe-stacks".to_string(),
            "--stack-name".to_string(),
            stack.name.clone(),
            "--region".to_string(),
            stack.region.clone(),
            "--output".to_string(),
            "json".to_string(),
        ];
        self.push_profile(&mut args);
        args
    }

    async fn resolve_account(&self) -> Result<String, String> {
        if let Some(ref account) = self.account {
            return Ok(account.clone());
        }
        let mut args = vec![
            "sts".to_string(),
            "get-caller-identity".to_string(),
            "--query".to_string(),
            "Account".to_string(),
            "--output".to_string(),
            "text".to_string(),
        ];
        self.push_profile(&mut args);
        let account = self.run("sts get-caller-identity", args).await?;
        Ok(account.trim().to_string())
    }

    /// Create the package bucket unless it already exists.
    async fn ensure_bucket(&self, bucket: &str, region: &str) -> Result<(), String> {
        let mut head = vec![
            "s3api".to_string(),
            "head-bucket".to_string(),
            "--bucket".to_string(),
            bucket.to_string(),
            "--region".to_string(),
            region.to_string(),
        ];
        self.push_profile(&mut head);
        if self.run("s3api head-bucket", head).await.is_ok() {
            return Ok(());
        }

        tracing::info!(bucket, region, "creating package bucket");
        let mut create = vec![
            "s3".to_string(),
            "mb".to_string(),
            format!("s3://{}", bucket),
            "--region".to_string(),
            region.to_string(),
        ];
        self.push_profile(&mut create);
        self.run("s3 mb", create).await.map(|_| ())
    }

    fn push_profile(&self, args: &mut Vec<String>) {
        if let Some(ref profile) = self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
    }

    async fn run(&self, context: &str, args: Vec<String>) -> Result<String, String> {
        tracing::debug!(command = %format!("{} {}", self.program, args.join(" ")), "running");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", self.program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(format!("{}: {}", context, stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Provisioner for CliProvisioner {
    async fn stage(
        &self,
        packages: &[FunctionPackage],
        region: &str,
    ) -> GraphResult<StackParameters> {
        let mut parameters = StackParameters::new();
        let Some(first) = packages.first() else {
            return Ok(parameters);
        };

        let account = if first.bucket.needs_account() {
            self.resolve_account().await.map_err(GraphError::Stage)?
        } else {
            String::new()
        };
        let bucket = first.bucket.resolve(&account, region);
        self.ensure_bucket(&bucket, region)
            .await
            .map_err(GraphError::Stage)?;

        for package in packages {
            let packaged = self.builder.build(package).await?;
            tracing::info!(
                endpoint = %packaged.endpoint_id,
                bucket = %bucket,
                key = %packaged.key,
                bytes = packaged.bytes,
                "uploading function code"
            );
            self.run("s3 cp", self.upload_args(&packaged, &bucket, region))
                .await
                .map_err(GraphError::Stage)?;
            parameters.insert(packaged.key_parameter, packaged.key);
        }

        Ok(parameters)
    }

    async fn provision(&self, stack: &SynthesizedStack) -> GraphResult<ResolvedOutputs> {
        let provision_error = |message: String| GraphError::Provision {
            stack: stack.name.clone(),
            message,
        };

        let template_path = self.template_dir.join(stack.template_file());
        tokio::fs::create_dir_all(&self.template_dir)
            .await
            .map_err(|e| provision_error(e.to_string()))?;
        let template = serde_json::to_string_pretty(&stack.template)
            .map_err(|e| provision_error(e.to_string()))?;
        tokio::fs::write(&template_path, template)
            .await
            .map_err(|e| provision_error(e.to_string()))?;

        tracing::info!(stack = %stack.name, region = %stack.region, "deploying stack");
        self.run("cloudformation deploy", self.deploy_args(stack))
            .await
            .map_err(provision_error)?;

        let described = self
            .run("cloudformation describe-stacks", self.describe_args(stack))
            .await
            .map_err(provision_error)?;

        parse_stack_outputs(&described).map_err(provision_error)
    }

    async fn publish(
        &self,
        publication: &AssetPublication,
        assets: &AssetSet,
        outputs: &ResolvedOutputs,
    ) -> GraphResult<()> {
        let target = publication
            .resolve(outputs)
            .map_err(|e| GraphError::Publish(e.to_string()))?;
        let source = assets
            .source()
            .ok_or_else(|| GraphError::Publish("asset set was not loaded from a directory".into()))?;

        let mut sync = vec![
            "s3".to_string(),
            "sync".to_string(),
            source.display().to_string(),
            format!("s3://{}", target.bucket),
        ];
        if publication.prune {
            sync.push("--delete".to_string());
        }
        self.push_profile(&mut sync);
        tracing::info!(bucket = %target.bucket, files = assets.len(), "uploading assets");
        self.run("s3 sync", sync).await.map_err(GraphError::Publish)?;

        let mut invalidate = vec![
            "cloudfront".to_string(),
            "create-invalidation".to_string(),
            "--distribution-id".to_string(),
            target.distribution_id.clone(),
            "--paths".to_string(),
        ];
        invalidate.extend(publication.invalidation_paths.iter().cloned());
        self.push_profile(&mut invalidate);
        tracing::info!(
            distribution = %target.distribution_id,
            paths = ?publication.invalidation_paths,
            "invalidating edge cache"
        );
        self.run("cloudfront create-invalidation", invalidate)
            .await
            .map_err(GraphError::Publish)?;

        Ok(())
    }

    async fn describe(&self, stack: &SynthesizedStack) -> GraphResult<Option<ResolvedOutputs>> {
        let teardown_error = |message: String| GraphError::Teardown {
            stack: stack.name.clone(),
            message,
        };

        match self
            .run("cloudformation describe-stacks", self.describe_args(stack))
            .await
        {
            Ok(described) => parse_stack_outputs(&described).map(Some).map_err(teardown_error),
            Err(message) if message.contains("does not exist") => Ok(None),
            Err(message) => Err(teardown_error(message)),
        }
    }

    async fn empty_bucket(&self, bucket: &str, region: &str) -> GraphResult<()> {
        tracing::info!(bucket, "emptying bucket");
        match self.run("s3 rm", self.empty_bucket_args(bucket, region)).await {
            Ok(_) => Ok(()),
            Err(message) if message.contains("NoSuchBucket") => Ok(()),
            Err(message) => Err(GraphError::Teardown {
                stack: bucket.to_string(),
                message,
            }),
        }
    }

    async fn teardown(&self, stack: &SynthesizedStack) -> GraphResult<()> {
        let [delete, wait] = self.teardown_args(stack);
        tracing::info!(stack = %stack.name, region = %stack.region, "deleting stack");

        for (context, args) in [("cloudformation delete-stack", delete), ("cloudformation wait", wait)] {
            self.run(context, args)
                .await
                .map_err(|message| GraphError::Teardown {
                    stack: stack.name.clone(),
                    message,
                })?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStacks {
    stacks: Vec<DescribedStack>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribedStack {
    #[serde(default)]
    outputs: Vec<DescribedOutput>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribedOutput {
    output_key: String,
    output_value: String,
}

/// Outputs of the first stack in a `describe-stacks` response.
pub fn parse_stack_outputs(json: &str) -> Result<ResolvedOutputs, String> {
    let described: DescribeStacks = serde_json::from_str(json)
        .map_err(|e| format!("unreadable describe-stacks output: {}", e))?;
    let stack = described
        .stacks
        .into_iter()
        .next()
        .ok_or_else(|| "describe-stacks returned no stack".to_string())?;

    Ok(stack
        .outputs
        .into_iter()
        .map(|o| (o.output_key, o.output_value))
        .collect())
}
