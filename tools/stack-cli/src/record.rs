//! Deployment records kept under `.stack/deployments`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stack_core::ResolvedOutputs;
use stack_delivery::AssetPublication;
use stack_graph::DeploymentReport;

pub const STATUS_DEPLOYED: &str = "deployed";
pub const STATUS_DRY_RUN: &str = "dry-run";

/// One finished deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: String,
    pub environment: String,
    pub timestamp: DateTime<Utc>,
    pub app_name: String,
    pub status: String,
    pub domain_name: String,
    pub url: String,
    /// Hash of the published site.
    pub content_hash: String,
    pub file_count: usize,
    /// Resolved outputs per stack.
    pub stacks: BTreeMap<String, ResolvedOutputs>,
}

impl DeploymentRecord {
    pub fn new(
        environment: &str,
        app_name: &str,
        report: &DeploymentReport,
        publication: &AssetPublication,
        dry_run: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("{}-{}", environment, timestamp.format("%Y%m%d%H%M%S%3f")),
            environment: environment.to_string(),
            timestamp,
            app_name: app_name.to_string(),
            status: if dry_run { STATUS_DRY_RUN } else { STATUS_DEPLOYED }.to_string(),
            domain_name: report.domain_name.clone(),
            url: report.url(),
            content_hash: publication.content_hash.clone(),
            file_count: publication.file_count,
            stacks: report.outputs.clone(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.id)
    }
}

/// Write `record` into `dir`, creating it if needed.
pub fn save(dir: &Path, record: &DeploymentRecord) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let path = dir.join(record.file_name());
    let json = serde_json::to_string_pretty(record)?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Records in `dir`, newest first. Unreadable files are skipped.
pub fn load_all(dir: &Path, environment: Option<&str>) -> Result<Vec<DeploymentRecord>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map_or(true, |e| e != "json") {
            continue;
        }

        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        let Ok(record) = serde_json::from_str::<DeploymentRecord>(&content) else {
            continue;
        };
        if environment.is_some_and(|env| env != record.environment) {
            continue;
        }
        records.push(record);
    }

    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(records)
}

/// Find a record by id.
pub fn find(dir: &Path, id: &str) -> Result<Option<DeploymentRecord>> {
    Ok(load_all(dir, None)?.into_iter().find(|r| r.id == id))
}

/// Delete all but the newest `keep` records of `environment`. Returns how many were removed.
pub fn prune(dir: &Path, environment: &str, keep: usize) -> Result<usize> {
    let records = load_all(dir, Some(environment))?;
    let mut removed = 0;
    for record in records.iter().skip(keep) {
        let path = dir.join(record.file_name());
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}
