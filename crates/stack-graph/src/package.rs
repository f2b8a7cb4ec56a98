//! Building function code into upload-ready archives.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use stack_api::{FunctionPackage, PackageSource};
use tokio::process::Command;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::{GraphError, GraphResult};

/// Target the `provided.al2023` runtime executes.
pub const DEFAULT_BUILD_TARGET: &str = "x86_64-unknown-linux-musl";

/// Directory under the output directory archives are written to.
pub const ARCHIVE_DIR: &str = "functions";

/// Template parameter values, by parameter name.
pub type StackParameters = BTreeMap<String, String>;

/// An archive ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedFunction {
    pub endpoint_id: String,
    pub archive: PathBuf,
    pub sha256: String,
    pub bytes: u64,
    /// Object key in the package bucket.
    pub key: String,
    /// Template parameter the key is passed through.
    pub key_parameter: String,
}

struct ArchiveEntry {
    name: String,
    source: PathBuf,
    mode: u32,
}

/// Compiles function crates and writes their archives.
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    project_dir: PathBuf,
    out_dir: PathBuf,
    target: String,
    cargo: String,
    cargo_args: Vec<String>,
}

impl FunctionBuilder {
    /// Sources resolve against `project_dir`; archives land in `out_dir/functions`.
    pub fn new(project_dir: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            out_dir: out_dir.into(),
            target: DEFAULT_BUILD_TARGET.to_string(),
            cargo: "cargo".to_string(),
            cargo_args: Vec::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Extra arguments appended to every cargo call.
    pub fn with_cargo_args(mut self, args: Vec<String>) -> Self {
        self.cargo_args = args;
        self
    }

    /// Use a different cargo executable (for example `cross`).
    pub fn with_cargo(mut self, cargo: impl Into<String>) -> Self {
        self.cargo = cargo.into();
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Arguments of the cargo call compiling `package`.
    pub fn cargo_args(&self, package: &FunctionPackage) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "--release".to_string(),
            "--target".to_string(),
            self.target.clone(),
            "--package".to_string(),
            package.crate_name.clone(),
            "--bin".to_string(),
            package.crate_name.clone(),
        ];
        args.extend(self.cargo_args.iter().cloned());
        args
    }

    /// Where cargo leaves the executable of `package`.
    pub fn binary_path(&self, package: &FunctionPackage) -> PathBuf {
        let target_dir = std::env::var_os("CARGO_TARGET_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| self.project_dir.join("target"));
        target_dir
            .join(&self.target)
            .join("release")
            .join(&package.crate_name)
    }

    /// Compile `package` if it is a crate, then archive it.
    pub async fn build(&self, package: &FunctionPackage) -> GraphResult<PackagedFunction> {
        match package.source {
            PackageSource::CargoBinary => {
                let args = self.cargo_args(package);
                tracing::info!(
                    endpoint = %package.endpoint_id,
                    target = %self.target,
                    "compiling function"
                );
                tracing::debug!(command = %format!("{} {}", self.cargo, args.join(" ")), "running");

                let output = Command::new(&self.cargo)
                    .args(&args)
                    .current_dir(&self.project_dir)
                    .output()
                    .await
                    .map_err(|e| package_error(package, format!("failed to run {}: {}", self.cargo, e)))?;
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    return Err(package_error(package, format!("cargo build failed: {}", stderr)));
                }

                self.archive_binary(package, &self.binary_path(package))
            }
            PackageSource::Directory => {
                self.archive_directory(package, &self.project_dir.join(&package.source_asset))
            }
        }
    }

    /// Archive one executable under the package's entry point.
    pub fn archive_binary(
        &self,
        package: &FunctionPackage,
        binary: &Path,
    ) -> GraphResult<PackagedFunction> {
        if !binary.is_file() {
            return Err(package_error(
                package,
                format!("no executable at {}", binary.display()),
            ));
        }
        let entries = vec![ArchiveEntry {
            name: package.entry_point.clone(),
            source: binary.to_path_buf(),
            mode: 0o755,
        }];
        self.write(package, &entries)
    }

    /// Archive every file below `dir`, keyed by its relative path.
    pub fn archive_directory(
        &self,
        package: &FunctionPackage,
        dir: &Path,
    ) -> GraphResult<PackagedFunction> {
        if !dir.is_dir() {
            return Err(package_error(
                package,
                format!("source directory {} not found", dir.display()),
            ));
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| package_error(package, e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(dir)
                .map_err(|e| package_error(package, e.to_string()))?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            entries.push(ArchiveEntry {
                name,
                source: entry.path().to_path_buf(),
                mode: 0o644,
            });
        }
        if entries.is_empty() {
            return Err(package_error(
                package,
                format!("source directory {} is empty", dir.display()),
            ));
        }
        self.write(package, &entries)
    }

    fn write(
        &self,
        package: &FunctionPackage,
        entries: &[ArchiveEntry],
    ) -> GraphResult<PackagedFunction> {
        let dir = self.out_dir.join(ARCHIVE_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| package_error(package, e.to_string()))?;
        let archive = dir.join(format!("{}.zip", package.endpoint_id));

        write_archive(&archive, entries).map_err(|e| package_error(package, e))?;

        let bytes = std::fs::read(&archive).map_err(|e| package_error(package, e.to_string()))?;
        let sha256 = hex::encode(Sha256::digest(&bytes));

        tracing::debug!(
            endpoint = %package.endpoint_id,
            archive = %archive.display(),
            bytes = bytes.len(),
            "wrote function archive"
        );

        Ok(PackagedFunction {
            endpoint_id: package.endpoint_id.clone(),
            archive,
            key: package.key_for(&sha256),
            sha256,
            bytes: bytes.len() as u64,
            key_parameter: package.key_parameter.clone(),
        })
    }
}

/// Entries carry a fixed timestamp so unchanged code hashes to the same key.
fn write_archive(path: &Path, entries: &[ArchiveEntry]) -> Result<(), String> {
    let file = File::create(path).map_err(|e| e.to_string())?;
    let mut zip = ZipWriter::new(file);

    for entry in entries {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(entry.mode);
        zip.start_file(entry.name.as_str(), options)
            .map_err(|e| e.to_string())?;
        let mut source = File::open(&entry.source)
            .map_err(|e| format!("{}: {}", entry.source.display(), e))?;
        std::io::copy(&mut source, &mut zip).map_err(|e| e.to_string())?;
    }

    zip.finish().map_err(|e| e.to_string())?;
    Ok(())
}

fn package_error(package: &FunctionPackage, message: impl Into<String>) -> GraphError {
    GraphError::Package {
        endpoint: package.endpoint_id.clone(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use stack_api::{ApiComputeUnit, ApiConfig};
    use stack_core::StackEnv;

    use super::*;

    fn packages() -> Vec<FunctionPackage> {
        ApiComputeUnit::new("ApiStack", StackEnv::global_edge(), &ApiConfig::default())
            .unwrap()
            .packages()
    }

    fn entry(archive: &Path, name: &str) -> (Vec<u8>, Option<u32>) {
        let mut zip = zip::ZipArchive::new(File::open(archive).unwrap()).unwrap();
        let mut file = zip.by_name(name).unwrap();
        let mut content = Vec::new();
        file.read_to_end(&mut content).unwrap();
        (content, file.unix_mode())
    }

    #[test]
    fn test_cargo_args() {
        let builder = FunctionBuilder::new("/project", "/project/stack.out")
            .with_cargo_args(vec!["--locked".into()]);
        let args = builder.cargo_args(&packages()[0]);

        assert_eq!(&args[..2], ["build", "--release"]);
        assert!(args.windows(2).any(|w| w == ["--target", DEFAULT_BUILD_TARGET]));
        assert!(args.windows(2).any(|w| w == ["--package", "sample-lambda-1"]));
        assert!(args.windows(2).any(|w| w == ["--bin", "sample-lambda-1"]));
        assert_eq!(args.last().map(String::as_str), Some("--locked"));
    }

    #[test]
    fn test_binary_archived_as_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("sample-lambda-1");
        std::fs::write(&binary, b"\x7fELF fake executable").unwrap();

        let builder = FunctionBuilder::new(dir.path(), dir.path().join("out"));
        let package = &packages()[0];
        let packaged = builder.archive_binary(package, &binary).unwrap();

        assert_eq!(packaged.archive, dir.path().join("out/functions/sample-lambda-1.zip"));
        assert_eq!(packaged.key_parameter, "SampleLambda1CodeKey");
        assert_eq!(
            packaged.key,
            format!("functions/sample-lambda-1-{}.zip", &packaged.sha256[..16])
        );

        let (content, mode) = entry(&packaged.archive, "bootstrap");
        assert_eq!(content, b"\x7fELF fake executable");
        assert_eq!(mode.map(|m| m & 0o777), Some(0o755));

        // Unchanged code keeps its key.
        let again = builder.archive_binary(package, &binary).unwrap();
        assert_eq!(again.sha256, packaged.sha256);

        std::fs::write(&binary, b"\x7fELF changed").unwrap();
        assert_ne!(builder.archive_binary(package, &binary).unwrap().key, packaged.key);
    }

    #[test]
    fn test_directory_archived_with_relative_names() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("lambdas/report");
        std::fs::create_dir_all(source.join("lib")).unwrap();
        std::fs::write(source.join("index.js"), "exports.handler = async () => ({})").unwrap();
        std::fs::write(source.join("lib/util.js"), "module.exports = {}").unwrap();

        let mut package = packages()[0].clone();
        package.source = PackageSource::Directory;
        package.source_asset = "lambdas/report".into();

        let builder = FunctionBuilder::new(dir.path(), dir.path().join("out"));
        let packaged = builder.archive_directory(&package, &source).unwrap();

        let (index, mode) = entry(&packaged.archive, "index.js");
        assert!(index.starts_with(b"exports.handler"));
        assert_eq!(mode.map(|m| m & 0o777), Some(0o644));
        assert_eq!(entry(&packaged.archive, "lib/util.js").0, b"module.exports = {}");
    }

    #[test]
    fn test_missing_sources_reported() {
        let dir = tempfile::tempdir().unwrap();
        let builder = FunctionBuilder::new(dir.path(), dir.path().join("out"));
        let package = &packages()[1];

        let err = builder
            .archive_binary(package, &dir.path().join("absent"))
            .unwrap_err();
        assert!(matches!(err, GraphError::Package { ref endpoint, .. } if endpoint == "sample-lambda-2"));
        assert!(builder.archive_directory(package, &dir.path().join("absent")).is_err());
    }

    #[tokio::test]
    async fn test_missing_cargo_reported() {
        let dir = tempfile::tempdir().unwrap();
        let builder =
            FunctionBuilder::new(dir.path(), dir.path().join("out")).with_cargo("definitely-not-cargo");
        let err = builder.build(&packages()[0]).await.unwrap_err();
        assert!(err.to_string().contains("definitely-not-cargo"));
    }
}
