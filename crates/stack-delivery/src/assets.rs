//! Static files published into the object store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{DeliveryError, DeliveryResult};

/// One file of the static site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Object key, `/`-separated and relative to the site root.
    pub key: String,
    pub content_type: &'static str,
    /// Hex sha256 of the contents.
    pub sha256: String,
    pub body: Vec<u8>,
}

impl Asset {
    /// Asset from in-memory contents.
    pub fn new(key: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        let key = key.into();
        let body = body.into();
        Self {
            content_type: content_type_for(&key),
            sha256: checksum(&body),
            key,
            body,
        }
    }

    pub fn size(&self) -> usize {
        self.body.len()
    }
}

/// The static site, keyed by object key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetSet {
    source: Option<PathBuf>,
    assets: BTreeMap<String, Asset>,
}

impl AssetSet {
    /// Load every regular file under `dir`.
    pub fn load(dir: impl AsRef<Path>) -> DeliveryResult<Self> {
        let dir = dir.as_ref();
        let read_error = |message: String| DeliveryError::AssetRead {
            path: dir.to_path_buf(),
            message,
        };

        if !dir.is_dir() {
            return Err(read_error("not a directory".to_string()));
        }

        let mut assets = BTreeMap::new();
        for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| read_error(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(dir)
                .map_err(|e| read_error(e.to_string()))?;
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let body = std::fs::read(entry.path()).map_err(|e| DeliveryError::AssetRead {
                path: entry.path().to_path_buf(),
                message: e.to_string(),
            })?;

            assets.insert(key.clone(), Asset::new(key, body));
        }

        tracing::debug!(dir = %dir.display(), files = assets.len(), "loaded static assets");

        Ok(Self {
            source: Some(dir.to_path_buf()),
            assets,
        })
    }

    /// Build a set from in-memory files.
    pub fn from_files<K, B>(files: impl IntoIterator<Item = (K, B)>) -> Self
    where
        K: Into<String>,
        B: Into<Vec<u8>>,
    {
        let assets = files
            .into_iter()
            .map(|(key, body)| {
                let asset = Asset::new(key, body);
                (asset.key.clone(), asset)
            })
            .collect();
        Self {
            source: None,
            assets,
        }
    }

    /// Directory the set was loaded from.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&Asset> {
        self.assets.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.assets.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.assets.values().map(Asset::size).sum()
    }

    /// Hash over every key and file hash; changes whenever any file does.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for asset in self.assets.values() {
            hasher.update(asset.key.as_bytes());
            hasher.update([0]);
            hasher.update(asset.sha256.as_bytes());
            hasher.update([0]);
        }
        hex::encode(hasher.finalize())
    }
}

fn checksum(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// Content type by file extension.
pub fn content_type_for(key: &str) -> &'static str {
    let extension = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "txt" => "text/plain; charset=utf-8",
        "wasm" => "application/wasm",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}
