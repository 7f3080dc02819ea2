//! On-disk artifact cache
//!
//! Stores program blobs between sessions as `<hash>.bin` with a
//! `<hash>.json` metadata file next to it.

use super::CacheKey;
use crate::backend::artifact::CompiledArtifact;
use crate::backend::program::EntryPoint;
use crate::signature::TypeSignature;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// Metadata stored next to each blob
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DiskCacheMetadata {
    pub entry_point: EntryPoint,
    pub function_name: String,
    pub signatures: Vec<TypeSignature>,
    pub crate_version: String,
}

/// Platform cache directory for kernel blobs, e.g. `~/.cache/kernjit/kernels`
pub fn default_cache_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "kernjit").map(|dirs| dirs.cache_dir().join("kernels"))
}

#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stable file stem for a key
    pub fn hash_key(key: &CacheKey) -> String {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    fn paths(&self, key: &CacheKey) -> (PathBuf, PathBuf) {
        let hash = Self::hash_key(key);
        (
            self.dir.join(format!("{}.bin", hash)),
            self.dir.join(format!("{}.json", hash)),
        )
    }

    /// Load the artifact for `key`.
    ///
    /// Returns `Ok(None)` when nothing usable is stored: missing files, a
    /// different crate version or mismatching signatures.
    pub fn load(&self, key: &CacheKey) -> io::Result<Option<CompiledArtifact>> {
        let (bin_path, meta_path) = self.paths(key);
        if !bin_path.exists() || !meta_path.exists() {
            return Ok(None);
        }

        let meta_str = std::fs::read_to_string(&meta_path)?;
        let metadata: DiskCacheMetadata = serde_json::from_str(&meta_str)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        if metadata.crate_version != crate_version() {
            log::debug!(
                "ignoring disk cache entry for {} from version {}",
                key,
                metadata.crate_version
            );
            return Ok(None);
        }
        if metadata.signatures != key.signatures() || metadata.function_name != key.name() {
            log::debug!("ignoring disk cache entry for {}: key mismatch", key);
            return Ok(None);
        }

        let blob = std::fs::read(&bin_path)?;
        let artifact = CompiledArtifact::from_blob(
            metadata.function_name,
            key.function(),
            metadata.signatures,
            blob,
        )
        .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        if artifact.entry_point() != metadata.entry_point {
            return Ok(None);
        }

        log::debug!(
            "Disk cache hit: {} (entry_point={:?})",
            key,
            metadata.entry_point
        );
        Ok(Some(artifact))
    }

    pub fn store(&self, key: &CacheKey, artifact: &CompiledArtifact) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let (bin_path, meta_path) = self.paths(key);

        std::fs::write(&bin_path, artifact.blob())?;

        let metadata = DiskCacheMetadata {
            entry_point: artifact.entry_point(),
            function_name: artifact.name().to_string(),
            signatures: artifact.signatures().to_vec(),
            crate_version: crate_version().to_string(),
        };
        let meta_json = serde_json::to_string_pretty(&metadata)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        std::fs::write(&meta_path, meta_json)?;

        log::debug!(
            "Disk cache saved: {} ({} bytes, entry_point={:?})",
            key,
            artifact.blob().len(),
            metadata.entry_point
        );
        Ok(())
    }
}

fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
