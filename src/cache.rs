use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info};

use crate::build::Builder;
use crate::errors::BenchError;
use crate::types::{BinaryArtifact, VersionId};
use crate::versions::natural_cmp;

/// Directory of built binaries, one file per version, kept between sessions.
///
/// Releases are immutable and never rebuilt once present. The working tree is
/// rebuilt every time. At most one latest-commit build is kept.
#[derive(Debug, Clone)]
pub struct BinaryCache {
    dir: PathBuf,
    binary_name: String,
}

impl BinaryCache {
    /// Open the cache at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>, binary_name: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| BenchError::CacheError {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            binary_name: binary_name.into(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, id: &VersionId) -> PathBuf {
        self.dir.join(id.artifact_name(&self.binary_name))
    }

    /// Delete latest-commit builds for any hash other than `current_hash`.
    /// Returns the removed paths.
    pub fn evict_stale_latest_commits(&self, current_hash: &str) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for artifact in self.artifacts()? {
            if let VersionId::LatestCommit(hash) = &artifact.id
                && hash != current_hash
            {
                info!(path = %artifact.path.display(), "removing build for earlier unreleased commit");
                fs::remove_file(&artifact.path).map_err(|source| BenchError::CacheError {
                    path: artifact.path.clone(),
                    source,
                })?;
                removed.push(artifact.path);
            }
        }
        Ok(removed)
    }

    /// Return a usable binary for `id`, building it with `builder` if needed.
    pub fn ensure<B: Builder + ?Sized>(
        &self,
        id: &VersionId,
        builder: &mut B,
    ) -> Result<BinaryArtifact> {
        let path = self.artifact_path(id);

        let reusable = match id {
            VersionId::Release(_) => true,
            VersionId::LatestCommit(hash) => {
                self.evict_stale_latest_commits(hash)?;
                true
            }
            VersionId::WorkingTree => false,
        };

        if reusable && path.is_file() {
            debug!(version = %id, path = %path.display(), "cached");
        } else {
            if reusable {
                info!(path = %path.display(), "building missing binary");
            }
            builder.build(id, &path)?;
        }

        Ok(BinaryArtifact {
            id: id.clone(),
            path,
        })
    }

    /// [`BinaryCache::ensure`] every version in order, stopping at the first failure.
    pub fn ensure_all<B: Builder + ?Sized>(
        &self,
        ids: &[VersionId],
        builder: &mut B,
    ) -> Result<Vec<BinaryArtifact>> {
        ids.iter().map(|id| self.ensure(id, builder)).collect()
    }

    /// Every artifact currently in the cache, in natural file name order.
    /// Files the cache did not produce are ignored.
    pub fn artifacts(&self) -> Result<Vec<BinaryArtifact>> {
        let entries = fs::read_dir(&self.dir).map_err(|source| BenchError::CacheError {
            path: self.dir.clone(),
            source,
        })?;

        let prefix = format!("{}-", self.binary_name);
        let mut artifacts = Vec::new();

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let id = name
                .strip_prefix(&prefix)
                .and_then(VersionId::from_artifact_suffix);
            match id {
                Some(id) => artifacts.push(BinaryArtifact { id, path }),
                None => debug!(file = %name, "ignoring unrecognized file in binary cache"),
            }
        }

        artifacts.sort_by(|a, b| natural_cmp(&a.label(), &b.label()));
        Ok(artifacts)
    }
}
