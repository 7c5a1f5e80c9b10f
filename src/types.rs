use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;

use crate::versions::is_release_tag;

const CURRENT_SUFFIX: &str = "current";
const LATEST_COMMIT_PREFIX: &str = "latest-commit-";

/// A buildable snapshot of the benchmarked project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionId {
    /// A released version, named by its numeric-dotted tag.
    Release(String),
    /// The most recent commit, named by its short hash.
    LatestCommit(String),
    /// Uncommitted sources as currently checked out.
    WorkingTree,
}

impl VersionId {
    /// The part of a cached artifact's file name that follows `<binary>-`.
    pub fn artifact_suffix(&self) -> String {
        match self {
            VersionId::Release(tag) => tag.clone(),
            VersionId::LatestCommit(hash) => format!("{LATEST_COMMIT_PREFIX}{hash}"),
            VersionId::WorkingTree => CURRENT_SUFFIX.to_string(),
        }
    }

    /// Inverse of [`VersionId::artifact_suffix`]. Returns `None` for names the
    /// cache did not produce.
    pub fn from_artifact_suffix(suffix: &str) -> Option<Self> {
        if suffix == CURRENT_SUFFIX {
            return Some(VersionId::WorkingTree);
        }
        if let Some(hash) = suffix.strip_prefix(LATEST_COMMIT_PREFIX) {
            if hash.is_empty() || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            return Some(VersionId::LatestCommit(hash.to_string()));
        }
        if is_release_tag(suffix) {
            return Some(VersionId::Release(suffix.to_string()));
        }
        None
    }

    /// Name of the cached artifact for this version.
    pub fn artifact_name(&self, binary_name: &str) -> String {
        format!("{}-{}", binary_name, self.artifact_suffix())
    }

    /// The git revision to check out, `None` for the working tree.
    pub fn revision(&self) -> Option<&str> {
        match self {
            VersionId::Release(tag) => Some(tag),
            VersionId::LatestCommit(hash) => Some(hash),
            VersionId::WorkingTree => None,
        }
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionId::Release(tag) => write!(f, "release {tag}"),
            VersionId::LatestCommit(hash) => write!(f, "latest commit {hash}"),
            VersionId::WorkingTree => write!(f, "working tree"),
        }
    }
}

/// A built binary sitting in the cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryArtifact {
    pub id: VersionId,
    pub path: PathBuf,
}

impl BinaryArtifact {
    pub fn label(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Trimmed timing interval, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub low_ms: f64,
    pub high_ms: f64,
}

impl Interval {
    pub fn midpoint_ms(&self) -> f64 {
        (self.low_ms + self.high_ms) / 2.0
    }

    pub fn half_width_ms(&self) -> f64 {
        (self.high_ms - self.low_ms) / 2.0
    }
}

/// Something to time: a cached artifact or the baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchTarget {
    pub label: String,
    pub path: PathBuf,
}

impl From<&BinaryArtifact> for BenchTarget {
    fn from(artifact: &BinaryArtifact) -> Self {
        Self {
            label: artifact.label(),
            path: artifact.path.clone(),
        }
    }
}

/// A timed target.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub target: BenchTarget,
    pub interval: Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
