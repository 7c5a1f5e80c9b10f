use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::errors::BenchError;
use crate::types::VersionId;
use crate::vcs::{Vcs, describe};

const DENY_WARNINGS: &str = "#![deny(warnings)]";
const ALLOW_WARNINGS: &str = "#![allow(warnings)]";

/// Produces one executable for a version.
pub trait Builder {
    /// Build `id` and place the resulting executable at `dest`.
    fn build(&mut self, id: &VersionId, dest: &Path) -> Result<()>;
}

/// How old snapshots that fail `#![deny(warnings)]` on a newer compiler get built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum WarningPolicy {
    /// Pass `--cap-lints=warn` through `RUSTFLAGS`; sources are never touched.
    ///
    /// `RUSTFLAGS` replaces any `build.rustflags` from `.cargo/config.toml`, and
    /// it changes cargo's fingerprint, so the next plain `cargo build --release`
    /// in the working tree recompiles from scratch.
    #[default]
    CapLints,
    /// Temporarily rewrite the deny attribute in the crate root.
    RewriteSource,
}

/// Swaps `#![deny(warnings)]` for `#![allow(warnings)]` in a source file and
/// puts the original contents back when dropped.
#[derive(Debug)]
pub struct LenientWarningsGuard {
    path: PathBuf,
    original: Option<String>,
}

impl LenientWarningsGuard {
    pub fn apply(path: &Path) -> Result<Self> {
        let original = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no crate root to relax");
                return Ok(Self {
                    path: path.to_path_buf(),
                    original: None,
                });
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        let relaxed = relax_warnings(&original);
        if relaxed == original {
            return Ok(Self {
                path: path.to_path_buf(),
                original: None,
            });
        }

        fs::write(path, relaxed).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            original: Some(original),
        })
    }

    /// Whether the file was actually changed.
    pub fn is_active(&self) -> bool {
        self.original.is_some()
    }
}

impl Drop for LenientWarningsGuard {
    fn drop(&mut self) {
        if let Some(original) = self.original.take()
            && let Err(e) = fs::write(&self.path, original)
        {
            warn!(path = %self.path.display(), error = %e, "failed to restore #![deny(warnings)]");
        }
    }
}

fn relax_warnings(source: &str) -> String {
    source
        .split_inclusive('\n')
        .map(|line| {
            if line.starts_with(DENY_WARNINGS) {
                let ending = &line[line.trim_end_matches(['\r', '\n']).len()..];
                format!("{ALLOW_WARNINGS}{ending}")
            } else {
                line.to_string()
            }
        })
        .collect()
}

/// `RUSTFLAGS` with `--cap-lints=warn` appended to whatever the caller already set.
fn cap_lints_rustflags(existing: Option<OsString>) -> OsString {
    let mut flags = existing.unwrap_or_default();
    if !flags.is_empty() {
        flags.push(" ");
    }
    flags.push("--cap-lints=warn");
    flags
}

/// Builds release binaries with cargo.
///
/// Tagged and committed versions are built in a private clone that lives for
/// as long as the builder; the working tree is built in place.
pub struct CargoBuilder<'a, V: Vcs> {
    vcs: &'a V,
    repo: PathBuf,
    binary_name: String,
    policy: WarningPolicy,
    source_file: PathBuf,
    cargo: OsString,
    clone: Option<TempDir>,
}

impl<'a, V: Vcs> CargoBuilder<'a, V> {
    pub fn new(vcs: &'a V, repo: impl Into<PathBuf>, binary_name: impl Into<String>) -> Self {
        Self {
            vcs,
            repo: repo.into(),
            binary_name: binary_name.into(),
            policy: WarningPolicy::default(),
            source_file: PathBuf::from("src/main.rs"),
            cargo: std::env::var_os("CARGO").unwrap_or_else(|| "cargo".into()),
            clone: None,
        }
    }

    pub fn with_policy(mut self, policy: WarningPolicy, source_file: impl Into<PathBuf>) -> Self {
        self.policy = policy;
        self.source_file = source_file.into();
        self
    }

    pub fn with_cargo(mut self, cargo: impl Into<OsString>) -> Self {
        self.cargo = cargo.into();
        self
    }

    fn clone_dir(&mut self) -> Result<PathBuf> {
        if let Some(clone) = &self.clone {
            return Ok(clone.path().to_path_buf());
        }
        let tmp = tempfile::Builder::new()
            .prefix(&format!("{}-benchmark", self.binary_name))
            .tempdir()?;
        info!(path = %tmp.path().display(), "cloning repository for snapshot builds");
        self.vcs.clone_into(tmp.path())?;
        let path = tmp.path().to_path_buf();
        self.clone = Some(tmp);
        Ok(path)
    }

    fn cargo_build(&self, dir: &Path, id: &VersionId) -> Result<()> {
        let mut cmd = Command::new(&self.cargo);
        cmd.args(["build", "--release"]).current_dir(dir);

        let _guard = match self.policy {
            WarningPolicy::CapLints => {
                cmd.env("RUSTFLAGS", cap_lints_rustflags(std::env::var_os("RUSTFLAGS")));
                None
            }
            WarningPolicy::RewriteSource => {
                Some(LenientWarningsGuard::apply(&dir.join(&self.source_file))?)
            }
        };

        debug!(command = %describe(&cmd), dir = %dir.display(), "building");
        let status = cmd.status().map_err(|source| BenchError::SpawnFailed {
            command: describe(&cmd),
            source,
        })?;
        if !status.success() {
            return Err(BenchError::BuildFailed {
                version: id.to_string(),
                status,
            }
            .into());
        }
        Ok(())
    }
}

impl<V: Vcs> Builder for CargoBuilder<'_, V> {
    fn build(&mut self, id: &VersionId, dest: &Path) -> Result<()> {
        let dir = match id.revision() {
            Some(revision) => {
                let clone = self.clone_dir()?;
                self.vcs.checkout(&clone, revision)?;
                clone
            }
            None => self.repo.clone(),
        };

        info!(version = %id, "building");
        self.cargo_build(&dir, id)?;

        // Copy under a temporary name first so an interrupted copy never
        // looks like a finished artifact.
        let built = dir.join("target").join("release").join(&self.binary_name);
        let mut partial = dest.as_os_str().to_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);
        fs::copy(&built, &partial).map_err(|source| BenchError::CacheError {
            path: built.clone(),
            source,
        })?;
        fs::rename(&partial, dest).map_err(|source| BenchError::CacheError {
            path: dest.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}
