use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use git2::Repository;
use tracing::debug;

use crate::errors::BenchError;

/// The version-control operations a benchmarking session needs.
pub trait Vcs {
    /// Every tag in the repository, in no particular order.
    fn tags(&self) -> Result<Vec<String>>;

    /// Short hash of the commit currently checked out.
    fn short_head(&self) -> Result<String>;

    /// Clone the repository into the empty directory `dest`.
    fn clone_into(&self, dest: &Path) -> Result<()>;

    /// Check out `revision` inside a clone made by [`Vcs::clone_into`].
    fn checkout(&self, worktree: &Path, revision: &str) -> Result<()>;

    /// Write the patch-formatted history of `branch` to `out`.
    fn write_history(&self, branch: &str, out: File) -> Result<()>;
}

/// [`Vcs`] for a git repository.
///
/// Tags, HEAD, clones and checkouts go through libgit2; the history corpus
/// comes from `git log -p` so it matches what riff users feed it.
#[derive(Debug, Clone)]
pub struct GitRepo {
    repo: PathBuf,
}

impl GitRepo {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    fn open(&self) -> Result<Repository> {
        Repository::open(&self.repo)
            .with_context(|| format!("Cannot open git repository {}", self.repo.display()))
    }
}

impl Vcs for GitRepo {
    fn tags(&self) -> Result<Vec<String>> {
        let repo = self.open()?;
        let names = repo.tag_names(None)?;
        Ok(names.iter().flatten().map(str::to_string).collect())
    }

    fn short_head(&self) -> Result<String> {
        let repo = self.open()?;
        let head = repo
            .revparse_single("HEAD")
            .context("Cannot resolve HEAD")?;
        let short = head.short_id()?;
        match short.as_str() {
            Some(id) => Ok(id.to_string()),
            None => anyhow::bail!("HEAD abbreviation is not valid UTF-8"),
        }
    }

    fn clone_into(&self, dest: &Path) -> Result<()> {
        // libgit2 resolves a relative source against the process, not the repo.
        let source = fs::canonicalize(&self.repo)
            .with_context(|| format!("Cannot resolve repository path {}", self.repo.display()))?;
        let Some(url) = source.to_str() else {
            anyhow::bail!("Repository path {} is not valid UTF-8", source.display());
        };
        debug!(from = %source.display(), to = %dest.display(), "cloning");
        Repository::clone(url, dest)
            .with_context(|| format!("Cannot clone {} into {}", source.display(), dest.display()))?;
        Ok(())
    }

    fn checkout(&self, worktree: &Path, revision: &str) -> Result<()> {
        let repo = Repository::open(worktree)
            .with_context(|| format!("Cannot open clone {}", worktree.display()))?;
        let commit = repo
            .revparse_single(revision)
            .and_then(|obj| obj.peel_to_commit())
            .with_context(|| format!("Cannot find revision {revision}"))?;

        // The clone is private, so tracked files are overwritten; untracked
        // build output stays for incremental builds.
        let mut opts = git2::build::CheckoutBuilder::new();
        opts.force();
        repo.checkout_tree(commit.as_object(), Some(&mut opts))?;
        repo.set_head_detached(commit.id())?;
        Ok(())
    }

    fn write_history(&self, branch: &str, out: File) -> Result<()> {
        run_checked(
            Command::new("git")
                .current_dir(&self.repo)
                .args(["log", "-p", branch])
                .stdout(out),
        )
    }
}

/// Human-readable rendering of a command line for error messages.
pub(crate) fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

/// Run `cmd` to completion, failing on spawn errors and non-zero exits.
pub(crate) fn run_checked(cmd: &mut Command) -> Result<()> {
    let command = describe(cmd);
    let status = cmd.status().map_err(|source| BenchError::SpawnFailed {
        command: command.clone(),
        source,
    })?;
    if !status.success() {
        return Err(BenchError::CommandFailed { command, status }.into());
    }
    Ok(())
}
