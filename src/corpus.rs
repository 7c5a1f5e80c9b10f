use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::info;

use crate::vcs::Vcs;

#[derive(Debug)]
enum Backing {
    /// Generated for this session, deleted on drop.
    Temporary(NamedTempFile),
    /// Supplied by the user, left alone.
    Existing(PathBuf),
}

/// The input every benchmarked binary reads from stdin.
///
/// Written once per session and only ever reopened for reading, so every run
/// sees the same bytes.
#[derive(Debug)]
pub struct Corpus {
    backing: Backing,
}

impl Corpus {
    /// The patch-formatted history of `branch`, captured into a temporary file.
    pub fn from_history<V: Vcs + ?Sized>(vcs: &V, branch: &str) -> Result<Self> {
        let tmp = tempfile::Builder::new()
            .prefix("riff-benchmark")
            .suffix(".gitlog")
            .tempfile()?;
        vcs.write_history(branch, tmp.reopen()?)?;

        let corpus = Self {
            backing: Backing::Temporary(tmp),
        };
        info!(branch, bytes = corpus.len()?, "captured history corpus");
        Ok(corpus)
    }

    /// Use an existing file as is.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let meta = fs::metadata(&path)
            .with_context(|| format!("Cannot read corpus file {}", path.display()))?;
        if !meta.is_file() {
            anyhow::bail!("Corpus {} is not a regular file", path.display());
        }
        Ok(Self {
            backing: Backing::Existing(path),
        })
    }

    /// One removed line of `tokens` dots followed by one added line of `tokens`
    /// hashes: a hunk where nothing matches, the worst case for refinement.
    pub fn synthetic_mismatch(tokens: usize) -> Result<Self> {
        let tmp = tempfile::Builder::new()
            .prefix("riff-benchmark")
            .suffix(".diff")
            .tempfile()?;
        {
            let mut out = BufWriter::new(tmp.as_file());
            write_repeated(&mut out, b'-', b'.', tokens)?;
            write_repeated(&mut out, b'+', b'#', tokens)?;
            out.flush()?;
        }
        info!(tokens, "generated synthetic mismatch corpus");
        Ok(Self {
            backing: Backing::Temporary(tmp),
        })
    }

    /// Build a corpus from literal bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut tmp = tempfile::Builder::new().prefix("riff-benchmark").tempfile()?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        Ok(Self {
            backing: Backing::Temporary(tmp),
        })
    }

    pub fn path(&self) -> &Path {
        match &self.backing {
            Backing::Temporary(tmp) => tmp.path(),
            Backing::Existing(path) => path,
        }
    }

    pub fn len(&self) -> io::Result<u64> {
        Ok(fs::metadata(self.path())?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// A fresh read handle positioned at the start.
    pub fn open(&self) -> io::Result<File> {
        File::open(self.path())
    }
}

fn write_repeated<W: Write>(out: &mut W, marker: u8, fill: u8, count: usize) -> io::Result<()> {
    const CHUNK: usize = 64 * 1024;
    let chunk = [fill; CHUNK];

    out.write_all(&[marker])?;
    let mut left = count;
    while left > 0 {
        let n = left.min(CHUNK);
        out.write_all(&chunk[..n])?;
        left -= n;
    }
    out.write_all(b"\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    struct HistoryVcs(&'static str);

    impl Vcs for HistoryVcs {
        fn tags(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        fn short_head(&self) -> Result<String> {
            Ok("ab12".into())
        }
        fn clone_into(&self, _dest: &Path) -> Result<()> {
            Ok(())
        }
        fn checkout(&self, _worktree: &Path, _revision: &str) -> Result<()> {
            Ok(())
        }
        fn write_history(&self, branch: &str, mut out: File) -> Result<()> {
            write!(out, "branch {branch}\n{}", self.0)?;
            Ok(())
        }
    }

    fn read_all(corpus: &Corpus) -> Vec<u8> {
        let mut buf = Vec::new();
        corpus.open().unwrap().read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn history_corpus_is_captured_once_and_reopened() {
        let corpus = Corpus::from_history(&HistoryVcs("diff --git a/x b/x\n"), "master").unwrap();
        let first = read_all(&corpus);
        let second = read_all(&corpus);
        assert_eq!(first, b"branch master\ndiff --git a/x b/x\n");
        assert_eq!(first, second);
        assert_eq!(corpus.len().unwrap(), first.len() as u64);
    }

    #[test]
    fn temporary_corpus_is_removed_on_drop() {
        let corpus = Corpus::from_bytes(b"hello").unwrap();
        let path = corpus.path().to_path_buf();
        assert!(path.exists());
        drop(corpus);
        assert!(!path.exists());
    }

    #[test]
    fn existing_file_is_left_in_place() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let path = tmp.path().join("input.diff");
        fs::write(&path, "+added\n").unwrap();

        let corpus = Corpus::from_file(&path).unwrap();
        assert_eq!(read_all(&corpus), b"+added\n");
        drop(corpus);
        assert!(path.exists());
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let result = Corpus::from_file(tmp.path().join("nope"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Cannot read corpus"));
    }

    #[test]
    fn directory_is_not_a_corpus() {
        let tmp = assert_fs::TempDir::new().unwrap();
        assert!(Corpus::from_file(tmp.path()).is_err());
    }

    #[test]
    fn synthetic_mismatch_layout() {
        let corpus = Corpus::synthetic_mismatch(5).unwrap();
        assert_eq!(read_all(&corpus), b"-.....\n+#####\n");
    }

    #[test]
    fn synthetic_mismatch_spans_chunks() {
        let tokens = 200_000;
        let corpus = Corpus::synthetic_mismatch(tokens).unwrap();
        assert_eq!(corpus.len().unwrap(), 2 * (tokens as u64 + 2));
        assert!(!corpus.is_empty().unwrap());
    }
}
