use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::build::WarningPolicy;
use crate::errors::BenchError;
use crate::timer::TrimPlan;
use crate::versions::ReleaseFilter;

/// Looked up in the repository root when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "benchmark.toml";

/// Settings for one benchmarking session.
///
/// Built-in defaults, overridden by an optional TOML file, overridden by
/// command-line flags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    /// Name of the binary cargo produces, also the cache file prefix.
    pub binary_name: String,
    /// Branch whose history becomes the corpus.
    pub branch: String,
    /// Lower-bound reference timed after all builds.
    pub baseline: PathBuf,
    pub iterations: u32,
    pub confidence_percent: u32,
    pub warmup_runs: u32,
    /// How many of the newest releases to build and report.
    pub keep_releases: usize,
    /// Release major versions never benchmarked.
    pub excluded_majors: Vec<u64>,
    /// Relative paths are resolved against the repository root.
    pub cache_dir: PathBuf,
    pub warnings: WarningPolicy,
    /// Crate root holding `#![deny(warnings)]`, for [`WarningPolicy::RewriteSource`].
    pub source_file: PathBuf,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            binary_name: "riff".to_string(),
            branch: "master".to_string(),
            baseline: PathBuf::from("/bin/cat"),
            iterations: 60,
            confidence_percent: 50,
            warmup_runs: 10,
            keep_releases: 4,
            excluded_majors: ReleaseFilter::default().excluded_majors,
            cache_dir: PathBuf::from(".benchmark-binaries"),
            warnings: WarningPolicy::default(),
            source_file: PathBuf::from("src/main.rs"),
        }
    }
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self, BenchError> {
        let text = fs::read_to_string(path).map_err(|source| BenchError::ConfigReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|detail| BenchError::ConfigParseError {
            path: path.to_path_buf(),
            detail,
        })
    }

    fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.message().to_string())
    }

    /// Load `explicit` if given (it must exist), else `<repo>/benchmark.toml`
    /// if present, else the defaults.
    pub fn discover(repo: &Path, explicit: Option<&Path>) -> Result<Self, BenchError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let implicit = repo.join(CONFIG_FILE_NAME);
        if implicit.is_file() {
            return Self::load(&implicit);
        }
        Ok(Self::default())
    }

    /// Check every setting, returning the trim plan on success. Runs before any
    /// subprocess is started.
    pub fn validate(&self) -> Result<TrimPlan, BenchError> {
        if self.binary_name.is_empty() || self.binary_name.contains(['/', '\\']) {
            return Err(BenchError::InvalidConfig {
                detail: format!("binary_name '{}' is not a plain file name", self.binary_name),
            });
        }
        if self.branch.trim().is_empty() {
            return Err(BenchError::InvalidConfig {
                detail: "branch must not be empty".to_string(),
            });
        }
        TrimPlan::new(self.iterations, self.confidence_percent)
    }

    pub fn release_filter(&self) -> ReleaseFilter {
        ReleaseFilter {
            excluded_majors: self.excluded_majors.clone(),
        }
    }

    pub fn cache_dir_in(&self, repo: &Path) -> PathBuf {
        if self.cache_dir.is_absolute() {
            self.cache_dir.clone()
        } else {
            repo.join(&self.cache_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_classic_session() {
        let config = BenchConfig::default();
        assert_eq!(config.iterations, 60);
        assert_eq!(config.confidence_percent, 50);
        assert_eq!(config.warmup_runs, 10);
        assert_eq!(config.keep_releases, 4);
        assert_eq!(config.baseline, PathBuf::from("/bin/cat"));
        assert_eq!(config.validate().unwrap().trim(), 15);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = BenchConfig::parse(
            r#"
            iterations = 20
            excluded_majors = []
            warnings = "rewrite-source"
            "#,
        )
        .unwrap();
        assert_eq!(config.iterations, 20);
        assert!(config.excluded_majors.is_empty());
        assert_eq!(config.warnings, WarningPolicy::RewriteSource);
        assert_eq!(config.binary_name, "riff");
        assert_eq!(config.branch, "master");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = BenchConfig::parse("iteratons = 20").unwrap_err();
        assert!(err.contains("iteratons"), "{err}");
    }

    #[test]
    fn unknown_warning_policy_is_rejected() {
        assert!(BenchConfig::parse(r#"warnings = "ignore""#).is_err());
    }

    #[test]
    fn discover_prefers_explicit_file() {
        let tmp = assert_fs::TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE_NAME), "iterations = 20").unwrap();
        let explicit = tmp.path().join("other.toml");
        fs::write(&explicit, "iterations = 40").unwrap();

        let config = BenchConfig::discover(tmp.path(), Some(&explicit)).unwrap();
        assert_eq!(config.iterations, 40);

        let config = BenchConfig::discover(tmp.path(), None).unwrap();
        assert_eq!(config.iterations, 20);
    }

    #[test]
    fn discover_without_file_uses_defaults() {
        let tmp = assert_fs::TempDir::new().unwrap();
        assert_eq!(
            BenchConfig::discover(tmp.path(), None).unwrap(),
            BenchConfig::default()
        );
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let err = BenchConfig::discover(tmp.path(), Some(&tmp.path().join("nope.toml")))
            .unwrap_err();
        assert!(matches!(err, BenchError::ConfigReadError { .. }));
    }

    #[test]
    fn malformed_file_names_the_path() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "iterations = \"many\"").unwrap();
        let err = BenchConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE_NAME), "{err}");
    }

    #[test]
    fn validation_rejects_uneven_trim() {
        let config = BenchConfig {
            iterations: 7,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BenchError::UnevenTrim { .. })
        ));
    }

    #[test]
    fn validation_rejects_path_like_binary_name() {
        let config = BenchConfig {
            binary_name: "target/riff".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BenchError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn relative_cache_dir_lives_in_the_repo() {
        let config = BenchConfig::default();
        assert_eq!(
            config.cache_dir_in(Path::new("/src/riff")),
            PathBuf::from("/src/riff/.benchmark-binaries")
        );

        let config = BenchConfig {
            cache_dir: PathBuf::from("/var/cache/riff"),
            ..Default::default()
        };
        assert_eq!(
            config.cache_dir_in(Path::new("/src/riff")),
            PathBuf::from("/var/cache/riff")
        );
    }
}
