use std::path::PathBuf;
use std::process::ExitStatus;

#[derive(thiserror::Error, Debug)]
pub enum BenchError {
    #[error(
        "Cannot trim {iterations} iterations to a {confidence_percent}% interval: \
         (100 - {confidence_percent}) * {iterations} must be divisible by 200"
    )]
    UnevenTrim {
        iterations: u32,
        confidence_percent: u32,
    },

    #[error("Invalid configuration: {detail}")]
    InvalidConfig { detail: String },

    #[error("Failed to read config file {path}: {source}")]
    ConfigReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {detail}")]
    ConfigParseError { path: PathBuf, detail: String },

    #[error("Failed to run '{command}': {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },

    #[error("'{command}' failed ({status})")]
    CommandFailed { command: String, status: ExitStatus },

    #[error("Building {version} failed ({status})")]
    BuildFailed { version: String, status: ExitStatus },

    #[error("Benchmarked binary {binary} failed ({status})")]
    BinaryFailed { binary: PathBuf, status: ExitStatus },

    #[error("Binary cache error at {path}: {source}")]
    CacheError {
        path: PathBuf,
        source: std::io::Error,
    },
}
