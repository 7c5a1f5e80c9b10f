use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::debug;

use crate::corpus::Corpus;
use crate::errors::BenchError;
use crate::types::Interval;

/// How many sorted samples to drop from each end.
///
/// `((100 - confidence) * iterations) / 200` samples go from each side, and that
/// division has to be exact: a plan that would need rounding is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimPlan {
    iterations: u32,
    trim: u32,
}

impl TrimPlan {
    pub fn new(iterations: u32, confidence_percent: u32) -> Result<Self, BenchError> {
        if iterations == 0 {
            return Err(BenchError::InvalidConfig {
                detail: "iterations must be at least 1".to_string(),
            });
        }
        if confidence_percent == 0 || confidence_percent > 100 {
            return Err(BenchError::InvalidConfig {
                detail: format!("confidence must be 1-100%, got {confidence_percent}%"),
            });
        }

        let dropped = u64::from(100 - confidence_percent) * u64::from(iterations);
        if dropped % 200 != 0 {
            return Err(BenchError::UnevenTrim {
                iterations,
                confidence_percent,
            });
        }

        Ok(Self {
            iterations,
            // Below iterations / 2 since confidence_percent >= 1.
            trim: (dropped / 200) as u32,
        })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Samples discarded from each end.
    pub fn trim(&self) -> u32 {
        self.trim
    }

    /// Sort `samples` and return the interval spanned by the survivors of the trim.
    ///
    /// Panics if `samples` does not hold exactly [`TrimPlan::iterations`] entries.
    pub fn interval(&self, samples: &mut [Duration]) -> Interval {
        assert_eq!(
            samples.len(),
            self.iterations as usize,
            "sample count must match the trim plan"
        );
        samples.sort_unstable();

        let trim = self.trim as usize;
        let low = samples[trim];
        let high = samples[samples.len() - trim - 1];
        Interval {
            low_ms: millis(low),
            high_ms: millis(high),
        }
    }
}

fn millis(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

/// Times whole-process runs of a binary reading the corpus on stdin.
#[derive(Debug, Clone)]
pub struct Timer {
    plan: TrimPlan,
    warmup_runs: u32,
}

impl Timer {
    pub fn new(plan: TrimPlan, warmup_runs: u32) -> Self {
        Self { plan, warmup_runs }
    }

    pub fn plan(&self) -> &TrimPlan {
        &self.plan
    }

    /// Warm up, then take [`TrimPlan::iterations`] samples and trim them.
    ///
    /// Any run exiting non-zero aborts the measurement.
    pub fn measure(&self, binary: &Path, corpus: &Corpus) -> Result<Interval> {
        for _ in 0..self.warmup_runs {
            run_once(binary, corpus)?;
        }

        let mut samples = Vec::with_capacity(self.plan.iterations() as usize);
        for _ in 0..self.plan.iterations() {
            samples.push(run_once(binary, corpus)?);
        }

        let interval = self.plan.interval(&mut samples);
        debug!(
            binary = %binary.display(),
            min_ms = millis(samples[0]),
            max_ms = millis(samples[samples.len() - 1]),
            "measured"
        );
        Ok(interval)
    }
}

/// One run from spawn through exit, with stdout discarded.
fn run_once(binary: &Path, corpus: &Corpus) -> Result<Duration> {
    let stdin = corpus.open()?;

    let start = Instant::now();
    let status = Command::new(binary)
        .stdin(stdin)
        .stdout(Stdio::null())
        .status()
        .map_err(|source| BenchError::SpawnFailed {
            command: binary.display().to_string(),
            source,
        })?;
    let elapsed = start.elapsed();

    if !status.success() {
        return Err(BenchError::BinaryFailed {
            binary: binary.to_path_buf(),
            status,
        }
        .into());
    }
    Ok(elapsed)
}
