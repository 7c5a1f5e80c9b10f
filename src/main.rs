use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{ArgAction, Parser};
use tracing::info;

use riff_bench::build::{CargoBuilder, WarningPolicy};
use riff_bench::cache::BinaryCache;
use riff_bench::config::BenchConfig;
use riff_bench::corpus::Corpus;
use riff_bench::display;
use riff_bench::logging;
use riff_bench::timer::Timer;
use riff_bench::types::OutputFormat;
use riff_bench::vcs::{GitRepo, Vcs};
use riff_bench::versions::select_versions;

#[derive(Parser)]
#[command(
    name = "riff-bench",
    version,
    about = "Time recent riff releases, the latest commit and the working tree on the same input"
)]
struct Cli {
    /// Repository to benchmark
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Config file (default: <repo>/benchmark.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where built binaries are kept between runs
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Measured runs per binary
    #[arg(short = 'n', long)]
    iterations: Option<u32>,

    /// Percentage of samples kept after trimming both ends
    #[arg(short, long)]
    confidence: Option<u32>,

    /// Untimed runs before measuring
    #[arg(short, long)]
    warmup: Option<u32>,

    /// Number of newest releases to benchmark
    #[arg(short, long)]
    keep_releases: Option<usize>,

    /// Reference binary timed last
    #[arg(long)]
    baseline: Option<PathBuf>,

    /// Branch whose history is used as input
    #[arg(long)]
    branch: Option<String>,

    /// How to get old snapshots past #![deny(warnings)]
    #[arg(long, value_enum)]
    warnings: Option<WarningPolicy>,

    /// Use this file as input instead of the branch history
    #[arg(long, conflicts_with = "synthetic_tokens")]
    corpus: Option<PathBuf>,

    /// Use a generated all-mismatch hunk of this many tokens as input
    #[arg(long)]
    synthetic_tokens: Option<usize>,

    /// Only time what is already in the cache
    #[arg(long)]
    no_build: bool,

    #[arg(long, default_value = "text")]
    format: OutputFormat,

    #[arg(long)]
    json: bool,

    /// More diagnostics on stderr (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only warnings and errors on stderr
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn apply_to(&self, config: &mut BenchConfig) {
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = dir.clone();
        }
        if let Some(n) = self.iterations {
            config.iterations = n;
        }
        if let Some(pct) = self.confidence {
            config.confidence_percent = pct;
        }
        if let Some(n) = self.warmup {
            config.warmup_runs = n;
        }
        if let Some(k) = self.keep_releases {
            config.keep_releases = k;
        }
        if let Some(baseline) = &self.baseline {
            config.baseline = baseline.clone();
        }
        if let Some(branch) = &self.branch {
            config.branch = branch.clone();
        }
        if let Some(policy) = self.warnings {
            config.warnings = policy;
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet)?;

    let mut config = BenchConfig::discover(&cli.repo, cli.config.as_deref())?;
    cli.apply_to(&mut config);

    // Everything is validated before the first subprocess starts.
    let plan = config.validate()?;
    let timer = Timer::new(plan, config.warmup_runs);

    let cache = BinaryCache::open(config.cache_dir_in(&cli.repo), &config.binary_name)?;
    let git = GitRepo::new(&cli.repo);

    if !cli.no_build {
        let tags = git.tags()?;
        let head = git.short_head()?;
        let versions = select_versions(
            &tags,
            &config.release_filter(),
            config.keep_releases,
            &head,
        );
        info!(
            versions = %versions.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", "),
            "selected"
        );

        let mut builder = CargoBuilder::new(&git, &cli.repo, &config.binary_name)
            .with_policy(config.warnings, &config.source_file);
        cache.ensure_all(&versions, &mut builder)?;
    }

    let corpus = match (&cli.corpus, cli.synthetic_tokens) {
        (Some(path), _) => Corpus::from_file(path)?,
        (None, Some(tokens)) => Corpus::synthetic_mismatch(tokens)?,
        (None, None) => Corpus::from_history(&git, &config.branch)?,
    };

    let targets =
        display::targets_for_display(cache.artifacts()?, config.keep_releases, &config.baseline);
    info!(
        targets = targets.len(),
        iterations = timer.plan().iterations(),
        trim = timer.plan().trim(),
        "benchmarking"
    );

    let format = if cli.json {
        OutputFormat::Json
    } else {
        cli.format
    };
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    display::report(&targets, format, &mut out, |target| {
        timer.measure(&target.path, &corpus)
    })?;

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        process::exit(1);
    }
}
