use std::io::Write;
use std::path::Path;

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use crate::types::{BenchTarget, BinaryArtifact, Interval, Measurement, OutputFormat, VersionId};
use crate::versions::natural_cmp;

pub const BANNER: &str = "=== BENCHMARKING ===";

/// Put cached artifacts in report order.
///
/// Natural name order, keeping only the newest `keep_releases` releases and a
/// single latest-commit build, with the working-tree build moved to the end.
pub fn order_for_display(mut artifacts: Vec<BinaryArtifact>, keep_releases: usize) -> Vec<BinaryArtifact> {
    artifacts.sort_by(|a, b| natural_cmp(&a.label(), &b.label()));

    // Leftovers from earlier commits survive when nothing was built this session.
    let last_commit = artifacts
        .iter()
        .rposition(|a| matches!(a.id, VersionId::LatestCommit(_)));
    let mut index = 0;
    artifacts.retain(|a| {
        let keep = !matches!(a.id, VersionId::LatestCommit(_)) || Some(index) == last_commit;
        index += 1;
        keep
    });

    let releases = artifacts
        .iter()
        .filter(|a| matches!(a.id, VersionId::Release(_)))
        .count();
    let mut to_skip = releases.saturating_sub(keep_releases);
    artifacts.retain(|a| {
        if to_skip > 0 && matches!(a.id, VersionId::Release(_)) {
            to_skip -= 1;
            return false;
        }
        true
    });

    // Stable, so everything else keeps its natural order.
    artifacts.sort_by_key(|a| a.id == VersionId::WorkingTree);
    artifacts
}

/// Report order followed by the baseline, which always comes last.
pub fn targets_for_display(
    artifacts: Vec<BinaryArtifact>,
    keep_releases: usize,
    baseline: &Path,
) -> Vec<BenchTarget> {
    let mut targets: Vec<BenchTarget> = order_for_display(artifacts, keep_releases)
        .iter()
        .map(BenchTarget::from)
        .collect();
    targets.push(BenchTarget {
        label: baseline.display().to_string(),
        path: baseline.to_path_buf(),
    });
    targets
}

/// `12.3 ± 0.4 ms: riff-2.3`
pub fn format_line(interval: &Interval, label: &str) -> String {
    let timing = format!(
        "{:.1} ± {:.1} ms",
        interval.midpoint_ms(),
        interval.half_width_ms()
    );
    format!(
        "{}: {}",
        timing.if_supports_color(Stream::Stdout, |s| s.yellow()),
        label.if_supports_color(Stream::Stdout, |s| s.green())
    )
}

#[derive(Serialize)]
struct JsonMeasurement<'a> {
    label: &'a str,
    path: String,
    midpoint_ms: f64,
    half_width_ms: f64,
    low_ms: f64,
    high_ms: f64,
}

pub fn format_json(measurements: &[Measurement]) -> String {
    let rows: Vec<JsonMeasurement> = measurements
        .iter()
        .map(|m| JsonMeasurement {
            label: &m.target.label,
            path: m.target.path.to_string_lossy().into_owned(),
            midpoint_ms: m.interval.midpoint_ms(),
            half_width_ms: m.interval.half_width_ms(),
            low_ms: m.interval.low_ms,
            high_ms: m.interval.high_ms,
        })
        .collect();

    serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
}

/// Measure `targets` one at a time, in order, writing the report to `out`.
///
/// Text lines are written as each measurement finishes; JSON is written once
/// at the end. The first failed measurement aborts the report.
pub fn report<W, F>(
    targets: &[BenchTarget],
    format: OutputFormat,
    out: &mut W,
    mut measure: F,
) -> Result<Vec<Measurement>>
where
    W: Write,
    F: FnMut(&BenchTarget) -> Result<Interval>,
{
    if format == OutputFormat::Text {
        writeln!(out)?;
        writeln!(
            out,
            "{}",
            BANNER.if_supports_color(Stream::Stdout, |s| s.dimmed())
        )?;
        out.flush()?;
    }

    let mut measurements = Vec::with_capacity(targets.len());
    for target in targets {
        let interval = measure(target)?;
        if format == OutputFormat::Text {
            writeln!(out, "{}", format_line(&interval, &target.label))?;
            out.flush()?;
        }
        measurements.push(Measurement {
            target: target.clone(),
            interval,
        });
    }

    if format == OutputFormat::Json {
        writeln!(out, "{}", format_json(&measurements))?;
    }
    Ok(measurements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn artifact(name: &str) -> BinaryArtifact {
        let suffix = name.strip_prefix("riff-").unwrap();
        BinaryArtifact {
            id: VersionId::from_artifact_suffix(suffix).unwrap(),
            path: PathBuf::from("/cache").join(name),
        }
    }

    fn labels(targets: &[BenchTarget]) -> Vec<&str> {
        targets.iter().map(|t| t.label.as_str()).collect()
    }

    fn interval(low_ms: f64, high_ms: f64) -> Interval {
        Interval { low_ms, high_ms }
    }

    #[test]
    fn current_build_then_baseline_come_last() {
        let artifacts = vec![
            artifact("riff-current"),
            artifact("riff-2.3"),
            artifact("riff-latest-commit-ab12"),
            artifact("riff-2.1"),
        ];
        let targets = targets_for_display(artifacts, 4, Path::new("/bin/cat"));
        assert_eq!(
            labels(&targets),
            vec![
                "riff-2.1",
                "riff-2.3",
                "riff-latest-commit-ab12",
                "riff-current",
                "/bin/cat"
            ]
        );
    }

    #[test]
    fn releases_sort_naturally() {
        let artifacts = vec![
            artifact("riff-2.10"),
            artifact("riff-10.0"),
            artifact("riff-2.9"),
        ];
        let ordered = order_for_display(artifacts, 4);
        let names: Vec<String> = ordered.iter().map(|a| a.label()).collect();
        assert_eq!(names, vec!["riff-2.9", "riff-2.10", "riff-10.0"]);
    }

    #[test]
    fn only_newest_releases_are_shown() {
        let artifacts = vec![
            artifact("riff-2.1"),
            artifact("riff-2.2"),
            artifact("riff-2.3"),
            artifact("riff-2.10"),
            artifact("riff-2.9"),
            artifact("riff-latest-commit-ab12"),
            artifact("riff-current"),
        ];
        let targets = targets_for_display(artifacts, 2, Path::new("/bin/cat"));
        assert_eq!(
            labels(&targets),
            vec![
                "riff-2.9",
                "riff-2.10",
                "riff-latest-commit-ab12",
                "riff-current",
                "/bin/cat"
            ]
        );
    }

    #[test]
    fn only_one_latest_commit_is_shown() {
        let artifacts = vec![
            artifact("riff-latest-commit-0dd1"),
            artifact("riff-2.3"),
            artifact("riff-latest-commit-ab12"),
            artifact("riff-current"),
            artifact("riff-latest-commit-0dd2"),
        ];
        let targets = targets_for_display(artifacts, 4, Path::new("/bin/cat"));
        assert_eq!(
            labels(&targets),
            vec![
                "riff-2.3",
                "riff-latest-commit-ab12",
                "riff-current",
                "/bin/cat"
            ]
        );
    }

    #[test]
    fn empty_cache_still_reports_baseline() {
        let targets = targets_for_display(vec![], 4, Path::new("/bin/cat"));
        assert_eq!(labels(&targets), vec!["/bin/cat"]);
    }

    #[test]
    fn line_format() {
        let line = format_line(&interval(10.0, 12.0), "riff-2.3");
        assert!(line.contains("11.0 ± 1.0 ms"), "{line}");
        assert!(line.contains(": "), "{line}");
        assert!(line.contains("riff-2.3"), "{line}");
    }

    #[test]
    fn text_report_streams_lines_in_order() {
        let targets = targets_for_display(
            vec![artifact("riff-current"), artifact("riff-2.3")],
            4,
            Path::new("/bin/cat"),
        );
        let mut out = Vec::new();
        let mut measured = Vec::new();

        let results = report(&targets, OutputFormat::Text, &mut out, |t| {
            measured.push(t.label.clone());
            Ok(interval(1.0, 3.0))
        })
        .unwrap();

        assert_eq!(measured, vec!["riff-2.3", "riff-current", "/bin/cat"]);
        assert_eq!(results.len(), 3);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].is_empty());
        assert!(lines[1].contains(BANNER));
        for (line, label) in lines[2..].iter().zip(["riff-2.3", "riff-current", "/bin/cat"]) {
            assert!(line.contains("2.0 ± 1.0 ms"), "{line}");
            assert!(line.contains(label), "{line}");
        }
    }

    #[test]
    fn failed_measurement_aborts_the_report() {
        let targets = targets_for_display(
            vec![artifact("riff-2.3"), artifact("riff-2.4")],
            4,
            Path::new("/bin/cat"),
        );
        let mut out = Vec::new();
        let mut calls = 0;

        let result = report(&targets, OutputFormat::Text, &mut out, |_| {
            calls += 1;
            if calls == 2 {
                anyhow::bail!("riff-2.4 crashed");
            }
            Ok(interval(1.0, 1.0))
        });

        assert!(result.is_err());
        assert_eq!(calls, 2);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("riff-2.3"));
        assert!(!text.contains("/bin/cat"));
    }

    #[test]
    fn json_report() {
        let targets = targets_for_display(vec![artifact("riff-2.3")], 4, Path::new("/bin/cat"));
        let mut out = Vec::new();

        report(&targets, OutputFormat::Json, &mut out, |_| {
            Ok(interval(10.0, 14.0))
        })
        .unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let rows = parsed.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["label"], "riff-2.3");
        assert_eq!(rows[0]["path"], "/cache/riff-2.3");
        assert_eq!(rows[0]["midpoint_ms"], 12.0);
        assert_eq!(rows[0]["half_width_ms"], 2.0);
        assert_eq!(rows[0]["low_ms"], 10.0);
        assert_eq!(rows[0]["high_ms"], 14.0);
        assert_eq!(rows[1]["label"], "/bin/cat");
    }

    #[test]
    fn json_empty() {
        assert_eq!(format_json(&[]), "[]");
    }
}
