use std::cmp::Ordering;

use crate::types::VersionId;

/// True for tags like `2`, `2.3` and `2.3.1`: dot-separated runs of ASCII digits.
///
/// Anything else (`PRERELEASE`, `v2.3`, `2.3-rc1`, `2..3`) belongs to some other
/// tag namespace and is not a release of the benchmarked binary.
pub fn is_release_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    // Significant digit count first, so longer numbers sort later without parsing.
    Number(usize, String),
    Text(String),
}

/// Sort key splitting a string into alternating text and numeric runs.
///
/// Numeric runs compare by value, text runs compare bytewise, and a numeric run
/// sorts before a text run at the same position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct NaturalKey(Vec<Segment>);

impl NaturalKey {
    pub fn new(s: &str) -> Self {
        let mut segments = Vec::new();
        let mut run = String::new();
        let mut in_digits = false;

        for c in s.chars() {
            let is_digit = c.is_ascii_digit();
            if !run.is_empty() && is_digit != in_digits {
                segments.push(Self::segment(std::mem::take(&mut run), in_digits));
            }
            in_digits = is_digit;
            run.push(c);
        }
        if !run.is_empty() {
            segments.push(Self::segment(run, in_digits));
        }

        NaturalKey(segments)
    }

    fn segment(run: String, digits: bool) -> Segment {
        if digits {
            let significant = run.trim_start_matches('0').to_string();
            Segment::Number(significant.len(), significant)
        } else {
            Segment::Text(run)
        }
    }
}

/// Natural ordering: `2.9` < `2.10` < `10.0`. Falls back to plain string
/// comparison so that `2.01` and `2.1` still have a stable order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    NaturalKey::new(a)
        .cmp(&NaturalKey::new(b))
        .then_with(|| a.cmp(b))
}

/// Decides which release tags are worth benchmarking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFilter {
    /// Major version numbers to skip entirely. Compared numerically against the
    /// first tag segment, so excluding `1` keeps `10.0`.
    pub excluded_majors: Vec<u64>,
}

impl Default for ReleaseFilter {
    fn default() -> Self {
        // 0.x and 1.x were tagged by the Ruby implementation.
        Self {
            excluded_majors: vec![0, 1],
        }
    }
}

impl ReleaseFilter {
    pub fn accepts(&self, tag: &str) -> bool {
        if !is_release_tag(tag) {
            return false;
        }
        let major = tag.split('.').next().and_then(|m| m.parse::<u64>().ok());
        match major {
            Some(major) => !self.excluded_majors.contains(&major),
            None => true,
        }
    }
}

/// All accepted release tags in natural order, oldest first.
pub fn candidate_releases<S: AsRef<str>>(tags: &[S], filter: &ReleaseFilter) -> Vec<String> {
    let mut releases: Vec<String> = tags
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| filter.accepts(t))
        .map(str::to_string)
        .collect();
    releases.sort_by(|a, b| natural_cmp(a, b));
    releases.dedup();
    releases
}

/// The versions to benchmark: the newest `keep_releases` releases in natural
/// order, then the latest commit, then the working tree.
pub fn select_versions<S: AsRef<str>>(
    tags: &[S],
    filter: &ReleaseFilter,
    keep_releases: usize,
    latest_commit: &str,
) -> Vec<VersionId> {
    let releases = candidate_releases(tags, filter);
    let skip = releases.len().saturating_sub(keep_releases);

    let mut selected: Vec<VersionId> = releases
        .into_iter()
        .skip(skip)
        .map(VersionId::Release)
        .collect();
    selected.push(VersionId::LatestCommit(latest_commit.to_string()));
    selected.push(VersionId::WorkingTree);
    selected
}
