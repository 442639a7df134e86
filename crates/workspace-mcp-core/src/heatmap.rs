//! Activity heatmap and promotion selection.
//!
//! Signal sources report absolute paths. Each path is mapped to its deepest
//! containing project root, truncated to `depth` segments below that root
//! (the bucket), and credited with the source's weight. The heatmap is
//! rebuilt from scratch on each promotion cycle.
//!
//! Buckets are kept in a `BTreeMap` so iteration order, and therefore every
//! derived promotion list, is a pure function of the inputs.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Identifies where an activity signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Paths referenced in the editor's persisted IDE state.
    EditorState,
    /// Paths referenced in editor session files.
    EditorSessions,
    /// Files modified inside the lookback window.
    FsMtime,
}

/// All observations from one source in one cycle.
///
/// Every entry in `paths` is one occurrence and contributes `weight` once,
/// so the mtime source scores `weight × count` for a bucket.
#[derive(Debug, Clone)]
pub struct SignalBatch {
    pub source: SignalSource,
    pub weight: f64,
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Heatmap {
    scores: BTreeMap<PathBuf, f64>,
}

impl Heatmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate `amount` into `bucket`. Negative or non-finite amounts are ignored.
    pub fn add(&mut self, bucket: PathBuf, amount: f64) {
        if !amount.is_finite() || amount <= 0.0 {
            return;
        }
        *self.scores.entry(bucket).or_insert(0.0) += amount;
    }

    pub fn score(&self, bucket: &Path) -> f64 {
        self.scores.get(bucket).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, f64)> {
        self.scores.iter().map(|(k, v)| (k, *v))
    }

    /// Buckets to promote under each root.
    ///
    /// Candidates lie strictly below the root and score at least
    /// `min_score`. Each root contributes its top `max_per_root` buckets by
    /// descending score, ties broken by path. Roots are visited in the order
    /// given.
    pub fn promotions(&self, roots: &[PathBuf], min_score: f64, max_per_root: usize) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for root in roots {
            let mut candidates: Vec<(&PathBuf, f64)> = self
                .scores
                .iter()
                .filter(|(bucket, score)| {
                    bucket.as_path() != root.as_path() && bucket.starts_with(root) && **score >= min_score
                })
                .map(|(b, s)| (b, *s))
                .collect();
            candidates.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(b.0))
            });
            out.extend(
                candidates
                    .into_iter()
                    .take(max_per_root)
                    .map(|(b, _)| b.clone()),
            );
        }
        out
    }
}

/// Truncate `path` to at most `depth` normal segments below `root`.
///
/// Returns `None` when `path` is not under `root`. A path equal to the root
/// maps to the root itself.
pub fn bucket_for(path: &Path, root: &Path, depth: usize) -> Option<PathBuf> {
    let rel = path.strip_prefix(root).ok()?;
    let mut bucket = root.to_path_buf();
    for seg in rel
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .take(depth)
    {
        bucket.push(seg);
    }
    Some(bucket)
}

/// Deepest root containing `path`.
pub fn owning_root<'a>(path: &Path, roots: &'a [PathBuf]) -> Option<&'a PathBuf> {
    roots
        .iter()
        .filter(|r| path.starts_with(r))
        .max_by_key(|r| r.components().count())
}

/// Fold signal batches into a heatmap. Paths outside every root are dropped.
pub fn build_heatmap(roots: &[PathBuf], depth: usize, batches: &[SignalBatch]) -> Heatmap {
    let mut map = Heatmap::new();
    for batch in batches {
        for path in &batch.paths {
            let Some(root) = owning_root(path, roots) else {
                continue;
            };
            if let Some(bucket) = bucket_for(path, root, depth) {
                map.add(bucket, batch.weight);
            }
        }
    }
    map
}
