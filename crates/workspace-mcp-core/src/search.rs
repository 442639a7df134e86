//! Hybrid lexical + semantic ranking with coverage backfill.
//!
//! The ranking pipeline operates on an already-built [`LexicalIndex`] and
//! an injected [`Embedder`]; loading files, resolving the target project and
//! telemetry are the caller's job.
//!
//! # Scoring
//!
//! 1. Run the lexical query; raw BM25 scores are divided by the best hit so
//!    the top lexical match scores `1.0`.
//! 2. Unless the mode is lexical-only, embed the query and the top
//!    `semantic_limit` candidates; the semantic score is the cosine
//!    similarity clamped to `[0, 1]`. Candidates past the limit keep a
//!    semantic score of `0`.
//! 3. Hybrid: `fused = 0.7 × semantic + 0.3 × lexical`.
//!    Semantic-only: `fused = semantic`. Lexical-only: `fused = lexical`.
//! 4. Sort by fused score (desc), then path (asc), and truncate to `top_k`.
//!
//! When the embedder is unavailable every semantic score is `0` and no
//! error is raised. Semantic-only ranking then falls back to lexical scores.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::classify::{PathCategory, PathClassifier};
use crate::embedding::{cosine_similarity, Embedder};
use crate::lexical::{LexicalHit, LexicalIndex};
use crate::models::{Capsule, LineRange, RankedResult, SearchMode};

pub const SEMANTIC_WEIGHT: f64 = 0.7;
pub const LEXICAL_WEIGHT: f64 = 0.3;
/// Default number of lexical hits that get a semantic re-rank.
pub const DEFAULT_SEMANTIC_LIMIT: usize = 50;
/// Score given to coverage-filled entries.
pub const COVERAGE_SCORE: f64 = 0.6;
/// Coverage fillers taken from the capsule per missing category.
pub const COVERAGE_PER_CATEGORY: usize = 3;
/// Characters of document text sent to the embedder.
pub const EMBED_TEXT_CHARS: usize = 2000;

/// Weighted combination of the two relevance signals.
pub fn fuse(lexical: f64, semantic: f64) -> f64 {
    SEMANTIC_WEIGHT * semantic + LEXICAL_WEIGHT * lexical
}

/// Scale raw scores by the maximum so the best hit is `1.0`.
///
/// Non-positive maxima yield all zeros.
pub fn normalize_scores(hits: &[LexicalHit]) -> Vec<f64> {
    let max = hits.iter().map(|h| h.score).fold(0.0f64, f64::max);
    hits.iter()
        .map(|h| if max > 0.0 { h.score / max } else { 0.0 })
        .collect()
}

#[derive(Debug, Clone)]
pub struct RankOptions {
    pub mode: SearchMode,
    pub top_k: usize,
    pub semantic_limit: usize,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            mode: SearchMode::Hybrid,
            top_k: 20,
            semantic_limit: DEFAULT_SEMANTIC_LIMIT,
        }
    }
}

/// One ranked document, referring into the index.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub doc: usize,
    pub path: PathBuf,
    pub lexical: f64,
    pub semantic: f64,
    pub fused: f64,
}

/// Rank `query` against `index`. See the module docs for the scoring rules.
pub async fn rank(
    index: &LexicalIndex,
    query: &str,
    opts: &RankOptions,
    embedder: &dyn Embedder,
) -> Vec<Scored> {
    let hits = index.search(query);
    if hits.is_empty() {
        return Vec::new();
    }
    let lexical = normalize_scores(&hits);
    let mut semantic = vec![0.0f64; hits.len()];

    let mut semantic_available = false;
    if opts.mode != SearchMode::LexicalOnly && embedder.is_enabled() {
        if let Ok(query_vec) = embedder.embed(query).await {
            semantic_available = true;
            for (slot, hit) in semantic.iter_mut().zip(&hits).take(opts.semantic_limit) {
                let Some(doc) = index.doc(hit.doc) else {
                    continue;
                };
                let text: String = doc.text.chars().take(EMBED_TEXT_CHARS).collect();
                if let Ok(doc_vec) = embedder.embed(&text).await {
                    *slot = (cosine_similarity(&query_vec, &doc_vec) as f64).clamp(0.0, 1.0);
                }
            }
        }
    }

    let mut scored: Vec<Scored> = hits
        .iter()
        .zip(lexical.iter().zip(semantic.iter()))
        .filter_map(|(hit, (&lex, &sem))| {
            let doc = index.doc(hit.doc)?;
            let fused = match opts.mode {
                SearchMode::LexicalOnly => lex,
                SearchMode::SemanticOnly if semantic_available => sem,
                SearchMode::SemanticOnly => lex,
                SearchMode::Hybrid => fuse(lex, sem),
            };
            Some(Scored {
                doc: hit.doc,
                path: doc.path.clone(),
                lexical: lex,
                semantic: sem,
                fused,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.fused
            .partial_cmp(&a.fused)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    scored.truncate(opts.top_k);
    scored
}

/// The first `lines` lines of `text` with their 1-based range.
pub fn preview_of(text: &str, lines: usize) -> (String, LineRange) {
    let head: Vec<&str> = text.lines().take(lines).collect();
    let end = head.len().max(1);
    (head.join("\n"), LineRange { start: 1, end })
}

/// Which orientation categories a result set already covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Coverage {
    pub entrypoint: bool,
    pub test: bool,
    pub core_source: bool,
}

impl Coverage {
    pub fn of(items: &[RankedResult], root: &Path, classifier: &PathClassifier) -> Self {
        let mut cov = Coverage::default();
        for item in items {
            let rel = item.path.strip_prefix(root).unwrap_or(&item.path);
            for cat in classifier.categories(rel) {
                match cat {
                    PathCategory::Entrypoint => cov.entrypoint = true,
                    PathCategory::Test => cov.test = true,
                    PathCategory::CoreSource => cov.core_source = true,
                }
            }
        }
        cov
    }

    pub fn is_complete(&self) -> bool {
        self.entrypoint && self.test && self.core_source
    }
}

/// Append coverage-filled entries for every category `coverage` lacks.
///
/// Fillers come from the capsule: entrypoints, tests and key modules, up
/// to [`COVERAGE_PER_CATEGORY`] each. `load` returns the preview text for a
/// path, or `None` if it cannot be read (such paths are skipped). Paths
/// already present are never duplicated. Returns the number added.
pub fn backfill_coverage<F>(
    items: &mut Vec<RankedResult>,
    coverage: Coverage,
    capsule: &Capsule,
    preview_lines: usize,
    mut load: F,
) -> usize
where
    F: FnMut(&Path) -> Option<String>,
{
    let mut fillers: Vec<&PathBuf> = Vec::new();
    if !coverage.entrypoint {
        fillers.extend(capsule.entrypoints.iter().take(COVERAGE_PER_CATEGORY));
    }
    if !coverage.test {
        fillers.extend(capsule.tests.iter().take(COVERAGE_PER_CATEGORY));
    }
    if !coverage.core_source {
        fillers.extend(capsule.key_modules.iter().take(COVERAGE_PER_CATEGORY));
    }

    let mut present: HashSet<PathBuf> = items.iter().map(|i| i.path.clone()).collect();
    let mut added = 0;
    for path in fillers {
        if present.contains(path) {
            continue;
        }
        let Some(text) = load(path) else {
            continue;
        };
        let (preview, line_range) = preview_of(&text, preview_lines);
        items.push(RankedResult {
            path: path.clone(),
            score: COVERAGE_SCORE,
            lexical_score: 0.0,
            semantic_score: 0.0,
            preview,
            line_range,
            coverage_filled: true,
        });
        present.insert(path.clone());
        added += 1;
    }
    added
}

/// Highest score in a result set, `0.0` when empty.
pub fn max_score(items: &[RankedResult]) -> f64 {
    items.iter().map(|i| i.score).fold(0.0, f64::max)
}
