//! Fuzzy project-name matching.
//!
//! Scores come from `nucleo-matcher` and are normalized against the score
//! the needle earns on itself, giving a similarity in `[0, 1]` where an
//! exact match is `1.0` and a non-match is `0.0`.

use nucleo_matcher::pattern::{AtomKind, CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Matcher, Utf32Str};
use serde::Serialize;
use std::path::PathBuf;

/// Tokens shorter than this are ignored when matching free text.
const MIN_TOKEN_LEN: usize = 3;

/// A project as seen by the matcher.
#[derive(Debug, Clone, Serialize)]
pub struct AppCandidate {
    pub name: String,
    /// Path relative to the workspace root.
    pub rel: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppMatch {
    pub name: String,
    pub rel: String,
    pub path: PathBuf,
    pub score: f64,
}

pub struct FuzzyMatcher {
    matcher: Matcher,
    buf: Vec<char>,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FuzzyMatcher {
    pub fn new() -> Self {
        Self {
            matcher: Matcher::new(nucleo_matcher::Config::DEFAULT),
            buf: Vec::new(),
        }
    }

    /// Similarity of `needle` to `haystack` in `[0, 1]`.
    pub fn similarity(&mut self, needle: &str, haystack: &str) -> f64 {
        let needle = needle.trim();
        if needle.is_empty() || haystack.is_empty() {
            return 0.0;
        }
        let pattern = Pattern::new(
            needle,
            CaseMatching::Smart,
            Normalization::Smart,
            AtomKind::Fuzzy,
        );
        let Some(best) = pattern.score(Utf32Str::new(needle, &mut self.buf), &mut self.matcher) else {
            return 0.0;
        };
        if best == 0 {
            return 0.0;
        }
        match pattern.score(Utf32Str::new(haystack, &mut self.buf), &mut self.matcher) {
            Some(score) => (score as f64 / best as f64).min(1.0),
            None => 0.0,
        }
    }

    /// Best similarity of `needle` against any of the candidate's fields.
    pub fn candidate_score(&mut self, needle: &str, candidate: &AppCandidate) -> f64 {
        let path = candidate.path.to_string_lossy();
        [candidate.name.as_str(), candidate.rel.as_str(), path.as_ref()]
            .iter()
            .map(|field| self.similarity(needle, field))
            .fold(0.0, f64::max)
    }

    /// Candidates scoring at least `threshold`, best first, at most `limit`.
    /// Ties are broken by relative path.
    pub fn rank(
        &mut self,
        needle: &str,
        candidates: &[AppCandidate],
        threshold: f64,
        limit: usize,
    ) -> Vec<AppMatch> {
        let mut scored: Vec<AppMatch> = candidates
            .iter()
            .filter_map(|c| {
                let score = self.candidate_score(needle, c);
                (score >= threshold && score > 0.0).then(|| AppMatch {
                    name: c.name.clone(),
                    rel: c.rel.clone(),
                    path: c.path.clone(),
                    score,
                })
            })
            .collect();
        sort_matches(&mut scored);
        scored.truncate(limit);
        scored
    }

    /// Best candidate for a free-text query, scored token by token.
    ///
    /// Each query word is matched separately and a candidate keeps its best
    /// word score, so "where is billing retry logic" still finds `billing`.
    pub fn best_for_text(
        &mut self,
        text: &str,
        candidates: &[AppCandidate],
        threshold: f64,
    ) -> Option<AppMatch> {
        let tokens: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
            .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
            .collect();
        let mut scored: Vec<AppMatch> = candidates
            .iter()
            .filter_map(|c| {
                let score = tokens
                    .iter()
                    .map(|t| self.candidate_score(t, c))
                    .fold(0.0, f64::max);
                (score >= threshold && score > 0.0).then(|| AppMatch {
                    name: c.name.clone(),
                    rel: c.rel.clone(),
                    path: c.path.clone(),
                    score,
                })
            })
            .collect();
        sort_matches(&mut scored);
        scored.into_iter().next()
    }
}

fn sort_matches(matches: &mut [AppMatch]) {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.rel.cmp(&b.rel))
    });
}
