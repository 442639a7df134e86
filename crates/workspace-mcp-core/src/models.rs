//! Shared data types for jobs, capsules and ranked results.
//!
//! These are serialized as-is in tool responses and in the on-disk
//! capsule cache, so field names are part of the wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Scheduling tier for a job. Lower tiers are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Project lives under a configured priority path, or was promoted explicitly.
    High = 1,
    Normal = 2,
}

impl Priority {
    pub fn as_number(self) -> u8 {
        self as u8
    }
}

/// Why a job was enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobReason {
    Startup,
    Watch,
    Promote,
    /// Requested directly through a tool call.
    Manual,
}

impl std::fmt::Display for JobReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobReason::Startup => "startup",
            JobReason::Watch => "watch",
            JobReason::Promote => "promote",
            JobReason::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// A pending request to (re)build one project's capsule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub project_root: PathBuf,
    pub priority: Priority,
    pub reason: JobReason,
    pub enqueued_at: DateTime<Utc>,
    /// Monotonic insertion sequence; breaks ties between equal timestamps.
    #[serde(skip)]
    pub seq: u64,
}

/// Resource budget handed to the summarizer for one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub max_files: usize,
    pub max_bytes: usize,
    pub chunk_tokens: usize,
    pub timeout_ms: u64,
}

/// Where a capsule's purpose text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CapsuleSource {
    /// External summarizer capability.
    Summarizer,
    /// Local heuristics over files already on disk.
    #[default]
    Heuristic,
}

/// The durable summary record for one project.
///
/// Always replaced as a whole; nothing mutates a published capsule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capsule {
    pub project_root: PathBuf,
    pub name: String,
    pub purpose: String,
    pub role: String,
    pub confidence: f64,
    #[serde(default)]
    pub evidence_paths: Vec<PathBuf>,
    #[serde(default)]
    pub entrypoints: Vec<PathBuf>,
    #[serde(default)]
    pub key_modules: Vec<PathBuf>,
    #[serde(default)]
    pub tests: Vec<PathBuf>,
    #[serde(default)]
    pub docs: Vec<PathBuf>,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub source: CapsuleSource,
    pub generated_at: DateTime<Utc>,
}

/// Which retrieval signals a search uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Hybrid,
    LexicalOnly,
    SemanticOnly,
}

impl SearchMode {
    /// Parse a user-supplied mode name. `bm25` and `keyword` are accepted
    /// as aliases for lexical-only ranking.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hybrid" => Some(SearchMode::Hybrid),
            "lexical" | "lexical_only" | "bm25" | "keyword" => Some(SearchMode::LexicalOnly),
            "semantic" | "semantic_only" => Some(SearchMode::SemanticOnly),
            _ => None,
        }
    }
}

/// Inclusive 1-based line range of a preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

/// One search hit, ephemeral per query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub path: PathBuf,
    pub score: f64,
    pub lexical_score: f64,
    pub semantic_score: f64,
    pub preview: String,
    pub line_range: LineRange,
    /// Synthetic entry appended by the coverage backfill.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub coverage_filled: bool,
}

/// The response envelope for a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub app: PathBuf,
    pub items: Vec<RankedResult>,
    pub max_score: f64,
}
