//! Retrieval: target resolution, lazy per-project lexical indexes and the
//! coverage-backed search response.
//!
//! Indexes are built on first query and kept for the life of the process.
//! They go stale when files change; [`Retrieval::invalidate`] drops one so
//! the next query rebuilds it.

use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use workspace_mcp_core::embedding::Embedder;
use workspace_mcp_core::fuzzy::FuzzyMatcher;
use workspace_mcp_core::lexical::{IndexDoc, LexicalIndex};
use workspace_mcp_core::models::{RankedResult, SearchMode, SearchResponse};
use workspace_mcp_core::search::{
    backfill_coverage, max_score, preview_of, rank, Coverage, RankOptions,
};

use crate::cache::CapsuleCache;
use crate::capsule::heuristic_capsule;
use crate::config::SearchConfig;
use crate::error::ToolError;
use crate::owners::CodeOwners;
use crate::telemetry::Telemetry;
use crate::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    /// Already passed through the workspace guard.
    pub app: Option<PathBuf>,
    pub top_k: usize,
    pub min_score: f64,
    pub mode: SearchMode,
}

pub struct Retrieval {
    workspace: Arc<Workspace>,
    owners: Arc<CodeOwners>,
    cache: Arc<CapsuleCache>,
    embedder: Arc<dyn Embedder>,
    telemetry: Arc<Telemetry>,
    config: SearchConfig,
    indexes: RwLock<HashMap<PathBuf, Arc<LexicalIndex>>>,
}

impl Retrieval {
    pub fn new(
        workspace: Arc<Workspace>,
        owners: Arc<CodeOwners>,
        cache: Arc<CapsuleCache>,
        embedder: Arc<dyn Embedder>,
        telemetry: Arc<Telemetry>,
        config: SearchConfig,
    ) -> Self {
        Self {
            workspace,
            owners,
            cache,
            embedder,
            telemetry,
            config,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Explicit app, else the best fuzzy match for the query, else any
    /// project with a capsule, else the first discovered root.
    pub fn resolve_target(&self, query: &str, explicit: Option<&Path>) -> Result<PathBuf, ToolError> {
        if let Some(app) = explicit {
            return Ok(app.to_path_buf());
        }
        let candidates = self.workspace.app_candidates();
        if let Some(hit) =
            FuzzyMatcher::new().best_for_text(query, &candidates, self.config.app_match_threshold)
        {
            return Ok(hit.path);
        }
        if let Some(capsule) = self.cache.list().first() {
            return Ok(capsule.project_root.clone());
        }
        self.workspace
            .roots()
            .first()
            .cloned()
            .ok_or(ToolError::NoApps)
    }

    /// The cached index for `root`, building it on first use.
    pub async fn index_for(&self, root: &Path) -> Result<Arc<LexicalIndex>> {
        if let Some(index) = self.read_indexes().get(root) {
            return Ok(Arc::clone(index));
        }

        let workspace = Arc::clone(&self.workspace);
        let project = root.to_path_buf();
        let index = tokio::task::spawn_blocking(move || build_index(&workspace, &project)).await?;
        tracing::debug!(app = %root.display(), docs = index.len(), "lexical index built");

        let index = Arc::new(index);
        let mut map = self.indexes.write().unwrap_or_else(|p| p.into_inner());
        let entry = map
            .entry(root.to_path_buf())
            .or_insert_with(|| Arc::clone(&index));
        Ok(Arc::clone(entry))
    }

    /// Drop the index for `root`. Returns whether one was cached.
    pub fn invalidate(&self, root: &Path) -> bool {
        let removed = self
            .indexes
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(root)
            .is_some();
        if removed {
            tracing::debug!(app = %root.display(), "lexical index invalidated");
        }
        removed
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let root = self.resolve_target(&request.query, request.app.as_deref())?;
        let index = self.index_for(&root).await?;

        let opts = RankOptions {
            mode: request.mode,
            top_k: request.top_k,
            semantic_limit: self.config.semantic_rerank_limit,
        };
        let ranked = rank(&index, &request.query, &opts, self.embedder.as_ref()).await;

        let mut items: Vec<RankedResult> = ranked
            .into_iter()
            .filter_map(|s| {
                let doc = index.doc(s.doc)?;
                let (preview, line_range) = preview_of(&doc.text, self.config.preview_lines);
                Some(RankedResult {
                    path: s.path,
                    score: s.fused,
                    lexical_score: s.lexical,
                    semantic_score: s.semantic,
                    preview,
                    line_range,
                    coverage_filled: false,
                })
            })
            .collect();

        let coverage = Coverage::of(&items, &root, self.workspace.classifier());
        if !coverage.is_complete() {
            let capsule = match self.cache.get(&root) {
                Some(c) => c,
                None => {
                    let workspace = Arc::clone(&self.workspace);
                    let owners = Arc::clone(&self.owners);
                    let project = root.clone();
                    Arc::new(
                        tokio::task::spawn_blocking(move || {
                            heuristic_capsule(&workspace, &owners, &project)
                        })
                        .await?,
                    )
                }
            };
            let added = backfill_coverage(
                &mut items,
                coverage,
                &capsule,
                self.config.preview_lines,
                |p| self.workspace.read_text(p),
            );
            if added > 0 {
                tracing::debug!(app = %root.display(), added, "coverage backfill");
            }
        }

        let best = max_score(&items);
        if best < request.min_score {
            self.telemetry.low_confidence(&request.query, &root, best);
        }

        Ok(SearchResponse {
            app: root,
            items,
            max_score: best,
        })
    }

    fn read_indexes(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<PathBuf, Arc<LexicalIndex>>> {
        self.indexes.read().unwrap_or_else(|p| p.into_inner())
    }
}

/// Unreadable and binary files are skipped.
fn build_index(workspace: &Workspace, root: &Path) -> LexicalIndex {
    let docs = workspace
        .code_files(root)
        .into_iter()
        .filter_map(|path| {
            let text = workspace.read_text(&path)?;
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            Some(IndexDoc { path, rel, text })
        })
        .collect();
    LexicalIndex::build(docs)
}
