//! Activity signal scanning and promotion.
//!
//! Three sources feed the heatmap: the editor's persisted IDE state, editor
//! session files, and a modification-time scan of each project root. The
//! editor sources are free text; any string starting with the workspace root
//! counts as a reference.

use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;
use workspace_mcp_core::heatmap::{build_heatmap, Heatmap, SignalBatch, SignalSource};
use workspace_mcp_core::models::JobReason;

use crate::config::ActivityConfig;
use crate::scheduler::Scheduler;
use crate::workspace::Workspace;

pub struct ActivityScanner {
    workspace: Arc<Workspace>,
    config: ActivityConfig,
    path_pattern: Option<Regex>,
}

impl ActivityScanner {
    pub fn new(workspace: Arc<Workspace>, config: ActivityConfig) -> Self {
        let root = workspace.root().to_string_lossy().into_owned();
        let path_pattern = Regex::new(&format!(r#"{}[^"\s]*"#, regex::escape(&root)))
            .map_err(|e| tracing::warn!(error = %e, "activity path pattern rejected"))
            .ok();
        Self {
            workspace,
            config,
            path_pattern,
        }
    }

    fn editor_state_path(&self) -> Option<PathBuf> {
        self.config
            .editor_state_path
            .clone()
            .or_else(|| home_dir().map(|h| h.join(".cursor/ide_state.json")))
    }

    fn sessions_dir(&self) -> Option<PathBuf> {
        self.config
            .sessions_dir
            .clone()
            .or_else(|| home_dir().map(|h| h.join(".cursor-sessions")))
    }

    fn cutoff(&self) -> SystemTime {
        let lookback = Duration::from_secs(self.config.lookback_days.saturating_mul(86_400));
        SystemTime::now()
            .checked_sub(lookback)
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }

    /// Workspace paths mentioned in `text`, existing or not.
    pub fn extract_paths(&self, text: &str) -> Vec<PathBuf> {
        let Some(re) = &self.path_pattern else {
            return Vec::new();
        };
        re.find_iter(text)
            .map(|m| PathBuf::from(m.as_str().trim_end_matches(['\'', ',', ')', ']', '}'])))
            .collect()
    }

    fn editor_state_signals(&self) -> Vec<PathBuf> {
        let Some(path) = self.editor_state_path() else {
            return Vec::new();
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => self.extract_paths(&text),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "no editor state");
                Vec::new()
            }
        }
    }

    fn session_signals(&self) -> Vec<PathBuf> {
        let Some(dir) = self.sessions_dir() else {
            return Vec::new();
        };
        let cutoff = self.cutoff();
        let mut out = Vec::new();
        for entry in WalkDir::new(&dir)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .take(self.config.max_scan_entries)
        {
            let recent = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(|t| t >= cutoff)
                .unwrap_or(false);
            if !recent {
                continue;
            }
            if let Ok(text) = std::fs::read_to_string(entry.path()) {
                out.extend(self.extract_paths(&text));
            }
        }
        out
    }

    /// Directories of recently modified files, one entry per file. Each root
    /// contributes at most `max_scan_entries` recent files.
    fn mtime_signals(&self) -> Vec<PathBuf> {
        let cutoff = self.cutoff();
        let max_depth = self.config.promote.depth_limit + 2;
        let mut out = Vec::new();
        for root in self.workspace.roots() {
            let walker = WalkDir::new(root)
                .min_depth(1)
                .max_depth(max_depth)
                .into_iter()
                .filter_entry(|e| !self.workspace.is_ignored(e.path()));
            let mut recent = 0usize;
            for entry in walker.filter_map(|e| e.ok()) {
                if recent >= self.config.max_scan_entries {
                    break;
                }
                if !entry.file_type().is_file() {
                    continue;
                }
                let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
                if !modified.map(|t| t >= cutoff).unwrap_or(false) {
                    continue;
                }
                if let Some(parent) = entry.path().parent() {
                    recent += 1;
                    out.push(parent.to_path_buf());
                }
            }
        }
        out
    }

    pub fn collect(&self) -> Vec<SignalBatch> {
        let sources = &self.config.sources;
        let weights = &self.config.weights;
        let mut batches = Vec::new();
        if sources.editor_state {
            batches.push(SignalBatch {
                source: SignalSource::EditorState,
                weight: weights.editor_state,
                paths: self.editor_state_signals(),
            });
        }
        if sources.editor_sessions {
            batches.push(SignalBatch {
                source: SignalSource::EditorSessions,
                weight: weights.editor_sessions,
                paths: self.session_signals(),
            });
        }
        if sources.fs_mtime {
            batches.push(SignalBatch {
                source: SignalSource::FsMtime,
                weight: weights.fs_mtime,
                paths: self.mtime_signals(),
            });
        }
        batches
    }

    pub fn build_heatmap(&self) -> Heatmap {
        let batches = self.collect();
        build_heatmap(
            self.workspace.roots(),
            self.config.promote.depth_limit,
            &batches,
        )
    }

    /// Enqueue promotion jobs from a fresh heatmap, then pump. Returns the
    /// number of jobs actually added.
    pub fn schedule_promotions(&self, scheduler: &Arc<Scheduler>) -> usize {
        let heatmap = self.build_heatmap();
        self.promote_from(&heatmap, scheduler)
    }

    pub fn promote_from(&self, heatmap: &Heatmap, scheduler: &Arc<Scheduler>) -> usize {
        let promote = &self.config.promote;
        let buckets = heatmap.promotions(
            self.workspace.roots(),
            promote.min_score,
            promote.max_per_root,
        );
        let added = buckets
            .into_iter()
            .filter(|b| scheduler.enqueue(b.clone(), JobReason::Promote, None))
            .count();
        tracing::info!(buckets = heatmap.len(), promoted = added, "promotion cycle");
        scheduler.pump();
        added
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

/// Run a promotion cycle every `interval` until the task is dropped. The
/// first cycle runs immediately.
pub async fn run_promotions(
    scanner: Arc<ActivityScanner>,
    scheduler: Arc<Scheduler>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let scan = Arc::clone(&scanner);
        match tokio::task::spawn_blocking(move || scan.build_heatmap()).await {
            Ok(heatmap) => {
                scanner.promote_from(&heatmap, &scheduler);
            }
            Err(e) => tracing::warn!(error = %e, "promotion scan failed"),
        }
    }
}
