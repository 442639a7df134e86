//! Filesystem watcher feeding the debouncer.
//!
//! `notify` delivers events on its own thread; they are forwarded over a
//! tokio channel, mapped to the deepest containing project root and
//! debounced per root. When a root's timer fires it is enqueued with reason
//! `watch` and the scheduler is pumped.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use workspace_mcp_core::heatmap::owning_root;
use workspace_mcp_core::models::JobReason;

use crate::debounce::Debouncer;
use crate::scheduler::Scheduler;
use crate::search::Retrieval;
use crate::workspace::Workspace;

/// Keeps the watcher alive; dropping it stops watching.
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Project roots touched by `event`, excluding ignored paths.
pub fn roots_for_event(workspace: &Workspace, event: &Event) -> Vec<PathBuf> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return Vec::new();
    }
    let roots: BTreeSet<PathBuf> = event
        .paths
        .iter()
        .filter(|p| !workspace.is_ignored(p))
        .filter_map(|p| owning_root(p, workspace.roots()).cloned())
        .collect();
    roots.into_iter().collect()
}

pub fn spawn_watcher(
    workspace: Arc<Workspace>,
    scheduler: Arc<Scheduler>,
    retrieval: Arc<Retrieval>,
    debounce: Duration,
    invalidate_on_change: bool,
) -> Result<WatchHandle> {
    let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(move |event| {
        if tx.send(event).is_err() {
            tracing::debug!("watch event dropped because the channel is closed");
        }
    })
    .context("Failed to create file watcher")?;

    let mut watched = 0usize;
    for root in workspace.roots() {
        match watcher.watch(root, RecursiveMode::Recursive) {
            Ok(()) => watched += 1,
            Err(e) => tracing::warn!(root = %root.display(), error = %e, "cannot watch root"),
        }
    }
    tracing::info!(roots = watched, debounce_ms = debounce.as_millis() as u64, "file watcher started");

    let debouncer = Debouncer::new(debounce, move |root: PathBuf| {
        if invalidate_on_change {
            retrieval.invalidate(&root);
        }
        if scheduler.enqueue(root, JobReason::Watch, None) {
            scheduler.pump();
        }
    });

    let task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                Ok(event) => {
                    for root in roots_for_event(&workspace, &event) {
                        debouncer.notify(root);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "watch error"),
            }
        }
    });

    Ok(WatchHandle {
        _watcher: watcher,
        task,
    })
}
