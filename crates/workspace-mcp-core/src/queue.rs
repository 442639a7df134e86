//! Priority job queue with per-project deduplication.
//!
//! Jobs are ordered by `(priority, enqueue sequence)`: lower priority tiers
//! first, FIFO within a tier. At most one job per project root is pending at
//! any time; a second enqueue for a queued root is a no-op and does not
//! upgrade the existing entry.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::models::{Job, JobReason, Priority};

/// Assigns a priority tier from a list of path prefixes.
#[derive(Debug, Clone, Default)]
pub struct PriorityPolicy {
    priority_paths: Vec<PathBuf>,
}

impl PriorityPolicy {
    pub fn new(priority_paths: Vec<PathBuf>) -> Self {
        Self { priority_paths }
    }

    /// [`Priority::High`] if `root` lies under any configured priority path.
    pub fn priority_for(&self, root: &Path) -> Priority {
        if self.priority_paths.iter().any(|p| root.starts_with(p)) {
            Priority::High
        } else {
            Priority::Normal
        }
    }
}

#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: BTreeMap<(Priority, u64), Job>,
    pending: HashSet<PathBuf>,
    next_seq: u64,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a job for `root`. Returns `false` if the root is already pending.
    pub fn push(
        &mut self,
        root: PathBuf,
        priority: Priority,
        reason: JobReason,
        now: DateTime<Utc>,
    ) -> bool {
        if self.pending.contains(&root) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(root.clone());
        self.jobs.insert(
            (priority, seq),
            Job {
                project_root: root,
                priority,
                reason,
                enqueued_at: now,
                seq,
            },
        );
        true
    }

    /// Remove and return the head job. Its root becomes enqueueable again.
    pub fn pop(&mut self) -> Option<Job> {
        let (_, job) = self.jobs.pop_first()?;
        self.pending.remove(&job.project_root);
        Some(job)
    }

    pub fn peek(&self) -> Option<&Job> {
        self.jobs.values().next()
    }

    pub fn contains(&self, root: &Path) -> bool {
        self.pending.contains(root)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Pending jobs in service order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }
}
