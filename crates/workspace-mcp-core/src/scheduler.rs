//! Admission state for the summarization scheduler.
//!
//! [`SchedulerState`] owns the job queue, the token bucket and the
//! active-worker counter. The app crate keeps exactly one instance behind a
//! mutex, so every admission decision (dequeue, token consume, counter
//! increment) happens inside a single critical section.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

use crate::models::{Job, JobReason, Priority};
use crate::queue::{JobQueue, PriorityPolicy};
use crate::rate_limit::TokenBucket;

/// Static scheduler limits.
#[derive(Debug, Clone)]
pub struct SchedulerLimits {
    pub max_concurrent: usize,
    pub per_minute: u32,
    pub priority_paths: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct SchedulerState {
    queue: JobQueue,
    bucket: TokenBucket,
    policy: PriorityPolicy,
    active: usize,
    max_concurrent: usize,
}

/// Point-in-time view for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerSnapshot {
    pub pending: Vec<Job>,
    pub active: usize,
    pub max_concurrent: usize,
    pub tokens: u32,
}

impl SchedulerState {
    pub fn new(limits: SchedulerLimits, now: Instant) -> Self {
        Self {
            queue: JobQueue::new(),
            bucket: TokenBucket::new_at(limits.per_minute, now),
            policy: PriorityPolicy::new(limits.priority_paths),
            active: 0,
            max_concurrent: limits.max_concurrent,
        }
    }

    /// Queue `root` unless it is already pending. The priority defaults to
    /// the configured priority-path policy.
    pub fn enqueue(
        &mut self,
        root: PathBuf,
        reason: JobReason,
        priority: Option<Priority>,
        now: DateTime<Utc>,
    ) -> bool {
        let priority = priority.unwrap_or_else(|| self.policy.priority_for(&root));
        self.queue.push(root, priority, reason, now)
    }

    /// Admit as many head jobs as concurrency and tokens allow.
    ///
    /// Each returned job has already been dequeued, charged one token and
    /// counted as active. The caller must call [`finish`](Self::finish) once
    /// per admitted job. No token is spent when the queue is empty.
    pub fn admit(&mut self, now: Instant) -> Vec<Job> {
        let mut admitted = Vec::new();
        while self.active < self.max_concurrent
            && !self.queue.is_empty()
            && self.bucket.try_consume_at(now)
        {
            if let Some(job) = self.queue.pop() {
                self.active += 1;
                admitted.push(job);
            }
        }
        admitted
    }

    /// Release one active slot.
    pub fn finish(&mut self) {
        self.active = self.active.saturating_sub(1);
    }

    /// Take a token outside the queue, for work requested directly by a caller.
    pub fn try_take_token(&mut self, now: Instant) -> bool {
        self.bucket.try_consume_at(now)
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_pending(&self, root: &std::path::Path) -> bool {
        self.queue.contains(root)
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            pending: self.queue.iter().cloned().collect(),
            active: self.active,
            max_concurrent: self.max_concurrent,
            tokens: self.bucket.available(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::WINDOW;

    fn state(max_concurrent: usize, per_minute: u32, now: Instant) -> SchedulerState {
        SchedulerState::new(
            SchedulerLimits {
                max_concurrent,
                per_minute,
                priority_paths: vec![PathBuf::from("/ws/apps/hot")],
            },
            now,
        )
    }

    fn root(name: &str) -> PathBuf {
        PathBuf::from("/ws/apps").join(name)
    }

    #[test]
    fn test_admit_respects_concurrency() {
        let t0 = Instant::now();
        let mut s = state(2, 10, t0);
        for n in ["a", "b", "c"] {
            s.enqueue(root(n), JobReason::Startup, None, Utc::now());
        }
        let first = s.admit(t0);
        assert_eq!(first.len(), 2);
        assert_eq!(s.active(), 2);
        assert!(s.admit(t0).is_empty());

        s.finish();
        let next = s.admit(t0);
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].project_root, root("c"));
    }

    #[test]
    fn test_admit_respects_rate() {
        let t0 = Instant::now();
        let mut s = state(10, 2, t0);
        for n in ["a", "b", "c", "d"] {
            s.enqueue(root(n), JobReason::Startup, None, Utc::now());
        }
        assert_eq!(s.admit(t0).len(), 2);
        assert_eq!(s.pending(), 2);
        assert!(s.admit(t0).is_empty());
        assert_eq!(s.admit(t0 + WINDOW).len(), 2);
    }

    #[test]
    fn test_empty_queue_spends_no_tokens() {
        let t0 = Instant::now();
        let mut s = state(3, 1, t0);
        assert!(s.admit(t0).is_empty());
        assert_eq!(s.snapshot().tokens, 1);
        s.enqueue(root("a"), JobReason::Watch, None, Utc::now());
        assert_eq!(s.admit(t0).len(), 1);
    }

    #[test]
    fn test_priority_path_served_first() {
        let t0 = Instant::now();
        let mut s = state(1, 10, t0);
        s.enqueue(root("cold"), JobReason::Startup, None, Utc::now());
        s.enqueue(root("hot/api"), JobReason::Startup, None, Utc::now());
        let job = s.admit(t0).pop().unwrap();
        assert_eq!(job.project_root, root("hot/api"));
        assert_eq!(job.priority, Priority::High);
    }

    #[test]
    fn test_explicit_priority_overrides_policy() {
        let t0 = Instant::now();
        let mut s = state(1, 10, t0);
        s.enqueue(root("cold"), JobReason::Startup, None, Utc::now());
        s.enqueue(
            root("other"),
            JobReason::Manual,
            Some(Priority::High),
            Utc::now(),
        );
        assert_eq!(s.admit(t0)[0].project_root, root("other"));
    }

    #[test]
    fn test_finish_never_underflows() {
        let mut s = state(1, 1, Instant::now());
        s.finish();
        assert_eq!(s.active(), 0);
    }
}
