//! Async dispatch around [`SchedulerState`].
//!
//! All admission happens in [`Scheduler::pump`] under one mutex; admitted
//! jobs run as spawned tasks that hold no lock while they work. When a job
//! finishes, its slot is released and the scheduler pumps again, so queued
//! work does not wait for the next tick.

use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use workspace_mcp_core::models::{Job, JobReason, Priority};
use workspace_mcp_core::scheduler::{SchedulerLimits, SchedulerSnapshot, SchedulerState};

/// Executes one admitted job. Failures are the runner's to record.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: Job);
}

pub struct Scheduler {
    state: Mutex<SchedulerState>,
    runner: Arc<dyn JobRunner>,
}

impl Scheduler {
    pub fn new(limits: SchedulerLimits, runner: Arc<dyn JobRunner>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SchedulerState::new(limits, Instant::now())),
            runner,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Queue `root`; `false` when it was already pending.
    pub fn enqueue(&self, root: PathBuf, reason: JobReason, priority: Option<Priority>) -> bool {
        let added = self.lock().enqueue(root.clone(), reason, priority, Utc::now());
        if added {
            tracing::debug!(app = %root.display(), reason = %reason, "job queued");
        }
        added
    }

    /// Admit and spawn whatever capacity and tokens allow. Never blocks on
    /// job execution. Must be called from inside a tokio runtime.
    pub fn pump(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let admitted = self.lock().admit(Instant::now());
        admitted
            .into_iter()
            .map(|job| {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    let _slot = Slot(Arc::clone(&this));
                    this.runner.run(job).await;
                })
            })
            .collect()
    }

    /// Take a token for work requested directly by a caller.
    pub fn try_take_token(&self) -> bool {
        self.lock().try_take_token(Instant::now())
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        self.lock().snapshot()
    }

    /// Pump every `interval` until the task is dropped.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.pump();
        }
    }
}

/// Releases the active slot even if the runner panics.
struct Slot(Arc<Scheduler>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.lock().finish();
        if !std::thread::panicking() {
            self.0.pump();
        }
    }
}
