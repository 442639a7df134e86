//! Wiring: one [`Engine`] per process owns every long-lived component and
//! is shared by the tool registry, the transports and the CLI.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use workspace_mcp_core::embedding::Embedder;
use workspace_mcp_core::models::{Capsule, JobReason};

use crate::activity::{run_promotions, ActivityScanner};
use crate::builder::CapsuleBuilder;
use crate::cache::CapsuleCache;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::owners::CodeOwners;
use crate::scheduler::Scheduler;
use crate::search::Retrieval;
use crate::summarize::{create_summarizer, Summarizer};
use crate::telemetry::Telemetry;
use crate::watcher::{spawn_watcher, WatchHandle};
use crate::workspace::Workspace;

pub struct Engine {
    pub config: Arc<Config>,
    pub workspace: Arc<Workspace>,
    pub owners: Arc<CodeOwners>,
    pub cache: Arc<CapsuleCache>,
    pub telemetry: Arc<Telemetry>,
    pub builder: Arc<CapsuleBuilder>,
    pub scheduler: Arc<Scheduler>,
    pub retrieval: Arc<Retrieval>,
    pub activity: Arc<ActivityScanner>,
}

impl Engine {
    /// Build an engine with the providers named in the config.
    pub fn open(config: Config) -> Result<Arc<Self>> {
        let embedder = create_embedder(&config.embedding, config.search.embed_cache_entries)
            .context("Failed to initialize embedding provider")?;
        let summarizer = create_summarizer(&config.summarizer)
            .context("Failed to initialize summarizer")?;
        Self::with_providers(config, embedder, summarizer)
    }

    pub fn with_providers(
        config: Config,
        embedder: Arc<dyn Embedder>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Result<Arc<Self>> {
        let workspace = Arc::new(Workspace::open(&config)?);
        let owners = Arc::new(CodeOwners::load(workspace.root()));
        let cache = Arc::new(CapsuleCache::new(config.workspace.cache_dir.clone()));
        let telemetry = Arc::new(Telemetry::new(
            config.workspace.cache_dir.join("telemetry.log"),
        ));
        let builder = Arc::new(CapsuleBuilder::new(
            Arc::clone(&workspace),
            Arc::clone(&owners),
            Arc::clone(&cache),
            summarizer,
            Arc::clone(&telemetry),
            config.purpose.clone(),
        ));
        let scheduler = Scheduler::new(config.scheduler_limits(), builder.clone());
        let retrieval = Arc::new(Retrieval::new(
            Arc::clone(&workspace),
            Arc::clone(&owners),
            Arc::clone(&cache),
            embedder,
            Arc::clone(&telemetry),
            config.search.clone(),
        ));
        let activity = Arc::new(ActivityScanner::new(
            Arc::clone(&workspace),
            config.activity.clone(),
        ));

        Ok(Arc::new(Self {
            config: Arc::new(config),
            workspace,
            owners,
            cache,
            telemetry,
            builder,
            scheduler,
            retrieval,
            activity,
        }))
    }

    /// Return the cached capsule unless `force`, else build one now. The
    /// external summarizer is used only if one is configured and a rate
    /// token is available. Heuristic-only builds spend no token.
    pub async fn bootstrap(
        &self,
        app: &Path,
        intent: Option<&str>,
        force: bool,
    ) -> Result<Arc<Capsule>> {
        if !force {
            if let Some(capsule) = self.cache.get(app) {
                return Ok(capsule);
            }
        }
        if !self.builder.summarizer_enabled() {
            return self.builder.build(app, intent, false).await;
        }
        let use_summarizer = self.scheduler.try_take_token();
        if !use_summarizer {
            tracing::info!(app = %app.display(), "rate limit reached; building heuristic capsule");
        }
        self.builder.build(app, intent, use_summarizer).await
    }

    /// Queue every root, then keep the pump, the promotion cycle and the
    /// watcher running until the returned value is dropped.
    pub fn start_background(self: &Arc<Self>) -> Result<BackgroundTasks> {
        let mut queued = 0;
        for root in self.workspace.roots() {
            if self.scheduler.enqueue(root.clone(), JobReason::Startup, None) {
                queued += 1;
            }
        }
        tracing::info!(queued, "startup jobs queued");
        self.scheduler.pump();

        let mut tasks = BackgroundTasks::default();
        tasks.handles.push(tokio::spawn(Arc::clone(&self.scheduler).run(
            Duration::from_millis(self.config.queue.pump_interval_ms),
        )));

        if self.config.activity.enable {
            tasks.handles.push(tokio::spawn(run_promotions(
                Arc::clone(&self.activity),
                Arc::clone(&self.scheduler),
                Duration::from_secs(self.config.activity.interval_secs),
            )));
        }

        if self.config.watch.enable {
            match spawn_watcher(
                Arc::clone(&self.workspace),
                Arc::clone(&self.scheduler),
                Arc::clone(&self.retrieval),
                Duration::from_millis(self.config.queue.debounce_ms),
                self.config.index.invalidate_on_change,
            ) {
                Ok(handle) => tasks.watcher = Some(handle),
                Err(e) => tracing::warn!(error = %format!("{:#}", e), "file watching disabled"),
            }
        }
        Ok(tasks)
    }
}

/// Background loops started by [`Engine::start_background`]; aborted on drop.
#[derive(Default)]
pub struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
    watcher: Option<WatchHandle>,
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        self.watcher.take();
        for h in &self.handles {
            h.abort();
        }
    }
}
