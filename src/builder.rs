//! The worker step: build one project's capsule and publish it.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use workspace_mcp_core::models::{Capsule, CapsuleSource, Job};

use crate::cache::CapsuleCache;
use crate::capsule::heuristic_capsule;
use crate::config::PurposeConfig;
use crate::error::ToolError;
use crate::owners::CodeOwners;
use crate::scheduler::JobRunner;
use crate::summarize::{collect_snippets, summarize_with_timeout, Summarizer, SummaryRequest};
use crate::telemetry::Telemetry;
use crate::workspace::{is_in_git_repo, project_name, Workspace};

const MAX_EVIDENCE: usize = 5;

pub struct CapsuleBuilder {
    workspace: Arc<Workspace>,
    owners: Arc<CodeOwners>,
    cache: Arc<CapsuleCache>,
    summarizer: Arc<dyn Summarizer>,
    telemetry: Arc<Telemetry>,
    purpose: PurposeConfig,
}

impl CapsuleBuilder {
    pub fn new(
        workspace: Arc<Workspace>,
        owners: Arc<CodeOwners>,
        cache: Arc<CapsuleCache>,
        summarizer: Arc<dyn Summarizer>,
        telemetry: Arc<Telemetry>,
        purpose: PurposeConfig,
    ) -> Self {
        Self {
            workspace,
            owners,
            cache,
            summarizer,
            telemetry,
            purpose,
        }
    }

    pub fn summarizer_enabled(&self) -> bool {
        self.summarizer.is_enabled()
    }

    /// Local capsule only, no external call. Not written to the cache.
    pub fn heuristic(&self, root: &Path) -> Capsule {
        heuristic_capsule(&self.workspace, &self.owners, root)
    }

    /// Build and publish a capsule. `use_summarizer` false skips the
    /// external call entirely.
    pub async fn build(
        &self,
        root: &Path,
        intent: Option<&str>,
        use_summarizer: bool,
    ) -> Result<Arc<Capsule>> {
        // Watch and promotion jobs can outlive the directory they name.
        if !root.is_dir() {
            return Err(ToolError::NotFound(root.to_path_buf()).into());
        }
        let started = Instant::now();
        let budget = self.purpose.budget(is_in_git_repo(root));

        let workspace = Arc::clone(&self.workspace);
        let owners = Arc::clone(&self.owners);
        let project = root.to_path_buf();
        let (mut capsule, snippets) = tokio::task::spawn_blocking(move || {
            let capsule = heuristic_capsule(&workspace, &owners, &project);
            let snippets = collect_snippets(&workspace, &project, &budget);
            (capsule, snippets)
        })
        .await?;

        if use_summarizer && self.summarizer.is_enabled() {
            let request = SummaryRequest {
                project: root.to_path_buf(),
                name: project_name(root),
                budget,
                intent: intent.map(str::to_string),
                snippets,
            };
            match summarize_with_timeout(self.summarizer.as_ref(), &request).await {
                Ok(outcome) => {
                    capsule.purpose = outcome.purpose;
                    if let Some(role) = outcome.role {
                        capsule.role = role;
                    }
                    capsule.confidence = outcome.confidence;
                    capsule.evidence_paths = request
                        .snippets
                        .iter()
                        .take(MAX_EVIDENCE)
                        .map(|s| s.path.clone())
                        .collect();
                    capsule.source = CapsuleSource::Summarizer;
                }
                Err(e) => {
                    tracing::warn!(
                        app = %root.display(),
                        summarizer = self.summarizer.name(),
                        error = %format!("{:#}", e),
                        "summarizer failed; using heuristic capsule"
                    );
                }
            }
        }

        let source = match capsule.source {
            CapsuleSource::Summarizer => "summarizer",
            CapsuleSource::Heuristic => "heuristic",
        };
        let published = self.cache.put(capsule);
        self.telemetry
            .job_done(root, source, started.elapsed().as_millis());
        Ok(published)
    }
}

#[async_trait]
impl JobRunner for CapsuleBuilder {
    async fn run(&self, job: Job) {
        tracing::debug!(app = %job.project_root.display(), reason = %job.reason, "building capsule");
        if let Err(e) = self.build(&job.project_root, None, true).await {
            self.telemetry.job_error(&job.project_root, &e);
        }
    }
}
