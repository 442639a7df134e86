use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use workspace_mcp_core::classify::{
    PathClassifier, DEFAULT_CORE_SOURCE_PATTERNS, DEFAULT_DEFINITION_PATTERN,
    DEFAULT_ENTRYPOINT_PATTERNS, DEFAULT_TEST_PATTERNS,
};
use workspace_mcp_core::models::Budget;
use workspace_mcp_core::scheduler::SchedulerLimits;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub purpose: PurposeConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
    #[serde(default = "default_app_globs")]
    pub app_globs: Vec<String>,
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

fn default_app_globs() -> Vec<String> {
    vec!["*".to_string()]
}

pub fn default_ignore() -> Vec<String> {
    [
        "**/node_modules/**",
        "**/.git/**",
        "**/.venv/**",
        "**/venv/**",
        "**/dist/**",
        "**/build/**",
        "**/.next/**",
        "**/.cache/**",
        "**/coverage/**",
        "**/target/**",
        "**/.workspace-mcp/**",
        "**/*.log",
        "**/*.zip",
        "**/*.png",
        "**/*.jpg",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".workspace-mcp/cache")
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_summaries: usize,
    #[serde(default = "default_per_minute")]
    pub summaries_per_minute: u32,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub priority_paths: Vec<PathBuf>,
    #[serde(default = "default_pump_interval_ms")]
    pub pump_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_summaries: default_max_concurrent(),
            summaries_per_minute: default_per_minute(),
            debounce_ms: default_debounce_ms(),
            priority_paths: Vec::new(),
            pump_interval_ms: default_pump_interval_ms(),
        }
    }
}

fn default_max_concurrent() -> usize {
    3
}
fn default_per_minute() -> u32 {
    3
}
fn default_debounce_ms() -> u64 {
    750
}
fn default_pump_interval_ms() -> u64 {
    500
}

/// Summarizer resource limits, `purpose.limits` and `purpose.git_repo_overrides`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct LimitsConfig {
    pub max_files: usize,
    pub max_bytes: usize,
    pub chunk_tokens: usize,
    pub timeout_ms: u64,
}

impl LimitsConfig {
    fn standard() -> Self {
        Self {
            max_files: 25,
            max_bytes: 350_000,
            chunk_tokens: 3000,
            timeout_ms: 8000,
        }
    }

    fn git_repo() -> Self {
        Self {
            max_files: 50,
            max_bytes: 800_000,
            chunk_tokens: 3800,
            timeout_ms: 12_000,
        }
    }

    pub fn as_budget(&self) -> Budget {
        Budget {
            max_files: self.max_files,
            max_bytes: self.max_bytes,
            chunk_tokens: self.chunk_tokens,
            timeout_ms: self.timeout_ms,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PurposeConfig {
    #[serde(default = "LimitsConfig::standard")]
    pub limits: LimitsConfig,
    #[serde(default = "LimitsConfig::git_repo")]
    pub git_repo_overrides: LimitsConfig,
}

impl Default for PurposeConfig {
    fn default() -> Self {
        Self {
            limits: LimitsConfig::standard(),
            git_repo_overrides: LimitsConfig::git_repo(),
        }
    }
}

impl PurposeConfig {
    /// Budget for a project, larger when it sits inside a git repository.
    pub fn budget(&self, in_git_repo: bool) -> Budget {
        if in_git_repo {
            self.git_repo_overrides.as_budget()
        } else {
            self.limits.as_budget()
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ActivityConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_activity_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u64,
    #[serde(default = "default_max_scan_entries")]
    pub max_scan_entries: usize,
    /// Defaults to `~/.cursor/ide_state.json`.
    #[serde(default)]
    pub editor_state_path: Option<PathBuf>,
    /// Defaults to `~/.cursor-sessions`.
    #[serde(default)]
    pub sessions_dir: Option<PathBuf>,
    #[serde(default)]
    pub sources: ActivitySources,
    #[serde(default)]
    pub weights: ActivityWeights,
    #[serde(default)]
    pub promote: PromoteConfig,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            enable: false,
            interval_secs: default_activity_interval(),
            lookback_days: default_lookback_days(),
            max_scan_entries: default_max_scan_entries(),
            editor_state_path: None,
            sessions_dir: None,
            sources: ActivitySources::default(),
            weights: ActivityWeights::default(),
            promote: PromoteConfig::default(),
        }
    }
}

fn default_activity_interval() -> u64 {
    300
}
fn default_lookback_days() -> u64 {
    7
}
fn default_max_scan_entries() -> usize {
    2000
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ActivitySources {
    #[serde(default = "default_true")]
    pub editor_state: bool,
    #[serde(default = "default_true")]
    pub editor_sessions: bool,
    #[serde(default = "default_true")]
    pub fs_mtime: bool,
}

impl Default for ActivitySources {
    fn default() -> Self {
        Self {
            editor_state: true,
            editor_sessions: true,
            fs_mtime: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ActivityWeights {
    #[serde(default = "default_editor_state_weight")]
    pub editor_state: f64,
    #[serde(default = "default_editor_sessions_weight")]
    pub editor_sessions: f64,
    #[serde(default = "default_fs_mtime_weight")]
    pub fs_mtime: f64,
}

impl Default for ActivityWeights {
    fn default() -> Self {
        Self {
            editor_state: default_editor_state_weight(),
            editor_sessions: default_editor_sessions_weight(),
            fs_mtime: default_fs_mtime_weight(),
        }
    }
}

fn default_editor_state_weight() -> f64 {
    1.0
}
fn default_editor_sessions_weight() -> f64 {
    0.8
}
fn default_fs_mtime_weight() -> f64 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromoteConfig {
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_max_per_root")]
    pub max_per_root: usize,
    #[serde(default = "default_depth_limit")]
    pub depth_limit: usize,
}

impl Default for PromoteConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            max_per_root: default_max_per_root(),
            depth_limit: default_depth_limit(),
        }
    }
}

fn default_min_score() -> f64 {
    3.0
}
fn default_max_per_root() -> usize {
    20
}
fn default_depth_limit() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { enable: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_include")]
    pub include: Vec<String>,
    #[serde(default = "default_index_max_files")]
    pub max_files: usize,
    #[serde(default = "default_large_file_bytes")]
    pub large_file_bytes: u64,
    #[serde(default = "default_large_file_head_lines")]
    pub large_file_head_lines: usize,
    #[serde(default = "default_large_file_max_definitions")]
    pub large_file_max_definitions: usize,
    /// Drop a project's lexical index when the watcher reports a change.
    #[serde(default)]
    pub invalidate_on_change: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            include: default_index_include(),
            max_files: default_index_max_files(),
            large_file_bytes: default_large_file_bytes(),
            large_file_head_lines: default_large_file_head_lines(),
            large_file_max_definitions: default_large_file_max_definitions(),
            invalidate_on_change: false,
        }
    }
}

fn default_index_include() -> Vec<String> {
    vec!["**/*.{ts,tsx,js,jsx,py,rs,go,md,json,toml,txt}".to_string()]
}
fn default_index_max_files() -> usize {
    5000
}
fn default_large_file_bytes() -> u64 {
    200 * 1024
}
fn default_large_file_head_lines() -> usize {
    200
}
fn default_large_file_max_definitions() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_search_min_score")]
    pub default_min_score: f64,
    #[serde(default = "default_semantic_rerank_limit")]
    pub semantic_rerank_limit: usize,
    #[serde(default = "default_preview_lines")]
    pub preview_lines: usize,
    #[serde(default = "default_embed_cache_entries")]
    pub embed_cache_entries: usize,
    #[serde(default = "default_app_match_threshold")]
    pub app_match_threshold: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            default_min_score: default_search_min_score(),
            semantic_rerank_limit: default_semantic_rerank_limit(),
            preview_lines: default_preview_lines(),
            embed_cache_entries: default_embed_cache_entries(),
            app_match_threshold: default_app_match_threshold(),
        }
    }
}

fn default_top_k() -> usize {
    20
}
fn default_search_min_score() -> f64 {
    0.75
}
fn default_semantic_rerank_limit() -> usize {
    workspace_mcp_core::search::DEFAULT_SEMANTIC_LIMIT
}
fn default_preview_lines() -> usize {
    80
}
fn default_embed_cache_entries() -> usize {
    1024
}
fn default_app_match_threshold() -> f64 {
    0.45
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_entrypoint_patterns")]
    pub entrypoint: Vec<String>,
    #[serde(default = "default_test_patterns")]
    pub test: Vec<String>,
    #[serde(default = "default_core_source_patterns")]
    pub core_source: Vec<String>,
    #[serde(default = "default_definition_pattern")]
    pub definition: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            entrypoint: default_entrypoint_patterns(),
            test: default_test_patterns(),
            core_source: default_core_source_patterns(),
            definition: default_definition_pattern(),
        }
    }
}

fn to_owned_all(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|s| s.to_string()).collect()
}
fn default_entrypoint_patterns() -> Vec<String> {
    to_owned_all(DEFAULT_ENTRYPOINT_PATTERNS)
}
fn default_test_patterns() -> Vec<String> {
    to_owned_all(DEFAULT_TEST_PATTERNS)
}
fn default_core_source_patterns() -> Vec<String> {
    to_owned_all(DEFAULT_CORE_SOURCE_PATTERNS)
}
fn default_definition_pattern() -> String {
    DEFAULT_DEFINITION_PATTERN.to_string()
}

impl ClassifierConfig {
    pub fn build(&self) -> Result<PathClassifier> {
        PathClassifier::new(
            &self.entrypoint,
            &self.test,
            &self.core_source,
            &self.definition,
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    /// Embedding runs while a search waits, so the retry budget stays small.
    /// At most [`MAX_EMBEDDING_RETRIES`].
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

pub const MAX_EMBEDDING_RETRIES: u32 = 3;

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    1
}
fn default_timeout_secs() -> u64 {
    10
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Executable for the `command` provider (e.g. `gemini`).
    #[serde(default)]
    pub command: Option<String>,
    /// Argument template; `{MODEL}` and `{PROMPT}` are substituted.
    #[serde(default = "default_command_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// URL for the `http` provider, or an OpenAI-compatible base URL.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding the bearer token.
    #[serde(default)]
    pub auth_env: Option<String>,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            command: None,
            args: default_command_args(),
            model: None,
            endpoint: None,
            auth_env: None,
        }
    }
}

fn default_command_args() -> Vec<String> {
    vec![
        "-m".to_string(),
        "{MODEL}".to_string(),
        "-p".to_string(),
        "{PROMPT}".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// All defaults for a workspace rooted at `root`. Used by tests and by
    /// `load_config` callers that only need to override a few fields.
    pub fn for_workspace(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            workspace: WorkspaceConfig {
                cache_dir: root.join(default_cache_dir()),
                root,
                app_globs: default_app_globs(),
                ignore: default_ignore(),
            },
            queue: QueueConfig::default(),
            purpose: PurposeConfig::default(),
            activity: ActivityConfig::default(),
            watch: WatchConfig::default(),
            index: IndexConfig::default(),
            search: SearchConfig::default(),
            classifier: ClassifierConfig::default(),
            embedding: EmbeddingConfig::default(),
            summarizer: SummarizerConfig::default(),
            server: ServerConfig::default(),
        }
    }

    pub fn scheduler_limits(&self) -> SchedulerLimits {
        SchedulerLimits {
            max_concurrent: self.queue.max_concurrent_summaries,
            per_minute: self.queue.summaries_per_minute,
            priority_paths: self
                .queue
                .priority_paths
                .iter()
                .map(|p| {
                    if p.is_absolute() {
                        p.clone()
                    } else {
                        self.workspace.root.join(p)
                    }
                })
                .collect(),
        }
    }

    /// Check invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if !self.workspace.root.is_absolute() {
            anyhow::bail!(
                "workspace.root must be an absolute path, got '{}'",
                self.workspace.root.display()
            );
        }
        if self.workspace.app_globs.is_empty() {
            anyhow::bail!("workspace.app_globs must list at least one pattern");
        }
        for pattern in self
            .workspace
            .app_globs
            .iter()
            .chain(&self.workspace.ignore)
            .chain(&self.index.include)
        {
            globset::Glob::new(pattern).with_context(|| format!("Invalid glob '{}'", pattern))?;
        }

        if self.queue.max_concurrent_summaries == 0 {
            anyhow::bail!("queue.max_concurrent_summaries must be >= 1");
        }
        if self.queue.summaries_per_minute == 0 {
            anyhow::bail!("queue.summaries_per_minute must be >= 1");
        }
        if self.queue.pump_interval_ms == 0 {
            anyhow::bail!("queue.pump_interval_ms must be > 0");
        }

        for (name, limits) in [
            ("purpose.limits", &self.purpose.limits),
            ("purpose.git_repo_overrides", &self.purpose.git_repo_overrides),
        ] {
            if limits.max_files == 0 || limits.max_bytes == 0 || limits.timeout_ms == 0 {
                anyhow::bail!("{}: max_files, max_bytes and timeout_ms must be > 0", name);
            }
        }

        if self.activity.promote.depth_limit == 0 {
            anyhow::bail!("activity.promote.depth_limit must be >= 1");
        }
        if self.activity.promote.min_score < 0.0 {
            anyhow::bail!("activity.promote.min_score must be >= 0");
        }
        if self.activity.interval_secs == 0 {
            anyhow::bail!("activity.interval_secs must be > 0");
        }

        if !(0.0..=1.0).contains(&self.search.default_min_score) {
            anyhow::bail!("search.default_min_score must be in [0.0, 1.0]");
        }
        if !(1..=50).contains(&self.search.default_top_k) {
            anyhow::bail!("search.default_top_k must be in [1, 50]");
        }
        if !(0.0..=1.0).contains(&self.search.app_match_threshold) {
            anyhow::bail!("search.app_match_threshold must be in [0.0, 1.0]");
        }

        self.classifier.build()?;

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" | "local" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }
        if self.embedding.max_retries > MAX_EMBEDDING_RETRIES {
            anyhow::bail!("embedding.max_retries must be <= {}", MAX_EMBEDDING_RETRIES);
        }
        if self.embedding.timeout_secs == 0 {
            anyhow::bail!("embedding.timeout_secs must be > 0");
        }
        if self.embedding.is_enabled() && self.embedding.provider != "local" {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }

        match self.summarizer.provider.as_str() {
            "disabled" | "openai" => {}
            "command" => {
                if self.summarizer.command.is_none() {
                    anyhow::bail!("summarizer.command must be set when provider is 'command'");
                }
            }
            "http" => {
                if self.summarizer.endpoint.is_none() {
                    anyhow::bail!("summarizer.endpoint must be set when provider is 'http'");
                }
            }
            other => anyhow::bail!(
                "Unknown summarizer provider: '{}'. Must be disabled, command, openai, or http.",
                other
            ),
        }

        Ok(())
    }
}

/// Read, parse and validate a config file. A relative `workspace.cache_dir`
/// is resolved against the config file's directory.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.workspace.cache_dir.is_relative() {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.workspace.cache_dir = base.join(&config.workspace.cache_dir);
    }

    config.validate()?;
    Ok(config)
}
