//! External summarizer adapters.
//!
//! The worker step only sees the [`Summarizer`] trait. Providers:
//! - **command**: a local CLI (e.g. `gemini`) run with a templated argument list.
//! - **openai**: chat completions, authenticated with `OPENAI_API_KEY`.
//! - **http**: a generic endpoint receiving `{app, snippets, limits}`.
//!
//! Every provider answers with a purpose line and optionally a role and a
//! confidence. Callers bound the call with the budget's `timeout_ms`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use workspace_mcp_core::models::Budget;

use crate::config::SummarizerConfig;
use crate::http::post_json_with_retry;
use crate::workspace::Workspace;

/// Confidence assigned when a provider does not report one.
pub const EXTERNAL_CONFIDENCE: f64 = 0.8;
const MAX_SNIPPETS: usize = 8;
const SNIPPET_CHARS: usize = 2000;
const MAX_PURPOSE_CHARS: usize = 140;
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_COMMAND_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, Serialize)]
pub struct Snippet {
    pub path: PathBuf,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub project: PathBuf,
    pub name: String,
    pub budget: Budget,
    pub intent: Option<String>,
    pub snippets: Vec<Snippet>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOutcome {
    pub purpose: String,
    pub role: Option<String>,
    pub confidence: f64,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    async fn summarize(&self, request: &SummaryRequest) -> Result<SummaryOutcome>;
}

// ============ Disabled ============

pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn summarize(&self, _request: &SummaryRequest) -> Result<SummaryOutcome> {
        bail!("summarizer is disabled")
    }
}

// ============ Command Provider ============

pub struct CommandSummarizer {
    program: String,
    args: Vec<String>,
    model: String,
}

impl CommandSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let program = config
            .command
            .clone()
            .ok_or_else(|| anyhow::anyhow!("summarizer.command required for command provider"))?;
        Ok(Self {
            program,
            args: config.args.clone(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_COMMAND_MODEL.to_string()),
        })
    }

    fn render_args(&self, prompt: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace("{MODEL}", &self.model).replace("{PROMPT}", prompt))
            .collect()
    }
}

#[async_trait]
impl Summarizer for CommandSummarizer {
    fn name(&self) -> &str {
        "command"
    }

    async fn summarize(&self, request: &SummaryRequest) -> Result<SummaryOutcome> {
        let prompt = build_prompt(request);
        let output = tokio::process::Command::new(&self.program)
            .args(self.render_args(&prompt))
            .current_dir(&request.project)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to execute '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} exited with {}: {}", self.program, output.status, stderr.trim());
        }
        parse_outcome(&String::from_utf8_lossy(&output.stdout))
    }
}

// ============ OpenAI Provider ============

pub struct OpenAiSummarizer {
    client: reqwest::Client,
    model: String,
    url: String,
    api_key: String,
}

impl OpenAiSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let key_var = config.auth_env.as_deref().unwrap_or("OPENAI_API_KEY");
        let api_key = std::env::var(key_var)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", key_var))?;
        let base = config
            .endpoint
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Ok(Self {
            client: reqwest::Client::new(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            url: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key,
        })
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    fn name(&self) -> &str {
        "openai"
    }

    async fn summarize(&self, request: &SummaryRequest) -> Result<SummaryOutcome> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": "You summarize software projects. Reply with JSON only." },
                { "role": "user", "content": build_prompt(request) },
            ],
        });
        let json =
            post_json_with_retry(&self.client, &self.url, Some(&self.api_key), &body, 2, "OpenAI")
                .await?;
        let content = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))?;
        parse_outcome(content)
    }
}

// ============ HTTP Provider ============

pub struct HttpSummarizer {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("summarizer.endpoint required for http provider"))?;
        let token = config
            .auth_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok());
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            token,
        })
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    fn name(&self) -> &str {
        "http"
    }

    async fn summarize(&self, request: &SummaryRequest) -> Result<SummaryOutcome> {
        let body = serde_json::json!({
            "app": request.project,
            "name": request.name,
            "intent": request.intent,
            "snippets": request.snippets,
            "limits": request.budget,
        });
        let json = post_json_with_retry(
            &self.client,
            &self.endpoint,
            self.token.as_deref(),
            &body,
            2,
            "summarizer",
        )
        .await?;
        outcome_from_value(&json)
            .ok_or_else(|| anyhow::anyhow!("summarizer response has no purpose"))
    }
}

// ============ Shared ============

/// Build the configured summarizer. `WORKSPACE_MCP_AI=disabled` wins over
/// the config file.
pub fn create_summarizer(config: &SummarizerConfig) -> Result<Arc<dyn Summarizer>> {
    if std::env::var("WORKSPACE_MCP_AI")
        .map(|v| v.eq_ignore_ascii_case("disabled"))
        .unwrap_or(false)
    {
        return Ok(Arc::new(DisabledSummarizer));
    }
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledSummarizer)),
        "command" => Ok(Arc::new(CommandSummarizer::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiSummarizer::new(config)?)),
        "http" => Ok(Arc::new(HttpSummarizer::new(config)?)),
        other => bail!("Unknown summarizer provider: {}", other),
    }
}

/// Run `summarizer` under the request's timeout.
pub async fn summarize_with_timeout(
    summarizer: &dyn Summarizer,
    request: &SummaryRequest,
) -> Result<SummaryOutcome> {
    let limit = Duration::from_millis(request.budget.timeout_ms);
    match tokio::time::timeout(limit, summarizer.summarize(request)).await {
        Ok(result) => result,
        Err(_) => bail!(
            "{} summarizer timed out after {}ms",
            summarizer.name(),
            request.budget.timeout_ms
        ),
    }
}

/// Docs first, then code files, within the budget's file and byte limits.
pub fn collect_snippets(ws: &Workspace, root: &Path, budget: &Budget) -> Vec<Snippet> {
    let per_snippet = SNIPPET_CHARS.min(budget.chunk_tokens.saturating_mul(4)).max(1);
    let max_snippets = MAX_SNIPPETS.min(budget.max_files);

    let mut candidates: Vec<PathBuf> = Vec::new();
    for name in ["README.md", "README", "readme.md"] {
        let p = root.join(name);
        if p.is_file() {
            candidates.push(p);
            break;
        }
    }
    for file in ws.code_files(root) {
        if !candidates.contains(&file) {
            candidates.push(file);
        }
    }
    candidates.sort_by_key(|p| !is_doc(p));

    let mut out = Vec::new();
    let mut total = 0usize;
    for path in candidates {
        if out.len() >= max_snippets {
            break;
        }
        let Some(text) = ws.read_text(&path) else {
            continue;
        };
        let text: String = text.chars().take(per_snippet).collect();
        if text.trim().is_empty() {
            continue;
        }
        if total + text.len() > budget.max_bytes {
            break;
        }
        total += text.len();
        out.push(Snippet { path, text });
    }
    out
}

fn is_doc(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    name.starts_with("readme") || name.ends_with(".md")
}

fn build_prompt(request: &SummaryRequest) -> String {
    let mut prompt = format!(
        "Summarize the purpose of the project \"{}\" in one sentence.\n\
         Answer as JSON: {{\"purpose\": string, \"role\": string, \"confidence\": number}}.\n",
        request.name
    );
    if let Some(intent) = &request.intent {
        prompt.push_str(&format!("The reader wants to: {}\n", intent));
    }
    for snippet in &request.snippets {
        let rel = snippet
            .path
            .strip_prefix(&request.project)
            .unwrap_or(&snippet.path);
        prompt.push_str(&format!("\n--- {} ---\n{}\n", rel.display(), snippet.text));
    }
    prompt
}

#[derive(Deserialize)]
struct RawOutcome {
    purpose: Option<String>,
    role: Option<String>,
    confidence: Option<f64>,
}

fn outcome_from_value(value: &Value) -> Option<SummaryOutcome> {
    let raw: RawOutcome = serde_json::from_value(value.clone()).ok()?;
    let purpose = clean_line(raw.purpose.as_deref().unwrap_or_default());
    if purpose.is_empty() {
        return None;
    }
    Some(SummaryOutcome {
        purpose,
        role: raw.role.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
        confidence: raw
            .confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(EXTERNAL_CONFIDENCE),
    })
}

/// A JSON object anywhere in the text, else the first non-empty line.
fn parse_outcome(text: &str) -> Result<SummaryOutcome> {
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
                if let Some(outcome) = outcome_from_value(&value) {
                    return Ok(outcome);
                }
            }
        }
    }
    let line = text
        .lines()
        .map(clean_line)
        .find(|l| !l.is_empty() && !l.starts_with('{') && !l.starts_with("```"))
        .ok_or_else(|| anyhow::anyhow!("summarizer returned no text"))?;
    Ok(SummaryOutcome {
        purpose: line,
        role: None,
        confidence: EXTERNAL_CONFIDENCE,
    })
}

fn clean_line(line: &str) -> String {
    let collapsed = line
        .trim()
        .trim_matches(|c| c == '"' || c == '*' || c == '`')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    collapsed.chars().take(MAX_PURPOSE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs;

    fn budget() -> Budget {
        Budget {
            max_files: 25,
            max_bytes: 350_000,
            chunk_tokens: 3000,
            timeout_ms: 50,
        }
    }

    fn request() -> SummaryRequest {
        SummaryRequest {
            project: PathBuf::from("/ws/apps/web"),
            name: "web".to_string(),
            budget: budget(),
            intent: None,
            snippets: vec![],
        }
    }

    #[test]
    fn test_parse_json_outcome() {
        let out = parse_outcome(
            "Sure!\n{\"purpose\": \"Checkout web frontend\", \"role\": \"frontend\", \"confidence\": 0.9}\n",
        )
        .unwrap();
        assert_eq!(out.purpose, "Checkout web frontend");
        assert_eq!(out.role.as_deref(), Some("frontend"));
        assert_eq!(out.confidence, 0.9);
    }

    #[test]
    fn test_parse_plain_line_gets_default_confidence() {
        let out = parse_outcome("\n  **Renders the storefront.**  \nmore text").unwrap();
        assert_eq!(out.purpose, "Renders the storefront.");
        assert_eq!(out.role, None);
        assert_eq!(out.confidence, EXTERNAL_CONFIDENCE);
    }

    #[test]
    fn test_parse_empty_output_fails() {
        assert!(parse_outcome("   \n\n").is_err());
    }

    #[test]
    fn test_command_args_are_templated() {
        let mut config = SummarizerConfig::default();
        config.provider = "command".to_string();
        config.command = Some("gemini".to_string());
        config.model = Some("flash".to_string());
        let cmd = CommandSummarizer::new(&config).unwrap();
        assert_eq!(cmd.render_args("hello"), vec!["-m", "flash", "-p", "hello"]);
    }

    struct Slow;

    #[async_trait]
    impl Summarizer for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        async fn summarize(&self, _request: &SummaryRequest) -> Result<SummaryOutcome> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            bail!("unreachable")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_failure() {
        let err = summarize_with_timeout(&Slow, &request()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_disabled_always_fails() {
        assert!(DisabledSummarizer.summarize(&request()).await.is_err());
        assert!(!DisabledSummarizer.is_enabled());
    }

    #[test]
    fn test_snippets_put_docs_first_and_respect_limits() {
        let tmp = tempfile::TempDir::new().unwrap();
        let app = tmp.path().join("apps/web");
        fs::create_dir_all(app.join("src")).unwrap();
        fs::write(app.join("src/a.ts"), "a".repeat(5000)).unwrap();
        fs::write(app.join("src/b.ts"), "export const b = 1;").unwrap();
        fs::write(app.join("README.md"), "# Web\n\nThe storefront.").unwrap();
        let mut config = Config::for_workspace(tmp.path());
        config.workspace.app_globs = vec!["apps/*".to_string()];
        let ws = Workspace::open(&config).unwrap();

        let mut b = budget();
        b.max_files = 2;
        let snippets = collect_snippets(&ws, &app, &b);
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].path, app.join("README.md"));
        assert_eq!(snippets[1].text.chars().count(), SNIPPET_CHARS);
    }
}
