//! Tool trait, registry and the built-in workspace tools.
//!
//! Every tool takes a JSON object of arguments and returns a JSON value.
//! Both transports (`serve mcp` over stdio, `serve http`) dispatch through
//! the same [`ToolRegistry`], so a tool behaves identically on either.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                ToolRegistry                  │
//! │  list_roots  list_apps  find_app  bootstrap  │
//! │  list_entrypoints  tests_for  describe_symbol│
//! │  owners  search_semantic  invalidate_index   │
//! └──────────────┬───────────────────────────────┘
//!                ▼
//!        ToolContext → Engine
//! ```
//!
//! Every argument that names a path goes through the workspace guard before
//! it is used; a path outside the workspace root fails with
//! [`ToolError::OutsideWorkspace`].

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use workspace_mcp_core::fuzzy::FuzzyMatcher;
use workspace_mcp_core::models::{Capsule, SearchMode};

use crate::engine::Engine;
use crate::error::ToolError;
use crate::search::SearchRequest;
use crate::workspace::project_name;

const FIND_APP_THRESHOLD: f64 = 0.4;
const FIND_APP_DEFAULT_LIMIT: u64 = 5;
const FIND_APP_MAX_LIMIT: u64 = 20;
const MAX_TOP_K: u64 = 50;
const DESCRIBE_HEAD_LINES: usize = 60;
const DESCRIBE_MAX_DEFINITIONS: usize = 60;

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// A tool that agents can discover and call.
///
/// Registered once at startup; [`name`](Tool::name),
/// [`description`](Tool::description) and
/// [`parameters_schema`](Tool::parameters_schema) feed the tool list, and
/// [`execute`](Tool::execute) runs on every call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores, also the HTTP route segment.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// JSON Schema (`type: "object"`) for the arguments.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `params` is always a JSON object.
    ///
    /// Caller mistakes are returned as [`ToolError`] inside the
    /// `anyhow::Error` so transports can classify them.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// Bridge from tools to the engine. Cheap to clone.
#[derive(Clone)]
pub struct ToolContext {
    engine: Arc<Engine>,
}

impl ToolContext {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Resolve and guard a caller-supplied path.
    pub fn resolve(&self, input: &str) -> Result<PathBuf, ToolError> {
        self.engine.workspace.resolve(input)
    }

    /// Resolve an `app` argument; the directory must exist.
    pub fn resolve_app(&self, input: &str) -> Result<PathBuf, ToolError> {
        let path = self.resolve(input)?;
        if !path.is_dir() {
            return Err(ToolError::NotFound(path));
        }
        Ok(path)
    }

    /// Cached capsule, or a heuristic one built on the spot (not persisted).
    pub async fn capsule_for(&self, app: &Path) -> Result<Arc<Capsule>> {
        if let Some(capsule) = self.engine.cache.get(app) {
            return Ok(capsule);
        }
        let builder = Arc::clone(&self.engine.builder);
        let project = app.to_path_buf();
        Ok(Arc::new(
            tokio::task::spawn_blocking(move || builder.heuristic(&project)).await?,
        ))
    }

    fn rel(&self, path: &Path) -> String {
        self.engine.workspace.relative(path)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Argument helpers
// ═══════════════════════════════════════════════════════════════════════

fn optional_str<'a>(params: &'a Value, name: &'static str) -> Result<Option<&'a str>, ToolError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ToolError::invalid(name, "expected a string")),
    }
}

fn required_str<'a>(params: &'a Value, name: &'static str) -> Result<&'a str, ToolError> {
    optional_str(params, name)?.ok_or(ToolError::MissingArgument(name))
}

fn optional_bool(params: &Value, name: &'static str) -> Result<Option<bool>, ToolError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(ToolError::invalid(name, "expected a boolean")),
    }
}

fn optional_u64_in(
    params: &Value,
    name: &'static str,
    min: u64,
    max: u64,
) -> Result<Option<u64>, ToolError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let n = v
                .as_u64()
                .ok_or_else(|| ToolError::invalid(name, "expected a non-negative integer"))?;
            if n < min || n > max {
                return Err(ToolError::invalid(
                    name,
                    format!("must be between {} and {}", min, max),
                ));
            }
            Ok(Some(n))
        }
    }
}

fn optional_unit_f64(params: &Value, name: &'static str) -> Result<Option<f64>, ToolError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let n = v
                .as_f64()
                .ok_or_else(|| ToolError::invalid(name, "expected a number"))?;
            if !(0.0..=1.0).contains(&n) {
                return Err(ToolError::invalid(name, "must be between 0 and 1"));
            }
            Ok(Some(n))
        }
    }
}

fn capsule_summary(ctx: &ToolContext, capsule: &Capsule) -> Value {
    json!({
        "name": capsule.name,
        "path": capsule.project_root,
        "rel": ctx.rel(&capsule.project_root),
        "purpose": capsule.purpose,
        "role": capsule.role,
        "confidence": capsule.confidence,
        "source": capsule.source,
        "generated_at": capsule.generated_at,
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in Tools
// ═══════════════════════════════════════════════════════════════════════

pub struct ListRootsTool;

#[async_trait]
impl Tool for ListRootsTool {
    fn name(&self) -> &str {
        "list_roots"
    }

    fn description(&self) -> &str {
        "List every project root discovered in the workspace"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let roots: Vec<Value> = ctx
            .engine
            .workspace
            .roots()
            .iter()
            .map(|r| json!({ "name": project_name(r), "path": r, "rel": ctx.rel(r) }))
            .collect();
        Ok(json!({ "workspace": ctx.engine.workspace.root(), "roots": roots }))
    }
}

pub struct ListAppsTool;

#[async_trait]
impl Tool for ListAppsTool {
    fn name(&self) -> &str {
        "list_apps"
    }

    fn description(&self) -> &str {
        "List projects that already have a capsule, with their purpose"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let apps: Vec<Value> = ctx
            .engine
            .cache
            .list()
            .iter()
            .map(|c| capsule_summary(ctx, c))
            .collect();
        Ok(json!({ "apps": apps }))
    }
}

pub struct FindAppTool;

#[async_trait]
impl Tool for FindAppTool {
    fn name(&self) -> &str {
        "find_app"
    }

    fn description(&self) -> &str {
        "Fuzzy-find projects by name or path"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Project name or path fragment" },
                "limit": { "type": "integer", "minimum": 1, "maximum": FIND_APP_MAX_LIMIT, "default": FIND_APP_DEFAULT_LIMIT }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let limit = optional_u64_in(&params, "limit", 1, FIND_APP_MAX_LIMIT)?
            .unwrap_or(FIND_APP_DEFAULT_LIMIT) as usize;
        let candidates = ctx.engine.workspace.app_candidates();

        let matches: Vec<Value> = match optional_str(&params, "name")? {
            Some(name) => FuzzyMatcher::new()
                .rank(name, &candidates, FIND_APP_THRESHOLD, limit)
                .into_iter()
                .map(|m| json!({ "name": m.name, "rel": m.rel, "path": m.path, "score": m.score }))
                .collect(),
            None => candidates
                .into_iter()
                .take(limit)
                .map(|c| json!({ "name": c.name, "rel": c.rel, "path": c.path, "score": null }))
                .collect(),
        };
        Ok(json!({ "matches": matches }))
    }
}

pub struct BootstrapTool;

#[async_trait]
impl Tool for BootstrapTool {
    fn name(&self) -> &str {
        "bootstrap"
    }

    fn description(&self) -> &str {
        "Return a project's capsule, building it if missing or when forced"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "app": { "type": "string", "description": "Project root, absolute or workspace-relative" },
                "intent": { "type": "string", "description": "What the caller is trying to do" },
                "force": { "type": "boolean", "default": false, "description": "Rebuild even if cached" }
            },
            "required": ["app"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let app = ctx.resolve_app(required_str(&params, "app")?)?;
        let intent = optional_str(&params, "intent")?;
        let force = optional_bool(&params, "force")?.unwrap_or(false);
        let capsule = ctx.engine.bootstrap(&app, intent, force).await?;
        Ok(serde_json::to_value(capsule.as_ref())?)
    }
}

pub struct ListEntrypointsTool;

#[async_trait]
impl Tool for ListEntrypointsTool {
    fn name(&self) -> &str {
        "list_entrypoints"
    }

    fn description(&self) -> &str {
        "List a project's entrypoint files"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "app": { "type": "string" } },
            "required": ["app"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let app = ctx.resolve_app(required_str(&params, "app")?)?;
        let capsule = ctx.capsule_for(&app).await?;
        Ok(json!({ "app": app, "entrypoints": capsule.entrypoints }))
    }
}

pub struct TestsForTool;

#[async_trait]
impl Tool for TestsForTool {
    fn name(&self) -> &str {
        "tests_for"
    }

    fn description(&self) -> &str {
        "List test files for one project, or for every project"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "app": { "type": "string" } }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let apps: Vec<PathBuf> = match optional_str(&params, "app")? {
            Some(app) => vec![ctx.resolve_app(app)?],
            None => ctx.engine.workspace.roots().to_vec(),
        };
        let mut results = Vec::with_capacity(apps.len());
        for app in apps {
            let capsule = ctx.capsule_for(&app).await?;
            results.push(json!({ "app": app, "tests": capsule.tests }));
        }
        Ok(json!({ "results": results }))
    }
}

pub struct DescribeSymbolTool;

#[async_trait]
impl Tool for DescribeSymbolTool {
    fn name(&self) -> &str {
        "describe_symbol"
    }

    fn description(&self) -> &str {
        "Show the head of a file and its definition-like lines"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "path": { "type": "string", "description": "File path" } },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let path = ctx.resolve(required_str(&params, "path")?)?;
        if !path.is_file() {
            return Err(ToolError::NotFound(path).into());
        }
        let workspace = Arc::clone(&ctx.engine.workspace);
        let file = path.clone();
        let outline = tokio::task::spawn_blocking(move || {
            workspace.outline(&file, DESCRIBE_HEAD_LINES, DESCRIBE_MAX_DEFINITIONS)
        })
        .await?
        .ok_or_else(|| ToolError::invalid("path", "not a UTF-8 text file"))?;

        let definitions: Vec<Value> = outline
            .definitions
            .iter()
            .map(|(line, text)| json!({ "line": line, "text": text }))
            .collect();

        Ok(json!({
            "path": path,
            "line_count": outline.line_count,
            "head": outline.head.join("\n"),
            "definitions": definitions,
            "large": outline.large,
        }))
    }
}

pub struct OwnersTool;

#[async_trait]
impl Tool for OwnersTool {
    fn name(&self) -> &str {
        "owners"
    }

    fn description(&self) -> &str {
        "Look up CODEOWNERS for a path"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "path": { "type": "string", "description": "Defaults to the workspace root" } }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let path = match optional_str(&params, "path")? {
            Some(p) => ctx.resolve(p)?,
            None => ctx.engine.workspace.root().to_path_buf(),
        };
        let owners = ctx.engine.owners.owners_of(&ctx.rel(&path));
        Ok(json!({ "path": path, "owners": owners }))
    }
}

pub struct SearchSemanticTool;

#[async_trait]
impl Tool for SearchSemanticTool {
    fn name(&self) -> &str {
        "search_semantic"
    }

    fn description(&self) -> &str {
        "Hybrid lexical and semantic search over one project's files"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "app": { "type": "string", "description": "Project root; inferred from the query when omitted" },
                "top_k": { "type": "integer", "minimum": 1, "maximum": MAX_TOP_K },
                "min_score": { "type": "number", "minimum": 0, "maximum": 1 },
                "mode": { "type": "string", "enum": ["hybrid", "lexical", "semantic"], "default": "hybrid" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = required_str(&params, "query")?;
        let app = match optional_str(&params, "app")? {
            Some(a) => Some(ctx.resolve_app(a)?),
            None => None,
        };
        let defaults = ctx.engine.retrieval.config();
        let top_k = optional_u64_in(&params, "top_k", 1, MAX_TOP_K)?
            .map(|n| n as usize)
            .unwrap_or(defaults.default_top_k);
        let min_score = optional_unit_f64(&params, "min_score")?.unwrap_or(defaults.default_min_score);
        let mode = match optional_str(&params, "mode")? {
            Some(m) => SearchMode::parse(m).ok_or_else(|| {
                ToolError::invalid("mode", format!("unknown mode '{}'; use hybrid, lexical or semantic", m))
            })?,
            None => SearchMode::Hybrid,
        };

        let response = ctx
            .engine
            .retrieval
            .search(&SearchRequest {
                query: query.to_string(),
                app,
                top_k,
                min_score,
                mode,
            })
            .await?;
        Ok(serde_json::to_value(response)?)
    }
}

pub struct InvalidateIndexTool;

#[async_trait]
impl Tool for InvalidateIndexTool {
    fn name(&self) -> &str {
        "invalidate_index"
    }

    fn description(&self) -> &str {
        "Drop a project's lexical index so the next search rebuilds it"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "app": { "type": "string" } },
            "required": ["app"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let app = ctx.resolve(required_str(&params, "app")?)?;
        let invalidated = ctx.engine.retrieval.invalidate(&app);
        Ok(json!({ "app": app, "invalidated": invalidated }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry of callable tools.
///
/// ```rust
/// use workspace_mcp::traits::ToolRegistry;
///
/// let tools = ToolRegistry::with_builtins();
/// assert!(tools.find("search_semantic").is_some());
/// ```
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ListRootsTool));
        registry.register(Box::new(ListAppsTool));
        registry.register(Box::new(FindAppTool));
        registry.register(Box::new(BootstrapTool));
        registry.register(Box::new(ListEntrypointsTool));
        registry.register(Box::new(TestsForTool));
        registry.register(Box::new(DescribeSymbolTool));
        registry.register(Box::new(OwnersTool));
        registry.register(Box::new(SearchSemanticTool));
        registry.register(Box::new(InvalidateIndexTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Look up and run `name`. `params` of `null` is treated as `{}`.
    pub async fn call(&self, name: &str, params: Value, ctx: &ToolContext) -> Result<Value> {
        let tool = self
            .find(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let params = match params {
            Value::Null => json!({}),
            Value::Object(_) => params,
            _ => return Err(ToolError::invalid("arguments", "expected a JSON object").into()),
        };
        tool.execute(params, ctx).await
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_have_unique_names_and_object_schemas() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.len(), 10);
        let mut names: Vec<&str> = registry.tools().iter().map(|t| t.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 10);
        for tool in registry.tools() {
            assert_eq!(tool.parameters_schema()["type"], "object", "{}", tool.name());
        }
    }

    #[test]
    fn test_argument_helpers() {
        let params = json!({ "q": "  ", "n": 7, "f": 1.5, "b": "yes" });
        assert!(matches!(
            required_str(&params, "q"),
            Err(ToolError::MissingArgument("q"))
        ));
        assert_eq!(optional_u64_in(&params, "n", 1, 50).unwrap(), Some(7));
        assert!(optional_u64_in(&params, "n", 1, 5).is_err());
        assert!(optional_unit_f64(&params, "f").is_err());
        assert!(optional_bool(&params, "b").is_err());
        assert_eq!(optional_str(&params, "missing").unwrap(), None);
    }
}
