//! End-to-end tests for the tool registry and the HTTP transport against a
//! temporary workspace, using deterministic embedding and summarizer fakes.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use workspace_mcp::config::Config;
use workspace_mcp::engine::Engine;
use workspace_mcp::error::as_tool_error;
use workspace_mcp::server::router;
use workspace_mcp::summarize::{Summarizer, SummaryOutcome, SummaryRequest};
use workspace_mcp::traits::{ToolContext, ToolRegistry};
use workspace_mcp_core::embedding::Embedder;

// ─── Fakes ──────────────────────────────────────────────────────────

/// Letter-frequency vectors: texts sharing words land close together.
struct LetterEmbedder;

#[async_trait]
impl Embedder for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; 26];
        for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
            v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
        }
        Ok(v)
    }
}

struct FixedSummarizer {
    calls: AtomicUsize,
}

#[async_trait]
impl Summarizer for FixedSummarizer {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn summarize(&self, request: &SummaryRequest) -> Result<SummaryOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SummaryOutcome {
            purpose: format!("Handles {} for the storefront", request.name),
            role: Some("service".to_string()),
            confidence: 0.9,
        })
    }
}

// ─── Fixture ────────────────────────────────────────────────────────

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

struct Harness {
    tmp: TempDir,
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
    summarizer: Arc<FixedSummarizer>,
}

impl Harness {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "CODEOWNERS", "/apps/billing/ @payments\n");
        write(
            root,
            "apps/billing/README.md",
            "# Billing\n\nComputes invoice totals and retries failed card payments.\n",
        );
        write(
            root,
            "apps/billing/src/main.ts",
            "export function main() { startServer(); }\n",
        );
        write(
            root,
            "apps/billing/src/invoice.ts",
            "export function invoiceTotal(lines) { return lines.reduce((a, l) => a + l.amount, 0); }\n",
        );
        write(
            root,
            "apps/billing/tests/invoice.test.ts",
            "test('invoice total', () => { expect(invoiceTotal([])).toBe(0); });\n",
        );
        let mut long = String::new();
        for i in 0..64 {
            long.push_str(&format!("const value{} = {};\n", i, i));
        }
        long.push_str("export function refund(amount) { return -amount; }\n");
        write(root, "apps/billing/src/refund.ts", &long);
        write(root, "apps/web/src/page.tsx", "export const Page = () => null;\n");

        let mut config = Config::for_workspace(root);
        config.workspace.app_globs = vec!["apps/*".to_string()];
        config.watch.enable = false;

        let summarizer = Arc::new(FixedSummarizer {
            calls: AtomicUsize::new(0),
        });
        let engine =
            Engine::with_providers(config, Arc::new(LetterEmbedder), summarizer.clone()).unwrap();
        Self {
            tmp,
            ctx: ToolContext::new(engine),
            tools: Arc::new(ToolRegistry::with_builtins()),
            summarizer,
        }
    }

    fn root(&self) -> &Path {
        self.tmp.path()
    }

    async fn call(&self, name: &str, params: Value) -> Result<Value> {
        self.tools.call(name, params, &self.ctx).await
    }

    async fn code_of(&self, name: &str, params: Value) -> &'static str {
        let err = self.call(name, params).await.unwrap_err();
        as_tool_error(&err)
            .unwrap_or_else(|| panic!("{} failed with an internal error: {:#}", name, err))
            .code()
    }
}

// ─── Registry ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_roots_and_find_app() {
    let h = Harness::new();
    let roots = h.call("list_roots", json!({})).await.unwrap();
    let names: Vec<&str> = roots["roots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["billing", "web"]);

    let found = h.call("find_app", json!({ "name": "billing" })).await.unwrap();
    assert_eq!(found["matches"][0]["rel"], "apps/billing");

    assert_eq!(h.code_of("find_app", json!({ "limit": 0 })).await, "bad_request");
}

#[tokio::test]
async fn test_bootstrap_uses_summarizer_and_caches() {
    let h = Harness::new();
    let capsule = h.call("bootstrap", json!({ "app": "apps/billing" })).await.unwrap();
    assert_eq!(capsule["purpose"], "Handles billing for the storefront");
    assert_eq!(capsule["role"], "service");
    assert_eq!(capsule["source"], "summarizer");
    assert_eq!(capsule["owners"], json!(["@payments"]));

    h.call("bootstrap", json!({ "app": "apps/billing" })).await.unwrap();
    assert_eq!(h.summarizer.calls.load(Ordering::SeqCst), 1);

    let apps = h.call("list_apps", json!({})).await.unwrap();
    assert_eq!(apps["apps"].as_array().unwrap().len(), 1);
    assert_eq!(apps["apps"][0]["name"], "billing");

    h.call("bootstrap", json!({ "app": "apps/billing", "force": true }))
        .await
        .unwrap();
    assert_eq!(h.summarizer.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_bootstrap_missing_app_is_not_found() {
    let h = Harness::new();
    assert_eq!(
        h.code_of("bootstrap", json!({ "app": "apps/nope" })).await,
        "not_found"
    );
    assert_eq!(h.code_of("bootstrap", json!({})).await, "bad_request");
}

#[tokio::test]
async fn test_entrypoints_and_tests() {
    let h = Harness::new();
    let billing = h.root().join("apps/billing");

    let eps = h.call("list_entrypoints", json!({ "app": "apps/billing" })).await.unwrap();
    let eps: Vec<&str> = eps["entrypoints"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p.as_str().unwrap())
        .collect();
    assert!(eps.contains(&billing.join("src/main.ts").to_str().unwrap()));

    let all = h.call("tests_for", json!({})).await.unwrap();
    let results = all["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    let billing_tests = results
        .iter()
        .find(|r| r["app"] == json!(billing))
        .unwrap();
    assert_eq!(
        billing_tests["tests"],
        json!([billing.join("tests/invoice.test.ts")])
    );
}

#[tokio::test]
async fn test_describe_symbol_reports_definitions_anywhere() {
    let h = Harness::new();
    let short = h
        .call("describe_symbol", json!({ "path": "apps/billing/src/main.ts" }))
        .await
        .unwrap();
    assert_eq!(short["line_count"], 1);
    assert_eq!(short["definitions"][0]["line"], 1);
    assert_eq!(
        short["definitions"][0]["text"],
        "export function main() { startServer(); }"
    );

    let out = h
        .call("describe_symbol", json!({ "path": "apps/billing/src/refund.ts" }))
        .await
        .unwrap();
    assert_eq!(out["head"].as_str().unwrap().lines().count(), 60);
    assert_eq!(out["definitions"][0]["line"], 65);
    assert!(out["definitions"][0]["text"]
        .as_str()
        .unwrap()
        .starts_with("export function refund"));

    assert_eq!(
        h.code_of("describe_symbol", json!({ "path": "apps/billing/src" })).await,
        "not_found"
    );
}

#[tokio::test]
async fn test_owners_defaults_to_workspace_root() {
    let h = Harness::new();
    let billing = h
        .call("owners", json!({ "path": "apps/billing/src/invoice.ts" }))
        .await
        .unwrap();
    assert_eq!(billing["owners"], json!(["@payments"]));

    let root = h.call("owners", json!({})).await.unwrap();
    assert_eq!(root["owners"], json!([]));
}

#[tokio::test]
async fn test_search_semantic_ranks_and_backfills() {
    let h = Harness::new();
    let billing = h.root().join("apps/billing");
    let out = h
        .call(
            "search_semantic",
            json!({ "query": "invoice total", "app": "apps/billing", "top_k": 5 }),
        )
        .await
        .unwrap();
    assert_eq!(out["app"], json!(billing));
    let items = out["items"].as_array().unwrap();
    assert!(!items.is_empty());
    assert!(out["max_score"].as_f64().unwrap() <= 1.0);

    let paths: Vec<&str> = items.iter().map(|i| i["path"].as_str().unwrap()).collect();
    assert!(paths.iter().any(|p| p.ends_with("invoice.test.ts")));
    assert!(paths.contains(&billing.join("src/main.ts").to_str().unwrap()));
}

#[tokio::test]
async fn test_search_semantic_argument_validation() {
    let h = Harness::new();
    assert_eq!(h.code_of("search_semantic", json!({})).await, "bad_request");
    assert_eq!(
        h.code_of("search_semantic", json!({ "query": "x", "mode": "vector" })).await,
        "bad_request"
    );
    assert_eq!(
        h.code_of("search_semantic", json!({ "query": "x", "top_k": 51 })).await,
        "bad_request"
    );
    assert_eq!(
        h.code_of("search_semantic", json!({ "query": "x", "min_score": 2 })).await,
        "bad_request"
    );
}

#[tokio::test]
async fn test_invalidate_index_after_search() {
    let h = Harness::new();
    h.call("search_semantic", json!({ "query": "page", "app": "apps/web" }))
        .await
        .unwrap();
    let first = h.call("invalidate_index", json!({ "app": "apps/web" })).await.unwrap();
    assert_eq!(first["invalidated"], true);
    let second = h.call("invalidate_index", json!({ "app": "apps/web" })).await.unwrap();
    assert_eq!(second["invalidated"], false);
}

#[tokio::test]
async fn test_every_path_argument_is_guarded() {
    let h = Harness::new();
    let cases = [
        ("bootstrap", json!({ "app": "/etc" })),
        ("list_entrypoints", json!({ "app": "../" })),
        ("tests_for", json!({ "app": "/etc" })),
        ("describe_symbol", json!({ "path": "/etc/passwd" })),
        ("owners", json!({ "path": "apps/../../outside" })),
        ("search_semantic", json!({ "query": "x", "app": "/etc" })),
        ("invalidate_index", json!({ "app": "/etc" })),
    ];
    for (tool, params) in cases {
        assert_eq!(h.code_of(tool, params).await, "outside_workspace", "{}", tool);
    }
}

#[tokio::test]
async fn test_unknown_tool() {
    let h = Harness::new();
    assert_eq!(h.code_of("delete_everything", json!({})).await, "not_found");
}

// ─── HTTP transport ─────────────────────────────────────────────────

#[tokio::test]
async fn test_http_status_mapping() {
    let h = Harness::new();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(h.ctx.clone(), h.tools.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let base = format!("http://{}", addr);
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["roots"], 2);

    let list: Value = client
        .post(format!("{}/tools/list", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["tools"].as_array().unwrap().len(), 10);

    let ok = client
        .post(format!("{}/tools/list_roots", base))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), 200);
    let ok: Value = ok.json().await.unwrap();
    assert_eq!(ok["result"]["roots"].as_array().unwrap().len(), 2);

    let outside = client
        .post(format!("{}/tools/describe_symbol", base))
        .json(&json!({ "path": "/etc/passwd" }))
        .send()
        .await
        .unwrap();
    assert_eq!(outside.status(), 400);
    let body: Value = outside.json().await.unwrap();
    assert_eq!(body["error"]["code"], "outside_workspace");

    let missing = client
        .post(format!("{}/tools/no_such_tool", base))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}
