//! Append-only telemetry log.
//!
//! One JSON object per line: `{"t": <RFC 3339>, "type": <event>, ...}`.
//! Every event is also emitted through `tracing`. Write failures are logged
//! and otherwise ignored.

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct Telemetry {
    path: Option<PathBuf>,
    lock: Mutex<()>,
}

impl Telemetry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            lock: Mutex::new(()),
        }
    }

    /// Telemetry that only goes to `tracing`.
    pub fn disabled() -> Self {
        Self {
            path: None,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn job_error(&self, app: &Path, error: &anyhow::Error) {
        tracing::warn!(app = %app.display(), error = %format!("{:#}", error), "job failed");
        self.record(
            "job_error",
            json!({ "app": app, "error": format!("{:#}", error) }),
        );
    }

    pub fn job_done(&self, app: &Path, source: &str, elapsed_ms: u128) {
        tracing::info!(app = %app.display(), source, elapsed_ms = elapsed_ms as u64, "capsule built");
        self.record(
            "job_done",
            json!({ "app": app, "source": source, "elapsed_ms": elapsed_ms as u64 }),
        );
    }

    pub fn low_confidence(&self, query: &str, app: &Path, max_score: f64) {
        tracing::info!(app = %app.display(), query, max_score, "low-confidence search");
        self.record(
            "low_confidence",
            json!({ "query": query, "app": app, "max_score": max_score }),
        );
    }

    fn record(&self, kind: &str, fields: Value) {
        let Some(path) = &self.path else {
            return;
        };
        let mut line = Map::new();
        line.insert("t".to_string(), json!(Utc::now().to_rfc3339()));
        line.insert("type".to_string(), json!(kind));
        if let Value::Object(extra) = fields {
            line.extend(extra);
        }

        let _guard = match self.lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = append_line(path, &Value::Object(line)) {
            tracing::warn!(path = %path.display(), error = %e, "telemetry write failed");
        }
    }
}

fn append_line(path: &Path, value: &Value) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(f, "{}", value)
}
