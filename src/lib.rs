//! # workspace-mcp
//!
//! Keeps a short, durable summary (a *capsule*) for every project in a large
//! multi-project workspace and serves project lookup, capsule retrieval and
//! hybrid code search to agents over MCP.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  ┌──────────┐  ┌───────────┐
//! │ Startup  │  │ Watcher  │  │ Activity  │
//! │  roots   │  │ debounce │  │  heatmap  │
//! └────┬─────┘  └────┬─────┘  └─────┬─────┘
//!      └─────────────┼──────────────┘
//!                    ▼
//!          ┌──────────────────┐      ┌──────────────┐
//!          │ Scheduler        │─────▶│ CapsuleCache │
//!          │ queue + tokens   │ build└──────┬───────┘
//!          └──────────────────┘             │
//!                                           ▼
//!     ┌────────────┐     ┌──────────────────────────┐
//!     │ Retrieval  │◀────│ ToolRegistry             │
//!     │ BM25+embed │     │ MCP stdio / HTTP / CLI   │
//!     └────────────┘     └──────────────────────────┘
//! ```
//!
//! Pure logic (queue state, token bucket, heatmap, ranking) lives in
//! `workspace-mcp-core`; this crate owns I/O, async and the transports.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`workspace`] | Root discovery, ignore rules and the path guard |
//! | [`capsule`] | Heuristic capsule construction |
//! | [`summarize`] | External summarizer providers |
//! | [`builder`] | Capsule builds with summarizer fallback |
//! | [`cache`] | Capsule cache (memory + disk) |
//! | [`scheduler`] | Job dispatch onto tokio tasks |
//! | [`debounce`] | Per-key trailing-edge debounce |
//! | [`activity`] | Activity signals and promotion |
//! | [`watcher`] | Filesystem watcher |
//! | [`embedding`] | Embedding providers and cache |
//! | [`search`] | Retrieval orchestration |
//! | [`traits`] | Tool trait and built-in tools |
//! | [`mcp`] | MCP stdio bridge |
//! | [`server`] | HTTP tool server |

pub mod activity;
pub mod builder;
pub mod cache;
pub mod capsule;
pub mod config;
pub mod debounce;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod owners;
pub mod scheduler;
pub mod search;
pub mod server;
pub mod summarize;
pub mod telemetry;
pub mod traits;
pub mod watcher;
pub mod workspace;
