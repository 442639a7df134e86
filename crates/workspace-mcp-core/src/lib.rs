//! # Workspace MCP Core
//!
//! Pure scheduling and ranking logic for workspace-mcp: the capsule data
//! model, token bucket, priority job queue, admission state, activity
//! heatmap, path classifier, lexical index, fuzzy project matcher and the
//! hybrid fusion / coverage pipeline.
//!
//! This crate contains no tokio runtime, filesystem I/O or network
//! dependencies. Everything that touches the outside world lives in the
//! `workspace-mcp` app crate and is injected through plain values or the
//! [`embedding::Embedder`] trait.

pub mod classify;
pub mod embedding;
pub mod fuzzy;
pub mod heatmap;
pub mod lexical;
pub mod models;
pub mod queue;
pub mod rate_limit;
pub mod scheduler;
pub mod search;
