//! # workspace-mcp CLI
//!
//! ## Usage
//!
//! ```bash
//! workspace-mcp --config ./config/workspace-mcp.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `serve mcp` | Serve the tools over MCP stdio |
//! | `serve http` | Serve the tools over HTTP |
//! | `roots` | List discovered project roots |
//! | `apps` | List projects with a cached capsule |
//! | `search "<query>"` | Hybrid search over one project |
//! | `bootstrap <app>` | Build or show a project's capsule |
//! | `heatmap` | Show the activity heatmap and promotion candidates |
//!
//! Both `serve` modes queue every project for a capsule build at startup and
//! keep the scheduler, promotion cycle and file watcher running until Ctrl-C.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use workspace_mcp::config::load_config;
use workspace_mcp::engine::Engine;
use workspace_mcp::logging;
use workspace_mcp::mcp::{serve_stdio, McpBridge};
use workspace_mcp::server::run_server;
use workspace_mcp::traits::{ToolContext, ToolRegistry};

#[derive(Parser)]
#[command(
    name = "workspace-mcp",
    about = "Project capsules and hybrid code search for large multi-project workspaces",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/workspace-mcp.toml")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a tool server.
    Serve {
        #[arg(value_enum)]
        transport: Transport,
    },

    /// List discovered project roots.
    Roots,

    /// List projects with a cached capsule.
    Apps,

    /// Search one project's files.
    Search {
        query: String,
        /// Project root; inferred from the query when omitted.
        #[arg(long)]
        app: Option<String>,
        /// hybrid, lexical or semantic.
        #[arg(long, default_value = "hybrid")]
        mode: String,
        #[arg(long)]
        top_k: Option<u64>,
        #[arg(long)]
        min_score: Option<f64>,
    },

    /// Build or show a project's capsule.
    Bootstrap {
        app: String,
        #[arg(long)]
        intent: Option<String>,
        /// Rebuild even if a capsule is cached.
        #[arg(long)]
        force: bool,
    },

    /// Show the activity heatmap and which buckets would be promoted.
    Heatmap,
}

#[derive(Clone, Copy, ValueEnum)]
enum Transport {
    Mcp,
    Http,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = load_config(&cli.config)?;
    let engine = Engine::open(config)?;
    let ctx = ToolContext::new(Arc::clone(&engine));
    let tools = Arc::new(ToolRegistry::with_builtins());

    match cli.command {
        Commands::Serve { transport } => {
            let _background = engine.start_background()?;
            let serve = async {
                match transport {
                    Transport::Mcp => serve_stdio(McpBridge::new(ctx.clone(), Arc::clone(&tools))).await,
                    Transport::Http => run_server(&engine.config.server.bind, ctx.clone(), Arc::clone(&tools)).await,
                }
            };
            tokio::select! {
                result = serve => result?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                }
            }
        }
        Commands::Roots => {
            let result = tools.call("list_roots", json!({}), &ctx).await?;
            let roots = result["roots"].as_array().cloned().unwrap_or_default();
            if roots.is_empty() {
                println!("No project roots found under {}", engine.workspace.root().display());
            }
            for r in roots {
                println!(
                    "{:<30} {}",
                    r["name"].as_str().unwrap_or_default(),
                    r["rel"].as_str().unwrap_or_default()
                );
            }
        }
        Commands::Apps => {
            let capsules = engine.cache.list();
            if capsules.is_empty() {
                println!("No capsules cached yet. Run `bootstrap <app>` or `serve`.");
            }
            for c in capsules {
                println!("{:<30} {:.2}  {}", c.name, c.confidence, c.purpose);
            }
        }
        Commands::Search {
            query,
            app,
            mode,
            top_k,
            min_score,
        } => {
            let params = json!({
                "query": query,
                "app": app,
                "mode": mode,
                "top_k": top_k,
                "min_score": min_score,
            });
            let result = tools.call("search_semantic", params, &ctx).await?;
            println!(
                "app: {}  max_score: {:.3}",
                result["app"].as_str().unwrap_or_default(),
                result["max_score"].as_f64().unwrap_or_default()
            );
            for (i, item) in result["items"].as_array().cloned().unwrap_or_default().iter().enumerate() {
                let filled = if item["coverage_filled"].as_bool().unwrap_or(false) {
                    " (coverage)"
                } else {
                    ""
                };
                println!(
                    "{:>2}. {:.3}  {}{}",
                    i + 1,
                    item["score"].as_f64().unwrap_or_default(),
                    item["path"].as_str().unwrap_or_default(),
                    filled
                );
            }
        }
        Commands::Bootstrap { app, intent, force } => {
            let params = json!({ "app": app, "intent": intent, "force": force });
            let result = tools.call("bootstrap", params, &ctx).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Heatmap => {
            let scanner = Arc::clone(&engine.activity);
            let heatmap = tokio::task::spawn_blocking(move || scanner.build_heatmap()).await?;
            let mut rows: Vec<(&PathBuf, f64)> = heatmap.iter().collect();
            rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            for (bucket, score) in rows {
                println!("{:>8.2}  {}", score, engine.workspace.relative(bucket));
            }
            let promote = &engine.config.activity.promote;
            let promoted = heatmap.promotions(
                engine.workspace.roots(),
                promote.min_score,
                promote.max_per_root,
            );
            println!("\n{} bucket(s) at or above {:.1}:", promoted.len(), promote.min_score);
            for p in promoted {
                println!("  {}", engine.workspace.relative(&p));
            }
        }
    }

    Ok(())
}
