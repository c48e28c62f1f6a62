//! Outline Dump Binary
//!
//! Loads a Turtle document through the same model the editor uses and prints
//! the tree as an indented outline, followed by model statistics.
//!
//! # Usage
//!
//! ```bash
//! # Print the outline of a document
//! cargo run --bin trestle-dump -- outline.ttl
//!
//! # Print statistics as JSON instead of the outline
//! cargo run --bin trestle-dump -- outline.ttl --json
//!
//! # Normalize the document in place (sorted statements, repaired indices)
//! cargo run --bin trestle-dump -- outline.ttl --rewrite
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")
//! - `TRESTLE_BASE_URI`, `TRESTLE_WORKER_MODE`: see `TrestleConfig::from_env`

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use trestle_core::{FileGateway, Node, TrestleConfig, TrestleModel};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut path: Option<PathBuf> = None;
    let mut json = false;
    let mut rewrite = false;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--json" => json = true,
            "--rewrite" => rewrite = true,
            flag if flag.starts_with("--") => anyhow::bail!("Unknown flag {}", flag),
            _ => path = Some(PathBuf::from(arg)),
        }
    }
    let path = path.ok_or_else(|| anyhow::anyhow!("Usage: trestle-dump <file.ttl> [--json] [--rewrite]"))?;

    tracing::info!("Loading {}", path.display());

    let config = TrestleConfig {
        auto_save: false,
        ..TrestleConfig::from_env()
    };
    let model = TrestleModel::new(Arc::new(FileGateway::new(&path)), config);
    model.load().await?;

    let problems = model.verify();
    for problem in &problems {
        tracing::warn!("Consistency problem: {}", problem);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&model.stats())?);
    } else {
        let root = model
            .get_root_node()
            .ok_or_else(|| anyhow::anyhow!("Document has no root node"))?;
        print_outline(&model, &root);

        let stats = model.stats();
        println!();
        println!("{} nodes, {} assertions", stats.node_count, stats.assertion_count);
    }

    if rewrite {
        model.save().await?;
        tracing::info!("Rewrote {}", path.display());
    }

    Ok(())
}

/// Depth-first outline with an explicit stack so deep trees are fine
fn print_outline(model: &TrestleModel, root: &Node) {
    let mut stack: Vec<(String, usize)> = vec![(root.id.clone(), 0)];
    while let Some((id, depth)) = stack.pop() {
        let Some(node) = model.get_node(&id) else {
            continue;
        };
        let label = node.title.as_deref().unwrap_or("(untitled)");
        if node.is_root() {
            println!("{} [{}]", label, node.id);
        } else {
            println!("{}- {}", "  ".repeat(depth.saturating_sub(1)), label);
        }
        for child in node.children.iter().rev() {
            stack.push((child.clone(), depth + 1));
        }
    }
}
