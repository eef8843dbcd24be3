// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `manifold chat` command implementation.
//!
//! Interactive REPL over the orchestrator with the demo backends: routed,
//! pooled, retried requests with tiered memory and document retrieval.
//! `/ingest <path>` adds a file to the vector index, `/search <query>`
//! queries memory, `/stats` dumps pool and memory counters.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use manifold_config::ManifoldConfig;
use manifold_core::{BackendFactory, ManifoldError};
use manifold_orchestrator::Orchestrator;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::demo::{DemoEmbedder, DemoFactory};

/// Cadence of the background health refresher.
const HEALTH_REFRESH_PERIOD: Duration = Duration::from_secs(60);

/// Runs the `manifold chat` interactive REPL.
///
/// Builds an orchestrator over demo factories for every enabled backend,
/// starts the health refresher, and loops on readline until `/quit`,
/// Ctrl+C, or Ctrl+D.
pub async fn run_chat(mut config: ManifoldConfig) -> Result<(), ManifoldError> {
    if config.configured_backends().is_empty() {
        // The demo backends need no credentials; default to the local one.
        println!(
            "{}",
            "no backends enabled; enabling ollama for this demo session".dimmed()
        );
        config.backends.ollama.enabled = true;
    }

    let factories: Vec<Arc<dyn BackendFactory>> = config
        .configured_backends()
        .into_iter()
        .map(|kind| Arc::new(DemoFactory::new(kind)) as Arc<dyn BackendFactory>)
        .collect();

    let orchestrator = Arc::new(Orchestrator::new(
        config,
        factories,
        Some(Arc::new(DemoEmbedder::new())),
    )?);

    let shutdown = CancellationToken::new();
    let refresher = orchestrator.spawn_health_refresher(HEALTH_REFRESH_PERIOD, shutdown.clone());

    let mut rl = DefaultEditor::new()
        .map_err(|e| ManifoldError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", "manifold chat".bold().green());
    println!(
        "Type {} to exit, {} for commands.\n",
        "/quit".yellow(),
        "/help".yellow()
    );

    let prompt = format!("{}> ", "manifold".green());
    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed == "/quit" || trimmed == "/exit" {
                    break;
                }
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);

                if let Err(e) = handle_line(&orchestrator, trimmed).await {
                    eprintln!("{}: {e}", "error".red());
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        }
    }

    shutdown.cancel();
    let _ = refresher.await;
    orchestrator.shutdown().await;
    info!("chat session ended");

    println!("{}", "goodbye".dimmed());
    Ok(())
}

/// Dispatches one REPL line: slash commands or a chat turn.
async fn handle_line(orchestrator: &Orchestrator, input: &str) -> Result<(), ManifoldError> {
    if let Some(path) = input.strip_prefix("/ingest ") {
        return ingest_file(orchestrator, path.trim()).await;
    }
    if let Some(query) = input.strip_prefix("/search ") {
        return search_memory(orchestrator, query.trim()).await;
    }
    if input == "/stats" {
        return print_stats(orchestrator).await;
    }
    if input == "/help" {
        print_help();
        return Ok(());
    }
    if input.starts_with('/') {
        eprintln!("{}: unknown command {input}", "error".red());
        print_help();
        return Ok(());
    }

    let outcome = orchestrator.chat(input).await?;
    println!("{}", outcome.response.content);
    println!(
        "{}",
        format!(
            "({} {} | {} tokens | {}ms | ~${:.6})",
            outcome.decision.backend,
            outcome.decision.model,
            outcome.metrics.tokens.total_tokens,
            outcome.metrics.latency_ms,
            outcome.metrics.cost_usd
        )
        .dimmed()
    );
    Ok(())
}

/// Reads a file and indexes it for retrieval; markdown files keep their
/// header structure.
async fn ingest_file(orchestrator: &Orchestrator, path: &str) -> Result<(), ManifoldError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ManifoldError::InvalidInput(format!("could not read {path}: {e}")))?;
    let chunks = if path.ends_with(".md") {
        orchestrator.ingest_markdown(path, &text).await?
    } else {
        orchestrator.ingest_document(path, &text).await?
    };
    println!("{}", format!("indexed {chunks} chunks from {path}").dimmed());
    Ok(())
}

async fn search_memory(orchestrator: &Orchestrator, query: &str) -> Result<(), ManifoldError> {
    let results = orchestrator.search_memory(query).await?;
    if results.is_empty() {
        println!("{}", "no matches".dimmed());
        return Ok(());
    }
    for result in results {
        println!(
            "{} {}",
            format!("[{:?} {:.2}]", result.source, result.score).dimmed(),
            result.content
        );
    }
    Ok(())
}

async fn print_stats(orchestrator: &Orchestrator) -> Result<(), ManifoldError> {
    let memory = orchestrator.memory().stats().await?;
    println!(
        "memory: {} short-term, {} working, {} facts, {} entities, {} episodes",
        memory.short_term_messages,
        memory.working_entries,
        memory.long_term.facts,
        memory.long_term.entities,
        memory.long_term.episodes
    );
    for (kind, stats) in orchestrator.pool_stats() {
        println!(
            "pool {kind}: {} total ({} idle, {} in use), {} created, {} destroyed, {} timeouts",
            stats.total,
            stats.idle,
            stats.in_use,
            stats.created_total,
            stats.destroyed_total,
            stats.acquire_timeouts
        );
    }
    Ok(())
}

fn print_help() {
    println!("  /ingest <path>   index a file for retrieval");
    println!("  /search <query>  search the memory tiers");
    println!("  /stats           show memory and pool counters");
    println!("  /quit            exit");
}
