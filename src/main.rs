use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use summarizer::api::job_routes;
use summarizer::config::ServiceConfig;
use summarizer::jobs::{CoordinatorConfig, JobCoordinator, JobStore, spawn_cleanup_task};
use summarizer::llm::create_provider;
use summarizer::summarize::{LlmSummarizer, SummarizerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("📝 Summarizer v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({})", config.llm.model, config.llm.backend);
    eprintln!(
        "   Workers: {} (queue: {})",
        config.max_workers,
        config
            .max_queue_depth
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unbounded".to_string())
    );
    eprintln!("   Uploads: {}", config.upload_dir.display());
    eprintln!("   API: http://0.0.0.0:{}/api/jobs\n", config.port);

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("creating upload dir {}", config.upload_dir.display()))?;

    // ── Summarizer ──────────────────────────────────────────────────────
    let llm = create_provider(&config.llm)?;
    let summarizer = Arc::new(LlmSummarizer::new(
        llm,
        SummarizerConfig {
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        },
    ));

    // ── Jobs ────────────────────────────────────────────────────────────
    let coordinator = Arc::new(JobCoordinator::new(
        Arc::new(JobStore::new()),
        summarizer,
        CoordinatorConfig {
            max_workers: config.max_workers,
            max_queue_depth: config.max_queue_depth,
            supported_extensions: config.supported_extensions.clone(),
        },
    ));
    let cleanup_handle = spawn_cleanup_task(
        Arc::clone(&coordinator),
        config.cleanup_interval,
        config.retention_hours,
    );

    // ── HTTP ────────────────────────────────────────────────────────────
    let port = config.port;
    let app = job_routes(Arc::clone(&coordinator), Arc::new(config));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .with_context(|| format!("binding port {port}"))?;
    tracing::info!(port, "Job API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    cleanup_handle.abort();
    coordinator.shutdown().await;
    tracing::info!("Summarizer stopped");
    Ok(())
}

fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "summarizer.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested, draining jobs");
}
