#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;
mod commands;

use args::{Args, Command};
use clap::Parser;
use sage_config::Settings;
use sage_llm::Orchestrator;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings = Settings::load(&args.config)?;
    sage_telemetry::init(&settings.logging, args.log_filter.as_deref())?;

    tracing::debug!(config_path = %args.config.display(), "starting sage");

    let orchestrator = Orchestrator::from_settings(&settings)?;

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    match args.command {
        Command::Complete(complete) => commands::complete(&orchestrator, complete, shutdown).await,
        Command::Models { provider } => commands::models(&orchestrator, provider).await,
        Command::Validate => commands::validate(&orchestrator).await,
        Command::Providers => {
            commands::providers(&orchestrator);
            Ok(())
        }
        Command::Local { check } => commands::local(&orchestrator, check).await,
    }
}

/// Wait for `SIGINT` or `SIGTERM`
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
