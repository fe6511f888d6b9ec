#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;
mod catalog;
mod generate;
mod read;

use anyhow::Context;
use args::{Args, Command};
use clap::Parser;
use tales_client::TalesClient;
use tales_config::{Config, ServerConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load_or_default(&args.config)?;
    if let Some(base_url) = args.base_url {
        config.server.base_url = base_url;
    }

    // Initialize telemetry
    let _telemetry_guard = tales_telemetry::init(&config.telemetry, args.log.as_deref())?;

    tracing::info!(
        config_path = %args.config.display(),
        base_url = %config.server.base_url,
        "starting audiotales"
    );

    let client = build_client(&config.server)?;

    // Set up graceful shutdown
    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    match args.command {
        Command::Generate { prompt, pages, path } => {
            generate::run(&client, &config.generation, prompt, pages, path, &shutdown).await?;
        }
        Command::Read {
            title,
            page,
            voice,
            speed,
        } => {
            let options = read::ReadOptions {
                title,
                page,
                voice,
                speed,
            };
            read::run(client, &config.playback, options, shutdown).await?;
        }
        Command::Stories => catalog::stories(&client).await?,
        Command::Voices => catalog::voices(&client).await?,
    }

    Ok(())
}

fn build_client(server: &ServerConfig) -> anyhow::Result<TalesClient> {
    let client = TalesClient::from_url(server.base_url.clone())
        .context("invalid server configuration")?
        .with_retries(server.retries, server.retry_delay()?)
        .with_request_timeout(server.request_timeout()?);

    Ok(client)
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
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
                tracing::error!("failed to install SIGTERM handler: {e}");
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
