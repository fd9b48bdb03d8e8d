//! `story-engine-node` - the process that hosts the service-dispatch core.
//!
//! Wires together logging, the internal service registry, an inbound HTTP
//! surface for the subscription broker's callbacks, and graceful shutdown.
//! Story tree construction, application/user persistence, and container
//! orchestration are out of scope - this binary only proves the dispatch
//! core out with the narrowest possible surface around it.

mod internal_services;
mod server;

use std::sync::Arc;

use allframe_core::shutdown::GracefulShutdown;
use clap::Parser;
use story_engine_core::prelude::*;

/// `story-engine-node` command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "story-engine-node")]
#[command(about = "Service-dispatch node for the story execution engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Port the inbound event endpoint listens on. Overrides `ENGINE_PORT`.
    #[arg(long)]
    port: Option<u16>,
    /// Port metrics are exposed on. Overrides `METRICS_PORT`.
    #[arg(long = "metrics-port")]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::from_env();
    if let Some(port) = cli.port {
        config.engine_port = port;
    }
    if let Some(metrics_port) = cli.metrics_port {
        config.metrics_port = metrics_port;
    }

    let registry = Arc::new(InternalServiceRegistry::new());
    internal_services::register_all(&registry);
    for (service, commands) in registry.list() {
        tracing::info!(service = %service, commands = ?commands, "discovered internal service");
    }

    let containers: Arc<dyn ContainerManager> = Arc::new(MockContainerManager::new());
    let dispatcher = Arc::new(Dispatcher::new(registry.clone(), containers)?);

    let shutdown = Arc::new(GracefulShutdown::new());
    let bind_addr = format!("0.0.0.0:{}", config.engine_port);
    let metrics_bind_addr = format!("0.0.0.0:{}", config.metrics_port);

    tracing::info!(%bind_addr, %metrics_bind_addr, "starting story-engine-node");

    let shutdown_waiter = shutdown.clone();
    tokio::spawn(async move {
        let signal = shutdown_waiter.wait().await;
        tracing::info!(%signal, "shutdown signal received");
    });

    let metrics_listener = tokio::net::TcpListener::bind(&metrics_bind_addr).await?;
    let mut metrics_token = shutdown.token();
    tokio::spawn(async move {
        let result = axum::serve(metrics_listener, server::metrics_router())
            .with_graceful_shutdown(async move {
                metrics_token.cancelled().await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "metrics server exited with an error");
        }
    });

    let app = server::router(dispatcher, Arc::new(config));
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    let mut token = shutdown.token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            token.cancelled().await;
        })
        .await?;

    Ok(())
}
