//! Kubeless Function controller
//!
//! Main entry point. Loads the controller configuration, builds the runtime
//! registry and cluster clients, and runs one controller per managed kind
//! until a shutdown signal arrives.

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use kube::Client;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use function_controller::cluster::Cluster;
use function_controller::config::{ClusterDefaults, Config};
use function_controller::controllers::{self, Context};
use function_controller::metrics;
use function_controller::resources::Synthesizer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::parse();

    info!(namespace = %config.namespace, config = %config.config_name, "Starting Function controller");

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let (defaults, runtimes) = ClusterDefaults::load(&client, &config)
        .await
        .context("loading controller configuration")?;
    info!(runtimes = runtimes.ids().count(), "Runtime registry loaded");

    let synthesizer = Synthesizer::new(Arc::new(runtimes), Arc::new(defaults));
    let context = Arc::new(Context::new(Cluster::new(client.clone()), synthesizer));
    let cancel = CancellationToken::new();

    let metrics_handle = tokio::spawn(metrics::serve(config.metrics_port, cancel.clone()));
    info!("Metrics server starting on port {}", config.metrics_port);

    let controllers = futures::future::join3(
        controllers::run_function_controller(
            client.clone(),
            context.clone(),
            config.clone(),
            cancel.clone(),
        ),
        controllers::run_cronjob_trigger_controller(
            client.clone(),
            context.clone(),
            config.clone(),
            cancel.clone(),
        ),
        controllers::run_http_trigger_controller(client, context, config.clone(), cancel.clone()),
    );

    let shutdown = {
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("Received shutdown signal, draining in-flight work");
            cancel.cancel();
        }
    };

    tokio::join!(controllers, shutdown);

    match metrics_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Metrics server failed"),
        Err(e) => error!(error = %e, "Metrics server task panicked"),
    }

    info!("Function controller stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
