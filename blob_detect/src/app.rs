use crate::config::Config;
use crate::handler::{HandlerOptions, ImageAnalyzer};
use crate::prediction::CustomVisionClientFactory;
use crate::server::{HttpServer, SharedState};
use crate::settings::EnvSource;
use crate::telemetry::Metrics;

use std::{error::Error, sync::Arc, time::Duration};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let style = match config.annotation.to_style() {
        Ok(style) => style,
        Err(e) => {
            tracing::error!("Failed to load annotation font: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let options = HandlerOptions {
        threshold: config.annotation.threshold,
        style,
        image_source: config.prediction.image_source,
        blob_container_url: config.prediction.blob_container_url.clone(),
    };
    let client_factory =
        CustomVisionClientFactory::new(Duration::from_secs(config.prediction.timeout_secs));
    let analyzer = ImageAnalyzer::new(Arc::new(EnvSource), Arc::new(client_factory), options);

    let metrics = match Metrics::new() {
        Ok(metrics) => Arc::new(metrics),
        Err(e) => {
            tracing::error!("Failed to initialize metrics: {:?}", e);
            return Err(e.into());
        }
    };

    let state = SharedState {
        analyzer: Arc::new(analyzer),
        metrics,
    };
    let server = HttpServer::new(state, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let _ = server_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
