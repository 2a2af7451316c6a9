use std::sync::Arc;

use anyhow::Context;
use clap::ArgMatches;
use sentinel_runtime::{HttpApiConfig, HttpApiServer};

pub async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = super::load_config(matches)?;
    super::init_tracing(&config.logging);

    println!("✓ Loading model from {}", config.model.path.display());
    let coordinator = Arc::new(super::start_coordinator(&config).await?);
    let info = coordinator.runtime_info();
    println!("✓ Model loaded ({} on {})", info.backend, info.device);
    println!("→ Default reasoning mode: {}", config.detection.reasoning);

    if config.api.auth_token.is_some() {
        println!("✓ Authentication: ENABLED (Bearer token required)");
    } else if !is_loopback(&config.api.host) {
        eprintln!("\n⚠️  SECURITY WARNING: listening on {} without an API token!", config.api.host);
        eprintln!("⚠️  Set SENTINEL_API_TOKEN or api.auth_token before exposing the service\n");
    }

    let server = HttpApiServer::new(HttpApiConfig::from(&config.api), coordinator.clone());
    println!("✓ Serving on http://{}", server.address());

    let served = server.serve(shutdown_signal()).await;

    // The running request finishes; anything still queued fails fast.
    coordinator.shutdown().await;
    served.context("HTTP server failed")?;

    println!("✓ SSN Sentinel stopped");
    Ok(())
}

fn is_loopback(host: &str) -> bool {
    matches!(host, "127.0.0.1" | "::1" | "localhost")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping");
}
