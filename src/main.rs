use anyhow::Result;
use docker_monitor::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    tracing::debug!(
        url = %app_config.engine.url,
        poll_interval_secs = app_config.monitoring.poll_interval_secs,
        "Setting up docker monitor"
    );

    let connector = Arc::new(docker_repo::DockerConnector::new(app_config.request_timeout()));
    let (coordinator, rebuild_rx) =
        coordinator::Coordinator::new(connector, app_config.coordinator());
    let coordinator = Arc::new(coordinator);

    // An unreachable engine at startup is fatal.
    let listener_handle = coordinator.initialize().await?;
    if let Err(e) = coordinator.poll().await {
        tracing::warn!(error = %e, operation = "poll", "First refresh failed");
    }

    let (refresh, refresh_rx) = worker::refresh_channel();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let worker_handle = worker::spawn(
        worker::WorkerDeps {
            coordinator: coordinator.clone(),
            refresh_rx,
            rebuild_rx,
            listener: Some(listener_handle),
            shutdown_rx,
        },
        worker::WorkerConfig {
            poll_interval_secs: app_config.monitoring.poll_interval_secs,
            refresh_cooldown_ms: app_config.monitoring.refresh_cooldown_ms,
        },
    );

    let app = routes::app(coordinator, refresh);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            let _ = worker_handle.await;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
