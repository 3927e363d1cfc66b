use std::sync::Arc;

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use plant_monitor_dashboard::{
    api::{self, AppState},
    config::Config,
    control::MqttPublisher,
    sensors::SensorService,
    supabase::{RecordSource, SupabaseClient, Unconfigured},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent; env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    // Missing credentials disable the affected sections, not the server.
    let source: Arc<dyn RecordSource> = match SupabaseClient::new(&config.supabase) {
        Ok(client) => {
            info!(url = %config.supabase.url, "Supabase client ready");
            Arc::new(client)
        }
        Err(e) => {
            warn!(error = %e, "Supabase unavailable, dashboard sections will show the error");
            Arc::new(Unconfigured::new(&e))
        }
    };
    if let Err(e) = config.mqtt.validate() {
        warn!(error = %e, "Pump control unavailable until MQTT settings are provided");
    }

    let state = AppState {
        sensors: SensorService::new(source, config.dashboard.clone()),
        pump: Arc::new(MqttPublisher::new(config.mqtt.clone())),
    };

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
