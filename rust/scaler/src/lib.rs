use calendar_scaler_config::Configurable;

use crate::config::RootConfig;
use crate::server::ExternalScalerService;

pub mod backend;
pub mod config;
pub mod dynamodb;
pub mod metadata;
pub mod postgres;
pub mod server;

const CONFIG_PATH_ENV_VAR: &str = "CONFIG_PATH";

pub async fn entrypoint() {
    let config = match std::env::var(CONFIG_PATH_ENV_VAR) {
        Ok(config_path) => RootConfig::load_from_path(&config_path),
        Err(_) => RootConfig::load(),
    };
    let config = config.calendar_scaler;
    if let Some(otel_config) = &config.opentelemetry {
        eprintln!("enabling tracing");
        calendar_scaler_tracing::init_otel_tracing(
            &otel_config.service_name,
            &otel_config.filters,
            &otel_config.endpoint,
        );
    } else {
        calendar_scaler_tracing::init_stdout_tracing(&[]);
    }

    let scaler = match ExternalScalerService::try_from_config(&config).await {
        Ok(scaler) => scaler,
        Err(err) => {
            tracing::error!("Failed to create calendar scaler: {:?}", err);
            return;
        }
    };

    let server_join_handle = tokio::spawn(async move {
        if let Err(err) = scaler.run().await {
            tracing::error!("Server terminated with error: {:?}", err);
        }
    });

    if let Err(err) = server_join_handle.await {
        tracing::error!("Error terminating server: {:?}", err);
    }
}
