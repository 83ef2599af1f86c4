use std::time::Duration;

use calendar_scaler_config::helpers::{
    deserialize_duration_from_millis, deserialize_duration_from_seconds,
    serialize_duration_to_millis, serialize_duration_to_seconds,
};
use calendar_scaler_tracing::{OtelFilter, OtelFilterLevel};
use figment::providers::{Env, Format, Yaml};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_PATH: &str = "./calendar_scaler_config.yaml";

/// Where traces and metrics are exported. Absent means stdout logging only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpenTelemetryConfig {
    #[serde(default = "OpenTelemetryConfig::default_endpoint")]
    pub endpoint: String,
    #[serde(default = "OpenTelemetryConfig::default_otel_service_name")]
    pub service_name: String,
    #[serde(default = "OpenTelemetryConfig::default_otel_filters")]
    pub filters: Vec<OtelFilter>,
}

impl OpenTelemetryConfig {
    fn default_endpoint() -> String {
        "http://otel-collector:4317".to_string()
    }

    fn default_otel_service_name() -> String {
        "calendar-scaler".to_string()
    }

    fn default_otel_filters() -> Vec<OtelFilter> {
        vec![OtelFilter {
            crate_name: "calendar_scaler".to_string(),
            filter_level: OtelFilterLevel::Trace,
        }]
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScalerServiceConfig {
    #[serde(default = "ScalerServiceConfig::default_service_name")]
    pub service_name: String,
    #[serde(default = "ScalerServiceConfig::default_port")]
    pub port: u16,
    #[serde(default)]
    pub opentelemetry: Option<OpenTelemetryConfig>,
    /// Bound on opening a connection to the event store.
    #[serde(
        rename = "connect_timeout_ms",
        deserialize_with = "deserialize_duration_from_millis",
        serialize_with = "serialize_duration_to_millis",
        default = "ScalerServiceConfig::default_connect_timeout"
    )]
    pub connect_timeout: Duration,
    /// Bound on a single event query, including pagination.
    #[serde(
        rename = "query_timeout_ms",
        deserialize_with = "deserialize_duration_from_millis",
        serialize_with = "serialize_duration_to_millis",
        default = "ScalerServiceConfig::default_query_timeout"
    )]
    pub query_timeout: Duration,
    /// Overrides the DynamoDB endpoint, e.g. for DynamoDB Local. Falls back
    /// to the `DYNAMODB_ENDPOINT` environment variable.
    #[serde(default)]
    pub dynamodb_endpoint: Option<String>,
    #[serde(
        rename = "grpc_shutdown_grace_period_seconds",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds",
        default = "ScalerServiceConfig::default_grpc_shutdown_grace_period"
    )]
    pub grpc_shutdown_grace_period: Duration,
}

impl ScalerServiceConfig {
    fn default_service_name() -> String {
        "calendar-scaler".to_string()
    }

    fn default_port() -> u16 {
        6000
    }

    fn default_connect_timeout() -> Duration {
        Duration::from_secs(3)
    }

    fn default_query_timeout() -> Duration {
        Duration::from_secs(3)
    }

    fn default_grpc_shutdown_grace_period() -> Duration {
        Duration::from_secs(1)
    }
}

impl Default for ScalerServiceConfig {
    fn default() -> Self {
        Self {
            service_name: Self::default_service_name(),
            port: Self::default_port(),
            opentelemetry: None,
            connect_timeout: Self::default_connect_timeout(),
            query_timeout: Self::default_query_timeout(),
            dynamodb_endpoint: None,
            grpc_shutdown_grace_period: Self::default_grpc_shutdown_grace_period(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct RootConfig {
    #[serde(default)]
    pub calendar_scaler: ScalerServiceConfig,
}

impl RootConfig {
    /// # Description
    /// Load the config from the default location.
    /// # Panics
    /// - If the config file is not valid YAML.
    /// - If the config file or the environment contain invalid values.
    /// # Notes
    /// The default location is the current working directory, with the filename
    /// calendar_scaler_config.yaml. A missing file is not an error; every field
    /// has a default.
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// # Description
    /// Load the config from a specific location.
    /// # Notes
    /// The environment variables are prefixed with CALENDAR_SCALER_ and are uppercase,
    /// with `__` separating nested keys, e.g. `CALENDAR_SCALER_CALENDAR_SCALER__PORT`.
    /// Values in the environment variables take precedence over values in the YAML file.
    pub fn load_from_path(path: &str) -> Self {
        println!("loading config from {path}");
        if let Ok(contents) = std::fs::read_to_string(path) {
            println!(
                r#"Full config is:
================================================================================
{}
================================================================================
"#,
                contents
            );
        }
        // figment can't tell a nested key from a key containing underscores, so
        // nesting is spelled with a double underscore.
        let mut f = figment::Figment::from(
            Env::prefixed("CALENDAR_SCALER_").map(|k| k.as_str().replace("__", ".").into()),
        );
        if std::path::Path::new(path).exists() {
            f = figment::Figment::from(Yaml::file(path)).merge(f);
        }
        match f.extract() {
            Ok(config) => config,
            Err(e) => panic!("Error loading config: {}", e),
        }
    }
}
