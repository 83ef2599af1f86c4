//! Backend abstraction for the calendar scaler.
//!
//! ```text
//! ScaledObjectRef.scalerMetadata
//!          │
//!          ▼
//!   BackendFactory::open ── "type" ──► BackendType
//!          │                              │
//!          │               ┌──────────────┴──────────────┐
//!          │               ▼                             ▼
//!          │       PostgresMetadata               DynamoDbMetadata
//!          │               │                             │
//!          ▼               ▼                             ▼
//!       Backend::Postgres(PostgresBackend)   Backend::DynamoDb(DynamoDbBackend)
//!          │
//!          ▼
//!   get_events() ──► Vec<Event> ──► Decision
//! ```
//!
//! Every request opens its own backend and closes it before answering. There
//! is no pooling and nothing is shared between requests.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use calendar_scaler_config::Configurable;
use calendar_scaler_error::{ErrorCodes, ScalerError, WrappedSqlxError};
use calendar_scaler_tracing::util::Stopwatch;
use calendar_scaler_types::{Event, ScaledObject};
use opentelemetry::metrics::Histogram;
use opentelemetry::KeyValue;
use thiserror::Error;

use crate::config::ScalerServiceConfig;
use crate::dynamodb::DynamoDbBackend;
use crate::metadata::{DynamoDbMetadata, MetadataError, PostgresMetadata};
use crate::postgres::PostgresBackend;

const BACKEND_TYPE_KEY: &str = "type";
const DYNAMODB_ENDPOINT_ENV_VAR: &str = "DYNAMODB_ENDPOINT";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("unsupported backend type `{0}`")]
    UnsupportedBackend(String),
    #[error("failed to connect to postgresql: {0}")]
    PostgresConnection(#[source] WrappedSqlxError),
    #[error("postgresql query failed: {0}")]
    PostgresQuery(#[source] WrappedSqlxError),
    #[error("dynamodb scan of table `{table}` failed: {message}")]
    DynamoDbQuery { table: String, message: String },
    #[error("{operation} against {backend} timed out after {after:?}")]
    Timeout {
        backend: &'static str,
        operation: &'static str,
        after: Duration,
    },
}

impl ScalerError for BackendError {
    fn code(&self) -> ErrorCodes {
        match self {
            BackendError::Metadata(err) => err.code(),
            BackendError::UnsupportedBackend(_) => ErrorCodes::InvalidArgument,
            BackendError::PostgresConnection(_) => ErrorCodes::Internal,
            BackendError::PostgresQuery(_) => ErrorCodes::Internal,
            BackendError::DynamoDbQuery { .. } => ErrorCodes::Internal,
            BackendError::Timeout { .. } => ErrorCodes::Internal,
        }
    }

    fn should_trace_error(&self) -> bool {
        !self.code().is_client_error()
    }
}

/// The `type` tag of a trigger's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Postgres,
    DynamoDb,
}

impl FromStr for BackendType {
    type Err = BackendError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "postgresql" => Ok(BackendType::Postgres),
            "dynamodb" => Ok(BackendType::DynamoDb),
            _ => Err(BackendError::UnsupportedBackend(tag.to_string())),
        }
    }
}

/// An open connection to one event store, scoped to one request.
pub enum Backend {
    Postgres(PostgresBackend),
    DynamoDb(DynamoDbBackend),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Postgres(_) => PostgresBackend::NAME,
            Backend::DynamoDb(_) => DynamoDbBackend::NAME,
        }
    }

    /// Events whose window contains the current instant, scoped to the
    /// tenant when the metadata names a target field.
    pub async fn get_events(&mut self) -> Result<Vec<Event>, BackendError> {
        match self {
            Backend::Postgres(p) => p.get_events().await,
            Backend::DynamoDb(d) => d.get_events().await,
        }
    }

    pub async fn close(self) {
        match self {
            Backend::Postgres(p) => p.close().await,
            Backend::DynamoDb(d) => d.close(),
        }
    }
}

/// Builds a [`Backend`] from a trigger's metadata.
#[derive(Clone)]
pub struct BackendFactory {
    connect_timeout: Duration,
    query_timeout: Duration,
    dynamodb_endpoint: Option<String>,
    get_events_latency: Histogram<u64>,
}

#[async_trait]
impl Configurable<ScalerServiceConfig> for BackendFactory {
    async fn try_from_config(config: &ScalerServiceConfig) -> Result<Self, Box<dyn ScalerError>> {
        let dynamodb_endpoint = config.dynamodb_endpoint.clone().or_else(|| {
            std::env::var(DYNAMODB_ENDPOINT_ENV_VAR)
                .ok()
                .filter(|endpoint| !endpoint.trim().is_empty())
        });
        Ok(BackendFactory::new(
            config.connect_timeout,
            config.query_timeout,
            dynamodb_endpoint,
        ))
    }
}

impl BackendFactory {
    pub fn new(
        connect_timeout: Duration,
        query_timeout: Duration,
        dynamodb_endpoint: Option<String>,
    ) -> Self {
        let meter = opentelemetry::global::meter("calendar_scaler");
        Self {
            connect_timeout,
            query_timeout,
            dynamodb_endpoint,
            get_events_latency: meter
                .u64_histogram("get_events_latency")
                .with_unit("ms")
                .build(),
        }
    }

    /// Validates the metadata and opens the matching backend. The backend tag
    /// is checked before anything else, so an unknown tag never reaches a store.
    pub async fn open(&self, scaled_object: &ScaledObject) -> Result<Backend, BackendError> {
        let tag = scaled_object
            .metadata_value(BACKEND_TYPE_KEY)
            .ok_or(MetadataError::MissingField(BACKEND_TYPE_KEY))?;
        match tag.parse::<BackendType>()? {
            BackendType::Postgres => {
                let metadata = PostgresMetadata::try_from(scaled_object)?;
                let backend =
                    PostgresBackend::connect(metadata, self.connect_timeout, self.query_timeout)
                        .await?;
                Ok(Backend::Postgres(backend))
            }
            BackendType::DynamoDb => {
                let metadata = DynamoDbMetadata::try_from(scaled_object)?;
                let backend = DynamoDbBackend::connect(
                    metadata,
                    self.dynamodb_endpoint.as_deref(),
                    self.connect_timeout,
                    self.query_timeout,
                )
                .await;
                Ok(Backend::DynamoDb(backend))
            }
        }
    }

    /// Open, query, close. The backend is released on every path; when the
    /// caller drops this future mid-query the connection is dropped with it.
    pub async fn get_events(
        &self,
        scaled_object: &ScaledObject,
    ) -> Result<Vec<Event>, BackendError> {
        let mut backend = self.open(scaled_object).await?;
        let attributes = [KeyValue::new("backend", backend.name())];
        let events = {
            let _stopwatch = Stopwatch::new(&self.get_events_latency, &attributes);
            backend.get_events().await
        };
        backend.close().await;
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn scaled_object(pairs: &[(&str, &str)]) -> ScaledObject {
        ScaledObject {
            name: "obj1".to_string(),
            namespace: "tenantA".to_string(),
            scaler_metadata: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    fn factory() -> BackendFactory {
        BackendFactory::new(Duration::from_secs(1), Duration::from_secs(1), None)
    }

    #[test]
    fn test_backend_type_tags() {
        assert_eq!(
            "postgresql".parse::<BackendType>().unwrap(),
            BackendType::Postgres
        );
        assert_eq!(
            " DynamoDB ".parse::<BackendType>().unwrap(),
            BackendType::DynamoDb
        );
        let err = "mysql".parse::<BackendType>().unwrap_err();
        assert!(matches!(err, BackendError::UnsupportedBackend(ref tag) if tag == "mysql"));
        assert_eq!(err.code(), ErrorCodes::InvalidArgument);
    }

    #[tokio::test]
    async fn test_unsupported_backend_is_rejected_before_connecting() {
        // Carries valid-looking postgres metadata pointing at a port nothing
        // listens on. An attempted connection would surface as a connection error.
        let so = scaled_object(&[
            ("type", "mysql"),
            ("host", "127.0.0.1"),
            ("port", "1"),
            ("username", "scaler"),
            ("database", "calendar"),
        ]);
        let err = factory().open(&so).await.err().unwrap();
        assert!(matches!(err, BackendError::UnsupportedBackend(ref tag) if tag == "mysql"));
    }

    #[tokio::test]
    async fn test_missing_type_is_a_config_error() {
        let err = factory()
            .get_events(&scaled_object(&[("table", "events")]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::Metadata(MetadataError::MissingField("type"))
        ));
        assert_eq!(err.code(), ErrorCodes::InvalidArgument);
        assert!(!err.should_trace_error());
    }

    #[tokio::test]
    async fn test_metadata_is_validated_before_connecting() {
        let so = scaled_object(&[("type", "postgresql"), ("database", "calendar")]);
        let err = factory().open(&so).await.err().unwrap();
        assert!(matches!(
            err,
            BackendError::Metadata(MetadataError::MissingField("username"))
        ));

        let so = scaled_object(&[("type", "dynamodb"), ("table", "events")]);
        let err = factory().open(&so).await.err().unwrap();
        assert!(matches!(
            err,
            BackendError::Metadata(MetadataError::MissingField("startAttribute"))
        ));
    }

    #[test]
    fn test_store_failures_are_internal() {
        let err = BackendError::Timeout {
            backend: "dynamodb",
            operation: "scan",
            after: Duration::from_secs(3),
        };
        assert_eq!(err.code(), ErrorCodes::Internal);
        assert_eq!(err.to_string(), "scan against dynamodb timed out after 3s");

        let err = BackendError::PostgresQuery(WrappedSqlxError(sqlx::Error::RowNotFound));
        assert_eq!(err.code(), ErrorCodes::Internal);
        assert!(err.should_trace_error());
    }
}
