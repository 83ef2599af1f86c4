//! Trigger metadata for each backend.
//!
//! KEDA hands us the `metadata` block of the ScaledObject trigger as a flat
//! string map. Each backend declares the keys it reads in a static table of
//! [`FieldSpec`]s, and [`resolve_fields`] turns the map into one value per
//! table entry, applying defaults and rejecting the first missing required key.

use std::fmt;

use calendar_scaler_error::{ErrorCodes, ScalerError};
use calendar_scaler_types::{ScaledObject, TargetKey};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("missing required metadata field `{0}`")]
    MissingField(&'static str),
    #[error("invalid value `{value}` for metadata field `{field}`")]
    InvalidField { field: &'static str, value: String },
    #[error("unknown time zone `{0}`")]
    UnknownTimeZone(String),
}

impl ScalerError for MetadataError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::InvalidArgument
    }
}

/// How a field's value is obtained from the metadata map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// The value in the map is the value.
    Literal,
    /// The value in the map names an environment variable holding the value.
    EnvIndirect,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub required: bool,
    pub default: Option<&'static str>,
    pub source: FieldSource,
}

impl FieldSpec {
    const fn required(key: &'static str) -> Self {
        FieldSpec {
            key,
            required: true,
            default: None,
            source: FieldSource::Literal,
        }
    }

    const fn optional(key: &'static str) -> Self {
        FieldSpec {
            key,
            required: false,
            default: None,
            source: FieldSource::Literal,
        }
    }

    const fn defaulted(key: &'static str, default: &'static str) -> Self {
        FieldSpec {
            key,
            required: false,
            default: Some(default),
            source: FieldSource::Literal,
        }
    }

    const fn secret_from_env(key: &'static str) -> Self {
        FieldSpec {
            key,
            required: true,
            default: None,
            source: FieldSource::EnvIndirect,
        }
    }

    fn lookup(&self, scaled_object: &ScaledObject) -> Option<String> {
        let raw = scaled_object.metadata_value(self.key)?;
        match self.source {
            FieldSource::Literal => Some(raw.to_string()),
            // Secrets are passed through untouched; only blank ones count as unset.
            FieldSource::EnvIndirect => std::env::var(raw)
                .ok()
                .filter(|value| !value.trim().is_empty()),
        }
    }
}

/// Resolves every entry of `specs` in order. Optional fields without a
/// default resolve to an empty string.
pub fn resolve_fields<const N: usize>(
    specs: &[FieldSpec; N],
    scaled_object: &ScaledObject,
) -> Result<[String; N], MetadataError> {
    let mut values: [String; N] = std::array::from_fn(|_| String::new());
    for (spec, value) in specs.iter().zip(values.iter_mut()) {
        *value = match (spec.lookup(scaled_object), spec.default) {
            (Some(found), _) => found,
            (None, Some(default)) => default.to_string(),
            (None, None) if spec.required => return Err(MetadataError::MissingField(spec.key)),
            (None, None) => String::new(),
        };
    }
    Ok(values)
}

fn parse_time_zone(value: &str) -> Result<Tz, MetadataError> {
    value
        .parse::<Tz>()
        .map_err(|_| MetadataError::UnknownTimeZone(value.to_string()))
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/////////////////////////////////////////// PostgreSQL ///////////////////////////////////////////

pub const POSTGRES_FIELDS: [FieldSpec; 11] = [
    FieldSpec::defaulted("host", "localhost"),
    FieldSpec::defaulted("port", "5432"),
    FieldSpec::required("username"),
    FieldSpec::secret_from_env("passwordEnv"),
    FieldSpec::required("database"),
    FieldSpec::required("table"),
    FieldSpec::required("timezone"),
    FieldSpec::required("desiredReplicasColumn"),
    FieldSpec::required("startColumn"),
    FieldSpec::required("endColumn"),
    FieldSpec::optional("targetColumn"),
];

#[derive(Clone)]
pub struct PostgresMetadata {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Either `table` or `schema.table`.
    pub table: String,
    pub timezone: Tz,
    pub desired_replicas_column: String,
    pub start_column: String,
    pub end_column: String,
    pub target_column: Option<String>,
    pub target_key: TargetKey,
}

impl fmt::Debug for PostgresMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresMetadata")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("table", &self.table)
            .field("timezone", &self.timezone)
            .field("desired_replicas_column", &self.desired_replicas_column)
            .field("start_column", &self.start_column)
            .field("end_column", &self.end_column)
            .field("target_column", &self.target_column)
            .field("target_key", &self.target_key)
            .finish()
    }
}

impl TryFrom<&ScaledObject> for PostgresMetadata {
    type Error = MetadataError;

    fn try_from(scaled_object: &ScaledObject) -> Result<Self, Self::Error> {
        let [
            host,
            port,
            username,
            password,
            database,
            table,
            timezone,
            desired_replicas_column,
            start_column,
            end_column,
            target_column,
        ] = resolve_fields(&POSTGRES_FIELDS, scaled_object)?;
        let port = port
            .parse::<u16>()
            .map_err(|_| MetadataError::InvalidField {
                field: "port",
                value: port.clone(),
            })?;
        Ok(PostgresMetadata {
            host,
            port,
            username,
            password,
            database,
            table,
            timezone: parse_time_zone(&timezone)?,
            desired_replicas_column,
            start_column,
            end_column,
            target_column: non_empty(target_column),
            target_key: scaled_object.target_key(),
        })
    }
}

//////////////////////////////////////////// DynamoDB ////////////////////////////////////////////

pub const DYNAMODB_FIELDS: [FieldSpec; 7] = [
    FieldSpec::required("table"),
    FieldSpec::optional("region"),
    FieldSpec::required("startAttribute"),
    FieldSpec::required("endAttribute"),
    FieldSpec::required("desiredReplicasAttribute"),
    FieldSpec::optional("targetAttribute"),
    FieldSpec::required("timezone"),
];

#[derive(Debug, Clone)]
pub struct DynamoDbMetadata {
    pub table: String,
    /// Falls back to the SDK's region provider chain when unset.
    pub region: Option<String>,
    pub start_attribute: String,
    pub end_attribute: String,
    pub desired_replicas_attribute: String,
    pub target_attribute: Option<String>,
    pub timezone: Tz,
    pub target_key: TargetKey,
}

impl TryFrom<&ScaledObject> for DynamoDbMetadata {
    type Error = MetadataError;

    fn try_from(scaled_object: &ScaledObject) -> Result<Self, Self::Error> {
        let [
            table,
            region,
            start_attribute,
            end_attribute,
            desired_replicas_attribute,
            target_attribute,
            timezone,
        ] = resolve_fields(&DYNAMODB_FIELDS, scaled_object)?;
        Ok(DynamoDbMetadata {
            table,
            region: non_empty(region),
            start_attribute,
            end_attribute,
            desired_replicas_attribute,
            target_attribute: non_empty(target_attribute),
            timezone: parse_time_zone(&timezone)?,
            target_key: scaled_object.target_key(),
        })
    }
}
