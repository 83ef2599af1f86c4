use std::time::Duration;

use calendar_scaler_types::Event;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use sea_query::{Alias, Expr, PostgresQueryBuilder};
use sea_query_binder::{SqlxBinder, SqlxValues};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Connection, Row};

use crate::backend::BackendError;
use crate::metadata::PostgresMetadata;

// Column positions in the select list built by `events_query`.
const START: usize = 0;
const END: usize = 1;
const REPLICAS: usize = 2;
const TARGET: usize = 3;

/// A single PostgreSQL connection opened for one request.
///
/// The session time zone is set to the trigger's time zone, so `timestamp`
/// columns are read as wall-clock time there and compare correctly against
/// the bound `timestamptz` "now".
pub struct PostgresBackend {
    metadata: PostgresMetadata,
    connection: PgConnection,
    query_timeout: Duration,
}

impl PostgresBackend {
    pub const NAME: &'static str = "postgresql";

    pub async fn connect(
        metadata: PostgresMetadata,
        connect_timeout: Duration,
        query_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let options = PgConnectOptions::new()
            .host(&metadata.host)
            .port(metadata.port)
            .username(&metadata.username)
            .password(&metadata.password)
            .database(&metadata.database)
            .options([("timezone", metadata.timezone.name())]);

        let connect = PgConnection::connect_with(&options);
        let connection = tokio::time::timeout(connect_timeout, connect)
            .await
            .map_err(|_| BackendError::Timeout {
                backend: Self::NAME,
                operation: "connect",
                after: connect_timeout,
            })?
            .map_err(|e| BackendError::PostgresConnection(e.into()))?;
        tracing::debug!(
            host = %metadata.host,
            database = %metadata.database,
            table = %metadata.table,
            "Connected to postgresql"
        );

        Ok(PostgresBackend {
            metadata,
            connection,
            query_timeout,
        })
    }

    pub async fn get_events(&mut self) -> Result<Vec<Event>, BackendError> {
        let now = Utc::now()
            .with_timezone(&self.metadata.timezone)
            .fixed_offset();
        let (sql, values) = events_query(&self.metadata, now);

        let rows = tokio::time::timeout(
            self.query_timeout,
            sqlx::query_with(&sql, values).fetch_all(&mut self.connection),
        )
        .await
        .map_err(|_| BackendError::Timeout {
            backend: Self::NAME,
            operation: "query",
            after: self.query_timeout,
        })?
        .map_err(|e| BackendError::PostgresQuery(e.into()))?;

        Ok(rows.iter().filter_map(|row| self.decode_row(row)).collect())
    }

    pub async fn close(self) {
        if let Err(err) = self.connection.close().await {
            tracing::warn!(error = %err, "Failed to close postgresql connection cleanly");
        }
    }

    /// `None` for rows outside the tenant's scope and for rows that fail to
    /// decode; the latter are logged and skipped.
    fn decode_row(&self, row: &PgRow) -> Option<Event> {
        match self.try_decode_row(row) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(
                    table = %self.metadata.table,
                    error = %err,
                    "Skipping event row that could not be decoded"
                );
                None
            }
        }
    }

    fn try_decode_row(&self, row: &PgRow) -> Result<Option<Event>, sqlx::Error> {
        let timezone = self.metadata.timezone;
        let start_time = decode_timestamp(row, START, timezone)?;
        let end_time = decode_timestamp(row, END, timezone)?;
        let desired_replicas = decode_replicas(row, REPLICAS)?;

        if self.metadata.target_column.is_some() {
            let targets: Option<String> = row.try_get(TARGET)?;
            let in_scope = targets
                .map(|targets| self.metadata.target_key.is_listed_in(&targets))
                .unwrap_or(false);
            if !in_scope {
                return Ok(None);
            }
        }

        Ok(Some(Event::new(start_time, end_time, desired_replicas)))
    }
}

/// `SELECT start, end, replicas[, target] FROM table WHERE start <= $1 AND end >= $2`
/// with both parameters bound to `now`.
pub(crate) fn events_query(
    metadata: &PostgresMetadata,
    now: DateTime<FixedOffset>,
) -> (String, SqlxValues) {
    let mut query = sea_query::Query::select();
    query.columns([
        Alias::new(&metadata.start_column),
        Alias::new(&metadata.end_column),
        Alias::new(&metadata.desired_replicas_column),
    ]);
    if let Some(target_column) = &metadata.target_column {
        query.column(Alias::new(target_column));
    }
    match metadata.table.split_once('.') {
        Some((schema, table)) => query.from((Alias::new(schema), Alias::new(table))),
        None => query.from(Alias::new(&metadata.table)),
    };
    query
        .and_where(Expr::col(Alias::new(&metadata.start_column)).lte(now))
        .and_where(Expr::col(Alias::new(&metadata.end_column)).gte(now));
    query.build_sqlx(PostgresQueryBuilder)
}

// Accepts both `timestamptz` and `timestamp` columns. The latter are wall-clock
// values in the trigger's time zone.
fn decode_timestamp(
    row: &PgRow,
    index: usize,
    timezone: Tz,
) -> Result<DateTime<Utc>, sqlx::Error> {
    if let Ok(timestamp) = row.try_get::<DateTime<Utc>, _>(index) {
        return Ok(timestamp);
    }
    let naive: NaiveDateTime = row.try_get(index)?;
    timezone
        .from_local_datetime(&naive)
        .earliest()
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .ok_or_else(|| {
            sqlx::Error::Decode(format!("{naive} does not exist in {timezone}").into())
        })
}

fn decode_replicas(row: &PgRow, index: usize) -> Result<i64, sqlx::Error> {
    row.try_get::<i32, _>(index)
        .map(i64::from)
        .or_else(|_| row.try_get::<i64, _>(index))
        .or_else(|_| row.try_get::<i16, _>(index).map(i64::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use calendar_scaler_error::ScalerError;
    use calendar_scaler_types::TargetKey;

    fn metadata(table: &str, target_column: Option<&str>) -> PostgresMetadata {
        PostgresMetadata {
            host: "127.0.0.1".to_string(),
            port: 1,
            username: "scaler".to_string(),
            password: "hunter2".to_string(),
            database: "calendar".to_string(),
            table: table.to_string(),
            timezone: chrono_tz::Asia::Tokyo,
            desired_replicas_column: "replicas".to_string(),
            start_column: "starts_at".to_string(),
            end_column: "ends_at".to_string(),
            target_column: target_column.map(str::to_string),
            target_key: TargetKey::new("tenantA", "obj1"),
        }
    }

    fn now() -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&chrono_tz::Asia::Tokyo).fixed_offset()
    }

    #[test]
    fn test_events_query_filters_on_window() {
        let (sql, values) = events_query(&metadata("events", None), now());
        assert_eq!(
            sql,
            r#"SELECT "starts_at", "ends_at", "replicas" FROM "events" WHERE "starts_at" <= $1 AND "ends_at" >= $2"#
        );
        assert_eq!(values.0 .0.len(), 2);
    }

    #[test]
    fn test_events_query_with_schema_and_target() {
        let (sql, _) = events_query(&metadata("calendar.events", Some("targets")), now());
        assert_eq!(
            sql,
            r#"SELECT "starts_at", "ends_at", "replicas", "targets" FROM "calendar"."events" WHERE "starts_at" <= $1 AND "ends_at" >= $2"#
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_fast() {
        let result = PostgresBackend::connect(
            metadata("events", None),
            Duration::from_secs(2),
            Duration::from_secs(2),
        )
        .await;
        let err = result.err().expect("nothing listens on port 1");
        assert!(matches!(
            err,
            BackendError::PostgresConnection(_) | BackendError::Timeout { .. }
        ));
        assert_eq!(err.code(), calendar_scaler_error::ErrorCodes::Internal);
    }
}
