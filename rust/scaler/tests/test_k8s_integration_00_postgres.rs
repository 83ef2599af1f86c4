//! Requires a PostgreSQL server. Connection settings come from `PGHOST`,
//! `PGPORT`, `PGUSER`, `PGDATABASE` and `POSTGRES_PASSWORD`, defaulting to a
//! local `postgres`/`postgres` superuser.

use std::collections::HashMap;
use std::time::Duration;

use calendar_scaler::backend::BackendFactory;
use calendar_scaler_types::{Decision, ScaledObject};
use chrono::{DateTime, Utc};
use sqlx::{Connection, PgConnection};

const PASSWORD_ENV: &str = "POSTGRES_PASSWORD";

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

async fn connect() -> PgConnection {
    if std::env::var(PASSWORD_ENV).is_err() {
        std::env::set_var(PASSWORD_ENV, "postgres");
    }
    let url = format!(
        "postgres://{}:{}@{}:{}/{}",
        env_or("PGUSER", "postgres"),
        env_or(PASSWORD_ENV, "postgres"),
        env_or("PGHOST", "localhost"),
        env_or("PGPORT", "5432"),
        env_or("PGDATABASE", "postgres"),
    );
    PgConnection::connect(&url).await.unwrap()
}

/// `starts_at` is a `timestamptz` and `ends_at` a plain `timestamp`, so both
/// decoding paths are exercised.
async fn create_table(conn: &mut PgConnection, table: &str) {
    sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
        .execute(&mut *conn)
        .await
        .unwrap();
    sqlx::query(&format!(
        "CREATE TABLE {table} (
            starts_at timestamptz NOT NULL,
            ends_at timestamp NOT NULL,
            replicas integer,
            targets text
        )"
    ))
    .execute(&mut *conn)
    .await
    .unwrap();
}

async fn insert_event(
    conn: &mut PgConnection,
    table: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    replicas: Option<i32>,
    targets: Option<&str>,
) {
    sqlx::query(&format!(
        "INSERT INTO {table} (starts_at, ends_at, replicas, targets) VALUES ($1, $2, $3, $4)"
    ))
    .bind(start)
    .bind(end.naive_utc())
    .bind(replicas)
    .bind(targets)
    .execute(&mut *conn)
    .await
    .unwrap();
}

async fn drop_table(mut conn: PgConnection, table: &str) {
    sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
        .execute(&mut conn)
        .await
        .unwrap();
    conn.close().await.unwrap();
}

fn scaled_object(table: &str, name: &str, target_column: Option<&str>) -> ScaledObject {
    let mut metadata = HashMap::from([
        ("type".to_string(), "postgresql".to_string()),
        ("host".to_string(), env_or("PGHOST", "localhost")),
        ("port".to_string(), env_or("PGPORT", "5432")),
        ("username".to_string(), env_or("PGUSER", "postgres")),
        ("passwordEnv".to_string(), PASSWORD_ENV.to_string()),
        ("database".to_string(), env_or("PGDATABASE", "postgres")),
        ("table".to_string(), table.to_string()),
        ("timezone".to_string(), "UTC".to_string()),
        ("desiredReplicasColumn".to_string(), "replicas".to_string()),
        ("startColumn".to_string(), "starts_at".to_string()),
        ("endColumn".to_string(), "ends_at".to_string()),
    ]);
    if let Some(target_column) = target_column {
        metadata.insert("targetColumn".to_string(), target_column.to_string());
    }
    ScaledObject {
        name: name.to_string(),
        namespace: "tenantA".to_string(),
        scaler_metadata: metadata,
    }
}

fn factory() -> BackendFactory {
    BackendFactory::new(Duration::from_secs(3), Duration::from_secs(3), None)
}

#[tokio::test]
async fn test_k8s_integration_active_window_and_tenant_scoping() {
    let table = format!("calendar_events_scoping_{}", std::process::id());
    let mut conn = connect().await;
    create_table(&mut conn, &table).await;

    let now = Utc::now();
    let hour = chrono::Duration::hours(1);
    let (active_start, active_end) = (now - hour, now + hour);
    let (later_start, later_end) = (now + hour * 2, now + hour * 3);
    let tenant_a = Some("tenantA/obj1");
    let tenant_b = Some("tenantB/obj2");
    insert_event(&mut conn, &table, active_start, active_end, Some(3), tenant_a).await;
    insert_event(&mut conn, &table, active_start, active_end, Some(5), tenant_b).await;
    insert_event(&mut conn, &table, later_start, later_end, Some(9), tenant_a).await;

    let events = factory()
        .get_events(&scaled_object(&table, "obj1", Some("targets")))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].desired_replicas, 3);

    let events = factory()
        .get_events(&scaled_object(&table, "obj1", None))
        .await
        .unwrap();
    assert_eq!(
        Decision::from_events(&events),
        Decision {
            is_active: true,
            desired_replicas: 5
        }
    );

    drop_table(conn, &table).await;
}

#[tokio::test]
async fn test_k8s_integration_no_active_events() {
    let table = format!("calendar_events_idle_{}", std::process::id());
    let mut conn = connect().await;
    create_table(&mut conn, &table).await;

    let now = Utc::now();
    let hour = chrono::Duration::hours(1);
    insert_event(&mut conn, &table, now - hour * 3, now - hour * 2, Some(4), None).await;

    let events = factory()
        .get_events(&scaled_object(&table, "obj1", None))
        .await
        .unwrap();
    assert_eq!(Decision::from_events(&events), Decision::default());

    drop_table(conn, &table).await;
}

#[tokio::test]
async fn test_k8s_integration_undecodable_row_is_skipped() {
    let table = format!("calendar_events_skip_{}", std::process::id());
    let mut conn = connect().await;
    create_table(&mut conn, &table).await;

    let now = Utc::now();
    let hour = chrono::Duration::hours(1);
    insert_event(&mut conn, &table, now - hour, now + hour, None, None).await;
    insert_event(&mut conn, &table, now - hour, now + hour, Some(2), None).await;

    let events = factory()
        .get_events(&scaled_object(&table, "obj1", None))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].desired_replicas, 2);

    drop_table(conn, &table).await;
}
