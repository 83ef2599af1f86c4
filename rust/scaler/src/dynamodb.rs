use std::collections::HashMap;
use std::time::Duration;

use aws_config::timeout::TimeoutConfigBuilder;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use calendar_scaler_types::{Event, TargetKey};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::backend::BackendError;
use crate::metadata::DynamoDbMetadata;

type Item = HashMap<String, AttributeValue>;

const FILTER_EXPRESSION: &str = "#start <= :now AND #end >= :now";

/// A DynamoDB client built for one request. DynamoDB is reached over
/// stateless HTTP calls, so there is no session to open up front and
/// connectivity problems surface from the scan.
pub struct DynamoDbBackend {
    metadata: DynamoDbMetadata,
    client: aws_sdk_dynamodb::Client,
    query_timeout: Duration,
}

impl DynamoDbBackend {
    pub const NAME: &'static str = "dynamodb";

    pub async fn connect(
        metadata: DynamoDbMetadata,
        endpoint: Option<&str>,
        connect_timeout: Duration,
        query_timeout: Duration,
    ) -> Self {
        let timeout_config = TimeoutConfigBuilder::default()
            .connect_timeout(connect_timeout)
            .operation_timeout(query_timeout)
            .build();

        let sdk_config = aws_config::load_from_env().await;
        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
            .timeout_config(timeout_config);
        if let Some(region) = &metadata.region {
            builder = builder.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = endpoint {
            tracing::debug!(endpoint, "Using dynamodb endpoint override");
            builder = builder.endpoint_url(endpoint);
        }

        DynamoDbBackend {
            client: aws_sdk_dynamodb::Client::from_conf(builder.build()),
            metadata,
            query_timeout,
        }
    }

    pub async fn get_events(&mut self) -> Result<Vec<Event>, BackendError> {
        let now = Utc::now();
        let items = tokio::time::timeout(self.query_timeout, self.scan(now))
            .await
            .map_err(|_| BackendError::Timeout {
                backend: Self::NAME,
                operation: "scan",
                after: self.query_timeout,
            })??;
        Ok(events_from_items(items, &self.metadata, now))
    }

    pub fn close(self) {}

    /// Full scan with the window applied as a server-side filter. Timestamps
    /// are stored as RFC 3339 strings and compared lexically against `:now`,
    /// which is rendered with the trigger time zone's offset. Stored start and
    /// end times must therefore carry that same offset; an item written with
    /// another offset (e.g. `Z` under an `Asia/Tokyo` trigger) can be dropped
    /// by the filter even though its window contains now.
    async fn scan(&self, now: DateTime<Utc>) -> Result<Vec<Item>, BackendError> {
        let now = now
            .with_timezone(&self.metadata.timezone)
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut pages = self
            .client
            .scan()
            .table_name(&self.metadata.table)
            .filter_expression(FILTER_EXPRESSION)
            .expression_attribute_names("#start", &self.metadata.start_attribute)
            .expression_attribute_names("#end", &self.metadata.end_attribute)
            .expression_attribute_values(":now", AttributeValue::S(now))
            .into_paginator()
            .send();

        let mut items = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| BackendError::DynamoDbQuery {
                table: self.metadata.table.clone(),
                message: DisplayErrorContext(&err).to_string(),
            })?;
            items.extend(page.items.unwrap_or_default());
        }
        Ok(items)
    }
}

/// Turns scanned items into events. Items without parseable start and end
/// times are logged and skipped; a missing or unparseable replica count is 0.
/// The window is checked again on the parsed instants.
pub fn events_from_items(
    items: Vec<Item>,
    metadata: &DynamoDbMetadata,
    now: DateTime<Utc>,
) -> Vec<Event> {
    items
        .into_iter()
        .filter_map(|item| match event_from_item(&item, metadata) {
            Ok(event) => event,
            Err(reason) => {
                tracing::warn!(table = %metadata.table, %reason, "Skipping unparseable event item");
                None
            }
        })
        .filter(|event| event.contains(now))
        .collect()
}

fn event_from_item(item: &Item, metadata: &DynamoDbMetadata) -> Result<Option<Event>, String> {
    if let Some(target_attribute) = &metadata.target_attribute {
        if !targets_include(item.get(target_attribute), &metadata.target_key) {
            return Ok(None);
        }
    }
    let start_time = timestamp_attribute(item, &metadata.start_attribute)?;
    let end_time = timestamp_attribute(item, &metadata.end_attribute)?;
    let desired_replicas = integer_attribute(item, &metadata.desired_replicas_attribute);
    Ok(Some(Event::new(start_time, end_time, desired_replicas)))
}

fn timestamp_attribute(item: &Item, name: &str) -> Result<DateTime<Utc>, String> {
    let value = item
        .get(name)
        .ok_or_else(|| format!("attribute `{name}` is missing"))?
        .as_s()
        .map_err(|_| format!("attribute `{name}` is not a string"))?;
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| format!("attribute `{name}` is not RFC 3339 ({value:?}): {err}"))
}

fn integer_attribute(item: &Item, name: &str) -> i64 {
    item.get(name)
        .and_then(|value| value.as_n().ok())
        .and_then(|number| number.parse::<i64>().ok())
        .unwrap_or(0)
}

// Targets may be a comma separated string or a string set.
fn targets_include(value: Option<&AttributeValue>, target_key: &TargetKey) -> bool {
    match value {
        Some(AttributeValue::S(targets)) => target_key.is_listed_in(targets),
        Some(AttributeValue::Ss(targets)) => {
            targets.iter().any(|target| target_key.is_listed_in(target))
        }
        _ => false,
    }
}
