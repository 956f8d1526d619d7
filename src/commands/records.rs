//! Reads and writes of the `transactions` table, and forwarding of its rows.

use crate::commands::Out;
use crate::config::ForwardConfig;
use crate::error::{Error, ErrorType, IntoResult, Res};
use crate::model::{NewRecord, Record};
use crate::sync::{CacheEntry, SyncContext};
use crate::Result;
use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Reads every row of the table, oldest first.
pub async fn view_data(ctx: &SyncContext) -> Result<Out<Vec<Record>>> {
    let rows = ctx
        .store()
        .list_all()
        .await
        .pub_result(ErrorType::Store)?;
    Ok(Out::new(format!("Read {} rows", rows.len()), rows))
}

/// Inserts one record and returns it as stored.
pub async fn insert_record(ctx: &SyncContext, record: NewRecord) -> Result<Out<Record>> {
    let stored = ctx
        .store()
        .insert(&record)
        .await
        .pub_result(ErrorType::Store)?;
    info!(
        "Inserted transaction '{}' as row {}",
        stored.transaction_id, stored.id
    );
    Ok(Out::new(format!("Inserted row {}", stored.id), stored))
}

/// The latest cached snapshot of the table. Errors if no cache refresh has succeeded yet.
pub async fn cached_data(ctx: &SyncContext) -> Result<Arc<CacheEntry>> {
    ctx.cache().get().await.ok_or_else(|| {
        Error::new(
            ErrorType::Service,
            anyhow!("The row cache has not been filled yet"),
        )
    })
}

/// Posts the rows recorded after `since` (every row when `None`) to the configured forward URL
/// as `{"data": [...]}` with the API key as a bearer token. Nothing is sent when there are no
/// such rows.
pub async fn forward_changes(
    ctx: &SyncContext,
    since: Option<DateTime<Utc>>,
) -> Result<Out<Value>> {
    let forward = ctx.config().forward().ok_or_else(|| {
        Error::new(
            ErrorType::Config,
            anyhow!("No forward URL is configured, set PARABOLA_URL and PARABOLA_API_KEY"),
        )
    })?;

    let rows = match since {
        Some(since) => ctx.store().list_since(since).await,
        None => ctx.store().list_all().await,
    }
    .pub_result(ErrorType::Store)?;
    if rows.is_empty() {
        debug!("No rows recorded since {since:?}");
        return Ok(Out::new_message("No new changes to send."));
    }

    let response = post_rows(ctx.http(), forward, &rows)
        .await
        .pub_result(ErrorType::Service)?;
    info!("Forwarded {} rows to {}", rows.len(), forward.url);
    Ok(Out::new("Data successfully sent to Parabola.", response))
}

async fn post_rows(client: &reqwest::Client, forward: &ForwardConfig, rows: &[Record]) -> Res<Value> {
    let response = client
        .post(forward.url.clone())
        .bearer_auth(&forward.api_key)
        .json(&json!({ "data": rows }))
        .send()
        .await
        .with_context(|| format!("Unable to reach {}", forward.url))?
        .error_for_status()
        .with_context(|| format!("{} rejected the rows", forward.url))?;
    let text = response
        .text()
        .await
        .context("Unable to read the forward response")?;
    Ok(serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text)))
}
