use crate::commands;
use crate::model::NewRecord;
use crate::server::error::{ApiError, OrApiError};
use crate::sync::{SheetPayload, SyncContext};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

pub(super) fn router() -> Router<SyncContext> {
    Router::new()
        .route("/manual-sync", post(manual_sync))
        .route("/parabola/get-data", get(get_cached_data))
        .route("/send-to-parabola", post(send_to_parabola))
        .route("/update-sheet-data", post(update_sheet_data))
        .route("/get-sheet-data", get(get_sheet_data))
        .route("/append-data", post(append_data))
        .route("/update-data", put(update_data))
        .route("/view-data", get(view_data))
        .route("/clear-data", delete(clear_data))
        .route("/transactions", post(insert_transaction))
        .route("/sync-status", get(sync_status))
}

#[derive(Debug, Deserialize)]
struct ForwardRequest {
    #[serde(rename = "lastCheckTime", default)]
    last_check_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ValuesRequest {
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct RangeValuesRequest {
    range: String,
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct RangeRequest {
    range: String,
}

/// Unwraps a JSON body, answering a missing or malformed one with a 500 carrying `message`.
fn take_body<T>(
    body: Result<Json<T>, JsonRejection>,
    message: &'static str,
) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|e| ApiError::BadBody {
        message,
        detail: e.body_text(),
    })
}

async fn manual_sync(State(ctx): State<SyncContext>) -> Result<Json<Value>, ApiError> {
    let out = commands::manual_sync(&ctx)
        .await
        .or_json("Failed to sync data to Google Sheets.")?;
    Ok(Json(json!({ "message": out.message() })))
}

async fn get_cached_data(State(ctx): State<SyncContext>) -> Result<Response, ApiError> {
    let entry = commands::cached_data(&ctx)
        .await
        .or_json("No data available at the moment.")?;
    Ok(Json(&entry.rows).into_response())
}

/// A missing or unreadable body forwards every row.
async fn send_to_parabola(
    State(ctx): State<SyncContext>,
    body: Option<Json<ForwardRequest>>,
) -> Result<Json<Value>, ApiError> {
    let since = body.and_then(|Json(request)| request.last_check_time);
    let out = commands::forward_changes(&ctx, since)
        .await
        .or_json("Failed to send data to Parabola.")?;
    let message = out.message().to_string();
    Ok(Json(match out.into_structure() {
        Some(response) => json!({ "message": message, "response": response }),
        None => json!({ "message": message }),
    }))
}

async fn update_sheet_data(
    State(ctx): State<SyncContext>,
    body: Result<Json<SheetPayload>, JsonRejection>,
) -> Result<String, ApiError> {
    let payload = take_body(body, "Failed to process data.")?;
    let out = commands::update_sheet_data(&ctx, payload)
        .await
        .or_text("Failed to manipulate data in the database.")?;
    Ok(out.message().to_string())
}

async fn get_sheet_data(State(ctx): State<SyncContext>) -> Result<Response, ApiError> {
    let out = commands::get_sheet_data(&ctx)
        .await
        .or_json("Failed to fetch data.")?;
    Ok(Json(out.into_structure().unwrap_or_default()).into_response())
}

async fn append_data(
    State(ctx): State<SyncContext>,
    body: Result<Json<ValuesRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = take_body(body, "Failed to append data.")?;
    let out = commands::append_data(&ctx, &request.values)
        .await
        .or_text("Failed to append data.")?;
    Ok(Json(out.into_structure().unwrap_or_default()))
}

async fn update_data(
    State(ctx): State<SyncContext>,
    body: Result<Json<RangeValuesRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = take_body(body, "Failed to update data.")?;
    let out = commands::update_data(&ctx, &request.range, &request.values)
        .await
        .or_text("Failed to update data.")?;
    Ok(Json(out.into_structure().unwrap_or_default()))
}

async fn view_data(State(ctx): State<SyncContext>) -> Result<Response, ApiError> {
    let out = commands::view_data(&ctx)
        .await
        .or_text("Error querying data")?;
    Ok(Json(out.into_structure().unwrap_or_default()).into_response())
}

async fn clear_data(
    State(ctx): State<SyncContext>,
    body: Result<Json<RangeRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = take_body(body, "Failed to clear data.")?;
    let out = commands::clear_data(&ctx, &request.range)
        .await
        .or_text("Failed to clear data.")?;
    Ok(Json(out.into_structure().unwrap_or_default()))
}

async fn insert_transaction(
    State(ctx): State<SyncContext>,
    body: Result<Json<NewRecord>, JsonRejection>,
) -> Result<Response, ApiError> {
    let record = take_body(body, "Failed to insert transaction.")?;
    let out = commands::insert_record(&ctx, record)
        .await
        .or_text("Failed to insert transaction.")?;
    Ok(Json(out.into_structure()).into_response())
}

async fn sync_status(State(ctx): State<SyncContext>) -> Response {
    let out = commands::sync_status(&ctx).await;
    Json(out.into_structure()).into_response()
}
