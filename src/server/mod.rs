//! The HTTP surface: the sync and sheet endpoints plus the `/ws` change feed.

mod error;
mod routes;
mod ws;

use crate::error::{ErrorType, IntoResult};
use crate::sync::SyncContext;
use crate::Result;
use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Builds the router with every endpoint. Any origin may call it.
pub(crate) fn router(ctx: SyncContext) -> Router {
    Router::new()
        .merge(routes::router())
        .merge(ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Serves on the configured host and port until ctrl-c.
pub(crate) async fn run(ctx: SyncContext) -> Result<()> {
    let addr = format!("{}:{}", ctx.config().host(), ctx.config().port());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Unable to listen on {addr}"))
        .pub_result(ErrorType::Service)?;
    info!("Server listening on {addr}");

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("The server stopped unexpectedly")
        .pub_result(ErrorType::Service)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down"),
        Err(e) => tracing::error!("Unable to listen for ctrl-c, shutting down: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(
        ctx: &SyncContext,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&value).unwrap())
            }
            None => Body::empty(),
        };
        let response = router(ctx.clone())
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    fn json_body(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    fn text_body(bytes: &[u8]) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn payload() -> Value {
        json!({
            "sheetName": "Sheet1",
            "range": "A1:E3",
            "values": [
                ["Transaction ID", "Amount", "Currency", "Payment Method", "Purchase Date"],
                ["T1", "9.99", "USD", "card", "2024-01-05"],
                ["T2", "abc", "USD", "card", "2024-01-05"]
            ]
        })
    }

    #[tokio::test]
    async fn test_manual_sync() {
        let env = TestEnv::new().await;
        let ctx = env.context();
        let (status, body) = call(&ctx, Method::POST, "/manual-sync", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), json!({ "message": "No data to sync." }));

        call(&ctx, Method::POST, "/update-sheet-data", Some(payload())).await;
        let (status, body) = call(&ctx, Method::POST, "/manual-sync", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json_body(&body),
            json!({ "message": "Data successfully synced to Google Sheets." })
        );

        env.sheet().fail_next(1).await;
        let (status, body) = call(&ctx, Method::POST, "/manual-sync", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(&body),
            json!({ "message": "Failed to sync data to Google Sheets." })
        );
    }

    #[tokio::test]
    async fn test_update_sheet_data_then_view() {
        let env = TestEnv::new().await;
        let ctx = env.context();
        let (status, body) = call(&ctx, Method::POST, "/update-sheet-data", Some(payload())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text_body(&body), "Data successfully updated in the database.");

        let (status, body) = call(&ctx, Method::GET, "/view-data", None).await;
        assert_eq!(status, StatusCode::OK);
        let rows = json_body(&body);
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["transaction_id"], "T1");
        assert_eq!(rows[0]["amount"], "9.99");
        assert_eq!(rows[0]["purchase_date"], "2024-01-05");
    }

    #[tokio::test]
    async fn test_update_sheet_data_without_values() {
        let env = TestEnv::new().await;
        let (status, body) = call(
            &env.context(),
            Method::POST,
            "/update-sheet-data",
            Some(json!({ "sheetName": "Sheet1" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(text_body(&body), "Failed to process data.");
    }

    #[tokio::test]
    async fn test_cached_data() {
        let env = TestEnv::new().await;
        let ctx = env.context();
        let (status, body) = call(&ctx, Method::GET, "/parabola/get-data", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(&body),
            json!({ "message": "No data available at the moment." })
        );

        call(&ctx, Method::POST, "/update-sheet-data", Some(payload())).await;
        ctx.refresh_cache().await.unwrap();
        let (status, body) = call(&ctx, Method::GET, "/parabola/get-data", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)[0]["transaction_id"], "T1");
    }

    #[tokio::test]
    async fn test_get_sheet_data() {
        let env = TestEnv::new().await;
        let ctx = env.context();
        let (status, body) = call(&ctx, Method::GET, "/get-sheet-data", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)[1][0], "tx-0001");

        env.sheet().set_rows("Sheet1", vec![]).await;
        let (status, body) = call(&ctx, Method::GET, "/get-sheet-data", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(&body), json!({ "message": "Failed to fetch data." }));
    }

    #[tokio::test]
    async fn test_sheet_edits() {
        let env = TestEnv::new().await;
        let ctx = env.context();

        let (status, body) = call(
            &ctx,
            Method::POST,
            "/append-data",
            Some(json!({ "values": [["tx-0003", "1.00", "USD", "card", "2025-10-21"]] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["updates"]["updatedRange"], "Sheet1!A4:E4");

        let (status, _) = call(
            &ctx,
            Method::PUT,
            "/update-data",
            Some(json!({ "range": "Sheet1!B4", "values": [["2.00"]] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(env.sheet().get_state().await.sheets["Sheet1"][3][1], "2.00");

        let (status, _) = call(
            &ctx,
            Method::DELETE,
            "/clear-data",
            Some(json!({ "range": "Sheet1!A4:E4" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &ctx,
            Method::DELETE,
            "/clear-data",
            Some(json!({ "range": "Missing!A1:B2" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(text_body(&body), "Failed to clear data.");

        let (status, body) = call(
            &ctx,
            Method::PUT,
            "/update-data",
            Some(json!({ "range": "Sheet1!A1:A1", "values": [["a"], ["b"]] })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(text_body(&body), "Failed to update data.");
    }

    #[tokio::test]
    async fn test_forward_without_config() {
        let env = TestEnv::new().await;
        let (status, body) = call(
            &env.context(),
            Method::POST,
            "/send-to-parabola",
            Some(json!({ "lastCheckTime": "2024-01-01T00:00:00Z" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(&body),
            json!({ "message": "Failed to send data to Parabola." })
        );
    }

    #[tokio::test]
    async fn test_insert_transaction_and_status() {
        let env = TestEnv::new().await;
        let ctx = env.context();
        let (status, body) = call(
            &ctx,
            Method::POST,
            "/transactions",
            Some(json!({
                "transaction_id": "T7",
                "amount": 12.5,
                "currency": "GBP",
                "payment_method": "card",
                "purchase_date": "2024-07-07"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let record = json_body(&body);
        assert_eq!(record["transaction_id"], "T7");
        assert!(record["id"].as_i64().unwrap() > 0);

        let (status, body) = call(&ctx, Method::GET, "/sync-status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json_body(&body)["tasks"].is_object());
    }

    #[tokio::test]
    async fn test_bad_bodies_are_answered_with_the_route_message() {
        let env = TestEnv::new().await;
        let ctx = env.context();
        let cases = [
            (Method::DELETE, "/clear-data", "Failed to clear data."),
            (Method::POST, "/append-data", "Failed to append data."),
            (Method::PUT, "/update-data", "Failed to update data."),
            (Method::POST, "/transactions", "Failed to insert transaction."),
        ];
        for (method, uri, message) in cases {
            let (status, body) = call(&ctx, method.clone(), uri, Some(json!({}))).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{method} {uri}");
            assert_eq!(text_body(&body), message, "{method} {uri}");

            let (status, body) = call(&ctx, method.clone(), uri, None).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{method} {uri}");
            assert_eq!(text_body(&body), message, "{method} {uri}");
        }
        // Nothing reached the sheet or the store
        assert_eq!(env.sheet().get_state().await.version, 1);
        assert!(ctx.store().list_all().await.unwrap().is_empty());
    }
}
