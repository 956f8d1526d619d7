//! Implements the `Sheet` trait using the `sheets::Client` to interact with a Google sheet.

use crate::api::{Sheet, SheetSnapshot, TokenProvider};
use crate::error::Res;
use anyhow::{anyhow, Context};
use serde_json::{json, Value};
use std::time::Duration;
use sheets::types::{
    BatchClearValuesRequest, DateTimeRenderOption, Dimension, ValueRenderOption,
};
use sheets::ClientError;
use tracing::trace;
use url::Url;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_FILES_API: &str = "https://www.googleapis.com/drive/v3/files";

/// Writes store cells as given. `USER_ENTERED` would parse them, turning `=...` text into
/// formulas and `1/2` into dates.
const VALUE_INPUT_OPTION: &str = "RAW";

/// Implements the `Sheet` trait against the Google Sheets and Drive APIs. Every call asks the
/// `TokenProvider` for a current access token.
pub(super) struct GoogleSheet {
    spreadsheet_id: String,
    token_provider: TokenProvider,
    http: reqwest::Client,
}

impl GoogleSheet {
    /// `timeout` bounds each request made with reqwest directly, from connect to end of body.
    pub(super) fn new(
        spreadsheet_id: &str,
        token_provider: TokenProvider,
        timeout: Duration,
    ) -> Res<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Unable to build the HTTP client")?;
        Ok(Self {
            spreadsheet_id: spreadsheet_id.to_string(),
            token_provider,
            http,
        })
    }

    /// Creates a sheets client carrying a fresh access token.
    async fn client(&self) -> Res<sheets::Client> {
        let access_token = self.token_provider.token().await?;

        // The sheets crate wants OAuth app settings too, but API calls only use the token
        Ok(sheets::Client::new(
            String::new(),
            String::new(),
            String::new(),
            access_token,
            String::new(),
        ))
    }


    /// Sends `request` with the bearer token and returns the JSON body of a successful response.
    async fn send_json(&self, request: reqwest::RequestBuilder, what: &str) -> Res<Value> {
        let token = self.token_provider.token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("Failed to send {what} request"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            anyhow::bail!("{what} failed with status {status}: {body}");
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {what} response"))
    }
}

#[async_trait::async_trait]
impl Sheet for GoogleSheet {
    async fn read_range(&self, range: &str) -> Res<SheetSnapshot> {
        trace!("read_range {range}");
        // Take the tag first: if the document changes mid-read, the next poll sees it again
        let version_tag = self.version_tag().await?;
        let response = self
            .client()
            .await?
            .spreadsheets()
            .values_get(
                &self.spreadsheet_id,
                range,
                DateTimeRenderOption::FormattedString,
                Dimension::Rows,
                ValueRenderOption::FormattedValue,
            )
            .await
            .map_err(map_client_error)
            .with_context(|| format!("Failed to read range {range}"))?;
        Ok(SheetSnapshot {
            values: response.body.values,
            version_tag,
        })
    }

    async fn version_tag(&self) -> Res<String> {
        let mut url = Url::parse(DRIVE_FILES_API).context("Invalid Drive API base URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Drive API base URL cannot take path segments"))?
            .push(&self.spreadsheet_id);
        url.query_pairs_mut()
            .append_pair("fields", "version")
            .append_pair("supportsAllDrives", "true");

        let body = self
            .send_json(self.http.get(url), "Drive file version")
            .await?;

        // Drive encodes the int64 version as a string
        let version = body.get("version").context("Drive response missing 'version'")?;
        version
            .as_str()
            .map(str::to_string)
            .or_else(|| version.as_i64().map(|n| n.to_string()))
            .context("Drive 'version' field has an unexpected type")
    }

    async fn append_rows(&self, range: &str, rows: &[Vec<Value>]) -> Res<Value> {
        trace!("append_rows {range}, {} rows", rows.len());
        let mut url = spreadsheet_url(
            &self.spreadsheet_id,
            &["values", &format!("{range}:append")],
        )?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", VALUE_INPUT_OPTION)
            .append_pair("insertDataOption", "INSERT_ROWS");

        let request = self.http.post(url).json(&append_body(rows));
        self.send_json(request, "Append").await
    }

    // The sheets crate types cells as strings, so typed writes go out as plain JSON
    async fn overwrite_range(&self, range: &str, rows: &[Vec<Value>]) -> Res<Value> {
        trace!("overwrite_range {range}, {} rows", rows.len());
        let url = spreadsheet_url(&self.spreadsheet_id, &["values:batchUpdate"])?;
        let request = self.http.post(url).json(&batch_update_body(range, rows));
        self.send_json(request, "Batch update")
            .await
            .with_context(|| format!("Failed to write range {range}"))
    }

    async fn clear_range(&self, range: &str) -> Res<Value> {
        trace!("clear_range {range}");
        let request = BatchClearValuesRequest {
            ranges: vec![range.to_string()],
        };

        let response = self
            .client()
            .await?
            .spreadsheets()
            .values_batch_clear(&self.spreadsheet_id, &request)
            .await
            .map_err(map_client_error)
            .with_context(|| format!("Failed to clear range {range}"))?;
        serde_json::to_value(&response.body).context("Unable to serialize clear response")
    }
}

/// Builds `SHEETS_API/{id}/{segments...}`, escaping each segment so ranges like
/// `'Sales Log'!A1` survive.
fn spreadsheet_url(spreadsheet_id: &str, segments: &[&str]) -> Res<Url> {
    let mut url = Url::parse(SHEETS_API).context("Invalid Sheets API base URL")?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("Sheets API base URL cannot take path segments"))?
        .push(spreadsheet_id)
        .extend(segments);
    Ok(url)
}

fn append_body(rows: &[Vec<Value>]) -> Value {
    json!({ "majorDimension": "ROWS", "values": rows })
}

fn batch_update_body(range: &str, rows: &[Vec<Value>]) -> Value {
    json!({
        "valueInputOption": VALUE_INPUT_OPTION,
        "includeValuesInResponse": false,
        "data": [{ "range": range, "majorDimension": "ROWS", "values": rows }],
    })
}

/// Names the `ClientError` variant in the context so logs show what kind of failure it was.
fn map_client_error(e: ClientError) -> anyhow::Error {
    let error_name = match &e {
        ClientError::EmptyRefreshToken => "EmptyRefreshToken".to_string(),
        ClientError::FromUtf8Error(inner) => format!("FromUtf8Error {inner}"),
        ClientError::UrlParserError(inner) => format!("UrlParserError {inner}"),
        ClientError::SerdeJsonError(inner) => format!("SerdeJsonError {inner}"),
        ClientError::ReqwestError(inner) => format!("ReqwestError {inner}"),
        ClientError::InvalidHeaderValue(inner) => format!("InvalidHeaderValue {inner}"),
        ClientError::ReqwestMiddleWareError(inner) => format!("ReqwestMiddleWareError {inner}"),
        ClientError::HttpError { .. } => "HttpError".to_string(),
        ClientError::Other(_) => "Other".to_string(),
    };
    anyhow::Error::new(e).context(error_name)
}
