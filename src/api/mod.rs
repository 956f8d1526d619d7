//! Access to the spreadsheet backend.
//!
//! The `Sheet` trait is the seam between the sync engine and Google Sheets. `GoogleSheet` talks
//! to the real API; `TestSheet` keeps an in-memory grid so the whole service can run, and be
//! tested, without Google.

mod oauth;
mod sheet;
mod sheet_test_client;
mod timed;

use crate::error::Res;
use crate::Config;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub(crate) use oauth::TokenProvider;
pub use sheet_test_client::{TestSheet, TestSheetState};
pub use timed::TimedSheet;

/// Scopes requested for the service account. `drive.readonly` is needed for the file version
/// that serves as the change fingerprint.
const OAUTH_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive.readonly",
];

/// When this variable is set and non-empty, the in-memory `TestSheet` is used instead of Google.
const TEST_MODE_ENV: &str = "SHEET_SYNC_IN_TEST_MODE";

/// Whether to talk to Google or to the in-memory test sheet.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Google,
    Test,
}

serde_plain::derive_display_from_serialize!(Mode);

impl Mode {
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(v) if !v.is_empty() => Mode::Test,
            _ => Mode::Google,
        }
    }
}

/// The values of a range together with the document's version tag at the time of the read.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SheetSnapshot {
    /// Rows of cell values. The first row is normally a header.
    pub values: Vec<Vec<String>>,
    /// An opaque fingerprint that changes whenever the document changes.
    pub version_tag: String,
}

/// Operations on a single spreadsheet document. Range strings are A1 notation and are passed
/// through unvalidated; a malformed range fails with whatever the backend reports.
#[async_trait::async_trait]
pub trait Sheet: Send + Sync {
    /// Reads the values in `range` along with the current version tag.
    async fn read_range(&self, range: &str) -> Res<SheetSnapshot>;

    /// Reads only the document's version tag.
    async fn version_tag(&self) -> Res<String>;

    /// Appends `rows` after the last non-empty row of the table found at `range`. Cells are
    /// stored as given: strings stay text and numbers stay numbers. Nothing is parsed as a
    /// formula.
    async fn append_rows(&self, range: &str, rows: &[Vec<Value>]) -> Res<Value>;

    /// Writes `rows` into `range`, starting at its top-left cell. Cells are stored as given, as
    /// for `append_rows`.
    async fn overwrite_range(&self, range: &str, rows: &[Vec<Value>]) -> Res<Value>;

    /// Blanks every cell in `range`.
    async fn clear_range(&self, range: &str) -> Res<Value>;
}

/// Creates the `Sheet` for `mode`. In `Mode::Google` this loads the service account credential,
/// which is then shared read-only by every caller for the life of the process.
pub(crate) async fn sheet(config: &Config, mode: Mode) -> Res<Arc<dyn Sheet>> {
    match mode {
        Mode::Google => {
            let token_provider = TokenProvider::load(config.service_account()).await?;
            let google = sheet::GoogleSheet::new(
                config.spreadsheet_id(),
                token_provider,
                config.sheet_timeout(),
            )?;
            Ok(Arc::new(google))
        }
        Mode::Test => Ok(Arc::new(TestSheet::seeded(config.default_sheet())?)),
    }
}
