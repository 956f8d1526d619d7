//! Runtime configuration.
//!
//! `Config` is built from the parsed command line (which has already folded in environment
//! variables and the `.env` file) and validated once, so the rest of the program can rely on it.

use crate::api::Mode;
use crate::args::{Common, ServeArgs, StoreKind};
use crate::error::{ErrorType, IntoResult, Res};
use crate::model::{Cell, Range};
use crate::Result;
use anyhow::{bail, ensure, Context};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Spreadsheet ID used when running against the in-memory sheet without one configured.
const TEST_SPREADSHEET_ID: &str = "test-spreadsheet";

/// Connection settings for a MySQL store.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MySqlSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Which store to open, and where.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StoreConfig {
    MySql(MySqlSettings),
    Sqlite { path: PathBuf },
}

/// Where new rows are forwarded by the forwarding endpoint.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ForwardConfig {
    pub url: Url,
    pub api_key: String,
}

/// How often each periodic task runs.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Periods {
    pub push: Duration,
    pub refresh: Duration,
    pub poll: Duration,
}

impl Default for Periods {
    fn default() -> Self {
        Self {
            push: Duration::from_secs(10),
            refresh: Duration::from_secs(5),
            poll: Duration::from_secs(60),
        }
    }
}

/// The validated configuration of the app.
#[derive(Debug, Clone)]
pub struct Config {
    store: StoreConfig,
    max_connections: u32,
    service_account: PathBuf,
    spreadsheet_id: String,
    default_sheet: String,
    push_anchor: Range,
    watch_range: Range,
    host: String,
    port: u16,
    periods: Periods,
    retry_delays: Vec<Duration>,
    sheet_timeout: Duration,
    forward: Option<ForwardConfig>,
}

impl Config {
    /// Builds a configuration from the arguments shared by every command. Server settings take
    /// their defaults; see `with_serve`.
    pub fn from_args(common: &Common, mode: Mode) -> Result<Self> {
        Self::build(common, mode).pub_result(ErrorType::Config)
    }

    /// Applies and validates the `serve` command's arguments.
    pub fn with_serve(self, serve: &ServeArgs) -> Result<Self> {
        self.apply_serve(serve).pub_result(ErrorType::Config)
    }

    fn build(common: &Common, mode: Mode) -> Res<Self> {
        let store_args = common.store();
        let store = match store_args.store() {
            StoreKind::Mysql => StoreConfig::MySql(MySqlSettings {
                host: store_args.db_host().to_string(),
                port: store_args.db_port(),
                user: store_args
                    .db_user()
                    .context("A MySQL user is required (--db-user or DB_USER)")?
                    .to_string(),
                password: store_args.db_password().unwrap_or_default().to_string(),
                database: store_args
                    .db_name()
                    .context("A MySQL database name is required (--db-name or DB_NAME)")?
                    .to_string(),
            }),
            StoreKind::Sqlite => StoreConfig::Sqlite {
                path: store_args.sqlite_path().to_path_buf(),
            },
        };
        ensure!(
            store_args.db_max_connections() > 0,
            "--db-max-connections must be at least 1"
        );

        let sheet = common.sheet();
        let spreadsheet_id = match (sheet.spreadsheet_id(), mode) {
            (Some(id), _) if !id.trim().is_empty() => extract_spreadsheet_id(id.trim())
                .context("Failed to extract spreadsheet ID")?
                .to_string(),
            (_, Mode::Test) => TEST_SPREADSHEET_ID.to_string(),
            (_, Mode::Google) => {
                bail!("A spreadsheet is required (--spreadsheet-id or SPREADSHEET_ID)")
            }
        };

        ensure!(
            !sheet.default_sheet().trim().is_empty(),
            "--default-sheet must not be empty"
        );

        let push_anchor: Range = sheet
            .push_anchor()
            .parse()
            .with_context(|| format!("Invalid push anchor '{}'", sheet.push_anchor()))?;
        ensure!(
            push_anchor.end.is_none() && push_anchor.start.row.is_some(),
            "The push anchor must be a single cell such as A2, got '{}'",
            sheet.push_anchor()
        );

        let watch_range: Range = sheet
            .watch_range()
            .parse()
            .with_context(|| format!("Invalid watch range '{}'", sheet.watch_range()))?;

        ensure!(
            sheet.sheet_timeout_ms() > 0,
            "--sheet-timeout-ms must be at least 1"
        );

        let serve = ServeArgs::default();
        Ok(Self {
            store,
            max_connections: store_args.db_max_connections(),
            service_account: sheet.service_account().to_path_buf(),
            spreadsheet_id,
            default_sheet: sheet.default_sheet().trim().to_string(),
            push_anchor,
            watch_range,
            host: serve.host().to_string(),
            port: serve.port(),
            periods: Periods::default(),
            retry_delays: millis(sheet.retry_delays_ms()),
            sheet_timeout: Duration::from_millis(sheet.sheet_timeout_ms()),
            forward: None,
        })
    }

    fn apply_serve(mut self, serve: &ServeArgs) -> Res<Self> {
        ensure!(
            serve.push_secs() > 0 && serve.refresh_secs() > 0 && serve.poll_secs() > 0,
            "Task periods must be at least one second"
        );
        self.host = serve.host().to_string();
        self.port = serve.port();
        self.periods = Periods {
            push: Duration::from_secs(serve.push_secs()),
            refresh: Duration::from_secs(serve.refresh_secs()),
            poll: Duration::from_secs(serve.poll_secs()),
        };
        self.forward = match (serve.forward_url(), serve.forward_key()) {
            (None, _) => None,
            (Some(url), Some(key)) => Some(ForwardConfig {
                url: Url::parse(url).with_context(|| format!("Invalid forward URL '{url}'"))?,
                api_key: key.to_string(),
            }),
            (Some(_), None) => {
                bail!("A forward URL was given without a key (--forward-key or PARABOLA_API_KEY)")
            }
        };
        Ok(self)
    }

    pub fn store(&self) -> &StoreConfig {
        &self.store
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    pub fn service_account(&self) -> &Path {
        &self.service_account
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn default_sheet(&self) -> &str {
        &self.default_sheet
    }

    /// The cell that the first pushed row is written to.
    pub fn push_anchor(&self) -> &Range {
        &self.push_anchor
    }

    pub fn watch_range(&self) -> &Range {
        &self.watch_range
    }

    /// The range that `append-data` appends at.
    pub fn append_range(&self) -> Range {
        Range {
            sheet: Some(self.default_sheet.clone()),
            start: Cell::new(0, 0),
            end: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn periods(&self) -> Periods {
        self.periods
    }

    /// The delays between retries of a failed sheet call, used by the periodic tasks and the
    /// one-shot sync commands.
    pub fn retry_delays(&self) -> &[Duration] {
        &self.retry_delays
    }

    /// How long a single sheet call may take.
    pub fn sheet_timeout(&self) -> Duration {
        self.sheet_timeout
    }

    pub fn forward(&self) -> Option<&ForwardConfig> {
        self.forward.as_ref()
    }
}

fn millis(values: &[u64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_millis).collect()
}

/// Extracts the spreadsheet ID from a Google Sheets URL. A value without slashes is taken to be
/// the ID itself.
///
/// # Arguments
/// * `url` - The Google Sheets URL (e.g., "https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/...")
fn extract_spreadsheet_id(url: &str) -> Res<&str> {
    if !url.contains('/') {
        return Ok(url);
    }

    // URL format: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/...
    // or: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID?foo=bar
    let parts: Vec<&str> = url.split('/').collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "d" && i + 1 < parts.len() {
            // Extract the ID and remove any query parameters or fragments
            let id_part = parts[i + 1];
            let id = id_part
                .split('?')
                .next()
                .unwrap_or(id_part)
                .split('#')
                .next()
                .unwrap_or(id_part);
            return Ok(id);
        }
    }
    Err(anyhow::anyhow!(
        "Invalid Google Sheets URL format. Expected: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{SheetArgs, StoreArgs};
    use clap::Parser;
    use tracing_subscriber::filter::LevelFilter;

    fn sqlite_common(spreadsheet_id: Option<&str>) -> Common {
        Common::new(
            LevelFilter::INFO,
            StoreArgs::sqlite("/tmp/test.sqlite"),
            SheetArgs::new(spreadsheet_id.map(str::to_string)),
        )
    }

    #[test]
    fn test_from_args_defaults() {
        let config = Config::from_args(&sqlite_common(Some("ABC123")), Mode::Google).unwrap();
        assert_eq!(config.spreadsheet_id(), "ABC123");
        assert_eq!(config.push_anchor().to_string(), "A2");
        assert_eq!(config.watch_range().to_string(), "A1:T502");
        assert_eq!(config.append_range().to_string(), "Sheet1!A1");
        assert_eq!(config.periods(), Periods::default());
        assert_eq!(
            config.retry_delays(),
            &[
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_millis(1000)
            ]
        );
        assert_eq!(config.sheet_timeout(), Duration::from_secs(30));
        assert!(config.forward().is_none());
        assert_eq!(
            config.store(),
            &StoreConfig::Sqlite {
                path: PathBuf::from("/tmp/test.sqlite")
            }
        );
    }

    #[test]
    fn test_spreadsheet_required_outside_test_mode() {
        let err = Config::from_args(&sqlite_common(None), Mode::Google).unwrap_err();
        assert_eq!(err.kind(), ErrorType::Config);
        let config = Config::from_args(&sqlite_common(None), Mode::Test).unwrap();
        assert_eq!(config.spreadsheet_id(), TEST_SPREADSHEET_ID);
    }

    #[test]
    fn test_mysql_requires_user_and_database() {
        let no_user = StoreArgs::mysql("localhost", None, Some("db"));
        let common = Common::new(
            LevelFilter::INFO,
            no_user,
            SheetArgs::new(Some("ABC".into())),
        );
        let err = Config::from_args(&common, Mode::Google).unwrap_err();
        assert_eq!(err.kind(), ErrorType::Config);

        let no_database = StoreArgs::mysql("localhost", Some("me"), None);
        let common = Common::new(
            LevelFilter::INFO,
            no_database,
            SheetArgs::new(Some("ABC".into())),
        );
        let err = Config::from_args(&common, Mode::Google).unwrap_err();
        assert_eq!(err.kind(), ErrorType::Config);

        let both = StoreArgs::mysql("localhost", Some("me"), Some("db"));
        let common = Common::new(LevelFilter::INFO, both, SheetArgs::new(Some("ABC".into())));
        assert!(Config::from_args(&common, Mode::Google).is_ok());
    }

    #[test]
    fn test_mysql_settings_from_flags() {
        #[derive(Parser)]
        struct Wrapper {
            #[clap(flatten)]
            common: Common,
        }
        let w = Wrapper::try_parse_from([
            "x",
            "--spreadsheet-id",
            "ABC",
            "--db-user",
            "me",
            "--db-name",
            "db",
            "--db-host",
            "db.internal",
        ])
        .unwrap();
        let config = Config::from_args(&w.common, Mode::Google).unwrap();
        match config.store() {
            StoreConfig::MySql(settings) => {
                assert_eq!(settings.user, "me");
                assert_eq!(settings.database, "db");
                assert_eq!(settings.host, "db.internal");
            }
            other => panic!("unexpected store {other:?}"),
        }
    }

    #[test]
    fn test_with_serve() {
        let config = Config::from_args(&sqlite_common(Some("ABC")), Mode::Test).unwrap();
        let serve = ServeArgs::default().with_forward("https://example.com/hook", "secret");
        let config = config.with_serve(&serve).unwrap();
        let forward = config.forward().unwrap();
        assert_eq!(forward.url.as_str(), "https://example.com/hook");
        assert_eq!(forward.api_key, "secret");
        assert_eq!(config.port(), 3000);
    }

    #[test]
    fn test_sheet_timeout_must_be_positive() {
        let common = Common::new(
            LevelFilter::INFO,
            StoreArgs::sqlite("/tmp/test.sqlite"),
            SheetArgs::new(Some("ABC".into())).with_sheet_timeout_ms(0),
        );
        assert!(Config::from_args(&common, Mode::Test).is_err());
    }

    #[test]
    fn test_with_serve_rejects_bad_forward_url() {
        let config = Config::from_args(&sqlite_common(Some("ABC")), Mode::Test).unwrap();
        let serve = ServeArgs::default().with_forward("not a url", "secret");
        assert!(config.with_serve(&serve).is_err());
    }

    #[test]
    fn test_extract_spreadsheet_id() {
        let url = "https://docs.google.com/spreadsheets/d/7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL/edit";
        let id = extract_spreadsheet_id(url).unwrap();
        assert_eq!(id, "7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL");

        let url = "https://docs.google.com/spreadsheets/d/ABC123?foo=bar";
        assert_eq!(extract_spreadsheet_id(url).unwrap(), "ABC123");

        assert_eq!(extract_spreadsheet_id("ABC123").unwrap(), "ABC123");

        let invalid = "https://example.com/invalid";
        assert!(extract_spreadsheet_id(invalid).is_err());
    }
}
