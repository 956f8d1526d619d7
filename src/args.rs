//! These structs provide the CLI interface for the sheet-sync program.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::filter::LevelFilter;

/// sheet-sync: keeps a transactions table and a Google sheet in sync.
///
/// Rows in the database are pushed to the sheet on a timer, the sheet can be pulled back into
/// the database through the HTTP API, and edits made in the sheet are announced to websocket
/// listeners as they are detected.
///
/// Every option can also be given as an environment variable, and a `.env` file in the working
/// directory is read at startup.
///
/// Set SHEET_SYNC_IN_TEST_MODE to a non-empty value to use an in-memory sheet instead of Google.
#[derive(Debug, Parser, Clone)]
#[command(version)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server together with the periodic push, cache refresh and change detection
    /// tasks. Runs until interrupted.
    Serve(ServeArgs),
    /// Sync once and exit: "up" writes the database to the sheet, "down" replaces the database
    /// with the rows of the watched sheet range.
    Sync(SyncArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    #[clap(flatten)]
    store: StoreArgs,

    #[clap(flatten)]
    sheet: SheetArgs,
}

impl Common {
    pub fn new(log_level: LevelFilter, store: StoreArgs, sheet: SheetArgs) -> Self {
        Self {
            log_level,
            store,
            sheet,
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn store(&self) -> &StoreArgs {
        &self.store
    }

    pub fn sheet(&self) -> &SheetArgs {
        &self.sheet
    }
}

/// Which database backend holds the transactions table.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Mysql,
    Sqlite,
}

serde_plain::derive_display_from_serialize!(StoreKind);
serde_plain::derive_fromstr_from_deserialize!(StoreKind);

/// (Not shown): Database connection arguments.
#[derive(Debug, Parser, Clone)]
pub struct StoreArgs {
    /// The database backend: "mysql" or "sqlite".
    #[arg(long, default_value_t = StoreKind::Mysql)]
    store: StoreKind,

    /// MySQL host.
    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    db_host: String,

    /// MySQL port.
    #[arg(long, env = "DB_PORT", default_value_t = 3306)]
    db_port: u16,

    /// MySQL user.
    #[arg(long, env = "DB_USER")]
    db_user: Option<String>,

    /// MySQL password.
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    db_password: Option<String>,

    /// MySQL database name.
    #[arg(long, env = "DB_NAME")]
    db_name: Option<String>,

    /// The SQLite file used when --store is "sqlite". Created if it does not exist.
    #[arg(long, env = "SQLITE_PATH", default_value = "sheet-sync.sqlite")]
    sqlite_path: DisplayPath,

    /// The most database connections held open at once.
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    db_max_connections: u32,
}

impl StoreArgs {
    /// Arguments for a SQLite store at `path`.
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            store: StoreKind::Sqlite,
            db_host: "localhost".to_string(),
            db_port: 3306,
            db_user: None,
            db_password: None,
            db_name: None,
            sqlite_path: DisplayPath(path.into()),
            db_max_connections: 10,
        }
    }

    /// Arguments for a MySQL store on `host`, bypassing the environment.
    #[cfg(test)]
    pub(crate) fn mysql(host: &str, user: Option<&str>, database: Option<&str>) -> Self {
        Self {
            store: StoreKind::Mysql,
            db_host: host.to_string(),
            db_user: user.map(str::to_string),
            db_name: database.map(str::to_string),
            ..Self::sqlite("sheet-sync.sqlite")
        }
    }

    pub fn store(&self) -> StoreKind {
        self.store
    }

    pub fn db_host(&self) -> &str {
        &self.db_host
    }

    pub fn db_port(&self) -> u16 {
        self.db_port
    }

    pub fn db_user(&self) -> Option<&str> {
        self.db_user.as_deref()
    }

    pub fn db_password(&self) -> Option<&str> {
        self.db_password.as_deref()
    }

    pub fn db_name(&self) -> Option<&str> {
        self.db_name.as_deref()
    }

    pub fn sqlite_path(&self) -> &Path {
        self.sqlite_path.path()
    }

    pub fn db_max_connections(&self) -> u32 {
        self.db_max_connections
    }
}

/// Spreadsheet arguments.
#[derive(Debug, Parser, Clone)]
pub struct SheetArgs {
    /// The Google service account key (JSON) used to authenticate.
    #[arg(long, env = "GOOGLE_SERVICE_ACCOUNT", default_value = "service.json")]
    service_account: DisplayPath,

    /// The spreadsheet ID, or the full URL of the spreadsheet. Required unless running in test
    /// mode.
    #[arg(long, env = "SPREADSHEET_ID")]
    spreadsheet_id: Option<String>,

    /// The tab that rows are appended to and that unqualified ranges refer to in test mode.
    #[arg(long, env = "DEFAULT_SHEET", default_value = "Sheet1")]
    default_sheet: String,

    /// The top-left cell that pushed rows are written from. Row 1 holds the header.
    #[arg(long, env = "PUSH_ANCHOR", default_value = "A2")]
    push_anchor: String,

    /// The range that change detection reads and "sync down" pulls from.
    #[arg(long, env = "WATCH_RANGE", default_value = "A1:T502")]
    watch_range: String,

    /// Delays, in milliseconds, between retries of a failed sheet call made by a periodic task
    /// or by "sync".
    #[arg(long, env = "RETRY_DELAYS_MS", value_delimiter = ',', default_value = "250,500,1000")]
    retry_delays_ms: Vec<u64>,

    /// Milliseconds after which a single sheet call is abandoned as failed.
    #[arg(long, env = "SHEET_TIMEOUT_MS", default_value_t = 30_000)]
    sheet_timeout_ms: u64,
}

impl SheetArgs {
    pub fn new(spreadsheet_id: Option<String>) -> Self {
        Self {
            service_account: DisplayPath(PathBuf::from("service.json")),
            spreadsheet_id,
            default_sheet: "Sheet1".to_string(),
            push_anchor: "A2".to_string(),
            watch_range: "A1:T502".to_string(),
            retry_delays_ms: vec![250, 500, 1000],
            sheet_timeout_ms: 30_000,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_sheet_timeout_ms(mut self, ms: u64) -> Self {
        self.sheet_timeout_ms = ms;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_retry_delays_ms(mut self, delays: &[u64]) -> Self {
        self.retry_delays_ms = delays.to_vec();
        self
    }

    pub fn service_account(&self) -> &Path {
        self.service_account.path()
    }

    pub fn spreadsheet_id(&self) -> Option<&str> {
        self.spreadsheet_id.as_deref()
    }

    pub fn default_sheet(&self) -> &str {
        &self.default_sheet
    }

    pub fn push_anchor(&self) -> &str {
        &self.push_anchor
    }

    pub fn watch_range(&self) -> &str {
        &self.watch_range
    }

    pub fn retry_delays_ms(&self) -> &[u64] {
        &self.retry_delays_ms
    }

    pub fn sheet_timeout_ms(&self) -> u64 {
        self.sheet_timeout_ms
    }
}

/// (Not shown): Args for the `sheet-sync serve` command.
#[derive(Debug, Parser, Clone)]
pub struct ServeArgs {
    /// The address to listen on.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// The port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Seconds between pushes of the database to the sheet.
    #[arg(long, env = "PUSH_SECS", default_value_t = 10)]
    push_secs: u64,

    /// Seconds between refreshes of the in-memory row cache.
    #[arg(long, env = "REFRESH_SECS", default_value_t = 5)]
    refresh_secs: u64,

    /// Seconds between checks of the sheet for changes.
    #[arg(long, env = "POLL_SECS", default_value_t = 60)]
    poll_secs: u64,

    /// Where POST /send-to-parabola forwards new rows.
    #[arg(long, env = "PARABOLA_URL")]
    forward_url: Option<String>,

    /// Bearer token sent with forwarded rows.
    #[arg(long, env = "PARABOLA_API_KEY", hide_env_values = true)]
    forward_key: Option<String>,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            push_secs: 10,
            refresh_secs: 5,
            poll_secs: 60,
            forward_url: None,
            forward_key: None,
        }
    }
}

impl ServeArgs {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn push_secs(&self) -> u64 {
        self.push_secs
    }

    pub fn refresh_secs(&self) -> u64 {
        self.refresh_secs
    }

    pub fn poll_secs(&self) -> u64 {
        self.poll_secs
    }

    pub fn forward_url(&self) -> Option<&str> {
        self.forward_url.as_deref()
    }

    pub fn forward_key(&self) -> Option<&str> {
        self.forward_key.as_deref()
    }

    pub fn with_forward(mut self, url: impl Into<String>, key: impl Into<String>) -> Self {
        self.forward_url = Some(url.into());
        self.forward_key = Some(key.into());
        self
    }
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpDown {
    Up,
    #[default]
    Down,
}

serde_plain::derive_display_from_serialize!(UpDown);
serde_plain::derive_fromstr_from_deserialize!(UpDown);

/// (Not shown): Args for the `sheet-sync sync` command.
#[derive(Debug, Parser, Clone)]
pub struct SyncArgs {
    /// The direction to sync: "up" or "down"
    direction: UpDown,
}

impl SyncArgs {
    pub fn direction(&self) -> UpDown {
        self.direction
    }
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}
