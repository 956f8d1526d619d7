//! This module is responsible for reading, writing and managing the `transactions` table.
//!
//! `RowStore` is the seam between the sync engine and the database. `MySqlStore` is used in
//! production; `SqliteStore` keeps the same table in a local file for tests and local runs.
//! Every operation checks a connection out of the pool and gives it back when it returns, on
//! success and on error.

mod migrations;
mod mysql;
mod sqlite;

use crate::config::StoreConfig;
use crate::error::Res;
use crate::model::{NewRecord, Record};
use crate::Config;
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use tracing::debug;

pub use mysql::MySqlStore;
pub use sqlite::SqliteStore;

/// Operations against the `transactions` table.
#[async_trait::async_trait]
pub trait RowStore: Send + Sync {
    /// Inserts a single record and returns it as stored.
    async fn insert(&self, record: &NewRecord) -> Res<Record>;

    /// Returns every record, ordered by `id`.
    async fn list_all(&self) -> Res<Vec<Record>>;

    /// Returns the records whose `recorded_at` is strictly after `since`, ordered by `id`.
    async fn list_since(&self, since: DateTime<Utc>) -> Res<Vec<Record>>;

    /// Deletes every record and returns how many were removed.
    async fn delete_all(&self) -> Res<u64>;

    /// Updates the row(s) sharing each record's `transaction_id`, or inserts the record if there
    /// are none. A later element with the same `transaction_id` supersedes an earlier one. The
    /// whole batch is one transaction.
    async fn upsert_batch(&self, records: &[NewRecord]) -> Res<()>;

    /// Deletes every record and then upserts `records`, in one transaction. Returns the number
    /// of rows removed.
    async fn replace_all(&self, records: &[NewRecord]) -> Res<u64>;
}

/// Opens the store described by `config`, creating or upgrading the schema as needed.
pub(crate) async fn connect(config: &Config) -> Res<Arc<dyn RowStore>> {
    let max_connections = config.max_connections();
    match config.store() {
        StoreConfig::MySql(settings) => {
            debug!(
                "Connecting to MySQL at {}:{}/{}",
                settings.host, settings.port, settings.database
            );
            Ok(Arc::new(MySqlStore::connect(settings, max_connections).await?))
        }
        StoreConfig::Sqlite { path } => {
            debug!("Opening SQLite store at {}", path.display());
            Ok(Arc::new(SqliteStore::connect(path, max_connections).await?))
        }
    }
}

/// The insertion time stamped on new rows. Truncated to what both backends store.
fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
