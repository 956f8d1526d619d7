//! The sync engine: the push of the store to the sheet, the pull of a sheet payload into the
//! store, change detection on the sheet, and the row cache.
//!
//! Everything shares one `SyncContext`, which is cheap to clone and is handed to the periodic
//! tasks and to the HTTP handlers alike.

mod cache;
mod pull;
mod push;
pub(crate) mod task;
mod watch;

pub use cache::{CacheEntry, SyncCache};
pub use pull::{parse_payload, string_cells, PullOutcome, SheetPayload};
pub use push::{sheet_rows, target_range, PushOutcome};
pub use task::{TaskBoard, TaskName, TaskState, TaskStatus};
pub use watch::{ChangeDetector, SheetUpdate, UpdateKind};

use crate::api::{Sheet, TimedSheet};
use crate::db::RowStore;
use crate::error::{ErrorType, IntoResult};
use crate::retry::retry_with_delays;
use crate::{Config, Result};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

/// How many undelivered updates a slow websocket listener may fall behind by before it starts
/// missing them.
const UPDATE_CHANNEL_CAPACITY: usize = 16;

/// The shared state of the running service.
#[derive(Clone)]
pub struct SyncContext {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    store: Arc<dyn RowStore>,
    sheet: Arc<dyn Sheet>,
    http: reqwest::Client,
    cache: SyncCache,
    detector: ChangeDetector,
    /// Held by a pull for its delete+insert and by a push while it reads the table, so a push
    /// never sees a half-replaced table. Never held across a sheet call.
    gate: Mutex<()>,
    updates: broadcast::Sender<SheetUpdate>,
    tasks: TaskBoard,
}

impl SyncContext {
    /// Every call to `sheet` made through the context fails once it runs past the configured
    /// sheet timeout.
    pub fn new(config: Config, store: Arc<dyn RowStore>, sheet: Arc<dyn Sheet>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let sheet: Arc<dyn Sheet> = Arc::new(TimedSheet::new(sheet, config.sheet_timeout()));
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                sheet,
                http: reqwest::Client::new(),
                cache: SyncCache::new(),
                detector: ChangeDetector::new(),
                gate: Mutex::new(()),
                updates,
                tasks: TaskBoard::new(),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn store(&self) -> &dyn RowStore {
        self.inner.store.as_ref()
    }

    pub fn sheet(&self) -> &dyn Sheet {
        self.inner.sheet.as_ref()
    }

    /// The client used for calls to outside services other than the sheet.
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub fn cache(&self) -> &SyncCache {
        &self.inner.cache
    }

    pub fn tasks(&self) -> &TaskBoard {
        &self.inner.tasks
    }

    /// The last sheet version tag that change detection committed. Empty before the first poll.
    pub async fn last_version_tag(&self) -> String {
        self.inner.detector.last_tag().await
    }

    /// A receiver for sheet change broadcasts. Only updates sent after this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<SheetUpdate> {
        self.inner.updates.subscribe()
    }

    /// Writes every record in the store to the sheet, starting at the push anchor. An empty store
    /// leaves the sheet untouched. The sheet write is retried after each of `delays`.
    pub async fn push(&self, delays: &[Duration]) -> Result<PushOutcome> {
        let records = {
            let _gate = self.inner.gate.lock().await;
            self.store()
                .list_all()
                .await
                .pub_result(ErrorType::Store)?
        };
        if records.is_empty() {
            debug!("No data to sync");
            return Ok(PushOutcome::NothingToPush);
        }

        let rows = sheet_rows(&records);
        let range = target_range(self.config().push_anchor(), rows.len()).to_string();
        let response = retry_with_delays("Sheet write", delays, || {
            self.sheet().overwrite_range(&range, &rows)
        })
        .await
        .pub_result(ErrorType::RemoteSheet)?;
        info!("Pushed {} rows to {range}", rows.len());
        Ok(PushOutcome::Pushed {
            rows: rows.len(),
            range,
            response,
        })
    }

    /// Replaces the whole table with the rows parsed from `values`, whose first row is a header.
    /// A payload without data rows empties the table.
    pub async fn pull(&self, values: &[Vec<Value>]) -> Result<PullOutcome> {
        let (records, skipped) = parse_payload(values, Utc::now().date_naive());
        let _gate = self.inner.gate.lock().await;
        let removed = self
            .store()
            .replace_all(&records)
            .await
            .pub_result(ErrorType::Store)?;
        info!(
            "Replaced {removed} rows with {} rows from the sheet ({skipped} skipped)",
            records.len()
        );
        Ok(PullOutcome {
            inserted: records.len(),
            skipped,
            removed,
        })
    }

    /// Reads the watched range and pulls it into the store.
    pub async fn pull_watched(&self, delays: &[Duration]) -> Result<PullOutcome> {
        let range = self.config().watch_range().to_string();
        let snapshot = retry_with_delays("Sheet read", delays, || self.sheet().read_range(&range))
            .await
            .pub_result(ErrorType::RemoteSheet)?;
        self.pull(&string_cells(snapshot.values)).await
    }

    /// Reloads the row cache from the store.
    pub async fn refresh_cache(&self) -> Result<usize> {
        self.cache()
            .refresh(self.store())
            .await
            .pub_result(ErrorType::Store)
    }

    /// Compares the sheet's version tag with the last one seen. If it moved, reads the watched
    /// range, remembers the new tag and broadcasts the values. The tag is only remembered once the
    /// read succeeds, so a failed read is retried on the next poll.
    pub async fn check_for_changes(&self, delays: &[Duration]) -> Result<Option<SheetUpdate>> {
        let tag = retry_with_delays("Version tag read", delays, || self.sheet().version_tag())
            .await
            .pub_result(ErrorType::RemoteSheet)?;
        if !self.inner.detector.is_new(&tag).await {
            debug!("Sheet unchanged at version {tag}");
            return Ok(None);
        }

        let range = self.config().watch_range().to_string();
        let snapshot = retry_with_delays("Sheet read", delays, || self.sheet().read_range(&range))
            .await
            .pub_result(ErrorType::RemoteSheet)?;
        if !self.inner.detector.commit(&snapshot.version_tag).await {
            return Ok(None);
        }

        info!("Sheet changed, now at version {}", snapshot.version_tag);
        let update = SheetUpdate::new(snapshot.values);
        // An error here only means nobody is listening
        let listeners = self.inner.updates.send(update.clone()).unwrap_or(0);
        debug!("Broadcast the update to {listeners} listeners");
        Ok(Some(update))
    }

    /// Spawns the push, cache refresh and change detection tasks with the configured periods.
    pub(crate) fn spawn_tasks(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let periods = self.config().periods();
        vec![
            task::spawn(self.clone(), TaskName::Push, periods.push),
            task::spawn(self.clone(), TaskName::CacheRefresh, periods.refresh),
            task::spawn(self.clone(), TaskName::ChangeDetection, periods.poll),
        ]
    }
}
