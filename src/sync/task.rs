//! Periodic tasks and their status.

use crate::sync::SyncContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// The periodic tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskName {
    /// Writes the store to the sheet.
    Push,
    /// Reloads the row cache from the store.
    CacheRefresh,
    /// Polls the sheet's version tag and broadcasts changes.
    ChangeDetection,
}

serde_plain::derive_display_from_serialize!(TaskName);

/// `Idle` between runs, `Running` during one, `Failed` after a run that errored until the next
/// run starts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Idle,
    Running,
    Failed,
}

serde_plain::derive_display_from_serialize!(TaskState);

/// What is known about one periodic task.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStatus {
    pub state: TaskState,
    pub period_secs: u64,
    pub runs: u64,
    pub failures: u64,
    pub last_started: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// The status of every task, shared between the tasks and the status endpoint.
#[derive(Debug, Default)]
pub struct TaskBoard {
    statuses: RwLock<BTreeMap<TaskName, TaskStatus>>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` with its period. Tasks that were never registered do not appear in the
    /// snapshot.
    pub async fn register(&self, name: TaskName, period: Duration) {
        self.statuses.write().await.insert(
            name,
            TaskStatus {
                period_secs: period.as_secs(),
                ..TaskStatus::default()
            },
        );
    }

    pub async fn started(&self, name: TaskName) {
        let mut statuses = self.statuses.write().await;
        let status = statuses.entry(name).or_default();
        status.state = TaskState::Running;
        status.runs += 1;
        status.last_started = Some(Utc::now());
    }

    pub async fn succeeded(&self, name: TaskName) {
        let mut statuses = self.statuses.write().await;
        let status = statuses.entry(name).or_default();
        status.state = TaskState::Idle;
        status.last_success = Some(Utc::now());
    }

    pub async fn failed(&self, name: TaskName, error: &impl std::fmt::Display) {
        let mut statuses = self.statuses.write().await;
        let status = statuses.entry(name).or_default();
        status.state = TaskState::Failed;
        status.failures += 1;
        status.last_error = Some(error.to_string());
    }

    pub async fn snapshot(&self) -> BTreeMap<TaskName, TaskStatus> {
        self.statuses.read().await.clone()
    }
}

/// Spawns `name` to run every `period`, starting one period from now. Each run's error is logged
/// and recorded, and never stops the loop. A run that overruns its period delays the next one
/// rather than causing a burst.
pub(crate) fn spawn(ctx: SyncContext, name: TaskName, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        ctx.tasks().register(name, period).await;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Started the {name} task, running every {period:?}");

        loop {
            interval.tick().await;
            run_once(&ctx, name).await;
        }
    })
}

/// Runs one iteration of `name` and records the outcome.
pub(crate) async fn run_once(ctx: &SyncContext, name: TaskName) {
    ctx.tasks().started(name).await;
    let delays = ctx.config().retry_delays();
    let result = match name {
        TaskName::Push => ctx.push(delays).await.map(|outcome| {
            debug!("Push finished: {outcome:?}");
        }),
        TaskName::CacheRefresh => ctx.refresh_cache().await.map(|_| ()),
        TaskName::ChangeDetection => ctx.check_for_changes(delays).await.map(|update| {
            if update.is_some() {
                info!("The sheet changed, listeners notified");
            }
        }),
    };
    match result {
        Ok(()) => ctx.tasks().succeeded(name).await,
        Err(e) => {
            warn!("The {name} task failed: {e}");
            ctx.tasks().failed(name, &e).await;
        }
    }
}
