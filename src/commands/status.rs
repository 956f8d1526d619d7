use crate::commands::Out;
use crate::sync::{SyncContext, TaskName, TaskStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// A point-in-time view of the periodic tasks and the cache.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub tasks: BTreeMap<TaskName, TaskStatus>,
    /// Rows in the cache, `None` until the first refresh succeeds.
    pub cached_rows: Option<usize>,
    pub cache_fetched_at: Option<DateTime<Utc>>,
    /// The sheet version that change detection last saw, `None` before the first change.
    pub version_tag: Option<String>,
}

pub async fn sync_status(ctx: &SyncContext) -> Out<SyncStatus> {
    let cache = ctx.cache().get().await;
    let tag = ctx.last_version_tag().await;
    let status = SyncStatus {
        tasks: ctx.tasks().snapshot().await,
        cached_rows: cache.as_ref().map(|entry| entry.rows.len()),
        cache_fetched_at: cache.as_ref().map(|entry| entry.fetched_at),
        version_tag: (!tag.is_empty()).then_some(tag),
    };
    let failing = status
        .tasks
        .values()
        .filter(|task| task.state == crate::sync::TaskState::Failed)
        .count();
    Out::new(
        format!("{} tasks, {failing} failing", status.tasks.len()),
        status,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::TaskState;
    use crate::test::TestEnv;
    use std::time::Duration;

    #[tokio::test]
    async fn test_status_reflects_runs() {
        let env = TestEnv::new().await;
        let ctx = env.context();
        let status = sync_status(&ctx).await.into_structure().unwrap();
        assert!(status.tasks.is_empty());
        assert_eq!(status.cached_rows, None);
        assert_eq!(status.version_tag, None);

        ctx.tasks()
            .register(TaskName::ChangeDetection, Duration::from_secs(60))
            .await;
        crate::sync::task::run_once(&ctx, TaskName::ChangeDetection).await;
        crate::sync::task::run_once(&ctx, TaskName::CacheRefresh).await;

        let status = sync_status(&ctx).await.into_structure().unwrap();
        assert_eq!(status.tasks[&TaskName::ChangeDetection].runs, 1);
        assert_eq!(
            status.tasks[&TaskName::ChangeDetection].state,
            TaskState::Idle
        );
        assert_eq!(status.cached_rows, Some(0));
        assert_eq!(status.version_tag.as_deref(), Some("1"));

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["tasks"]["change_detection"]["period_secs"], 60);
    }
}
