//! A `Sheet` wrapper that puts a deadline on every call.

use crate::api::{Sheet, SheetSnapshot};
use crate::error::Res;
use anyhow::anyhow;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Fails any call to the inner sheet that has not finished within `limit`, so a hung request
/// cannot hold up the callers waiting behind it.
pub struct TimedSheet {
    inner: Arc<dyn Sheet>,
    limit: Duration,
}

impl TimedSheet {
    pub fn new(inner: Arc<dyn Sheet>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn within<T>(&self, what: &str, call: impl Future<Output = Res<T>>) -> Res<T> {
        tokio::time::timeout(self.limit, call)
            .await
            .map_err(|_| anyhow!("{what} timed out after {:?}", self.limit))?
    }
}

#[async_trait::async_trait]
impl Sheet for TimedSheet {
    async fn read_range(&self, range: &str) -> Res<SheetSnapshot> {
        self.within("Sheet read", self.inner.read_range(range)).await
    }

    async fn version_tag(&self) -> Res<String> {
        self.within("Version tag read", self.inner.version_tag())
            .await
    }

    async fn append_rows(&self, range: &str, rows: &[Vec<Value>]) -> Res<Value> {
        self.within("Sheet append", self.inner.append_rows(range, rows))
            .await
    }

    async fn overwrite_range(&self, range: &str, rows: &[Vec<Value>]) -> Res<Value> {
        self.within("Sheet write", self.inner.overwrite_range(range, rows))
            .await
    }

    async fn clear_range(&self, range: &str) -> Res<Value> {
        self.within("Sheet clear", self.inner.clear_range(range))
            .await
    }
}
