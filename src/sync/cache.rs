use crate::db::RowStore;
use crate::error::Res;
use crate::model::Record;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

/// A snapshot of the whole `transactions` table and when it was taken. Never changed after it is
/// built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub rows: Vec<Record>,
    pub fetched_at: DateTime<Utc>,
}

/// Holds the latest `CacheEntry`. Readers get a shared handle to a whole entry; a refresh builds
/// a new entry off to the side and then swaps the pointer, so a reader sees either the old
/// snapshot or the new one.
#[derive(Debug, Default)]
pub struct SyncCache {
    entry: RwLock<Option<Arc<CacheEntry>>>,
}

impl SyncCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest snapshot, or `None` if no refresh has succeeded yet.
    pub async fn get(&self) -> Option<Arc<CacheEntry>> {
        self.entry.read().await.clone()
    }

    /// Reads every row from `store` and replaces the current entry. On error the current entry
    /// is left as it was. Returns the number of rows cached.
    pub async fn refresh(&self, store: &dyn RowStore) -> Res<usize> {
        let rows = store.list_all().await?;
        let count = rows.len();
        let entry = Arc::new(CacheEntry {
            rows,
            fetched_at: Utc::now(),
        });
        *self.entry.write().await = Some(entry);
        trace!("Cache refreshed with {count} rows");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::model::{Amount, NewRecord};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn record(id: &str) -> NewRecord {
        NewRecord {
            transaction_id: id.to_string(),
            amount: "1.00".parse::<Amount>().unwrap(),
            currency: "USD".to_string(),
            payment_method: "card".to_string(),
            purchase_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_empty_until_first_refresh() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::connect(&dir.path().join("c.sqlite"), 2)
            .await
            .unwrap();
        let cache = SyncCache::new();
        assert!(cache.get().await.is_none());

        assert_eq!(cache.refresh(&store).await.unwrap(), 0);
        let entry = cache.get().await.unwrap();
        assert!(entry.rows.is_empty());
    }

    #[tokio::test]
    async fn test_readers_keep_their_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::connect(&dir.path().join("c.sqlite"), 2)
            .await
            .unwrap();
        store.upsert_batch(&[record("T1")]).await.unwrap();

        let cache = SyncCache::new();
        cache.refresh(&store).await.unwrap();
        let before = cache.get().await.unwrap();

        store
            .upsert_batch(&[record("T2"), record("T3")])
            .await
            .unwrap();
        cache.refresh(&store).await.unwrap();
        let after = cache.get().await.unwrap();

        assert_eq!(before.rows.len(), 1);
        assert_eq!(after.rows.len(), 3);
        assert!(after.fetched_at >= before.fetched_at);
    }

    #[tokio::test]
    async fn test_concurrent_reads_see_whole_snapshots() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            SqliteStore::connect(&dir.path().join("c.sqlite"), 4)
                .await
                .unwrap(),
        );
        let cache = Arc::new(SyncCache::new());
        cache.refresh(store.as_ref()).await.unwrap();

        let writer = {
            let store = store.clone();
            let cache = cache.clone();
            tokio::spawn(async move {
                for i in 0..10 {
                    let batch: Vec<NewRecord> =
                        (0..5).map(|j| record(&format!("T{i}-{j}"))).collect();
                    store.upsert_batch(&batch).await.unwrap();
                    cache.refresh(store.as_ref()).await.unwrap();
                }
            })
        };

        let reader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let entry = cache.get().await.unwrap();
                    // Rows are only ever added in batches of five
                    assert_eq!(entry.rows.len() % 5, 0);
                    tokio::task::yield_now().await;
                }
            })
        };

        writer.await.unwrap();
        reader.await.unwrap();
        assert_eq!(cache.get().await.unwrap().rows.len(), 50);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_entry() {
        struct Broken;

        #[async_trait::async_trait]
        impl RowStore for Broken {
            async fn insert(&self, _: &NewRecord) -> Res<Record> {
                anyhow::bail!("down")
            }
            async fn list_all(&self) -> Res<Vec<Record>> {
                anyhow::bail!("down")
            }
            async fn list_since(&self, _: DateTime<Utc>) -> Res<Vec<Record>> {
                anyhow::bail!("down")
            }
            async fn delete_all(&self) -> Res<u64> {
                anyhow::bail!("down")
            }
            async fn upsert_batch(&self, _: &[NewRecord]) -> Res<()> {
                anyhow::bail!("down")
            }
            async fn replace_all(&self, _: &[NewRecord]) -> Res<u64> {
                anyhow::bail!("down")
            }
        }

        let dir = TempDir::new().unwrap();
        let store = SqliteStore::connect(&dir.path().join("c.sqlite"), 2)
            .await
            .unwrap();
        store.upsert_batch(&[record("T1")]).await.unwrap();
        let cache = SyncCache::new();
        cache.refresh(&store).await.unwrap();

        assert!(cache.refresh(&Broken).await.is_err());
        assert_eq!(cache.get().await.unwrap().rows.len(), 1);
    }
}
