use crate::db::{migrations, now_millis, RowStore};
use crate::error::Res;
use crate::model::{NewRecord, Record};
use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::Path;
use std::time::Duration;
use tracing::trace;

const SELECT_ALL: &str = "SELECT id, transaction_id, amount, currency, payment_method, \
    purchase_date, recorded_at FROM transactions ORDER BY id";
const SELECT_ONE: &str = "SELECT id, transaction_id, amount, currency, payment_method, \
    purchase_date, recorded_at FROM transactions WHERE id = ?";
const SELECT_SINCE: &str = "SELECT id, transaction_id, amount, currency, payment_method, \
    purchase_date, recorded_at FROM transactions WHERE recorded_at > ? ORDER BY id";

/// A `RowStore` kept in a local SQLite file. Amounts are stored as text so no precision is
/// lost; `recorded_at` is stored as Unix milliseconds.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the SQLite file at `path` and brings its schema up to date.
    pub async fn connect(path: &Path, max_connections: u32) -> Res<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;

        migrations::run_sqlite(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl RowStore for SqliteStore {
    async fn insert(&self, record: &NewRecord) -> Res<Record> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire a SQLite connection")?;
        let id = insert_one(&mut conn, record).await?;
        let row = sqlx::query(SELECT_ONE)
            .bind(id)
            .fetch_one(&mut *conn)
            .await
            .context("Failed to read back the inserted record")?;
        to_record(&row)
    }

    async fn list_all(&self) -> Res<Vec<Record>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire a SQLite connection")?;
        let rows = sqlx::query(SELECT_ALL)
            .fetch_all(&mut *conn)
            .await
            .context("Failed to list transactions")?;
        rows.iter().map(to_record).collect()
    }

    async fn list_since(&self, since: DateTime<Utc>) -> Res<Vec<Record>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire a SQLite connection")?;
        let rows = sqlx::query(SELECT_SINCE)
            .bind(since.timestamp_millis())
            .fetch_all(&mut *conn)
            .await
            .context("Failed to list transactions by time")?;
        rows.iter().map(to_record).collect()
    }

    async fn delete_all(&self) -> Res<u64> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire a SQLite connection")?;
        let result = sqlx::query("DELETE FROM transactions")
            .execute(&mut *conn)
            .await
            .context("Failed to delete transactions")?;
        Ok(result.rows_affected())
    }

    async fn upsert_batch(&self, records: &[NewRecord]) -> Res<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin upsert transaction")?;
        for record in records {
            upsert_one(&mut tx, record).await?;
        }
        tx.commit()
            .await
            .context("Failed to commit upsert transaction")
    }

    async fn replace_all(&self, records: &[NewRecord]) -> Res<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin replace transaction")?;
        let removed = sqlx::query("DELETE FROM transactions")
            .execute(&mut *tx)
            .await
            .context("Failed to delete transactions")?
            .rows_affected();
        for record in records {
            upsert_one(&mut tx, record).await?;
        }
        tx.commit()
            .await
            .context("Failed to commit replace transaction")?;
        Ok(removed)
    }
}

async fn insert_one(conn: &mut SqliteConnection, record: &NewRecord) -> Res<i64> {
    let result = sqlx::query(
        "INSERT INTO transactions \
        (transaction_id, amount, currency, payment_method, purchase_date, recorded_at) \
        VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.transaction_id)
    .bind(record.amount.to_string())
    .bind(&record.currency)
    .bind(&record.payment_method)
    .bind(record.purchase_date)
    .bind(now_millis().timestamp_millis())
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to insert transaction '{}'", record.transaction_id))?;
    Ok(result.last_insert_rowid())
}

async fn upsert_one(conn: &mut SqliteConnection, record: &NewRecord) -> Res<()> {
    let (existing,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM transactions WHERE transaction_id = ?")
            .bind(&record.transaction_id)
            .fetch_one(&mut *conn)
            .await
            .context("Failed to look up transaction")?;

    if existing == 0 {
        trace!("Inserting '{}'", record.transaction_id);
        insert_one(conn, record).await?;
        return Ok(());
    }

    trace!("Updating '{}'", record.transaction_id);
    sqlx::query(
        "UPDATE transactions \
        SET amount = ?, currency = ?, payment_method = ?, purchase_date = ? \
        WHERE transaction_id = ?",
    )
    .bind(record.amount.to_string())
    .bind(&record.currency)
    .bind(&record.payment_method)
    .bind(record.purchase_date)
    .bind(&record.transaction_id)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to update transaction '{}'", record.transaction_id))?;
    Ok(())
}

fn to_record(row: &SqliteRow) -> Res<Record> {
    let amount: String = row.try_get("amount")?;
    let recorded_at: i64 = row.try_get("recorded_at")?;
    Ok(Record {
        id: row.try_get("id")?,
        transaction_id: row.try_get("transaction_id")?,
        amount: amount
            .parse()
            .with_context(|| format!("Stored amount '{amount}' is not a number"))?,
        currency: row.try_get("currency")?,
        payment_method: row.try_get("payment_method")?,
        purchase_date: row.try_get("purchase_date")?,
        recorded_at: DateTime::from_timestamp_millis(recorded_at)
            .with_context(|| format!("Stored timestamp {recorded_at} is out of range"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Amount;
    use chrono::NaiveDate;
    use std::str::FromStr;
    use tempfile::TempDir;

    async fn store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::connect(&dir.path().join("store.sqlite"), 4)
            .await
            .unwrap();
        (dir, store)
    }

    fn new_record(id: &str, amount: &str, date: &str) -> NewRecord {
        NewRecord {
            transaction_id: id.to_string(),
            amount: Amount::from_str(amount).unwrap(),
            currency: "USD".to_string(),
            payment_method: "card".to_string(),
            purchase_date: NaiveDate::from_str(date).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_list_all() {
        let (_dir, store) = store().await;
        let a = store
            .insert(&new_record("T1", "9.99", "2024-01-05"))
            .await
            .unwrap();
        let b = store
            .insert(&new_record("T2", "10.50", "2024-01-06"))
            .await
            .unwrap();
        assert!(b.id > a.id);
        assert_eq!(a.amount.to_string(), "9.99");

        let all = store.list_all().await.unwrap();
        assert_eq!(all, vec![a, b]);
    }

    #[tokio::test]
    async fn test_upsert_updates_in_place() {
        let (_dir, store) = store().await;
        let original = store
            .insert(&new_record("T1", "9.99", "2024-01-05"))
            .await
            .unwrap();

        let mut changed = new_record("T1", "12.00", "2024-02-01");
        changed.currency = "EUR".to_string();
        store.upsert_batch(&[changed]).await.unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, original.id);
        assert_eq!(all[0].amount.to_string(), "12.00");
        assert_eq!(all[0].currency, "EUR");
        assert_eq!(all[0].purchase_date.to_string(), "2024-02-01");
    }

    #[tokio::test]
    async fn test_upsert_later_element_wins() {
        let (_dir, store) = store().await;
        store
            .upsert_batch(&[
                new_record("T1", "1.00", "2024-01-01"),
                new_record("T2", "2.00", "2024-01-02"),
                new_record("T1", "3.00", "2024-01-03"),
            ])
            .await
            .unwrap();
        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].transaction_id, "T1");
        assert_eq!(all[0].amount.to_string(), "3.00");
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let (_dir, store) = store().await;
        let batch = vec![
            new_record("T1", "1.00", "2024-01-01"),
            new_record("T2", "2.00", "2024-01-02"),
        ];
        store.upsert_batch(&batch).await.unwrap();
        let once: Vec<NewRecord> = store.list_all().await.unwrap().iter().map(Record::to_new).collect();
        store.upsert_batch(&batch).await.unwrap();
        let twice: Vec<NewRecord> = store.list_all().await.unwrap().iter().map(Record::to_new).collect();
        assert_eq!(once, twice);
        assert_eq!(once, batch);
    }

    #[tokio::test]
    async fn test_replace_all_and_delete_all() {
        let (_dir, store) = store().await;
        store
            .upsert_batch(&[
                new_record("T1", "1.00", "2024-01-01"),
                new_record("T2", "2.00", "2024-01-02"),
            ])
            .await
            .unwrap();

        let removed = store
            .replace_all(&[new_record("T3", "3.00", "2024-01-03")])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].transaction_id, "T3");

        assert_eq!(store.replace_all(&[]).await.unwrap(), 1);
        assert!(store.list_all().await.unwrap().is_empty());
        assert_eq!(store.delete_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_since_is_strictly_after() {
        let (_dir, store) = store().await;
        let first = store
            .insert(&new_record("T1", "1.00", "2024-01-01"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let cut = Utc::now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = store
            .insert(&new_record("T2", "2.00", "2024-01-02"))
            .await
            .unwrap();

        assert_eq!(store.list_since(cut).await.unwrap(), vec![second]);
        let since_first = store.list_since(first.recorded_at).await.unwrap();
        assert_eq!(since_first.len(), 1);
        assert_eq!(since_first[0].transaction_id, "T2");
    }
}
