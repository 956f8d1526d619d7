use crate::config::MySqlSettings;
use crate::db::{migrations, now_millis, RowStore};
use crate::error::Res;
use crate::model::{Amount, NewRecord, Record};
use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::{MySqlConnection, MySqlPool, Row};
use tracing::trace;

const SELECT_ALL: &str = "SELECT id, transaction_id, amount, currency, payment_method, \
    purchase_date, recorded_at FROM transactions ORDER BY id";
const SELECT_ONE: &str = "SELECT id, transaction_id, amount, currency, payment_method, \
    purchase_date, recorded_at FROM transactions WHERE id = ?";
const SELECT_SINCE: &str = "SELECT id, transaction_id, amount, currency, payment_method, \
    purchase_date, recorded_at FROM transactions WHERE recorded_at > ? ORDER BY id";

/// The production `RowStore`. Amounts are `DECIMAL(10, 2)` and `recorded_at` is a UTC
/// `DATETIME(3)`.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Connects to the database described by `settings` and brings its schema up to date.
    pub async fn connect(settings: &MySqlSettings, max_connections: u32) -> Res<Self> {
        let options = MySqlConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.database)
            .timezone(Some(String::from("+00:00")));

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to MySQL at {}:{}/{}",
                    settings.host, settings.port, settings.database
                )
            })?;

        migrations::run_mysql(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl RowStore for MySqlStore {
    async fn insert(&self, record: &NewRecord) -> Res<Record> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire a MySQL connection")?;
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
            .context("Failed to acquire a MySQL connection")?;
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
            .context("Failed to acquire a MySQL connection")?;
        let rows = sqlx::query(SELECT_SINCE)
            .bind(since.naive_utc())
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
            .context("Failed to acquire a MySQL connection")?;
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

async fn insert_one(conn: &mut MySqlConnection, record: &NewRecord) -> Res<u64> {
    let result = sqlx::query(
        "INSERT INTO transactions \
        (transaction_id, amount, currency, payment_method, purchase_date, recorded_at) \
        VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.transaction_id)
    .bind(record.amount.value())
    .bind(&record.currency)
    .bind(&record.payment_method)
    .bind(record.purchase_date)
    .bind(now_millis().naive_utc())
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to insert transaction '{}'", record.transaction_id))?;
    Ok(result.last_insert_id())
}

async fn upsert_one(conn: &mut MySqlConnection, record: &NewRecord) -> Res<()> {
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
    .bind(record.amount.value())
    .bind(&record.currency)
    .bind(&record.payment_method)
    .bind(record.purchase_date)
    .bind(&record.transaction_id)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to update transaction '{}'", record.transaction_id))?;
    Ok(())
}

fn to_record(row: &MySqlRow) -> Res<Record> {
    let amount: Decimal = row.try_get("amount")?;
    let recorded_at: NaiveDateTime = row.try_get("recorded_at")?;
    Ok(Record {
        id: row.try_get("id")?,
        transaction_id: row.try_get("transaction_id")?,
        amount: Amount::from(amount),
        currency: row.try_get("currency")?,
        payment_method: row.try_get("payment_method")?,
        purchase_date: row.try_get("purchase_date")?,
        recorded_at: recorded_at.and_utc(),
    })
}
