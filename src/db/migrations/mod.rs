//! Database schema bootstrap.
//!
//! Each backend has an ordered list of migrations. A `schema_version` table records how far a
//! database has been brought; at startup every migration above that version is run, in order,
//! each one in its own transaction together with the version bump.

use crate::error::Res;
use anyhow::{bail, Context};
use sqlx::{MySqlPool, SqlitePool};
use tracing::debug;

/// A schema migration. Statements are executed one at a time so that backends without
/// multi-statement support work too.
pub(super) struct Migration {
    /// The version this migration brings the database to.
    version: i64,
    statements: &'static [&'static str],
}

/// The schema version this build of the program expects.
pub(super) const SCHEMA_VERSION: i64 = 1;

const SQLITE_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    statements: &[
        r#"CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            transaction_id TEXT NOT NULL,
            amount TEXT NOT NULL,
            currency TEXT NOT NULL DEFAULT '',
            payment_method TEXT NOT NULL DEFAULT '',
            purchase_date TEXT NOT NULL,
            recorded_at INTEGER NOT NULL
        )"#,
        "CREATE INDEX IF NOT EXISTS idx_transactions_transaction_id \
            ON transactions (transaction_id)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_recorded_at \
            ON transactions (recorded_at)",
    ],
}];

const MYSQL_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    statements: &[r#"CREATE TABLE IF NOT EXISTS transactions (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            transaction_id VARCHAR(255) NOT NULL,
            amount DECIMAL(10, 2) NOT NULL,
            currency VARCHAR(255) NOT NULL DEFAULT '',
            payment_method VARCHAR(255) NOT NULL DEFAULT '',
            purchase_date DATE NOT NULL,
            recorded_at DATETIME(3) NOT NULL,
            INDEX idx_transactions_transaction_id (transaction_id),
            INDEX idx_transactions_recorded_at (recorded_at)
        )"#],
}];

/// Brings a SQLite database up to `SCHEMA_VERSION`.
pub(super) async fn run_sqlite(pool: &SqlitePool) -> Res<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .execute(pool)
        .await
        .context("Failed to create schema_version table")?;
    let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_version")
        .fetch_one(pool)
        .await
        .context("Failed to query schema version")?;

    for migration in pending(SQLITE_MIGRATIONS, row.0)? {
        debug!("Running SQLite migration {:02}", migration.version);
        let mut tx = pool
            .begin()
            .await
            .context("Failed to begin migration transaction")?;
        for sql in migration.statements {
            sqlx::query(sql)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to execute migration {}", migration.version))?;
        }
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut *tx)
            .await
            .context("Failed to clear schema_version")?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(migration.version)
            .execute(&mut *tx)
            .await
            .context("Failed to update schema_version")?;
        tx.commit()
            .await
            .context("Failed to commit migration transaction")?;
    }
    Ok(())
}

/// Brings a MySQL database up to `SCHEMA_VERSION`. MySQL commits DDL implicitly, so the
/// statements are not wrapped in a transaction; they are all idempotent instead.
pub(super) async fn run_mysql(pool: &MySqlPool) -> Res<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version BIGINT NOT NULL)")
        .execute(pool)
        .await
        .context("Failed to create schema_version table")?;
    let row: (i64,) =
        sqlx::query_as("SELECT CAST(COALESCE(MAX(version), 0) AS SIGNED) FROM schema_version")
            .fetch_one(pool)
            .await
            .context("Failed to query schema version")?;

    for migration in pending(MYSQL_MIGRATIONS, row.0)? {
        debug!("Running MySQL migration {:02}", migration.version);
        for sql in migration.statements {
            sqlx::query(sql)
                .execute(pool)
                .await
                .with_context(|| format!("Failed to execute migration {}", migration.version))?;
        }
        sqlx::query("DELETE FROM schema_version")
            .execute(pool)
            .await
            .context("Failed to clear schema_version")?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(migration.version)
            .execute(pool)
            .await
            .context("Failed to update schema_version")?;
    }
    Ok(())
}

/// Returns the migrations needed to go from `current` to `SCHEMA_VERSION`, in order. Fails if
/// the database is newer than this program or if a step is missing.
fn pending(migrations: &'static [Migration], current: i64) -> Res<Vec<&'static Migration>> {
    if current > SCHEMA_VERSION {
        bail!(
            "The database schema is at version {current}, which is newer than this program \
            supports ({SCHEMA_VERSION})"
        );
    }
    let mut steps = Vec::new();
    for version in (current + 1)..=SCHEMA_VERSION {
        let migration = migrations
            .iter()
            .find(|m| m.version == version)
            .with_context(|| format!("Migration {version} not found"))?;
        steps.push(migration);
    }
    Ok(steps)
}
