use sqlx::{MySql, MySqlPool};

use super::super::models::LedgerEntry;
use crate::core::{AppError, Result};

/// Repository for the append-only payment ledger
///
/// The state machine is the only writer. No row is ever updated or deleted;
/// idempotency comes from the UNIQUE index on `sentinel_key`.
#[derive(Clone)]
pub struct LedgerRepository {
    pool: MySqlPool,
}

impl LedgerRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Append a ledger row
    pub async fn insert(&self, entry: &LedgerEntry) -> Result<()> {
        self.insert_with_tx(entry, &self.pool).await
    }

    /// Append a ledger row within an existing database transaction
    pub async fn insert_with_tx<'a, E>(&self, entry: &LedgerEntry, executor: E) -> Result<()>
    where
        E: sqlx::Executor<'a, Database = MySql>,
    {
        sqlx::query(
            r#"
            INSERT INTO payment_ledger (
                order_id, provider, method, status, amount, currency,
                transaction_id, merchant_ref, error_code, error_message,
                sentinel_key, paid_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.order_id)
        .bind(&entry.provider)
        .bind(entry.method)
        .bind(entry.status)
        .bind(entry.amount)
        .bind(&entry.currency)
        .bind(&entry.transaction_id)
        .bind(&entry.merchant_ref)
        .bind(&entry.error_code)
        .bind(&entry.error_message)
        .bind(&entry.sentinel_key)
        .bind(entry.paid_at)
        .execute(executor)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Insert a notification sentinel row; the UNIQUE sentinel_key is the guard
    ///
    /// Returns true when this call inserted the row (the caller owns the side
    /// effect), false when another caller won the race or already notified.
    pub async fn try_insert_sentinel(
        &self,
        order_id: u64,
        provider: &str,
        sentinel_code: &str,
    ) -> Result<bool> {
        let entry = LedgerEntry::sentinel(order_id, provider, sentinel_code);
        match self.insert(&entry).await {
            Ok(()) => Ok(true),
            Err(AppError::Database(e)) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Check whether a sentinel row already exists
    pub async fn sentinel_exists(
        &self,
        order_id: u64,
        provider: &str,
        sentinel_code: &str,
    ) -> Result<bool> {
        let key = format!("{}:{}:{}", order_id, provider, sentinel_code);
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM payment_ledger WHERE sentinel_key = ?")
                .bind(&key)
                .fetch_one(&self.pool)
                .await
                .map_err(AppError::Database)?;
        Ok(row.0 > 0)
    }

    /// All ledger rows for an order, newest first (audit view)
    pub async fn find_by_order_id(&self, order_id: u64) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT
                id, order_id, provider, method, status, amount, currency,
                transaction_id, merchant_ref, error_code, error_message,
                sentinel_key, created_at, updated_at, paid_at
            FROM payment_ledger
            WHERE order_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(entries)
    }

    /// Count confirmed payment rows for an order
    ///
    /// Financial rows only; sentinel rows never carry status 1.
    pub async fn count_confirmed(&self, order_id: u64) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM payment_ledger WHERE order_id = ? AND status = 1",
        )
        .bind(order_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;
        Ok(row.0)
    }

    /// Count attempt rows carrying a given error code (used by reconciliation)
    pub async fn count_by_error_code(&self, order_id: u64, error_code: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM payment_ledger WHERE order_id = ? AND error_code = ?",
        )
        .bind(order_id)
        .bind(error_code)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;
        Ok(row.0)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    // Repository behavior against a live database is covered by the state
    // machine integration paths; unit tests focus on entry construction in
    // the models module.
}
