use sqlx::{MySql, MySqlPool, Transaction};

use super::super::models::{Order, PaymentStatus};
use crate::core::{AppError, Result};

const ORDER_COLUMNS: &str =
    "id, order_code, pay_total, payment_status, payment_provider, payment_ref, paid_at";

/// Repository for the payment view of the orders table
///
/// The storefront owns the table; this repository touches only the payment
/// columns and is the single place the core's SQL lives.
#[derive(Clone)]
pub struct OrderRepository {
    pool: MySqlPool,
}

impl OrderRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Find an order by its code
    pub async fn find_by_code(&self, order_code: &str) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE order_code = ?",
            ORDER_COLUMNS
        ))
        .bind(order_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(order)
    }

    /// Find an order by code under an exclusive row lock
    ///
    /// Lock is held for the lifetime of the surrounding transaction; this is
    /// the check-then-act guard for the create path.
    pub async fn find_by_code_for_update(
        tx: &mut Transaction<'_, MySql>,
        order_code: &str,
    ) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE order_code = ? FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(order_code)
        .fetch_optional(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(order)
    }

    /// Resolve a provider transaction id back to the internal order code
    ///
    /// Matches either the order code itself or the current `payment_ref` —
    /// gateways only ever hand back their own id, so the ref match is the
    /// normal case. `None` means the id may be used for logging only, never
    /// for state mutation.
    pub async fn resolve_order_code(&self, provider_txn_id: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT order_code FROM orders WHERE order_code = ? OR payment_ref = ? LIMIT 1",
        )
        .bind(provider_txn_id)
        .bind(provider_txn_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.map(|(code,)| code))
    }

    /// Move a locked order to pending and record the current attempt
    pub async fn set_pending(
        tx: &mut Transaction<'_, MySql>,
        order_id: u64,
        provider: &str,
        payment_ref: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = 'pending', payment_provider = ?, payment_ref = ?
            WHERE id = ?
            "#,
        )
        .bind(provider)
        .bind(payment_ref)
        .bind(order_id)
        .execute(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Atomically flip an order to paid
    ///
    /// Single conditional UPDATE; no explicit lock window. The not-already-
    /// paid predicate makes a webhook and a return redirect racing each other
    /// produce exactly one transition. `force` skips the amount re-check for
    /// providers whose redirect carries no amount.
    pub async fn confirm_paid(
        tx: &mut Transaction<'_, MySql>,
        order_code: &str,
        provider: &str,
        amount_vnd: i64,
        force: bool,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = 'paid', payment_provider = ?, paid_at = NOW()
            WHERE order_code = ?
              AND payment_status <> 'paid'
              AND (CAST(ROUND(pay_total) AS SIGNED) = ? OR ?)
            "#,
        )
        .bind(provider)
        .bind(order_code)
        .bind(amount_vnd)
        .bind(force)
        .execute(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Move an order to failed/canceled unless it is already paid
    pub async fn mark_failed(
        tx: &mut Transaction<'_, MySql>,
        order_code: &str,
        new_status: PaymentStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = ?
            WHERE order_code = ? AND payment_status <> 'paid'
            "#,
        )
        .bind(new_status)
        .bind(order_code)
        .execute(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }
}
