use rust_decimal::Decimal;
use sqlx::MySqlPool;
use tracing::{error, info, warn};

use super::super::models::PaymentStatus;
use super::super::repositories::OrderRepository;
use crate::core::currency::{to_vnd, vnd_matches};
use crate::core::{AppError, Result};
use crate::modules::ledger::models::{codes, LedgerEntry};
use crate::modules::ledger::repositories::LedgerRepository;

/// Outcome of a create-payment attempt
///
/// Business outcomes are values, not errors: an already-paid order or an
/// amount mismatch is an expected branch, reported through `error_code`.
#[derive(Debug, Clone)]
pub struct PendingOutcome {
    pub ok: bool,
    pub order_id: u64,
    pub pay_total: Decimal,
    pub error_code: Option<String>,
}

impl PendingOutcome {
    fn rejected(code: &str) -> Self {
        Self {
            ok: false,
            order_id: 0,
            pay_total: Decimal::ZERO,
            error_code: Some(code.to_string()),
        }
    }
}

/// Outcome of a confirmation attempt
///
/// `Confirmed` is the sole notify trigger. The two no-op variants are kept
/// apart because a replayed webhook and a wrong-amount webhook need different
/// ledger treatment: the replay writes nothing, the mismatch writes an
/// `AMOUNT_MISMATCH` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// This call transitioned the order to paid
    Confirmed,
    /// Order already paid (replay or lost race); nothing written
    AlreadyPaid,
    /// Order not paid and the claimed amount does not match the total;
    /// mismatch row written, status untouched
    AmountMismatch,
}

/// The order payment state machine
///
/// Sole writer of `payment_status`/`payment_provider`/`payment_ref` and the
/// ledger. Every operation is a single database transaction; a dropped
/// future rolls the transaction back, so partial ledger writes cannot
/// happen. Raw driver errors never cross this boundary — they are logged
/// with order context and surfaced as DB_ERROR.
#[derive(Clone)]
pub struct PaymentStateMachine {
    orders: OrderRepository,
    ledger: LedgerRepository,
}

impl PaymentStateMachine {
    pub fn new(orders: OrderRepository, ledger: LedgerRepository) -> Self {
        Self { orders, ledger }
    }

    fn pool(&self) -> &MySqlPool {
        self.orders.pool()
    }

    /// Move an order to pending and log the creation attempt
    ///
    /// Runs under an exclusive row lock on the order for the whole
    /// check-then-act sequence, so it cannot interleave with a concurrent
    /// confirm. An amount mismatch is logged and committed without touching
    /// `payment_status`.
    pub async fn mark_pending_and_log_create(
        &self,
        order_code: &str,
        amount_vnd: i64,
        provider: &str,
        method: i32,
        provider_txn_id: &str,
    ) -> Result<PendingOutcome> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| db_error(order_code, provider, "begin", e))?;

        let order = OrderRepository::find_by_code_for_update(&mut tx, order_code)
            .await
            .map_err(|e| app_db_error(order_code, provider, "lock order", e))?;

        let order = match order {
            Some(order) => order,
            None => {
                warn!(order_code, provider, "create attempt for unknown order");
                return Ok(PendingOutcome::rejected(codes::ORDER_NOT_FOUND));
            }
        };

        // A late create call must never reopen a completed order.
        if order.is_paid() {
            warn!(order_code, provider, "create attempt on already-paid order");
            return Ok(PendingOutcome::rejected(codes::ORDER_ALREADY_PAID));
        }

        if !vnd_matches(order.pay_total, amount_vnd) {
            let entry = LedgerEntry::attempt(
                order.id,
                provider,
                method,
                amount_vnd,
                provider_txn_id,
                order_code,
                codes::AMOUNT_MISMATCH,
                Some(format!(
                    "requested {} but order total is {}",
                    amount_vnd, order.pay_total
                )),
            );
            self.ledger
                .insert_with_tx(&entry, &mut *tx)
                .await
                .map_err(|e| app_db_error(order_code, provider, "log mismatch", e))?;
            tx.commit()
                .await
                .map_err(|e| db_error(order_code, provider, "commit", e))?;

            warn!(
                order_code,
                provider,
                amount_vnd,
                pay_total = %order.pay_total,
                "amount mismatch on create, order state unchanged"
            );
            return Ok(PendingOutcome {
                ok: false,
                order_id: order.id,
                pay_total: order.pay_total,
                error_code: Some(codes::AMOUNT_MISMATCH.to_string()),
            });
        }

        OrderRepository::set_pending(&mut tx, order.id, provider, provider_txn_id)
            .await
            .map_err(|e| app_db_error(order_code, provider, "set pending", e))?;

        let entry = LedgerEntry::create_request(
            order.id,
            provider,
            method,
            amount_vnd,
            provider_txn_id,
            order_code,
        );
        self.ledger
            .insert_with_tx(&entry, &mut *tx)
            .await
            .map_err(|e| app_db_error(order_code, provider, "log create", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error(order_code, provider, "commit", e))?;

        info!(
            order_code,
            provider, provider_txn_id, amount_vnd, "order moved to pending"
        );

        Ok(PendingOutcome {
            ok: true,
            order_id: order.id,
            pay_total: order.pay_total,
            error_code: None,
        })
    }

    /// Atomically confirm a payment
    ///
    /// The check-and-flip is a single conditional UPDATE, so a webhook and a
    /// return redirect racing each other produce exactly one `Confirmed`.
    /// That variant is the sole trigger for notify-once side effects —
    /// callers must not re-derive "newly paid" any other way. When the UPDATE
    /// misses, the order row is locked to tell a replay (already paid, write
    /// nothing) apart from a wrong-amount confirmation, which leaves the
    /// status alone but logs an `AMOUNT_MISMATCH` row. `force_when_return`
    /// lets a redirect confirm on result code alone when the provider's
    /// redirect carries no amount; the not-already-paid predicate still
    /// holds.
    pub async fn confirm_paid(
        &self,
        order_code: &str,
        amount_vnd: i64,
        provider: &str,
        method: i32,
        force_when_return: bool,
        provider_txn_id: &str,
    ) -> Result<ConfirmOutcome> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| db_error(order_code, provider, "begin", e))?;

        let transitioned = OrderRepository::confirm_paid(
            &mut tx,
            order_code,
            provider,
            amount_vnd,
            force_when_return,
        )
        .await
        .map_err(|e| app_db_error(order_code, provider, "confirm", e))?;

        if !transitioned {
            let order = OrderRepository::find_by_code_for_update(&mut tx, order_code)
                .await
                .map_err(|e| app_db_error(order_code, provider, "inspect no-op", e))?;

            let order = match order {
                Some(order) => order,
                None => {
                    tx.rollback()
                        .await
                        .map_err(|e| db_error(order_code, provider, "rollback", e))?;
                    warn!(order_code, provider, "confirm attempt for unknown order");
                    return Ok(ConfirmOutcome::AlreadyPaid);
                }
            };

            if order.is_paid() {
                tx.rollback()
                    .await
                    .map_err(|e| db_error(order_code, provider, "rollback", e))?;
                info!(order_code, provider, "confirm was a no-op (already paid)");
                return Ok(ConfirmOutcome::AlreadyPaid);
            }

            // Not paid, so the amount predicate is what the UPDATE tripped on.
            let entry = LedgerEntry::attempt(
                order.id,
                provider,
                method,
                amount_vnd,
                provider_txn_id,
                order_code,
                codes::AMOUNT_MISMATCH,
                Some(format!(
                    "confirmation claimed {} but order total is {}",
                    amount_vnd, order.pay_total
                )),
            );
            self.ledger
                .insert_with_tx(&entry, &mut *tx)
                .await
                .map_err(|e| app_db_error(order_code, provider, "log mismatch", e))?;
            tx.commit()
                .await
                .map_err(|e| db_error(order_code, provider, "commit", e))?;

            warn!(
                order_code,
                provider,
                amount_vnd,
                pay_total = %order.pay_total,
                "amount mismatch on confirmation, order state unchanged"
            );
            return Ok(ConfirmOutcome::AmountMismatch);
        }

        let order = sqlx::query_as::<_, (u64,)>("SELECT id FROM orders WHERE order_code = ?")
            .bind(order_code)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error(order_code, provider, "load confirmed order", e))?;

        let entry = LedgerEntry::confirmed(
            order.0,
            provider,
            method,
            amount_vnd,
            provider_txn_id,
            order_code,
        );
        self.ledger
            .insert_with_tx(&entry, &mut *tx)
            .await
            .map_err(|e| app_db_error(order_code, provider, "log confirm", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error(order_code, provider, "commit", e))?;

        info!(order_code, provider, amount_vnd, "order confirmed paid");
        Ok(ConfirmOutcome::Confirmed)
    }

    /// Record a failed or canceled attempt and signal stock release
    ///
    /// A stale failure callback arriving after a race-won success is a
    /// no-op: no status change, no ledger row, no release event. The
    /// returned bool is the release-event boundary — the inventory service
    /// listens for the emitted event; the core never touches stock itself.
    #[allow(clippy::too_many_arguments)]
    pub async fn mark_failed_and_release(
        &self,
        order_code: &str,
        provider: &str,
        method: i32,
        new_status: PaymentStatus,
        error_code: &str,
        error_message: Option<String>,
        amount_vnd: i64,
        transaction_id: &str,
    ) -> Result<bool> {
        debug_assert!(matches!(
            new_status,
            PaymentStatus::Failed | PaymentStatus::Canceled
        ));

        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| db_error(order_code, provider, "begin", e))?;

        let changed = OrderRepository::mark_failed(&mut tx, order_code, new_status)
            .await
            .map_err(|e| app_db_error(order_code, provider, "mark failed", e))?;

        if !changed {
            tx.rollback()
                .await
                .map_err(|e| db_error(order_code, provider, "rollback", e))?;
            info!(
                order_code,
                provider, error_code, "stale failure ignored (order already paid or unknown)"
            );
            return Ok(false);
        }

        let order = sqlx::query_as::<_, (u64,)>("SELECT id FROM orders WHERE order_code = ?")
            .bind(order_code)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error(order_code, provider, "load failed order", e))?;

        let entry = LedgerEntry::attempt(
            order.0,
            provider,
            method,
            amount_vnd,
            transaction_id,
            order_code,
            error_code,
            error_message,
        );
        self.ledger
            .insert_with_tx(&entry, &mut *tx)
            .await
            .map_err(|e| app_db_error(order_code, provider, "log failure", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error(order_code, provider, "commit", e))?;

        // Release-event boundary: the inventory service subscribes to this.
        info!(
            order_code,
            provider,
            error_code,
            status = %new_status,
            event = "payment.release_stock",
            "payment attempt failed, stock reservation released"
        );
        Ok(true)
    }

    /// Integer VND amount an order expects, for callers shaping gateway requests
    pub async fn expected_amount_vnd(&self, order_code: &str) -> Result<Option<i64>> {
        match self.orders.find_by_code(order_code).await? {
            Some(order) => Ok(Some(to_vnd(order.pay_total)?)),
            None => Ok(None),
        }
    }
}

fn db_error(order_code: &str, provider: &str, step: &str, e: sqlx::Error) -> AppError {
    error!(order_code, provider, step, error = %e, "database failure in payment state machine");
    AppError::internal("DB_ERROR")
}

fn app_db_error(order_code: &str, provider: &str, step: &str, e: AppError) -> AppError {
    match e {
        AppError::Database(db) => db_error(order_code, provider, step, db),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_outcome_rejected() {
        let outcome = PendingOutcome::rejected(codes::ORDER_NOT_FOUND);
        assert!(!outcome.ok);
        assert_eq!(outcome.order_id, 0);
        assert_eq!(outcome.error_code.as_deref(), Some("ORDER_NOT_FOUND"));
    }

    #[test]
    fn test_db_error_never_leaks_driver_details() {
        let err = db_error("HA100001", "momo", "commit", sqlx::Error::PoolClosed);
        assert_eq!(err.to_string(), "Internal error: DB_ERROR");
    }
}
