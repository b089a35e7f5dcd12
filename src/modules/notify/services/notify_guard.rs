use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::core::Result;
use crate::modules::ledger::{codes, LedgerRepository};
use crate::modules::notify::services::notifier::PaidNotifier;
use crate::modules::orders::models::Order;

/// At-most-once execution guard for paid-order side effects
///
/// The sentinel ledger row is inserted BEFORE the side effect runs, so a
/// crash between insert and send loses the notification rather than
/// duplicating it. Concurrent callers race on the UNIQUE sentinel_key;
/// exactly one wins and runs the action.
#[derive(Clone)]
pub struct NotifyOnceGuard {
    ledger: LedgerRepository,
}

impl NotifyOnceGuard {
    pub fn new(ledger: LedgerRepository) -> Self {
        Self { ledger }
    }

    /// Run `action` at most once per (order, provider, sentinel_code)
    ///
    /// Returns Ok(true) when this call ran the action, Ok(false) when it was
    /// already handled. Action failures are logged and swallowed: the
    /// sentinel stays in place and callers must not retry through this path.
    pub async fn try_notify_once<F, Fut>(
        &self,
        order_id: u64,
        provider: &str,
        sentinel_code: &str,
        action: F,
    ) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let inserted = self
            .ledger
            .try_insert_sentinel(order_id, provider, sentinel_code)
            .await?;

        if !inserted {
            debug!(order_id, provider, sentinel_code, "notification already handled");
            return Ok(false);
        }

        if let Err(e) = action().await {
            error!(
                order_id,
                provider,
                sentinel_code,
                error = %e,
                "paid notification failed after sentinel insert"
            );
        }
        Ok(true)
    }
}

/// Fans a confirmed payment out to the notification channels
///
/// Each channel has its own sentinel code, so a Telegram outage does not
/// block the in-app notification and vice versa.
pub struct NotificationService {
    guard: NotifyOnceGuard,
    telegram: Option<Arc<dyn PaidNotifier>>,
    in_app: Arc<dyn PaidNotifier>,
}

impl NotificationService {
    pub fn new(
        guard: NotifyOnceGuard,
        telegram: Option<Arc<dyn PaidNotifier>>,
        in_app: Arc<dyn PaidNotifier>,
    ) -> Self {
        Self {
            guard,
            telegram,
            in_app,
        }
    }

    /// Fire all paid-order notifications, each at most once
    ///
    /// Only the confirming transition may call this; the state machine's
    /// conditional UPDATE is what makes that call site unique.
    pub async fn notify_order_paid(&self, order: &Order, provider: &str, amount_vnd: i64) {
        if let Some(telegram) = &self.telegram {
            let result = self
                .guard
                .try_notify_once(order.id, provider, codes::ADMIN_TG_PAID, || {
                    telegram.notify_paid(order, provider, amount_vnd)
                })
                .await;
            if let Err(e) = result {
                error!(order_code = %order.order_code, error = %e, "admin alert guard failed");
            }
        }

        let result = self
            .guard
            .try_notify_once(order.id, provider, codes::USER_INAPP_PAID, || {
                self.in_app.notify_paid(order, provider, amount_vnd)
            })
            .await;
        match result {
            Ok(true) => info!(order_code = %order.order_code, "paid notifications dispatched"),
            Ok(false) => {}
            Err(e) => {
                error!(order_code = %order.order_code, error = %e, "in-app notification guard failed")
            }
        }
    }
}
