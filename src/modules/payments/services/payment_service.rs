use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::config::FrontendConfig;
use crate::core::{AppError, Result};
use crate::modules::gateways::services::gateway_trait::{
    CreatePaymentRequest, PaymentGateway, QueryResult,
};
use crate::modules::ledger::{codes, LedgerRepository};
use crate::modules::notify::NotificationService;
use crate::modules::orders::models::PaymentStatus;
use crate::modules::orders::repositories::OrderRepository;
use crate::modules::orders::services::{ConfirmOutcome, PaymentStateMachine};

/// A registered gateway plus its return-redirect policy
pub struct ProviderEntry {
    pub gateway: Arc<dyn PaymentGateway>,
    /// Whether the browser return leg may confirm the payment
    pub confirm_on_return: bool,
}

/// Request body for creating a payment link
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderPaymentRequest {
    pub order_code: String,

    /// Optional client-declared amount; must match the order total when given
    pub amount_vnd: Option<i64>,

    pub description: Option<String>,

    pub client_ip: Option<String>,
}

/// Response body for a create-payment call
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderPaymentResponse {
    pub ok: bool,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_vnd: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// Audit view over an order's ledger trail
#[derive(Debug, Clone, Serialize)]
pub struct OrderLedgerView {
    pub order_code: String,
    pub payment_status: String,
    pub confirmed_count: i64,
    pub create_attempts: i64,
    pub admin_notified: bool,
    pub user_notified: bool,
    pub entries: Vec<crate::modules::ledger::LedgerEntry>,
}

/// Normalized IPN disposition; the controller shapes it into the
/// provider-specific acknowledgement body
#[derive(Debug, Clone)]
pub struct IpnAck {
    pub accepted: bool,
    pub code: String,
    pub message: String,
}

impl IpnAck {
    fn ok() -> Self {
        Self {
            accepted: true,
            code: "0".to_string(),
            message: "Confirm Success".to_string(),
        }
    }

    fn rejected(code: &str, message: &str) -> Self {
        Self {
            accepted: false,
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Orchestrates the payment flow across gateways, state machine and
/// notifications
///
/// Callback handlers here never propagate errors upward: the return leg
/// always produces a redirect URL and the IPN leg always produces an
/// acknowledgement, whatever went wrong underneath.
pub struct PaymentService {
    providers: HashMap<&'static str, ProviderEntry>,
    state: PaymentStateMachine,
    orders: OrderRepository,
    ledger: LedgerRepository,
    notifications: Arc<NotificationService>,
    frontend: FrontendConfig,
}

impl PaymentService {
    pub fn new(
        providers: Vec<ProviderEntry>,
        state: PaymentStateMachine,
        orders: OrderRepository,
        ledger: LedgerRepository,
        notifications: Arc<NotificationService>,
        frontend: FrontendConfig,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|entry| (entry.gateway.name(), entry))
            .collect();
        Self {
            providers,
            state,
            orders,
            ledger,
            notifications,
            frontend,
        }
    }

    fn provider(&self, name: &str) -> Result<&ProviderEntry> {
        self.providers
            .get(name)
            .ok_or_else(|| AppError::not_found(format!("Unknown payment provider: {}", name)))
    }

    /// Create a payment link and move the order to pending
    pub async fn create_payment(
        &self,
        provider: &str,
        request: CreateOrderPaymentRequest,
    ) -> Result<CreateOrderPaymentResponse> {
        let entry = self.provider(provider)?;
        let gateway = &entry.gateway;

        let expected = self
            .state
            .expected_amount_vnd(&request.order_code)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("Order not found: {}", request.order_code))
            })?;
        let amount_vnd = request.amount_vnd.unwrap_or(expected);

        if amount_vnd < gateway.min_amount_vnd() {
            return Err(AppError::validation(format!(
                "Amount {} is below the {} minimum of {}",
                amount_vnd,
                gateway.name(),
                gateway.min_amount_vnd()
            )));
        }

        let description = request
            .description
            .unwrap_or_else(|| format!("Thanh toan don hang {}", request.order_code));

        let created = gateway
            .create_payment(&CreatePaymentRequest {
                order_code: request.order_code.clone(),
                amount_vnd,
                description,
                client_ip: request.client_ip,
            })
            .await?;

        let outcome = self
            .state
            .mark_pending_and_log_create(
                &request.order_code,
                amount_vnd,
                gateway.name(),
                gateway.method().as_i32(),
                &created.provider_order_id,
            )
            .await?;

        if !outcome.ok {
            return Ok(CreateOrderPaymentResponse {
                ok: false,
                provider: gateway.name().to_string(),
                order_url: None,
                provider_order_id: None,
                amount_vnd: None,
                error_code: outcome.error_code,
            });
        }

        Ok(CreateOrderPaymentResponse {
            ok: true,
            provider: gateway.name().to_string(),
            order_url: Some(created.pay_url),
            provider_order_id: Some(created.provider_order_id),
            amount_vnd: Some(created.amount_vnd),
            error_code: None,
        })
    }

    /// Handle the browser return redirect; always yields a frontend URL
    pub async fn handle_return(
        &self,
        provider: &str,
        fields: &HashMap<String, String>,
    ) -> String {
        let entry = match self.provider(provider) {
            Ok(entry) => entry,
            Err(_) => return self.fail_redirect(provider, "UNKNOWN_PROVIDER"),
        };
        let gateway = &entry.gateway;

        match gateway.verify_callback(fields) {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                self.record_invalid_signature(gateway.as_ref(), fields).await;
                return self.fail_redirect(provider, codes::SIG_INVALID);
            }
        }

        let outcome = match gateway.parse_callback(fields) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(provider, error = %e, "unparseable return callback");
                return self.fail_redirect(provider, "MALFORMED");
            }
        };

        let order_code = match self.resolve(&outcome.provider_order_id).await {
            Some(code) => code,
            None => {
                warn!(
                    provider,
                    provider_order_id = %outcome.provider_order_id,
                    "return callback for unknown transaction"
                );
                return self.fail_redirect(provider, codes::ORDER_NOT_FOUND);
            }
        };

        if outcome.success {
            if entry.confirm_on_return {
                let amount = outcome.amount_vnd.unwrap_or(0);
                let force = outcome.amount_vnd.is_none();
                match self
                    .state
                    .confirm_paid(
                        &order_code,
                        amount,
                        gateway.name(),
                        gateway.method().as_i32(),
                        force,
                        &outcome.provider_order_id,
                    )
                    .await
                {
                    Ok(ConfirmOutcome::Confirmed) => {
                        self.dispatch_paid(&order_code, gateway.name(), amount).await
                    }
                    Ok(ConfirmOutcome::AlreadyPaid) => {}
                    Ok(ConfirmOutcome::AmountMismatch) => {
                        return self.fail_redirect(provider, codes::AMOUNT_MISMATCH);
                    }
                    Err(e) => {
                        error!(order_code, provider, error = %e, "confirm on return failed");
                        return self.fail_redirect(provider, codes::DB_ERROR);
                    }
                }
            }
            return self.thank_you_redirect(&order_code);
        }

        let status = failure_status(provider, &outcome.result_code);
        if let Err(e) = self
            .state
            .mark_failed_and_release(
                &order_code,
                gateway.name(),
                gateway.method().as_i32(),
                status,
                &outcome.result_code,
                Some(outcome.message.clone()),
                outcome.amount_vnd.unwrap_or(0),
                &outcome.provider_order_id,
            )
            .await
        {
            error!(order_code, provider, error = %e, "failed to record return failure");
        }
        self.fail_redirect(provider, &outcome.result_code)
    }

    /// Handle a server-to-server IPN; always yields an acknowledgement
    pub async fn handle_ipn(&self, provider: &str, fields: &HashMap<String, String>) -> IpnAck {
        let entry = match self.provider(provider) {
            Ok(entry) => entry,
            Err(_) => return IpnAck::rejected("99", "Unknown provider"),
        };
        let gateway = &entry.gateway;

        match gateway.verify_callback(fields) {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                self.record_invalid_signature(gateway.as_ref(), fields).await;
                return IpnAck::rejected("97", "Invalid signature");
            }
        }

        let outcome = match gateway.parse_callback(fields) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(provider, error = %e, "unparseable IPN body");
                return IpnAck::rejected("99", "Malformed payload");
            }
        };

        let order_code = match self.resolve(&outcome.provider_order_id).await {
            Some(code) => code,
            None => {
                warn!(
                    provider,
                    provider_order_id = %outcome.provider_order_id,
                    "IPN for unknown transaction"
                );
                return IpnAck::rejected("01", "Order not found");
            }
        };

        if outcome.success {
            let amount = outcome.amount_vnd.unwrap_or(0);
            let force = outcome.amount_vnd.is_none();
            match self
                .state
                .confirm_paid(
                    &order_code,
                    amount,
                    gateway.name(),
                    gateway.method().as_i32(),
                    force,
                    &outcome.provider_order_id,
                )
                .await
            {
                Ok(ConfirmOutcome::Confirmed) => {
                    self.dispatch_paid(&order_code, gateway.name(), amount).await;
                    IpnAck::ok()
                }
                // Replays and race losers acknowledge without re-acting.
                Ok(ConfirmOutcome::AlreadyPaid) => IpnAck::ok(),
                // Mismatch row already written by the state machine; tell the
                // provider the amount was wrong so it shows up in their logs.
                Ok(ConfirmOutcome::AmountMismatch) => IpnAck::rejected("04", "Invalid amount"),
                Err(e) => {
                    error!(order_code, provider, error = %e, "confirm on IPN failed");
                    IpnAck::rejected("99", "Internal error")
                }
            }
        } else {
            let status = failure_status(provider, &outcome.result_code);
            if let Err(e) = self
                .state
                .mark_failed_and_release(
                    &order_code,
                    gateway.name(),
                    gateway.method().as_i32(),
                    status,
                    &outcome.result_code,
                    Some(outcome.message.clone()),
                    outcome.amount_vnd.unwrap_or(0),
                    &outcome.provider_order_id,
                )
                .await
            {
                error!(order_code, provider, error = %e, "failed to record IPN failure");
                return IpnAck::rejected("99", "Internal error");
            }
            IpnAck::ok()
        }
    }

    /// Audit view: full ledger trail plus the derived invariant counters
    ///
    /// Support tooling reads this when reconciling a disputed payment; the
    /// confirmed count must never exceed 1.
    pub async fn order_ledger(&self, order_code: &str) -> Result<OrderLedgerView> {
        let order = self
            .orders
            .find_by_code(order_code)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Order not found: {}", order_code)))?;

        let entries = self.ledger.find_by_order_id(order.id).await?;
        let confirmed_count = self.ledger.count_confirmed(order.id).await?;
        let create_attempts = self
            .ledger
            .count_by_error_code(order.id, codes::CREATE_REQUEST)
            .await?;

        let (admin_notified, user_notified) = match order.payment_provider.as_deref() {
            Some(provider) => (
                self.ledger
                    .sentinel_exists(order.id, provider, codes::ADMIN_TG_PAID)
                    .await?,
                self.ledger
                    .sentinel_exists(order.id, provider, codes::USER_INAPP_PAID)
                    .await?,
            ),
            None => (false, false),
        };

        Ok(OrderLedgerView {
            order_code: order.order_code,
            payment_status: order.payment_status.to_string(),
            confirmed_count,
            create_attempts,
            admin_notified,
            user_notified,
            entries,
        })
    }

    /// Query a provider for a transaction's current status
    pub async fn query_transaction(
        &self,
        provider: &str,
        provider_order_id: &str,
    ) -> Result<QueryResult> {
        let entry = self.provider(provider)?;
        entry.gateway.query_transaction(provider_order_id).await
    }

    async fn resolve(&self, provider_order_id: &str) -> Option<String> {
        match self.orders.resolve_order_code(provider_order_id).await {
            Ok(code) => code,
            Err(e) => {
                error!(provider_order_id, error = %e, "order resolution failed");
                None
            }
        }
    }

    async fn record_invalid_signature(
        &self,
        gateway: &dyn PaymentGateway,
        fields: &HashMap<String, String>,
    ) {
        // Best effort: the forged/corrupt callback may still carry a usable
        // transaction id worth pinning the failure to.
        let candidate = gateway
            .parse_callback(fields)
            .map(|o| o.provider_order_id)
            .unwrap_or_default();
        if candidate.is_empty() {
            warn!(provider = gateway.name(), "invalid signature, no transaction id");
            return;
        }
        let Some(order_code) = self.resolve(&candidate).await else {
            warn!(
                provider = gateway.name(),
                provider_order_id = %candidate,
                "invalid signature on unknown transaction"
            );
            return;
        };
        if let Err(e) = self
            .state
            .mark_failed_and_release(
                &order_code,
                gateway.name(),
                gateway.method().as_i32(),
                PaymentStatus::Failed,
                codes::SIG_INVALID,
                None,
                0,
                &candidate,
            )
            .await
        {
            error!(order_code, error = %e, "failed to record invalid signature");
        }
    }

    async fn dispatch_paid(&self, order_code: &str, provider: &str, amount_vnd: i64) {
        match self.orders.find_by_code(order_code).await {
            Ok(Some(order)) => {
                self.notifications
                    .notify_order_paid(&order, provider, amount_vnd)
                    .await;
            }
            Ok(None) => {
                error!(order_code, "confirmed order vanished before notification");
            }
            Err(e) => {
                error!(order_code, error = %e, "could not load order for notification");
            }
        }
    }

    fn thank_you_redirect(&self, order_code: &str) -> String {
        format!(
            "{}?code={}",
            self.frontend.thank_you_url,
            urlencoding::encode(order_code)
        )
    }

    fn fail_redirect(&self, provider: &str, result_code: &str) -> String {
        format!(
            "{}?payfail=1&prov={}&rc={}",
            self.frontend.checkout_url,
            urlencoding::encode(provider),
            urlencoding::encode(result_code)
        )
    }

}

/// Map a provider result code to the terminal order status
///
/// User-initiated cancellations land on `canceled`, everything else on
/// `failed`.
fn failure_status(provider: &str, result_code: &str) -> PaymentStatus {
    let canceled = match provider {
        "momo" => result_code == "1006",
        "vnpay" => result_code == "24",
        "payos" => result_code.eq_ignore_ascii_case("CANCELLED"),
        _ => false,
    };
    if canceled {
        PaymentStatus::Canceled
    } else {
        PaymentStatus::Failed
    }
}
