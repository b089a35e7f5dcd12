use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::currency::MIN_GATEWAY_AMOUNT_VND;
use crate::core::Result;

/// Numeric payment method tags as persisted in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Momo = 1,
    ZaloPay = 2,
    VnPay = 3,
    PayOs = 4,
}

impl PaymentMethod {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Momo => write!(f, "momo"),
            PaymentMethod::ZaloPay => write!(f, "zalopay"),
            PaymentMethod::VnPay => write!(f, "vnpay"),
            PaymentMethod::PayOs => write!(f, "payos"),
        }
    }
}

/// Payment creation request, uniform across providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    /// Internal order code (stable, immutable once placed)
    pub order_code: String,

    /// Amount in integer VND
    pub amount_vnd: i64,

    /// Human-readable description shown on the provider's payment page
    pub description: String,

    /// Client IP, required by some providers in the signed field set
    pub client_ip: Option<String>,
}

/// Normalized result of a successful payment creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResult {
    /// URL the customer is sent to for payment
    pub pay_url: String,

    /// Provider-side order id, fresh on every attempt; persisted as payment_ref
    pub provider_order_id: String,

    /// Provider-side request id (correlation for support tickets)
    pub provider_request_id: String,

    /// Amount as submitted, in integer VND
    pub amount_vnd: i64,
}

/// Normalized view of a callback (return redirect or IPN webhook)
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    /// Provider-side order id handed back by the gateway
    pub provider_order_id: String,

    /// Amount the provider claims was paid, when present in the callback
    pub amount_vnd: Option<i64>,

    /// Provider's own result code, preserved verbatim
    pub result_code: String,

    /// Provider's free-text message
    pub message: String,

    /// Whether the result code is the provider's success value
    pub success: bool,
}

/// Normalized status-query result (manual reconciliation, not on the hot path)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub provider_order_id: String,
    pub result_code: String,
    pub message: String,
    pub amount_vnd: Option<i64>,
}

/// Payment gateway adapter contract
///
/// One implementation per provider. Adapters perform outbound HTTP only —
/// no database access. Signature verification recomputes the canonical
/// string from the exact field set the provider signs, excluding the
/// signature field itself.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Provider tag as persisted in `payment_provider` and the ledger
    fn name(&self) -> &'static str;

    /// Numeric method tag for ledger rows
    fn method(&self) -> PaymentMethod;

    /// Smallest amount this provider accepts
    fn min_amount_vnd(&self) -> i64 {
        MIN_GATEWAY_AMOUNT_VND
    }

    /// Create a payment link; generates a fresh provider order id every call
    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<CreateResult>;

    /// Verify the signature of an inbound callback field set
    fn verify_callback(&self, fields: &HashMap<String, String>) -> Result<bool>;

    /// Extract the normalized outcome from a verified callback field set
    fn parse_callback(&self, fields: &HashMap<String, String>) -> Result<CallbackOutcome>;

    /// Query the provider for a transaction's current status
    async fn query_transaction(&self, provider_order_id: &str) -> Result<QueryResult>;
}

/// Generate a fresh, globally-unique provider order id
///
/// Timestamp plus random suffix; gateways reject duplicate-id creation, so a
/// retried payment attempt must never reuse the previous id. Distinct from
/// the internal order code by construction.
pub fn fresh_provider_order_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{}{:06}", Utc::now().format("%y%m%d%H%M%S"), suffix)
}

/// Flatten a JSON webhook body into the string field map the verifiers use
///
/// Scalar values keep their canonical JSON text (numbers unquoted, booleans
/// `true`/`false`); nested objects and arrays keep their compact JSON form.
pub fn flatten_json_fields(value: &serde_json::Value) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    if let serde_json::Value::Object(map) = value {
        for (key, val) in map {
            let text = match val {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            fields.insert(key.clone(), text);
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_provider_order_id_is_unique() {
        let a = fresh_provider_order_id();
        let b = fresh_provider_order_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 18);
        assert!(a.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_payment_method_numeric_tags() {
        assert_eq!(PaymentMethod::Momo.as_i32(), 1);
        assert_eq!(PaymentMethod::ZaloPay.as_i32(), 2);
        assert_eq!(PaymentMethod::VnPay.as_i32(), 3);
        assert_eq!(PaymentMethod::PayOs.as_i32(), 4);
    }

    #[test]
    fn test_flatten_json_fields() {
        let body = serde_json::json!({
            "orderId": "2406120001",
            "amount": 150000,
            "resultCode": 0,
            "message": "Successful.",
            "extraData": null
        });
        let fields = flatten_json_fields(&body);
        assert_eq!(fields["orderId"], "2406120001");
        assert_eq!(fields["amount"], "150000");
        assert_eq!(fields["resultCode"], "0");
        assert_eq!(fields["extraData"], "");
    }
}
