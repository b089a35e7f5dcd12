use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Ledger error-code vocabulary
///
/// Attempt rows carry one of the lifecycle codes; sentinel rows exist solely
/// as idempotency markers and are never queried for financial totals.
pub mod codes {
    /// Payment link created, order moved to pending
    pub const CREATE_REQUEST: &str = "CREATE_REQUEST";
    /// Requested amount did not match the order total
    pub const AMOUNT_MISMATCH: &str = "AMOUNT_MISMATCH";
    /// Callback signature recomputation failed
    pub const SIG_INVALID: &str = "SIG_INVALID";
    /// No order matched the given code
    pub const ORDER_NOT_FOUND: &str = "ORDER_NOT_FOUND";
    /// A create attempt hit an order that is already paid
    pub const ORDER_ALREADY_PAID: &str = "ORDER_ALREADY_PAID";
    /// Database failure, details kept in the server log only
    pub const DB_ERROR: &str = "DB_ERROR";

    /// Sentinel: admin Telegram alert already sent
    pub const ADMIN_TG_PAID: &str = "ADMIN_TG_PAID";
    /// Sentinel: in-app user notification already created
    pub const USER_INAPP_PAID: &str = "USER_INAPP_PAID";
}

/// Row status: 0 = created/pending attempt row, 1 = confirmed payment row
pub const STATUS_CREATED: i8 = 0;
pub const STATUS_CONFIRMED: i8 = 1;

/// Append-only payment transaction ledger entry
///
/// One row at create time, a second row at terminal resolution. The state
/// machine is the sole writer. `sentinel_key` carries the uniqueness tuple
/// for dedupe rows (MySQL has no partial unique indexes) and stays NULL on
/// ordinary attempt rows so repeated attempts remain legal.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    #[serde(skip_deserializing)]
    pub id: Option<u64>,

    pub order_id: u64,

    /// Provider tag (momo, zalopay, vnpay, payos)
    pub provider: String,

    /// Numeric payment method tag
    pub method: i32,

    /// 0 = created/pending, 1 = confirmed
    pub status: i8,

    pub amount: Decimal,

    pub currency: String,

    /// Provider-side correlation id for this attempt
    pub transaction_id: String,

    /// Internal order code at the time of the write
    pub merchant_ref: String,

    pub error_code: Option<String>,

    pub error_message: Option<String>,

    /// Uniqueness key for sentinel/confirm rows, NULL otherwise
    pub sentinel_key: Option<String>,

    #[serde(skip_deserializing)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(skip_deserializing)]
    pub updated_at: Option<DateTime<Utc>>,

    pub paid_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    /// Attempt row written when a payment link is created
    pub fn create_request(
        order_id: u64,
        provider: &str,
        method: i32,
        amount_vnd: i64,
        transaction_id: &str,
        merchant_ref: &str,
    ) -> Self {
        Self::attempt(
            order_id,
            provider,
            method,
            amount_vnd,
            transaction_id,
            merchant_ref,
            codes::CREATE_REQUEST,
            None,
        )
    }

    /// Attempt row documenting a failure or mismatch
    #[allow(clippy::too_many_arguments)]
    pub fn attempt(
        order_id: u64,
        provider: &str,
        method: i32,
        amount_vnd: i64,
        transaction_id: &str,
        merchant_ref: &str,
        error_code: &str,
        error_message: Option<String>,
    ) -> Self {
        Self {
            id: None,
            order_id,
            provider: provider.to_string(),
            method,
            status: STATUS_CREATED,
            amount: Decimal::from(amount_vnd),
            currency: "VND".to_string(),
            transaction_id: transaction_id.to_string(),
            merchant_ref: merchant_ref.to_string(),
            error_code: Some(error_code.to_string()),
            error_message,
            sentinel_key: None,
            created_at: Some(Utc::now()),
            updated_at: Some(Utc::now()),
            paid_at: None,
        }
    }

    /// Confirmed payment row; the sentinel key guarantees at most one per order
    pub fn confirmed(
        order_id: u64,
        provider: &str,
        method: i32,
        amount_vnd: i64,
        transaction_id: &str,
        merchant_ref: &str,
    ) -> Self {
        Self {
            id: None,
            order_id,
            provider: provider.to_string(),
            method,
            status: STATUS_CONFIRMED,
            amount: Decimal::from(amount_vnd),
            currency: "VND".to_string(),
            transaction_id: transaction_id.to_string(),
            merchant_ref: merchant_ref.to_string(),
            error_code: None,
            error_message: None,
            sentinel_key: Some(format!("{}:PAID", order_id)),
            created_at: Some(Utc::now()),
            updated_at: Some(Utc::now()),
            paid_at: Some(Utc::now()),
        }
    }

    /// Sentinel row marking a notification channel as handled
    pub fn sentinel(order_id: u64, provider: &str, sentinel_code: &str) -> Self {
        Self {
            id: None,
            order_id,
            provider: provider.to_string(),
            method: 0,
            status: STATUS_CREATED,
            amount: Decimal::ZERO,
            currency: "VND".to_string(),
            transaction_id: format!("sentinel-{}", uuid::Uuid::new_v4()),
            merchant_ref: String::new(),
            error_code: Some(sentinel_code.to_string()),
            error_message: None,
            sentinel_key: Some(format!("{}:{}:{}", order_id, provider, sentinel_code)),
            created_at: Some(Utc::now()),
            updated_at: Some(Utc::now()),
            paid_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_row() {
        let entry = LedgerEntry::create_request(7, "momo", 1, 150000, "240612x", "HA100001");
        assert_eq!(entry.status, STATUS_CREATED);
        assert_eq!(entry.error_code.as_deref(), Some(codes::CREATE_REQUEST));
        assert_eq!(entry.amount, Decimal::from(150000));
        assert!(entry.sentinel_key.is_none());
        assert!(entry.paid_at.is_none());
    }

    #[test]
    fn test_confirmed_row_has_paid_sentinel() {
        let entry = LedgerEntry::confirmed(7, "momo", 1, 150000, "240612x", "HA100001");
        assert_eq!(entry.status, STATUS_CONFIRMED);
        assert_eq!(entry.sentinel_key.as_deref(), Some("7:PAID"));
        assert!(entry.paid_at.is_some());
        assert!(entry.error_code.is_none());
    }

    #[test]
    fn test_sentinel_row_key_tuple() {
        let entry = LedgerEntry::sentinel(7, "momo", codes::ADMIN_TG_PAID);
        assert_eq!(entry.sentinel_key.as_deref(), Some("7:momo:ADMIN_TG_PAID"));
        assert_eq!(entry.amount, Decimal::ZERO);
    }

    #[test]
    fn test_sentinel_transaction_ids_are_unique() {
        let a = LedgerEntry::sentinel(7, "momo", codes::ADMIN_TG_PAID);
        let b = LedgerEntry::sentinel(7, "momo", codes::ADMIN_TG_PAID);
        assert_ne!(a.transaction_id, b.transaction_id);
    }
}
