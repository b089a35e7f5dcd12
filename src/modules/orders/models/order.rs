use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Order payment state
///
/// `Paid` is terminal and reachable from `Pending` only. `Failed` and
/// `Canceled` are re-enterable: a new create attempt moves the order back
/// to `Pending`, with the same or a different provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Pending,
    Paid,
    Failed,
    Canceled,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Unpaid => write!(f, "unpaid"),
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Canceled => write!(f, "canceled"),
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "canceled" => Ok(PaymentStatus::Canceled),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

/// Order row as the payment core sees it
///
/// The order belongs to the storefront schema; the core only ever writes the
/// payment columns (`payment_status`, `payment_provider`, `payment_ref`,
/// `paid_at`) and only under the state machine's locking rules.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: u64,

    /// Human-facing order code, stable and immutable once placed
    pub order_code: String,

    /// Exact amount a payment confirmation must match
    pub pay_total: Decimal,

    pub payment_status: PaymentStatus,

    /// Gateway currently associated with the order
    pub payment_provider: Option<String>,

    /// Provider's own order id for the current attempt; overwritten on
    /// every new creation attempt
    pub payment_ref: Option<String>,

    pub paid_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}
