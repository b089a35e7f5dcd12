pub mod models;
pub mod repositories;
pub mod services;

pub use models::{Order, PaymentStatus};
pub use repositories::OrderRepository;
pub use services::{ConfirmOutcome, PaymentStateMachine, PendingOutcome};
