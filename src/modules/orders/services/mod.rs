pub mod payment_state;

pub use payment_state::{ConfirmOutcome, PaymentStateMachine, PendingOutcome};
