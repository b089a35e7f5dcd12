//! HaPay — payment core of the HA storefront
//!
//! Integrates the momo, zalopay, vnpay and payos gateways behind a uniform
//! adapter trait, and owns the order payment state machine, the append-only
//! payment ledger and the notify-once side effects.

pub mod config;
pub mod core;
pub mod middleware;
pub mod modules;

// Re-export commonly used types
pub use modules::gateways;
pub use modules::ledger;
pub use modules::notify;
pub use modules::orders;
pub use modules::payments;
