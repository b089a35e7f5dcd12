pub mod gateways;
pub mod ledger;
pub mod notify;
pub mod orders;
pub mod payments;
