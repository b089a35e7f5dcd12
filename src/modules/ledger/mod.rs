pub mod models;
pub mod repositories;

pub use models::{codes, LedgerEntry};
pub use repositories::LedgerRepository;
