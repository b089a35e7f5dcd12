pub mod ledger_entry;

pub use ledger_entry::{codes, LedgerEntry, STATUS_CONFIRMED, STATUS_CREATED};
