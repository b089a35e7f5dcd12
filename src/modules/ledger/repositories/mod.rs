pub mod ledger_repository;

pub use ledger_repository::LedgerRepository;
