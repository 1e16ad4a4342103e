//! Abstract interfaces for the ledger's storage collaborator.
//!
//! These traits define the contracts for:
//! - Member storage (identity, uniqueness, referral links)
//! - Ledger storage (balances and the append-only transaction log)
//! - Ratio storage (the commission tier table)

pub mod ledger_store;
pub mod member_store;
pub mod ratio_store;

pub use ledger_store::LedgerStore;
pub use member_store::{MemberStore, Result, StorageError};
pub use ratio_store::RatioStore;
