//! Loyalty ledger - membership points and referral commissions.
//!
//! Tracks point balances for members of a referral-based rewards program
//! and splits commissions whenever a member spends. Storage is reached
//! through the traits in [`interfaces`]; [`storage`] ships SQLite and
//! in-memory backends.

pub mod config;
pub mod error;
pub mod facade;
pub mod interfaces;
pub mod model;
pub mod services;
pub mod storage;
pub mod utils;

pub use error::{LedgerError, Result};
pub use facade::LoyaltyLedger;
