//! Shared storage integration tests.
//!
//! Tests the MemberStore, LedgerStore and RatioStore interfaces against all
//! implementations. Each implementation module imports these test functions
//! and runs them.

pub mod ledger_store_tests;
pub mod member_store_tests;
pub mod ratio_store_tests;

use chrono::{DateTime, SubsecRound, Utc};
use loyalty_ledger::model::Member;

/// Current time at the microsecond precision every backend keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn member(id: &str, phone: Option<&str>, card_no: Option<&str>, name: &str) -> Member {
    Member {
        id: id.to_string(),
        phone: phone.map(str::to_string),
        card_no: card_no.map(str::to_string),
        name: name.to_string(),
        referral: None,
        created_at: now(),
    }
}
