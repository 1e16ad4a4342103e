//! Ledger services.

pub mod directory;
pub mod engine;
pub mod ratio_table;
pub mod referral;

pub use directory::{validate_phone, MemberDirectory};
pub use engine::{
    parse_history_date, CashoutOutcome, CashoutRequest, ConsumeOutcome, ConsumeRequest,
    MemberLocks, TransactionEngine,
};
pub use ratio_table::RatioTable;
pub use referral::ReferralGraph;
