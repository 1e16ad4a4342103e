//! Engine error taxonomy.

use rust_decimal::Decimal;

use crate::interfaces::StorageError;
use crate::model::Member;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Response codes understood by the request-handling layer.
pub mod codes {
    pub const OK: &str = "200";
    /// Duplicate order or already-registered member.
    pub const DUPLICATE: &str = "201";
    /// More than one member matched; the caller has to choose.
    pub const CHOOSE_ONE: &str = "300";
    pub const NOT_FOUND: &str = "404";
    /// Missing or malformed input, or insufficient balance.
    pub const INVALID: &str = "412";
    pub const FAIL: &str = "500";
    pub const CREATE_FAILED: &str = "501";
}

/// Errors surfaced by directory, referral, ratio and engine operations.
///
/// Ambiguous lookups are not errors; see [`crate::model::MemberMatch`].
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("Invalid ratio table: {0}")]
    InvalidRatio(String),

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("Inconsistent member keys: {0}")]
    Inconsistent(String),

    #[error("Member already exists: {}", .0.id)]
    DuplicateMember(Box<Member>),

    #[error("Order {order_no} already processed for member {member_id}")]
    DuplicateOrder { member_id: String, order_no: String },

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Member {0} already has a referrer")]
    AlreadyBound(String),

    #[error("Member {0} cannot refer itself")]
    SelfReferral(String),

    #[error("Binding {member_id} to {referrer_id} would create a referral cycle")]
    ReferralCycle {
        member_id: String,
        referrer_id: String,
    },

    #[error("Member {0} is busy, retry later")]
    Busy(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LedgerError {
    pub(crate) fn member_not_found(id: &str) -> Self {
        LedgerError::NotFound {
            kind: "member",
            key: id.to_string(),
        }
    }

    /// Only lock contention is worth retrying blindly; everything else either
    /// fails the same way again or is protected by the order number.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Busy(_))
    }

    /// Response code for the request-handling layer.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Invalid(_)
            | LedgerError::InvalidPhone(_)
            | LedgerError::InvalidRatio(_)
            | LedgerError::InsufficientBalance { .. } => codes::INVALID,
            LedgerError::NotFound { .. } => codes::NOT_FOUND,
            LedgerError::DuplicateMember(_) | LedgerError::DuplicateOrder { .. } => {
                codes::DUPLICATE
            }
            LedgerError::AlreadyBound(_)
            | LedgerError::SelfReferral(_)
            | LedgerError::ReferralCycle { .. }
            | LedgerError::Inconsistent(_)
            | LedgerError::Busy(_)
            | LedgerError::Internal(_)
            | LedgerError::Storage(_) => codes::FAIL,
        }
    }
}
