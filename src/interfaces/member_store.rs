//! Member storage interface.

use async_trait::async_trait;

use crate::model::{Member, MemberSearch, ReferralLink};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Order already recorded")]
    DuplicateOrder,

    #[error("Posting would overdraw a balance")]
    InsufficientBalance,

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Decimal error: {0}")]
    Decimal(#[from] rust_decimal::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage backend not available: {0}")]
    Unsupported(String),

    #[error("Injected failure: {0}")]
    Injected(String),
}

/// Interface for member persistence.
///
/// Phone and card number are each unique when present. Implementations must
/// check uniqueness inside the same atomic unit as the write, so a
/// concurrent insert cannot slip between a caller's pre-check and the insert.
///
/// Implementations:
/// - `SqliteStore`: SQLite storage
/// - `MockStore`: In-memory storage for tests and embedded use
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Fetch a member by id.
    async fn get(&self, id: &str) -> Result<Option<Member>>;

    /// Exact phone lookup.
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Member>>;

    /// Exact card number lookup.
    async fn find_by_card(&self, card_no: &str) -> Result<Option<Member>>;

    /// OR-combined search: exact phone, exact card, name substring.
    ///
    /// Returns members ordered by creation time, then id. An empty search
    /// returns nothing.
    async fn search(&self, search: &MemberSearch) -> Result<Vec<Member>>;

    /// Insert a new member.
    ///
    /// Fails with `DuplicateKey` if the phone or card is already taken.
    async fn insert(&self, member: &Member) -> Result<()>;

    /// Replace phone, card and name.
    ///
    /// Fails with `NotFound` for an unknown id and `DuplicateKey` if the new
    /// phone or card belongs to another member.
    async fn update_profile(
        &self,
        id: &str,
        phone: Option<&str>,
        card_no: Option<&str>,
        name: &str,
    ) -> Result<()>;

    /// Set the referral link if none is set yet.
    ///
    /// Returns `false` when the member already has a referrer; the existing
    /// link is never replaced.
    async fn set_referral(&self, member_id: &str, link: &ReferralLink) -> Result<bool>;

    /// Members directly referred by `referrer_id`, oldest first.
    async fn list_referred(&self, referrer_id: &str) -> Result<Vec<Member>>;
}
