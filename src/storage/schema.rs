//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Members table schema.
#[derive(Iden, Clone, Copy)]
pub enum Members {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "phone"]
    Phone,
    #[iden = "card_no"]
    CardNo,
    #[iden = "name"]
    Name,
    #[iden = "referrer_id"]
    ReferrerId,
    #[iden = "referral_tier"]
    ReferralTier,
    #[iden = "referral_ratio"]
    ReferralRatio,
    #[iden = "created_at"]
    CreatedAt,
}

/// Column list used by every member select.
pub const MEMBER_COLUMNS: [Members; 8] = [
    Members::Id,
    Members::Phone,
    Members::CardNo,
    Members::Name,
    Members::ReferrerId,
    Members::ReferralTier,
    Members::ReferralRatio,
    Members::CreatedAt,
];

/// Balances table schema.
#[derive(Iden, Clone, Copy)]
pub enum Balances {
    Table,
    #[iden = "member_id"]
    MemberId,
    #[iden = "available"]
    Available,
    #[iden = "lifetime"]
    Lifetime,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Transactions table schema.
#[derive(Iden, Clone, Copy)]
pub enum Transactions {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "member_id"]
    MemberId,
    #[iden = "relation_id"]
    RelationId,
    #[iden = "kind"]
    Kind,
    #[iden = "direction"]
    Direction,
    #[iden = "points"]
    Points,
    #[iden = "amount"]
    Amount,
    #[iden = "order_no"]
    OrderNo,
    #[iden = "created_at"]
    CreatedAt,
}

/// Column list used by every transaction select.
pub const TRANSACTION_COLUMNS: [Transactions; 8] = [
    Transactions::Id,
    Transactions::MemberId,
    Transactions::RelationId,
    Transactions::Kind,
    Transactions::Points,
    Transactions::Amount,
    Transactions::OrderNo,
    Transactions::CreatedAt,
];

/// Ratio tiers table schema.
#[derive(Iden, Clone, Copy)]
pub enum Ratios {
    Table,
    #[iden = "tier"]
    Tier,
    #[iden = "fraction"]
    Fraction,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// SQL for creating the members table.
///
/// Decimal values are stored as TEXT so they round-trip exactly.
pub const CREATE_MEMBERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS members (
    id TEXT PRIMARY KEY NOT NULL,
    phone TEXT UNIQUE,
    card_no TEXT UNIQUE,
    name TEXT NOT NULL DEFAULT '',
    referrer_id TEXT,
    referral_tier INTEGER,
    referral_ratio TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_members_referrer ON members(referrer_id);
"#;

/// SQL for creating the balances table.
pub const CREATE_BALANCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS balances (
    member_id TEXT PRIMARY KEY NOT NULL,
    available TEXT NOT NULL,
    lifetime TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// SQL for creating the transactions table.
///
/// The partial unique index is the storage-level idempotency key: one
/// consume and one cashout per (member, order number).
pub const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    member_id TEXT NOT NULL,
    relation_id TEXT,
    kind TEXT NOT NULL,
    direction TEXT NOT NULL,
    points TEXT NOT NULL,
    amount INTEGER NOT NULL,
    order_no TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_history
    ON transactions(member_id, direction, created_at);

CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_order
    ON transactions(member_id, order_no, kind)
    WHERE order_no IS NOT NULL AND kind IN ('consume', 'cashout');
"#;

/// SQL for creating the ratio tiers table.
pub const CREATE_RATIOS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ratios (
    tier INTEGER PRIMARY KEY NOT NULL,
    fraction TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
