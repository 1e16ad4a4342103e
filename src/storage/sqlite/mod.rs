//! SQLite implementations of storage interfaces.
//!
//! One `SqliteStore` implements all three traits over a shared pool, so a
//! single `BEGIN IMMEDIATE` transaction can cover a balance update together
//! with its transaction records, or a ratio change together with the link
//! rewrites it triggers.

mod ledger_store;
mod member_store;
mod ratio_store;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};

use crate::interfaces::{Result, StorageError};
use crate::model::{Member, ReferralLink, Transaction, TransactionKind, REFERRAL_TIER};

use super::schema::{
    CREATE_BALANCES_TABLE, CREATE_MEMBERS_TABLE, CREATE_RATIOS_TABLE, CREATE_TRANSACTIONS_TABLE,
};

/// Path value that selects a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// SQLite implementation of MemberStore, LedgerStore and RatioStore.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a store over an existing pool. Call [`SqliteStore::init`]
    /// before use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) a database file and initialize the schema.
    pub async fn connect(path: &str) -> Result<Self> {
        if path == MEMORY_PATH {
            return Self::in_memory().await;
        }
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let store = Self::new(pool);
        store.init().await?;
        Ok(store)
    }

    /// Private in-memory database.
    ///
    /// Pinned to a single connection that never expires; a second
    /// connection would see a different, empty database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.init().await?;
        Ok(store)
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        for ddl in [
            CREATE_MEMBERS_TABLE,
            CREATE_BALANCES_TABLE,
            CREATE_TRANSACTIONS_TABLE,
            CREATE_RATIOS_TABLE,
        ] {
            sqlx::raw_sql(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Acquire a connection and open a write transaction on it.
    ///
    /// BEGIN IMMEDIATE acquires the write lock upfront, preventing deadlocks
    /// when concurrent DEFERRED transactions race to upgrade from shared to
    /// exclusive.
    async fn begin_immediate(&self) -> Result<PoolConnection<Sqlite>> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(conn)
    }

    /// Commit on success, roll back on error.
    async fn finish<T>(mut conn: PoolConnection<Sqlite>, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(value)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }
}

/// Fixed-width RFC 3339 so that TEXT comparison orders chronologically.
pub(crate) fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidTimestamp(format!("{value}: {e}")))
}

pub(crate) fn decode_decimal(value: &str) -> Result<Decimal> {
    Ok(Decimal::from_str(value)?)
}

pub(crate) fn member_from_row(row: &SqliteRow) -> Result<Member> {
    let referrer_id: Option<String> = row.try_get("referrer_id")?;
    let referral = match referrer_id {
        Some(referrer_id) => {
            let tier: Option<i64> = row.try_get("referral_tier")?;
            let ratio: Option<String> = row.try_get("referral_ratio")?;
            Some(ReferralLink {
                referrer_id,
                tier: tier.map_or(REFERRAL_TIER, |t| t as u32),
                ratio: match ratio {
                    Some(ratio) => decode_decimal(&ratio)?,
                    None => Decimal::ZERO,
                },
            })
        }
        None => None,
    };
    let created_at: String = row.try_get("created_at")?;

    Ok(Member {
        id: row.try_get("id")?,
        phone: row.try_get("phone")?,
        card_no: row.try_get("card_no")?,
        name: row.try_get("name")?,
        referral,
        created_at: decode_timestamp(&created_at)?,
    })
}

pub(crate) fn transaction_from_row(row: &SqliteRow) -> Result<Transaction> {
    let kind: String = row.try_get("kind")?;
    let points: String = row.try_get("points")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Transaction {
        id: row.try_get("id")?,
        member_id: row.try_get("member_id")?,
        relation_id: row.try_get("relation_id")?,
        kind: kind
            .parse::<TransactionKind>()
            .map_err(StorageError::Corrupt)?,
        points: decode_decimal(&points)?,
        amount: row.try_get("amount")?,
        order_no: row.try_get("order_no")?,
        created_at: decode_timestamp(&created_at)?,
    })
}

/// Unique-constraint violations become `DuplicateKey`; the atomic pre-checks
/// make this a backstop only.
pub(crate) fn map_unique_violation(error: sqlx::Error) -> StorageError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::DuplicateKey(db.message().to_string())
        }
        _ => StorageError::Database(error),
    }
}
