//! Ledger transaction records and postings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Points a spender earns on their own purchase.
    SelfGain,
    /// Commission credited to a referrer.
    ReferralGain,
    /// A purchase, recording points used as currency.
    Consume,
    /// Points withdrawn.
    Cashout,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::SelfGain => "self_gain",
            TransactionKind::ReferralGain => "referral_gain",
            TransactionKind::Consume => "consume",
            TransactionKind::Cashout => "cashout",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            TransactionKind::SelfGain | TransactionKind::ReferralGain => Direction::Gain,
            TransactionKind::Consume | TransactionKind::Cashout => Direction::Spend,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "self_gain" => Ok(TransactionKind::SelfGain),
            "referral_gain" => Ok(TransactionKind::ReferralGain),
            "consume" => Ok(TransactionKind::Consume),
            "cashout" => Ok(TransactionKind::Cashout),
            other => Err(format!("unknown transaction kind: {other}")),
        }
    }
}

/// History selector: points coming in or going out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Gain,
    Spend,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Gain => "gain",
            Direction::Spend => "spend",
        }
    }
}

/// A persisted, immutable ledger record.
///
/// `points` is signed: positive for gains, zero or negative for spends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub member_id: String,
    pub relation_id: Option<String>,
    pub kind: TransactionKind,
    pub points: Decimal,
    pub amount: i64,
    pub order_no: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn direction(&self) -> Direction {
        self.kind.direction()
    }
}

/// A record waiting to be written; storage assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    pub member_id: String,
    pub relation_id: Option<String>,
    pub kind: TransactionKind,
    pub points: Decimal,
    pub amount: i64,
    pub order_no: Option<String>,
}

/// Change to one member's balance within a posting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceDelta {
    pub member_id: String,
    pub available: Decimal,
    pub lifetime: Decimal,
}

/// Idempotency key for order-carrying records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderKey {
    pub member_id: String,
    pub order_no: String,
    pub kind: TransactionKind,
}

/// Everything one Consume or Cashout writes, applied as a single unit.
///
/// Storage must reject the posting with `DuplicateOrder` if `order_key`
/// already exists, and with `InsufficientBalance` if any delta would break
/// the balance invariants. Either way nothing is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub at: DateTime<Utc>,
    pub order_key: Option<OrderKey>,
    pub deltas: Vec<BalanceDelta>,
    pub records: Vec<TransactionDraft>,
}

impl Posting {
    pub fn new(at: DateTime<Utc>, order_key: Option<OrderKey>) -> Self {
        Self {
            at,
            order_key,
            deltas: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn delta(mut self, member_id: &str, available: Decimal, lifetime: Decimal) -> Self {
        self.deltas.push(BalanceDelta {
            member_id: member_id.to_string(),
            available,
            lifetime,
        });
        self
    }

    pub fn record(mut self, draft: TransactionDraft) -> Self {
        self.records.push(draft);
        self
    }

    pub(crate) fn materialize(&self, draft: &TransactionDraft, id: i64) -> Transaction {
        Transaction {
            id,
            member_id: draft.member_id.clone(),
            relation_id: draft.relation_id.clone(),
            kind: draft.kind,
            points: draft.points,
            amount: draft.amount,
            order_no: draft.order_no.clone(),
            created_at: self.at,
        }
    }
}

/// Parameters for a history listing.
///
/// Bounds are inclusive; `None` leaves that side open. A `page_size` of
/// `None` or `<= 0` means no limit. Results are newest first, ties broken
/// by id descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub member_id: String,
    pub direction: Direction,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub page_size: Option<i64>,
    pub offset: i64,
}

impl HistoryQuery {
    pub fn new(member_id: &str, direction: Direction) -> Self {
        Self {
            member_id: member_id.to_string(),
            direction,
            start: None,
            end: None,
            page_size: None,
            offset: 0,
        }
    }

    pub fn between(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Whole-day bounds in UTC: `start` from midnight, `end` through its
    /// last microsecond.
    pub fn between_days(self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        let midnight = |day: NaiveDate| day.and_hms_opt(0, 0, 0).map(|at| at.and_utc());
        let start = start.and_then(midnight);
        let end = end
            .and_then(|day| day.succ_opt())
            .and_then(midnight)
            .map(|next| next - chrono::Duration::microseconds(1));
        self.between(start, end)
    }

    pub fn page(mut self, page_size: i64, offset: i64) -> Self {
        self.page_size = Some(page_size);
        self.offset = offset;
        self
    }

    /// Effective row limit.
    pub fn limit(&self) -> Option<u64> {
        self.page_size.filter(|size| *size > 0).map(|size| size as u64)
    }

    /// Effective row offset.
    pub fn skip(&self) -> u64 {
        self.offset.max(0) as u64
    }

    /// In-memory filter shared by backends that cannot push it down.
    pub fn matches(&self, tx: &Transaction) -> bool {
        tx.member_id == self.member_id
            && tx.direction() == self.direction
            && self.start.map_or(true, |start| tx.created_at >= start)
            && self.end.map_or(true, |end| tx.created_at <= end)
    }
}
