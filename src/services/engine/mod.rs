//! Transaction engine: Consume, Cashout, history and balance.
//!
//! Each mutation locks the members it touches, re-reads balances under the
//! lock and writes everything through one atomic [`Posting`]. The critical
//! section runs in its own task, so a caller that stops waiting cannot
//! leave a mutation half done.

mod locks;

pub use locks::{MemberGuard, MemberLocks};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Instrument};

use crate::config::{GainBase, LedgerConfig};
use crate::error::{LedgerError, Result};
use crate::interfaces::{LedgerStore, MemberStore, StorageError};
use crate::model::{
    apply_ratio, non_empty, round_points, Balance, HistoryQuery, OrderKey, Posting, Transaction,
    TransactionDraft, TransactionKind, POINT_SCALE,
};

use super::RatioTable;

/// A purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeRequest {
    pub member_id: String,
    /// Purchase amount in monetary minor units.
    pub amount: i64,
    /// Pay with available points first.
    pub use_points: bool,
    /// External order number; empty means no idempotency key.
    pub order_no: Option<String>,
}

impl ConsumeRequest {
    pub fn new(member_id: &str, amount: i64, use_points: bool, order_no: &str) -> Self {
        Self {
            member_id: member_id.to_string(),
            amount,
            use_points,
            order_no: non_empty(order_no),
        }
    }
}

/// What a Consume did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeOutcome {
    pub member_id: String,
    /// Points deducted from the spender.
    pub points_used: Decimal,
    /// Amount charged for the purchase.
    pub pay_amount: i64,
    /// Part of the amount not covered by points.
    pub cash_due: Decimal,
    pub self_gain: Decimal,
    pub referral_gain: Decimal,
    /// Referrer credited with `referral_gain`, if any.
    pub referrer_id: Option<String>,
}

/// A points withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashoutRequest {
    pub member_id: String,
    pub points: Decimal,
    pub order_no: Option<String>,
}

impl CashoutRequest {
    pub fn new(member_id: &str, points: Decimal, order_no: &str) -> Self {
        Self {
            member_id: member_id.to_string(),
            points,
            order_no: non_empty(order_no),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashoutOutcome {
    pub member_id: String,
    pub points_used: Decimal,
    /// Available balance left afterwards.
    pub remaining: Decimal,
}

/// Lenient `Y-M-D` date ("2016-1-2" and "2016-01-02" both parse). Anything
/// else is `None`, which history treats as an open bound.
pub fn parse_history_date(value: &str) -> Option<NaiveDate> {
    let mut parts = value.trim().splitn(3, '-');
    let year = parts.next()?.trim().parse::<i32>().ok()?;
    let month = parts.next()?.trim().parse::<u32>().ok()?;
    let day = parts.next()?.trim().parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Consume, Cashout, history and balance over the ledger store.
#[derive(Clone)]
pub struct TransactionEngine {
    members: Arc<dyn MemberStore>,
    ledger: Arc<dyn LedgerStore>,
    ratios: Arc<RatioTable>,
    locks: Arc<MemberLocks>,
    settings: Arc<LedgerConfig>,
}

impl TransactionEngine {
    pub fn new(
        members: Arc<dyn MemberStore>,
        ledger: Arc<dyn LedgerStore>,
        ratios: Arc<RatioTable>,
        settings: LedgerConfig,
    ) -> Self {
        let timeout = Duration::from_millis(settings.lock_timeout_ms);
        Self {
            members,
            ledger,
            ratios,
            locks: Arc::new(MemberLocks::new(timeout)),
            settings: Arc::new(settings),
        }
    }

    /// Record a purchase: deduct points if asked, credit the spender's
    /// self-gain and the referrer's commission.
    #[tracing::instrument(
        name = "ledger.consume",
        skip_all,
        fields(member_id = %request.member_id, order_no = ?request.order_no, amount = request.amount)
    )]
    pub async fn consume(&self, request: ConsumeRequest) -> Result<ConsumeOutcome> {
        let member_id = non_empty(&request.member_id)
            .ok_or_else(|| LedgerError::Invalid("member id is required".into()))?;
        if request.amount < 0 {
            return Err(LedgerError::Invalid(format!(
                "amount must not be negative, got {}",
                request.amount
            )));
        }
        let request = ConsumeRequest {
            member_id,
            order_no: request.order_no.as_deref().and_then(non_empty),
            ..request
        };

        let engine = self.clone();
        run_detached(async move { engine.consume_exclusive(request).await }).await
    }

    /// Withdraw points from the available balance.
    #[tracing::instrument(
        name = "ledger.cashout",
        skip_all,
        fields(member_id = %request.member_id, order_no = ?request.order_no, points = %request.points)
    )]
    pub async fn cashout(&self, request: CashoutRequest) -> Result<CashoutOutcome> {
        let member_id = non_empty(&request.member_id)
            .ok_or_else(|| LedgerError::Invalid("member id is required".into()))?;
        if request.points <= Decimal::ZERO {
            return Err(LedgerError::Invalid(format!(
                "points must be positive, got {}",
                request.points
            )));
        }
        if request.points.scale() > POINT_SCALE && round_points(request.points) != request.points {
            return Err(LedgerError::Invalid(format!(
                "points allow at most {POINT_SCALE} decimal places, got {}",
                request.points
            )));
        }
        let request = CashoutRequest {
            member_id,
            order_no: request.order_no.as_deref().and_then(non_empty),
            ..request
        };

        let engine = self.clone();
        run_detached(async move { engine.cashout_exclusive(request).await }).await
    }

    /// Gain or spend records, newest first. Positive page sizes are capped
    /// at the configured limit.
    pub async fn history(&self, query: HistoryQuery) -> Result<Vec<Transaction>> {
        let mut query = query;
        query.member_id = self.require_member(&query.member_id).await?;

        if let Some(limit) = query.limit() {
            let cap = self.settings.history_page_limit;
            if limit > cap as u64 {
                debug!(requested = limit, cap, "History page size capped");
                query.page_size = Some(cap);
            }
        }
        Ok(self.ledger.history(&query).await?)
    }

    /// Current balance of an existing member.
    pub async fn balance(&self, member_id: &str) -> Result<Balance> {
        let member_id = self.require_member(member_id).await?;
        Ok(self.ledger.balance(&member_id).await?)
    }

    async fn require_member(&self, member_id: &str) -> Result<String> {
        let id = non_empty(member_id)
            .ok_or_else(|| LedgerError::Invalid("member id is required".into()))?;
        match self.members.get(&id).await? {
            Some(member) => Ok(member.id),
            None => Err(LedgerError::member_not_found(&id)),
        }
    }

    async fn consume_exclusive(&self, request: ConsumeRequest) -> Result<ConsumeOutcome> {
        let member = self
            .members
            .get(&request.member_id)
            .await?
            .ok_or_else(|| LedgerError::member_not_found(&request.member_id))?;
        let ratios = self.ratios.current().await;

        let referral = match &member.referral {
            Some(link) => match self.members.get(&link.referrer_id).await? {
                Some(referrer) => Some((referrer.id, link.ratio)),
                None => {
                    warn!(referrer_id = %link.referrer_id, "Referrer missing, no commission paid");
                    None
                }
            },
            None => None,
        };

        let mut lock_ids = vec![member.id.as_str()];
        if let Some((referrer_id, _)) = &referral {
            lock_ids.push(referrer_id.as_str());
        }
        let _guard = self.locks.acquire(&lock_ids).await?;

        let order_key = request.order_no.as_ref().map(|order_no| OrderKey {
            member_id: member.id.clone(),
            order_no: order_no.clone(),
            kind: TransactionKind::Consume,
        });
        if let Some(key) = &order_key {
            if self.ledger.find_order(key).await?.is_some() {
                return Err(duplicate_order(key));
            }
        }

        let balance = self.ledger.balance(&member.id).await?;
        let point_value = self.settings.point_value;
        let amount = Decimal::from(request.amount);

        let max_points = amount.checked_mul(point_value).ok_or_else(|| overflow("amount"))?;
        let points_used = if request.use_points {
            balance.available.min(round_points(max_points))
        } else {
            Decimal::ZERO
        };
        let points_value = round_points(
            points_used
                .checked_div(point_value)
                .ok_or_else(|| overflow("points value"))?,
        );
        let cash_due = amount - points_value;

        let base = match self.settings.gain_base {
            GainBase::Net => cash_due,
            GainBase::Full => amount,
        };
        let base_points = base.checked_mul(point_value).ok_or_else(|| overflow("gain base"))?;
        let self_gain =
            apply_ratio(base_points, ratios.self_ratio()).ok_or_else(|| overflow("self gain"))?;
        let referral_gain = match &referral {
            Some((_, ratio)) => {
                apply_ratio(base_points, *ratio).ok_or_else(|| overflow("referral gain"))?
            }
            None => Decimal::ZERO,
        };

        let draft = |member_id: &str, kind, points| TransactionDraft {
            member_id: member_id.to_string(),
            relation_id: None,
            kind,
            points,
            amount: request.amount,
            order_no: request.order_no.clone(),
        };

        let mut posting = Posting::new(Utc::now(), order_key.clone()).delta(
            &member.id,
            self_gain - points_used,
            self_gain,
        );
        if self_gain > Decimal::ZERO {
            posting = posting.record(draft(&member.id, TransactionKind::SelfGain, self_gain));
        }
        if let Some((referrer_id, _)) = referral.as_ref().filter(|_| referral_gain > Decimal::ZERO)
        {
            posting = posting
                .delta(referrer_id, referral_gain, referral_gain)
                .record(TransactionDraft {
                    relation_id: Some(member.id.clone()),
                    ..draft(referrer_id, TransactionKind::ReferralGain, referral_gain)
                });
        }
        posting = posting.record(draft(&member.id, TransactionKind::Consume, -points_used));

        self.ledger
            .post(posting)
            .await
            .map_err(|e| posting_error(e, order_key.as_ref(), balance.available, points_used))?;

        let referrer_id = referral.map(|(id, _)| id);
        info!(
            points_used = %points_used,
            self_gain = %self_gain,
            referral_gain = %referral_gain,
            referrer_id = ?referrer_id,
            "Consume recorded"
        );

        Ok(ConsumeOutcome {
            member_id: member.id,
            points_used,
            pay_amount: request.amount,
            cash_due,
            self_gain,
            referral_gain,
            referrer_id,
        })
    }

    async fn cashout_exclusive(&self, request: CashoutRequest) -> Result<CashoutOutcome> {
        let member = self
            .members
            .get(&request.member_id)
            .await?
            .ok_or_else(|| LedgerError::member_not_found(&request.member_id))?;

        let _guard = self.locks.acquire(&[member.id.as_str()]).await?;

        let order_key = request.order_no.as_ref().map(|order_no| OrderKey {
            member_id: member.id.clone(),
            order_no: order_no.clone(),
            kind: TransactionKind::Cashout,
        });
        if let Some(key) = &order_key {
            if self.ledger.find_order(key).await?.is_some() {
                return Err(duplicate_order(key));
            }
        }

        let balance = self.ledger.balance(&member.id).await?;
        if request.points > balance.available {
            return Err(LedgerError::InsufficientBalance {
                available: balance.available,
                requested: request.points,
            });
        }

        let posting = Posting::new(Utc::now(), order_key.clone())
            .delta(&member.id, -request.points, Decimal::ZERO)
            .record(TransactionDraft {
                member_id: member.id.clone(),
                relation_id: None,
                kind: TransactionKind::Cashout,
                points: -request.points,
                amount: 0,
                order_no: request.order_no.clone(),
            });

        self.ledger
            .post(posting)
            .await
            .map_err(|e| posting_error(e, order_key.as_ref(), balance.available, request.points))?;

        let remaining = balance.available - request.points;
        info!(points = %request.points, remaining = %remaining, "Cashout recorded");

        Ok(CashoutOutcome {
            member_id: member.id,
            points_used: request.points,
            remaining,
        })
    }
}

/// Run a critical section to completion even if the caller goes away.
async fn run_detached<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    tokio::spawn(work.in_current_span())
        .await
        .map_err(|e| LedgerError::Internal(format!("ledger task failed: {e}")))?
}

fn duplicate_order(key: &OrderKey) -> LedgerError {
    LedgerError::DuplicateOrder {
        member_id: key.member_id.clone(),
        order_no: key.order_no.clone(),
    }
}

fn overflow(what: &str) -> LedgerError {
    LedgerError::Invalid(format!("{what} out of range"))
}

/// Map the storage unit's own re-checks onto the engine's errors.
fn posting_error(
    error: StorageError,
    order_key: Option<&OrderKey>,
    available: Decimal,
    requested: Decimal,
) -> LedgerError {
    match (error, order_key) {
        (StorageError::DuplicateOrder, Some(key)) => duplicate_order(key),
        (StorageError::InsufficientBalance, _) => LedgerError::InsufficientBalance {
            available,
            requested,
        },
        (error, _) => LedgerError::Storage(error),
    }
}
