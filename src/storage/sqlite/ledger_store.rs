//! SQLite LedgerStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection};

use crate::interfaces::{LedgerStore, Result, StorageError};
use crate::model::{Balance, HistoryQuery, OrderKey, Posting, Transaction};
use crate::storage::schema::{Balances, Transactions, TRANSACTION_COLUMNS};

use super::{
    decode_decimal, encode_timestamp, map_unique_violation, transaction_from_row, SqliteStore,
};

/// Newest-first history listing with bounds and paging.
fn history_query(query: &HistoryQuery) -> String {
    let mut select = Query::select();
    select
        .columns(TRANSACTION_COLUMNS)
        .from(Transactions::Table)
        .and_where(Expr::col(Transactions::MemberId).eq(query.member_id.as_str()))
        .and_where(Expr::col(Transactions::Direction).eq(query.direction.as_str()))
        .order_by(Transactions::CreatedAt, Order::Desc)
        .order_by(Transactions::Id, Order::Desc);

    if let Some(start) = query.start {
        select.and_where(Expr::col(Transactions::CreatedAt).gte(encode_timestamp(start)));
    }
    if let Some(end) = query.end {
        select.and_where(Expr::col(Transactions::CreatedAt).lte(encode_timestamp(end)));
    }
    // SQLite needs a LIMIT before an OFFSET.
    match query.limit() {
        Some(limit) => {
            select.limit(limit);
        }
        None if query.skip() > 0 => {
            select.limit(i64::MAX as u64);
        }
        None => {}
    }
    if query.skip() > 0 {
        select.offset(query.skip());
    }

    select.to_string(SqliteQueryBuilder)
}

impl SqliteStore {
    async fn balance_in(conn: &mut SqliteConnection, member_id: &str) -> Result<Balance> {
        let query = Query::select()
            .columns([Balances::Available, Balances::Lifetime])
            .from(Balances::Table)
            .and_where(Expr::col(Balances::MemberId).eq(member_id))
            .to_string(SqliteQueryBuilder);

        let Some(row) = sqlx::query(&query).fetch_optional(&mut *conn).await? else {
            return Ok(Balance::default());
        };
        let available: String = row.try_get("available")?;
        let lifetime: String = row.try_get("lifetime")?;
        Ok(Balance {
            available: decode_decimal(&available)?,
            lifetime: decode_decimal(&lifetime)?,
        })
    }

    async fn order_in(conn: &mut SqliteConnection, key: &OrderKey) -> Result<Option<Transaction>> {
        let query = Query::select()
            .columns(TRANSACTION_COLUMNS)
            .from(Transactions::Table)
            .and_where(Expr::col(Transactions::MemberId).eq(key.member_id.as_str()))
            .and_where(Expr::col(Transactions::OrderNo).eq(key.order_no.as_str()))
            .and_where(Expr::col(Transactions::Kind).eq(key.kind.as_str()))
            .order_by(Transactions::Id, Order::Asc)
            .limit(1)
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    /// Apply a posting within an already-open transaction.
    async fn post_in(conn: &mut SqliteConnection, posting: &Posting) -> Result<Vec<Transaction>> {
        if let Some(key) = &posting.order_key {
            if Self::order_in(conn, key).await?.is_some() {
                return Err(StorageError::DuplicateOrder);
            }
        }

        // A member may appear in several deltas; fold them before writing.
        let mut staged: Vec<(String, Balance)> = Vec::new();
        for delta in &posting.deltas {
            let current = match staged.iter().position(|(id, _)| *id == delta.member_id) {
                Some(index) => staged.remove(index).1,
                None => Self::balance_in(conn, &delta.member_id).await?,
            };
            let next = current
                .apply(delta.available, delta.lifetime)
                .ok_or(StorageError::InsufficientBalance)?;
            staged.push((delta.member_id.clone(), next));
        }

        let updated_at = encode_timestamp(posting.at);
        for (member_id, balance) in &staged {
            let query = Query::insert()
                .into_table(Balances::Table)
                .columns([
                    Balances::MemberId,
                    Balances::Available,
                    Balances::Lifetime,
                    Balances::UpdatedAt,
                ])
                .values_panic([
                    member_id.as_str().into(),
                    balance.available.to_string().into(),
                    balance.lifetime.to_string().into(),
                    updated_at.as_str().into(),
                ])
                .on_conflict(
                    OnConflict::column(Balances::MemberId)
                        .update_columns([
                            Balances::Available,
                            Balances::Lifetime,
                            Balances::UpdatedAt,
                        ])
                        .to_owned(),
                )
                .to_string(SqliteQueryBuilder);

            sqlx::query(&query).execute(&mut *conn).await?;
        }

        let mut written = Vec::with_capacity(posting.records.len());
        for draft in &posting.records {
            let query = Query::insert()
                .into_table(Transactions::Table)
                .columns([
                    Transactions::MemberId,
                    Transactions::RelationId,
                    Transactions::Kind,
                    Transactions::Direction,
                    Transactions::Points,
                    Transactions::Amount,
                    Transactions::OrderNo,
                    Transactions::CreatedAt,
                ])
                .values_panic([
                    draft.member_id.as_str().into(),
                    draft.relation_id.clone().into(),
                    draft.kind.as_str().into(),
                    draft.kind.direction().as_str().into(),
                    draft.points.to_string().into(),
                    draft.amount.into(),
                    draft.order_no.clone().into(),
                    updated_at.as_str().into(),
                ])
                .to_string(SqliteQueryBuilder);

            let result = sqlx::query(&query)
                .execute(&mut *conn)
                .await
                .map_err(|e| match map_unique_violation(e) {
                    StorageError::DuplicateKey(_) => StorageError::DuplicateOrder,
                    other => other,
                })?;
            written.push(posting.materialize(draft, result.last_insert_rowid()));
        }

        Ok(written)
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn balance(&self, member_id: &str) -> Result<Balance> {
        let mut conn = self.pool.acquire().await?;
        Self::balance_in(&mut conn, member_id).await
    }

    async fn find_order(&self, key: &OrderKey) -> Result<Option<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        Self::order_in(&mut conn, key).await
    }

    async fn post(&self, posting: Posting) -> Result<Vec<Transaction>> {
        let mut conn = self.begin_immediate().await?;
        let result = Self::post_in(&mut conn, &posting).await;
        Self::finish(conn, result).await
    }

    async fn history(&self, query: &HistoryQuery) -> Result<Vec<Transaction>> {
        let sql = history_query(query);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(transaction_from_row).collect()
    }
}
