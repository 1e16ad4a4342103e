//! SQLite RatioStore implementation.

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection};

use crate::interfaces::{RatioStore, Result};
use crate::model::{RatioSync, RatioTier};
use crate::storage::schema::{Members, Ratios};

use super::{decode_decimal, encode_timestamp, SqliteStore};

impl SqliteStore {
    async fn replace_tiers_in(
        conn: &mut SqliteConnection,
        tiers: &[RatioTier],
        syncs: &[RatioSync],
    ) -> Result<u64> {
        let delete = Query::delete()
            .from_table(Ratios::Table)
            .to_string(SqliteQueryBuilder);
        sqlx::query(&delete).execute(&mut *conn).await?;

        let updated_at = encode_timestamp(Utc::now());
        for tier in tiers {
            let insert = Query::insert()
                .into_table(Ratios::Table)
                .columns([Ratios::Tier, Ratios::Fraction, Ratios::UpdatedAt])
                .values_panic([
                    (tier.key as i64).into(),
                    tier.fraction.to_string().into(),
                    updated_at.as_str().into(),
                ])
                .to_string(SqliteQueryBuilder);
            sqlx::query(&insert).execute(&mut *conn).await?;
        }

        let mut rewritten = 0;
        for sync in syncs {
            // Stored ratios are TEXT; "0.05" and "0.050" must compare equal,
            // so matching happens on parsed decimals.
            let select = Query::select()
                .columns([Members::Id, Members::ReferralRatio])
                .from(Members::Table)
                .and_where(Expr::col(Members::ReferrerId).is_not_null())
                .and_where(Expr::col(Members::ReferralTier).eq(sync.tier as i64))
                .to_string(SqliteQueryBuilder);
            let rows = sqlx::query(&select).fetch_all(&mut *conn).await?;

            for row in rows {
                let id: String = row.try_get("id")?;
                let ratio: Option<String> = row.try_get("referral_ratio")?;
                let recorded = match ratio {
                    Some(ratio) => decode_decimal(&ratio)?,
                    None => rust_decimal::Decimal::ZERO,
                };
                if !sync.applies_to(recorded) {
                    continue;
                }

                let update = Query::update()
                    .table(Members::Table)
                    .value(Members::ReferralRatio, sync.to.to_string())
                    .and_where(Expr::col(Members::Id).eq(id))
                    .to_string(SqliteQueryBuilder);
                sqlx::query(&update).execute(&mut *conn).await?;
                rewritten += 1;
            }
        }

        Ok(rewritten)
    }
}

#[async_trait]
impl RatioStore for SqliteStore {
    async fn load_tiers(&self) -> Result<Vec<RatioTier>> {
        let query = Query::select()
            .columns([Ratios::Tier, Ratios::Fraction])
            .from(Ratios::Table)
            .order_by(Ratios::Tier, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<RatioTier> {
                let key: i64 = row.try_get("tier")?;
                let fraction: String = row.try_get("fraction")?;
                Ok(RatioTier::new(key as u32, decode_decimal(&fraction)?))
            })
            .collect()
    }

    async fn replace_tiers(&self, tiers: &[RatioTier], syncs: &[RatioSync]) -> Result<u64> {
        let mut conn = self.begin_immediate().await?;
        let result = Self::replace_tiers_in(&mut conn, tiers, syncs).await;
        Self::finish(conn, result).await
    }
}
