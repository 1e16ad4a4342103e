//! SQLite MemberStore implementation.

use async_trait::async_trait;
use sea_query::{Cond, Expr, LikeExpr, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection};

use crate::interfaces::{MemberStore, Result, StorageError};
use crate::model::{Member, MemberSearch, ReferralLink};
use crate::storage::schema::{Members, MEMBER_COLUMNS};

use super::{encode_timestamp, map_unique_violation, member_from_row, SqliteStore};

/// Member rows matching `cond`, oldest first.
fn select_members(cond: Cond, limit: Option<u64>) -> String {
    let mut select = Query::select();
    select
        .columns(MEMBER_COLUMNS)
        .from(Members::Table)
        .cond_where(cond)
        .order_by(Members::CreatedAt, Order::Asc)
        .order_by(Members::Id, Order::Asc);
    if let Some(limit) = limit {
        select.limit(limit);
    }
    select.to_string(SqliteQueryBuilder)
}

/// Query for the id of a member other than `exclude` holding either key.
fn key_owner_query(
    phone: Option<&str>,
    card_no: Option<&str>,
    exclude: Option<&str>,
) -> Option<String> {
    if phone.is_none() && card_no.is_none() {
        return None;
    }

    let mut keys = Cond::any();
    if let Some(phone) = phone {
        keys = keys.add(Expr::col(Members::Phone).eq(phone));
    }
    if let Some(card_no) = card_no {
        keys = keys.add(Expr::col(Members::CardNo).eq(card_no));
    }
    let mut cond = Cond::all().add(keys);
    if let Some(exclude) = exclude {
        cond = cond.add(Expr::col(Members::Id).ne(exclude));
    }

    Some(
        Query::select()
            .column(Members::Id)
            .from(Members::Table)
            .cond_where(cond)
            .limit(1)
            .to_string(SqliteQueryBuilder),
    )
}

/// Escape character for name patterns.
const LIKE_ESCAPE: char = '!';

/// Substring pattern matching `name` literally.
fn name_pattern(name: &str) -> String {
    let mut pattern = String::with_capacity(name.len() + 2);
    pattern.push('%');
    for c in name.chars() {
        if matches!(c, '%' | '_') || c == LIKE_ESCAPE {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn search_query(search: &MemberSearch) -> String {
    let mut cond = Cond::any();
    if let Some(phone) = &search.phone {
        cond = cond.add(Expr::col(Members::Phone).eq(phone.as_str()));
    }
    if let Some(card_no) = &search.card_no {
        cond = cond.add(Expr::col(Members::CardNo).eq(card_no.as_str()));
    }
    if let Some(name) = &search.name {
        cond = cond.add(
            Expr::col(Members::Name).like(LikeExpr::new(name_pattern(name)).escape(LIKE_ESCAPE)),
        );
    }
    select_members(cond, None)
}

fn by_column(column: Members, value: &str) -> Cond {
    Cond::all().add(Expr::col(column).eq(value))
}

impl SqliteStore {
    async fn fetch_member(&self, sql: &str) -> Result<Option<Member>> {
        let row = sqlx::query(sql).fetch_optional(&self.pool).await?;
        row.as_ref().map(member_from_row).transpose()
    }

    async fn fetch_members(&self, sql: &str) -> Result<Vec<Member>> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter().map(member_from_row).collect()
    }

    /// Id of a member other than `exclude` holding either key.
    async fn key_owner_in(
        conn: &mut SqliteConnection,
        phone: Option<&str>,
        card_no: Option<&str>,
        exclude: Option<&str>,
    ) -> Result<Option<String>> {
        let Some(query) = key_owner_query(phone, card_no, exclude) else {
            return Ok(None);
        };
        let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
        Ok(row.map(|row| row.try_get("id")).transpose()?)
    }

    async fn insert_member_in(conn: &mut SqliteConnection, member: &Member) -> Result<()> {
        if let Some(owner) = Self::key_owner_in(
            conn,
            member.phone.as_deref(),
            member.card_no.as_deref(),
            None,
        )
        .await?
        {
            return Err(StorageError::DuplicateKey(format!(
                "phone or card owned by {owner}"
            )));
        }

        let link = member.referral.as_ref();
        let query = Query::insert()
            .into_table(Members::Table)
            .columns(MEMBER_COLUMNS)
            .values_panic([
                member.id.as_str().into(),
                member.phone.clone().into(),
                member.card_no.clone().into(),
                member.name.as_str().into(),
                link.map(|l| l.referrer_id.clone()).into(),
                link.map(|l| l.tier as i64).into(),
                link.map(|l| l.ratio.to_string()).into(),
                encode_timestamp(member.created_at).into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query)
            .execute(&mut *conn)
            .await
            .map_err(map_unique_violation)?;
        Ok(())
    }

    async fn update_profile_in(
        conn: &mut SqliteConnection,
        id: &str,
        phone: Option<&str>,
        card_no: Option<&str>,
        name: &str,
    ) -> Result<()> {
        if let Some(owner) = Self::key_owner_in(conn, phone, card_no, Some(id)).await? {
            return Err(StorageError::DuplicateKey(format!(
                "phone or card owned by {owner}"
            )));
        }

        let query = Query::update()
            .table(Members::Table)
            .values([
                (Members::Phone, phone.map(str::to_string).into()),
                (Members::CardNo, card_no.map(str::to_string).into()),
                (Members::Name, name.into()),
            ])
            .and_where(Expr::col(Members::Id).eq(id))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query)
            .execute(&mut *conn)
            .await
            .map_err(map_unique_violation)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("member {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl MemberStore for SqliteStore {
    async fn get(&self, id: &str) -> Result<Option<Member>> {
        self.fetch_member(&select_members(by_column(Members::Id, id), Some(1)))
            .await
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Member>> {
        self.fetch_member(&select_members(by_column(Members::Phone, phone), Some(1)))
            .await
    }

    async fn find_by_card(&self, card_no: &str) -> Result<Option<Member>> {
        self.fetch_member(&select_members(by_column(Members::CardNo, card_no), Some(1)))
            .await
    }

    async fn search(&self, search: &MemberSearch) -> Result<Vec<Member>> {
        if search.is_empty() {
            return Ok(vec![]);
        }
        self.fetch_members(&search_query(search)).await
    }

    async fn insert(&self, member: &Member) -> Result<()> {
        let mut conn = self.begin_immediate().await?;
        let result = Self::insert_member_in(&mut conn, member).await;
        Self::finish(conn, result).await
    }

    async fn update_profile(
        &self,
        id: &str,
        phone: Option<&str>,
        card_no: Option<&str>,
        name: &str,
    ) -> Result<()> {
        let mut conn = self.begin_immediate().await?;
        let result = Self::update_profile_in(&mut conn, id, phone, card_no, name).await;
        Self::finish(conn, result).await
    }

    async fn set_referral(&self, member_id: &str, link: &ReferralLink) -> Result<bool> {
        let query = Query::update()
            .table(Members::Table)
            .values([
                (Members::ReferrerId, link.referrer_id.as_str().into()),
                (Members::ReferralTier, (link.tier as i64).into()),
                (Members::ReferralRatio, link.ratio.to_string().into()),
            ])
            .and_where(Expr::col(Members::Id).eq(member_id))
            .and_where(Expr::col(Members::ReferrerId).is_null())
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }

        match self.get(member_id).await? {
            Some(_) => Ok(false),
            None => Err(StorageError::NotFound(format!("member {member_id}"))),
        }
    }

    async fn list_referred(&self, referrer_id: &str) -> Result<Vec<Member>> {
        self.fetch_members(&select_members(
            by_column(Members::ReferrerId, referrer_id),
            None,
        ))
        .await
    }
}
