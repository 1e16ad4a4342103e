//! In-memory storage implementation.
//!
//! Used by unit tests and by embedded deployments that do not need
//! persistence. All three storage traits share one state behind a single
//! `RwLock`, so every write method is one atomic unit.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::interfaces::{LedgerStore, MemberStore, RatioStore, Result, StorageError};
use crate::model::{
    Balance, HistoryQuery, Member, MemberSearch, OrderKey, Posting, RatioSync, RatioTier,
    ReferralLink, Transaction,
};


#[derive(Default)]
struct MockState {
    members: HashMap<String, Member>,
    balances: HashMap<String, Balance>,
    transactions: Vec<Transaction>,
    ratios: Vec<RatioTier>,
    next_transaction_id: i64,
}

impl MockState {
    fn by_phone(&self, phone: &str) -> Option<&Member> {
        self.members
            .values()
            .find(|m| m.phone.as_deref() == Some(phone))
    }

    fn by_card(&self, card_no: &str) -> Option<&Member> {
        self.members
            .values()
            .find(|m| m.card_no.as_deref() == Some(card_no))
    }

    /// A member other than `exclude` holding either key.
    fn key_owner(
        &self,
        phone: Option<&str>,
        card_no: Option<&str>,
        exclude: Option<&str>,
    ) -> Option<&Member> {
        self.members
            .values()
            .filter(|m| Some(m.id.as_str()) != exclude)
            .find(|m| m.owns_phone_or_card(phone, card_no))
    }

    fn order_record(&self, key: &OrderKey) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| {
            tx.member_id == key.member_id
                && tx.kind == key.kind
                && tx.order_no.as_deref() == Some(key.order_no.as_str())
        })
    }
}

fn sorted(mut members: Vec<Member>) -> Vec<Member> {
    members.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    members
}

/// Mock store that keeps members, balances, transactions and ratios in
/// memory.
#[derive(Default)]
pub struct MockStore {
    state: RwLock<MockState>,
    fail_on_post: RwLock<bool>,
    fail_on_insert: RwLock<bool>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `post` fail before touching state.
    pub async fn set_fail_on_post(&self, fail: bool) {
        *self.fail_on_post.write().await = fail;
    }

    /// Make every subsequent `insert` fail before touching state.
    pub async fn set_fail_on_insert(&self, fail: bool) {
        *self.fail_on_insert.write().await = fail;
    }

    /// Number of stored transactions, across all members.
    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }
}

#[async_trait]
impl MemberStore for MockStore {
    async fn get(&self, id: &str) -> Result<Option<Member>> {
        Ok(self.state.read().await.members.get(id).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Member>> {
        Ok(self.state.read().await.by_phone(phone).cloned())
    }

    async fn find_by_card(&self, card_no: &str) -> Result<Option<Member>> {
        Ok(self.state.read().await.by_card(card_no).cloned())
    }

    async fn search(&self, search: &MemberSearch) -> Result<Vec<Member>> {
        if search.is_empty() {
            return Ok(vec![]);
        }
        // Case-insensitive like SQLite's LIKE.
        let needle = search.name.as_deref().map(str::to_lowercase);
        let state = self.state.read().await;
        let hits = state
            .members
            .values()
            .filter(|m| {
                let phone = matches!((&search.phone, &m.phone), (Some(a), Some(b)) if a == b);
                let card = matches!((&search.card_no, &m.card_no), (Some(a), Some(b)) if a == b);
                let name = needle
                    .as_deref()
                    .is_some_and(|needle| m.name.to_lowercase().contains(needle));
                phone || card || name
            })
            .cloned()
            .collect();
        Ok(sorted(hits))
    }

    async fn insert(&self, member: &Member) -> Result<()> {
        if *self.fail_on_insert.read().await {
            return Err(StorageError::Injected("insert".into()));
        }
        let mut state = self.state.write().await;
        if state.members.contains_key(&member.id) {
            return Err(StorageError::DuplicateKey(format!("id {}", member.id)));
        }
        let owner = state.key_owner(member.phone.as_deref(), member.card_no.as_deref(), None);
        if let Some(owner) = owner {
            return Err(StorageError::DuplicateKey(format!(
                "phone or card owned by {}",
                owner.id
            )));
        }
        state.members.insert(member.id.clone(), member.clone());
        Ok(())
    }

    async fn update_profile(
        &self,
        id: &str,
        phone: Option<&str>,
        card_no: Option<&str>,
        name: &str,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.members.contains_key(id) {
            return Err(StorageError::NotFound(format!("member {id}")));
        }
        if let Some(owner) = state.key_owner(phone, card_no, Some(id)) {
            return Err(StorageError::DuplicateKey(format!(
                "phone or card owned by {}",
                owner.id
            )));
        }
        if let Some(member) = state.members.get_mut(id) {
            member.phone = phone.map(str::to_string);
            member.card_no = card_no.map(str::to_string);
            member.name = name.to_string();
        }
        Ok(())
    }

    async fn set_referral(&self, member_id: &str, link: &ReferralLink) -> Result<bool> {
        let mut state = self.state.write().await;
        let member = state
            .members
            .get_mut(member_id)
            .ok_or_else(|| StorageError::NotFound(format!("member {member_id}")))?;
        if member.referral.is_some() {
            return Ok(false);
        }
        member.referral = Some(link.clone());
        Ok(true)
    }

    async fn list_referred(&self, referrer_id: &str) -> Result<Vec<Member>> {
        let state = self.state.read().await;
        let children = state
            .members
            .values()
            .filter(|m| m.referrer_id() == Some(referrer_id))
            .cloned()
            .collect();
        Ok(sorted(children))
    }
}

#[async_trait]
impl LedgerStore for MockStore {
    async fn balance(&self, member_id: &str) -> Result<Balance> {
        Ok(self
            .state
            .read()
            .await
            .balances
            .get(member_id)
            .copied()
            .unwrap_or_default())
    }

    async fn find_order(&self, key: &OrderKey) -> Result<Option<Transaction>> {
        Ok(self.state.read().await.order_record(key).cloned())
    }

    async fn post(&self, posting: Posting) -> Result<Vec<Transaction>> {
        if *self.fail_on_post.read().await {
            return Err(StorageError::Injected("post".into()));
        }
        let mut state = self.state.write().await;

        if let Some(key) = &posting.order_key {
            if state.order_record(key).is_some() {
                return Err(StorageError::DuplicateOrder);
            }
        }

        // Validate every delta before mutating anything.
        let mut next_balances: HashMap<String, Balance> = HashMap::new();
        for delta in &posting.deltas {
            let current = next_balances
                .get(&delta.member_id)
                .or_else(|| state.balances.get(&delta.member_id))
                .copied()
                .unwrap_or_default();
            let next = current
                .apply(delta.available, delta.lifetime)
                .ok_or(StorageError::InsufficientBalance)?;
            next_balances.insert(delta.member_id.clone(), next);
        }

        state.balances.extend(next_balances);

        let mut written = Vec::with_capacity(posting.records.len());
        for draft in &posting.records {
            state.next_transaction_id += 1;
            let tx = posting.materialize(draft, state.next_transaction_id);
            state.transactions.push(tx.clone());
            written.push(tx);
        }
        Ok(written)
    }

    async fn history(&self, query: &HistoryQuery) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut rows: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|tx| query.matches(tx))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        let rows = rows.into_iter().skip(query.skip() as usize);
        Ok(match query.limit() {
            Some(limit) => rows.take(limit as usize).collect(),
            None => rows.collect(),
        })
    }
}

#[async_trait]
impl RatioStore for MockStore {
    async fn load_tiers(&self) -> Result<Vec<RatioTier>> {
        Ok(self.state.read().await.ratios.clone())
    }

    async fn replace_tiers(&self, tiers: &[RatioTier], syncs: &[RatioSync]) -> Result<u64> {
        let mut state = self.state.write().await;
        state.ratios = tiers.to_vec();

        let mut rewritten = 0;
        for member in state.members.values_mut() {
            let Some(link) = member.referral.as_mut() else {
                continue;
            };
            if let Some(sync) = syncs
                .iter()
                .find(|s| s.tier == link.tier && s.applies_to(link.ratio))
            {
                link.ratio = sync.to;
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }
}
