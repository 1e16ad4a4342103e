//! Referral graph: who referred whom.
//!
//! Links live on the referred member as an optional back-reference; the
//! reverse direction is a store query. The graph must stay a forest, so
//! binds are serialized and check the referrer's ancestor chain first.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{LedgerError, Result};
use crate::interfaces::MemberStore;
use crate::model::{non_empty, Member, ReferralLink, REFERRAL_TIER};

use super::RatioTable;

pub struct ReferralGraph {
    members: Arc<dyn MemberStore>,
    ratios: Arc<RatioTable>,
    bind_lock: Mutex<()>,
}

impl ReferralGraph {
    pub fn new(members: Arc<dyn MemberStore>, ratios: Arc<RatioTable>) -> Self {
        Self {
            members,
            ratios,
            bind_lock: Mutex::new(()),
        }
    }

    /// Set `referrer_id` as the referrer of `member_id`.
    ///
    /// The link records the referral tier and its current fraction.
    #[tracing::instrument(name = "referral.bind", skip_all, fields(%member_id, %referrer_id))]
    pub async fn bind(&self, member_id: &str, referrer_id: &str) -> Result<Member> {
        let member_id = non_empty(member_id)
            .ok_or_else(|| LedgerError::Invalid("member id is required".into()))?;
        let referrer_id = non_empty(referrer_id)
            .ok_or_else(|| LedgerError::Invalid("referrer id is required".into()))?;
        if member_id == referrer_id {
            return Err(LedgerError::SelfReferral(member_id));
        }

        // One bind at a time: two concurrent binds could otherwise each pass
        // the cycle check and close a loop together.
        let _bind = self.bind_lock.lock().await;

        let mut member = self.require(&member_id, "member").await?;
        let referrer = self.require(&referrer_id, "referrer").await?;
        if member.referral.is_some() {
            return Err(LedgerError::AlreadyBound(member_id));
        }
        if self
            .chain_above(&referrer)
            .await?
            .iter()
            .any(|ancestor| ancestor.id == member.id)
        {
            return Err(LedgerError::ReferralCycle {
                member_id,
                referrer_id,
            });
        }

        let members = &self.members;
        let bound_id = member.id.as_str();
        // Held so a concurrent ratio sync cannot miss the new link.
        let (link, bound) = self
            .ratios
            .hold_current(|snapshot| {
                let link = ReferralLink {
                    referrer_id: referrer.id.clone(),
                    tier: REFERRAL_TIER,
                    ratio: snapshot.referral_ratio(),
                };
                async move {
                    let bound = members.set_referral(bound_id, &link).await;
                    (link, bound)
                }
            })
            .await;
        if !bound? {
            return Err(LedgerError::AlreadyBound(member_id));
        }

        info!(ratio = %link.ratio, "Referral bound");
        member.referral = Some(link);
        Ok(member)
    }

    /// The member's immediate referrer, if any.
    pub async fn resolve_referrer(&self, member_id: &str) -> Result<Option<Member>> {
        let member = self.require(member_id, "member").await?;
        let Some(referrer_id) = member.referrer_id() else {
            return Ok(None);
        };
        let referrer = self.members.get(referrer_id).await?;
        if referrer.is_none() {
            warn!(%member_id, %referrer_id, "Referral link points to a missing member");
        }
        Ok(referrer)
    }

    /// Members directly referred by `referrer_id`, oldest first.
    pub async fn list_referred(&self, referrer_id: &str) -> Result<Vec<Member>> {
        let referrer = self.require(referrer_id, "member").await?;
        Ok(self.members.list_referred(&referrer.id).await?)
    }

    /// Referrers above `member_id`, nearest first.
    pub async fn ancestors(&self, member_id: &str) -> Result<Vec<Member>> {
        let member = self.require(member_id, "member").await?;
        self.chain_above(&member).await
    }

    async fn chain_above(&self, member: &Member) -> Result<Vec<Member>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([member.id.clone()]);
        let mut next = member.referrer_id().map(str::to_string);

        while let Some(id) = next {
            if !seen.insert(id.clone()) {
                warn!(member_id = %member.id, %id, "Referral chain loops");
                break;
            }
            let Some(ancestor) = self.members.get(&id).await? else {
                warn!(member_id = %member.id, %id, "Referral chain ends at a missing member");
                break;
            };
            next = ancestor.referrer_id().map(str::to_string);
            chain.push(ancestor);
        }
        Ok(chain)
    }

    async fn require(&self, id: &str, kind: &'static str) -> Result<Member> {
        let id = id.trim();
        if id.is_empty() {
            return Err(LedgerError::Invalid(format!("{kind} id is required")));
        }
        self.members
            .get(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound {
                kind,
                key: id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::storage::MockStore;

    async fn graph_with(ids: &[&str]) -> (ReferralGraph, Arc<MockStore>) {
        let store = Arc::new(MockStore::new());
        for id in ids {
            store
                .insert(&Member {
                    id: id.to_string(),
                    phone: None,
                    card_no: Some(format!("card-{id}")),
                    name: id.to_string(),
                    referral: None,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        let ratios = RatioTable::load(store.clone(), &[dec!(0.1), dec!(0.05)])
            .await
            .unwrap();
        (ReferralGraph::new(store.clone(), Arc::new(ratios)), store)
    }

    #[tokio::test]
    async fn test_bind_records_current_referral_ratio() {
        let (graph, _) = graph_with(&["a", "b"]).await;
        let member = graph.bind("b", "a").await.unwrap();
        let link = member.referral.unwrap();
        assert_eq!(link.referrer_id, "a");
        assert_eq!(link.tier, REFERRAL_TIER);
        assert_eq!(link.ratio, dec!(0.05));

        let referrer = graph.resolve_referrer("b").await.unwrap().unwrap();
        assert_eq!(referrer.id, "a");
        assert!(graph.resolve_referrer("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bind_rejects_reverse_edge() {
        let (graph, _) = graph_with(&["a", "b"]).await;
        graph.bind("a", "b").await.unwrap();
        assert!(matches!(
            graph.bind("b", "a").await,
            Err(LedgerError::ReferralCycle { .. })
        ));
    }

    #[tokio::test]
    async fn test_bind_rejects_longer_cycle() {
        let (graph, _) = graph_with(&["a", "b", "c"]).await;
        graph.bind("b", "a").await.unwrap();
        graph.bind("c", "b").await.unwrap();
        assert!(matches!(
            graph.bind("a", "c").await,
            Err(LedgerError::ReferralCycle { .. })
        ));

        let chain: Vec<String> = graph
            .ancestors("c")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(chain, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_bind_validation() {
        let (graph, _) = graph_with(&["a", "b", "c"]).await;
        assert!(matches!(graph.bind("", "a").await, Err(LedgerError::Invalid(_))));
        assert!(matches!(graph.bind("a", "a").await, Err(LedgerError::SelfReferral(_))));
        assert!(matches!(
            graph.bind("a", "zz").await,
            Err(LedgerError::NotFound { kind: "referrer", .. })
        ));

        graph.bind("b", "a").await.unwrap();
        assert!(matches!(graph.bind("b", "c").await, Err(LedgerError::AlreadyBound(_))));
    }

    #[tokio::test]
    async fn test_list_referred_direct_children_only() {
        let (graph, _) = graph_with(&["a", "b", "c", "d"]).await;
        graph.bind("b", "a").await.unwrap();
        graph.bind("c", "a").await.unwrap();
        graph.bind("d", "b").await.unwrap();

        let children: Vec<String> = graph
            .list_referred("a")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(children.len(), 2);
        assert!(children.contains(&"b".to_string()));
        assert!(children.contains(&"c".to_string()));
    }
}
