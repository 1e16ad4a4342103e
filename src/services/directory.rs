//! Member directory: identity resolution, enrollment and profile changes.
//!
//! Lookups that can match several members return [`MemberMatch`]; the
//! directory never picks a candidate on the caller's behalf.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::interfaces::{MemberStore, StorageError};
use crate::model::{
    non_empty, Enrollment, Member, MemberMatch, MemberSearch, NewMember, ReferralLink,
    ReferrerQuery, REFERRAL_TIER,
};

use super::RatioTable;

/// Phone numbers are digits with an optional leading '+'.
pub fn validate_phone(phone: &str) -> Result<()> {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(LedgerError::InvalidPhone(phone.to_string()));
    }
    Ok(())
}

pub struct MemberDirectory {
    members: Arc<dyn MemberStore>,
    ratios: Arc<RatioTable>,
}

impl MemberDirectory {
    pub fn new(members: Arc<dyn MemberStore>, ratios: Arc<RatioTable>) -> Self {
        Self { members, ratios }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Member> {
        let id = non_empty(id).ok_or_else(|| LedgerError::Invalid("member id is required".into()))?;
        self.members
            .get(&id)
            .await?
            .ok_or_else(|| LedgerError::member_not_found(&id))
    }

    /// Resolve by the two unique keys.
    ///
    /// Fails with `Inconsistent` when phone and card belong to different
    /// members.
    pub async fn find_by_phone_or_card(&self, phone: &str, card_no: &str) -> Result<MemberMatch> {
        let phone = non_empty(phone);
        let card_no = non_empty(card_no);
        if phone.is_none() && card_no.is_none() {
            return Err(LedgerError::Invalid("phone or card number is required".into()));
        }
        self.match_keys(phone.as_deref(), card_no.as_deref()).await
    }

    /// OR-combined search over phone, card and name substring.
    pub async fn search_by_info(&self, phone: &str, card_no: &str, name: &str) -> Result<MemberMatch> {
        self.run_search(&MemberSearch::new(phone, card_no, name))
            .await
    }

    /// Exact id lookup when an id is given, otherwise [`Self::search_by_info`].
    pub async fn search(
        &self,
        id: &str,
        phone: &str,
        card_no: &str,
        name: &str,
    ) -> Result<MemberMatch> {
        match non_empty(id) {
            Some(id) => Ok(self
                .members
                .get(&id)
                .await?
                .map_or(MemberMatch::NotFound, MemberMatch::Found)),
            None => self.search_by_info(phone, card_no, name).await,
        }
    }

    /// Create a member without a referrer.
    pub async fn create(&self, new: NewMember) -> Result<Member> {
        self.create_linked(new, None).await
    }

    /// Check-in: return the existing member for this phone/card, or create
    /// one linked to the resolved referrer.
    ///
    /// An ambiguous referrer is reported back without writing anything.
    #[tracing::instrument(name = "directory.enroll", skip_all)]
    pub async fn enroll(&self, new: NewMember, referrer: ReferrerQuery) -> Result<Enrollment> {
        let phone = new.phone.as_deref().and_then(non_empty);
        let card_no = new.card_no.as_deref().and_then(non_empty);
        if phone.is_none() && card_no.is_none() {
            return Err(LedgerError::Invalid("phone or card number is required".into()));
        }
        if let Some(existing) = self.existing_owner(phone.as_deref(), card_no.as_deref()).await? {
            return Ok(Enrollment::Existing(existing));
        }

        let referrer = match self.resolve_referrer(&referrer).await? {
            ReferrerResolution::None => None,
            ReferrerResolution::Found(member) => Some(member),
            ReferrerResolution::Ambiguous(candidates) => {
                return Ok(Enrollment::ReferrerAmbiguous(candidates));
            }
        };

        let created = match referrer {
            // Held so a concurrent ratio sync cannot miss the new link.
            Some(referrer) => {
                self.ratios
                    .hold_current(|snapshot| {
                        let link = ReferralLink {
                            referrer_id: referrer.id,
                            tier: REFERRAL_TIER,
                            ratio: snapshot.referral_ratio(),
                        };
                        self.create_linked(new, Some(link))
                    })
                    .await
            }
            None => self.create_linked(new, None).await,
        };

        match created {
            Ok(member) => Ok(Enrollment::Created(member)),
            // Lost a race with a concurrent check-in for the same keys.
            Err(LedgerError::DuplicateMember(existing)) => Ok(Enrollment::Existing(*existing)),
            Err(e) => Err(e),
        }
    }

    /// Replace phone, card and name. Blank fields keep their current value;
    /// phone or name must be given.
    #[tracing::instrument(name = "directory.update_profile", skip_all, fields(%id))]
    pub async fn update_profile(
        &self,
        id: &str,
        phone: &str,
        card_no: &str,
        name: &str,
    ) -> Result<Member> {
        let current = self.find_by_id(id).await?;
        let new_phone = non_empty(phone);
        let new_name = non_empty(name);
        if new_phone.is_none() && new_name.is_none() {
            return Err(LedgerError::Invalid("phone or name is required".into()));
        }
        if let Some(phone) = &new_phone {
            validate_phone(phone)?;
        }

        let phone = new_phone.or_else(|| current.phone.clone());
        let card_no = non_empty(card_no).or_else(|| current.card_no.clone());
        let name = new_name.unwrap_or_else(|| current.name.clone());

        match self
            .members
            .update_profile(&current.id, phone.as_deref(), card_no.as_deref(), &name)
            .await
        {
            Ok(()) => {}
            Err(StorageError::DuplicateKey(_)) => {
                return Err(self
                    .duplicate_of(phone.as_deref(), card_no.as_deref(), Some(&current.id))
                    .await);
            }
            Err(e) => return Err(e.into()),
        }

        info!("Member profile updated");
        Ok(Member {
            phone,
            card_no,
            name,
            ..current
        })
    }

    async fn create_linked(&self, new: NewMember, referral: Option<ReferralLink>) -> Result<Member> {
        let phone = new.phone.as_deref().and_then(non_empty);
        let card_no = new.card_no.as_deref().and_then(non_empty);
        if phone.is_none() && card_no.is_none() {
            return Err(LedgerError::Invalid("phone or card number is required".into()));
        }
        if let Some(phone) = &phone {
            validate_phone(phone)?;
        }
        if let Some(existing) = self.existing_owner(phone.as_deref(), card_no.as_deref()).await? {
            return Err(LedgerError::DuplicateMember(Box::new(existing)));
        }

        let member = Member {
            id: Uuid::new_v4().to_string(),
            phone,
            card_no,
            name: new.name.trim().to_string(),
            referral,
            created_at: Utc::now(),
        };

        match self.members.insert(&member).await {
            Ok(()) => {}
            Err(StorageError::DuplicateKey(_)) => {
                return Err(self
                    .duplicate_of(member.phone.as_deref(), member.card_no.as_deref(), None)
                    .await);
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            member_id = %member.id,
            referrer_id = ?member.referrer_id(),
            "Member created"
        );
        Ok(member)
    }

    async fn match_keys(&self, phone: Option<&str>, card_no: Option<&str>) -> Result<MemberMatch> {
        let by_phone = match phone {
            Some(phone) => self.members.find_by_phone(phone).await?,
            None => None,
        };
        let by_card = match card_no {
            Some(card_no) => self.members.find_by_card(card_no).await?,
            None => None,
        };

        match (by_phone, by_card) {
            (Some(a), Some(b)) if a.id != b.id => Err(LedgerError::Inconsistent(format!(
                "phone belongs to {}, card belongs to {}",
                a.id, b.id
            ))),
            (Some(member), _) | (None, Some(member)) => Ok(MemberMatch::Found(member)),
            (None, None) => Ok(MemberMatch::NotFound),
        }
    }

    /// First member holding either key; a split owner still counts as taken.
    async fn existing_owner(
        &self,
        phone: Option<&str>,
        card_no: Option<&str>,
    ) -> Result<Option<Member>> {
        if let Some(phone) = phone {
            if let Some(member) = self.members.find_by_phone(phone).await? {
                return Ok(Some(member));
            }
        }
        if let Some(card_no) = card_no {
            return Ok(self.members.find_by_card(card_no).await?);
        }
        Ok(None)
    }

    async fn duplicate_of(
        &self,
        phone: Option<&str>,
        card_no: Option<&str>,
        exclude: Option<&str>,
    ) -> LedgerError {
        let mut owners = Vec::new();
        if let Some(phone) = phone {
            owners.push(self.members.find_by_phone(phone).await);
        }
        if let Some(card_no) = card_no {
            owners.push(self.members.find_by_card(card_no).await);
        }
        for owner in owners {
            match owner {
                Ok(Some(member)) if Some(member.id.as_str()) != exclude => {
                    return LedgerError::DuplicateMember(Box::new(member));
                }
                Ok(_) => {}
                Err(e) => return e.into(),
            }
        }
        LedgerError::Storage(StorageError::DuplicateKey(
            "phone or card already taken".into(),
        ))
    }

    async fn run_search(&self, search: &MemberSearch) -> Result<MemberMatch> {
        if search.is_empty() {
            return Err(LedgerError::Invalid(
                "phone, card number or name is required".into(),
            ));
        }
        let mut seen = HashSet::new();
        let candidates: Vec<Member> = self
            .members
            .search(search)
            .await?
            .into_iter()
            .filter(|member| seen.insert(member.id.clone()))
            .collect();
        Ok(MemberMatch::from_candidates(candidates))
    }

    async fn resolve_referrer(&self, query: &ReferrerQuery) -> Result<ReferrerResolution> {
        if let Some(id) = &query.id {
            let referrer = self.members.get(id).await?.ok_or_else(|| LedgerError::NotFound {
                kind: "referrer",
                key: id.clone(),
            })?;
            return Ok(ReferrerResolution::Found(referrer));
        }
        if query.search.is_empty() {
            return Ok(ReferrerResolution::None);
        }

        match self.run_search(&query.search).await? {
            MemberMatch::Found(member) => Ok(ReferrerResolution::Found(member)),
            MemberMatch::Ambiguous(candidates) => Ok(ReferrerResolution::Ambiguous(candidates)),
            MemberMatch::NotFound => Err(LedgerError::NotFound {
                kind: "referrer",
                key: describe(&query.search),
            }),
        }
    }
}

enum ReferrerResolution {
    None,
    Found(Member),
    Ambiguous(Vec<Member>),
}

fn describe(search: &MemberSearch) -> String {
    [
        search.phone.as_deref().map(|v| format!("phone={v}")),
        search.card_no.as_deref().map(|v| format!("card={v}")),
        search.name.as_deref().map(|v| format!("name={v}")),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
}
