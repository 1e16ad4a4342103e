//! Member identity and lookup results.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Referral back-reference stored on the referred member.
///
/// `ratio` is the commission fraction recorded when the link was made.
/// Ratio table updates with sync enabled rewrite it; otherwise it stays
/// as recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralLink {
    pub referrer_id: String,
    pub tier: u32,
    pub ratio: Decimal,
}

/// A program member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub phone: Option<String>,
    pub card_no: Option<String>,
    pub name: String,
    pub referral: Option<ReferralLink>,
    pub created_at: DateTime<Utc>,
}

impl Member {
    /// Id of the member who referred this one, if any.
    pub fn referrer_id(&self) -> Option<&str> {
        self.referral.as_ref().map(|link| link.referrer_id.as_str())
    }

    /// True if either non-empty key equals this member's phone or card.
    pub fn owns_phone_or_card(&self, phone: Option<&str>, card_no: Option<&str>) -> bool {
        let phone_hit = matches!((phone, self.phone.as_deref()), (Some(a), Some(b)) if a == b);
        let card_hit = matches!((card_no, self.card_no.as_deref()), (Some(a), Some(b)) if a == b);
        phone_hit || card_hit
    }
}

/// Input for member creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMember {
    pub phone: Option<String>,
    pub card_no: Option<String>,
    pub name: String,
}

impl NewMember {
    /// Build from raw request fields; blank phone/card become `None`.
    pub fn new(phone: &str, card_no: &str, name: &str) -> Self {
        Self {
            phone: non_empty(phone),
            card_no: non_empty(card_no),
            name: name.trim().to_string(),
        }
    }
}

/// Search keys for identity resolution.
///
/// Phone and card match exactly, name matches as a substring. Keys are
/// OR-combined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberSearch {
    pub phone: Option<String>,
    pub card_no: Option<String>,
    pub name: Option<String>,
}

impl MemberSearch {
    pub fn new(phone: &str, card_no: &str, name: &str) -> Self {
        Self {
            phone: non_empty(phone),
            card_no: non_empty(card_no),
            name: non_empty(name),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.phone.is_none() && self.card_no.is_none() && self.name.is_none()
    }
}

/// How to find the referrer during enrollment. A non-empty id wins over
/// the other keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferrerQuery {
    pub id: Option<String>,
    pub search: MemberSearch,
}

impl ReferrerQuery {
    pub fn new(id: &str, phone: &str, card_no: &str, name: &str) -> Self {
        Self {
            id: non_empty(id),
            search: MemberSearch::new(phone, card_no, name),
        }
    }

    pub fn by_id(id: &str) -> Self {
        Self::new(id, "", "", "")
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.search.is_empty()
    }
}

/// Outcome of a lookup that may match zero, one or several members.
///
/// Callers must handle `Ambiguous` by asking the user to choose; nothing in
/// this crate picks a candidate on their behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberMatch {
    Found(Member),
    Ambiguous(Vec<Member>),
    NotFound,
}

impl MemberMatch {
    pub fn from_candidates(mut candidates: Vec<Member>) -> Self {
        match candidates.len() {
            0 => MemberMatch::NotFound,
            1 => MemberMatch::Found(candidates.remove(0)),
            _ => MemberMatch::Ambiguous(candidates),
        }
    }

    pub fn found(self) -> Option<Member> {
        match self {
            MemberMatch::Found(member) => Some(member),
            _ => None,
        }
    }

    pub fn candidates(&self) -> &[Member] {
        match self {
            MemberMatch::Found(member) => std::slice::from_ref(member),
            MemberMatch::Ambiguous(members) => members,
            MemberMatch::NotFound => &[],
        }
    }
}

/// Result of a check-in: a new member, an existing one, or a referrer that
/// needs disambiguation before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrollment {
    Created(Member),
    Existing(Member),
    ReferrerAmbiguous(Vec<Member>),
}

/// Trim and drop empty strings.
pub fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
