//! Domain types shared by the services and the storage backends.

pub mod member;
pub mod points;
pub mod ratio;
pub mod transaction;

pub use member::{
    non_empty, Enrollment, Member, MemberMatch, MemberSearch, NewMember, ReferralLink,
    ReferrerQuery,
};
pub use points::{apply_ratio, round_points, Balance, POINT_SCALE};
pub use ratio::{
    parse_fractions, tiers_from_fractions, validate_tiers, RatioSnapshot, RatioSync, RatioTier,
    REFERRAL_TIER, SELF_TIER,
};
pub use transaction::{
    BalanceDelta, Direction, HistoryQuery, OrderKey, Posting, Transaction, TransactionDraft,
    TransactionKind,
};
