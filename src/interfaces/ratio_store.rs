//! Ratio table persistence interface.

use async_trait::async_trait;

use super::member_store::Result;
use crate::model::{RatioSync, RatioTier};

/// Interface for the commission ratio table.
#[async_trait]
pub trait RatioStore: Send + Sync {
    /// Stored tiers ordered by key; empty if never configured.
    async fn load_tiers(&self) -> Result<Vec<RatioTier>>;

    /// Replace the whole table and apply link rewrites in one unit.
    ///
    /// Returns the number of member referral links rewritten.
    async fn replace_tiers(&self, tiers: &[RatioTier], syncs: &[RatioSync]) -> Result<u64>;
}
