//! Commission ratio tiers.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

/// Tier key for a member's own gain on a purchase.
pub const SELF_TIER: u32 = 0;
/// Tier key for the immediate referrer's commission.
pub const REFERRAL_TIER: u32 = 1;

/// One row of the ratio table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioTier {
    pub key: u32,
    pub fraction: Decimal,
}

impl RatioTier {
    pub fn new(key: u32, fraction: Decimal) -> Self {
        Self { key, fraction }
    }
}

/// Build a table from an ordered fraction list; position becomes the key.
pub fn tiers_from_fractions(fractions: &[Decimal]) -> Vec<RatioTier> {
    fractions
        .iter()
        .enumerate()
        .map(|(key, fraction)| RatioTier::new(key as u32, *fraction))
        .collect()
}

/// Parse textual fractions ("0.1", "0.05", ...) into an ordered table.
pub fn parse_fractions<S: AsRef<str>>(values: &[S]) -> Result<Vec<RatioTier>> {
    let fractions = values
        .iter()
        .map(|value| {
            let value = value.as_ref().trim();
            Decimal::from_str(value)
                .map_err(|e| LedgerError::InvalidRatio(format!("'{value}' is not a decimal: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(tiers_from_fractions(&fractions))
}

/// Check a candidate table: non-empty, keys strictly ascending, fractions in
/// `[0, 1]`, self and referral tiers present.
pub fn validate_tiers(tiers: &[RatioTier]) -> Result<()> {
    if tiers.is_empty() {
        return Err(LedgerError::InvalidRatio("ratio table is empty".into()));
    }
    for pair in tiers.windows(2) {
        if pair[1].key <= pair[0].key {
            return Err(LedgerError::InvalidRatio(format!(
                "tier keys must be strictly ascending: {} follows {}",
                pair[1].key, pair[0].key
            )));
        }
    }
    if let Some(tier) = tiers
        .iter()
        .find(|t| t.fraction < Decimal::ZERO || t.fraction > Decimal::ONE)
    {
        return Err(LedgerError::InvalidRatio(format!(
            "tier {} fraction {} outside [0, 1]",
            tier.key, tier.fraction
        )));
    }
    for required in [SELF_TIER, REFERRAL_TIER] {
        if !tiers.iter().any(|t| t.key == required) {
            return Err(LedgerError::InvalidRatio(format!("tier {required} is required")));
        }
    }
    Ok(())
}

/// Immutable view of the table handed to one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RatioSnapshot {
    pub version: u64,
    pub tiers: Vec<RatioTier>,
}

impl RatioSnapshot {
    pub fn fraction(&self, key: u32) -> Option<Decimal> {
        self.tiers.iter().find(|t| t.key == key).map(|t| t.fraction)
    }

    pub fn self_ratio(&self) -> Decimal {
        self.fraction(SELF_TIER).unwrap_or(Decimal::ZERO)
    }

    pub fn referral_ratio(&self) -> Decimal {
        self.fraction(REFERRAL_TIER).unwrap_or(Decimal::ZERO)
    }
}

/// Rewrite instruction for existing referral links after a tier changed.
///
/// Links with `tier` are moved to `to`. Unless `update_all` is set, only
/// links still recording `from` are touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatioSync {
    pub tier: u32,
    pub from: Decimal,
    pub to: Decimal,
    pub update_all: bool,
}

impl RatioSync {
    /// Whether a link currently recording `recorded` should be rewritten.
    pub fn applies_to(&self, recorded: Decimal) -> bool {
        self.update_all || recorded == self.from
    }
}
