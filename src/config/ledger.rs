//! Ledger configuration types.

use rust_decimal::Decimal;
use serde::Deserialize;

/// What a purchase's gains are computed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GainBase {
    /// Amount minus the value of the points used.
    #[default]
    Net,
    /// The full purchase amount.
    Full,
}

/// Ledger arithmetic, locking and ratio defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Points per monetary minor unit.
    pub point_value: Decimal,
    /// Base for self and referral gains.
    pub gain_base: GainBase,
    /// Upper bound on waiting for one member lock.
    pub lock_timeout_ms: u64,
    /// Ratio table written on first start; position is the tier key.
    pub default_ratios: Vec<Decimal>,
    /// Largest page a history listing returns.
    pub history_page_limit: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            point_value: Decimal::ONE,
            gain_base: GainBase::Net,
            lock_timeout_ms: 5000,
            default_ratios: vec![Decimal::new(1, 1), Decimal::new(5, 2)],
            history_page_limit: 500,
        }
    }
}
