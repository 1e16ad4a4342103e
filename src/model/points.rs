//! Point arithmetic.
//!
//! Points are `Decimal` values kept at a fixed scale of two places. Every
//! fractional result is rounded toward zero, so a member is never credited
//! more than the exact ratio allows.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Decimal places kept on point amounts.
pub const POINT_SCALE: u32 = 2;

/// Round a point amount toward zero at `POINT_SCALE`.
pub fn round_points(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(POINT_SCALE, RoundingStrategy::ToZero)
}

/// `base * ratio`, rounded. `None` on overflow.
pub fn apply_ratio(base: Decimal, ratio: Decimal) -> Option<Decimal> {
    base.checked_mul(ratio).map(round_points)
}

/// A member's two accumulators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Spendable / cashoutable points.
    pub available: Decimal,
    /// Everything ever earned.
    pub lifetime: Decimal,
}

impl Balance {
    /// Points already spent or cashed out.
    pub fn used(&self) -> Decimal {
        self.lifetime - self.available
    }

    /// Apply a delta; `None` if either accumulator would go negative or
    /// available would exceed lifetime.
    pub fn apply(&self, available: Decimal, lifetime: Decimal) -> Option<Balance> {
        let next = Balance {
            available: self.available.checked_add(available)?,
            lifetime: self.lifetime.checked_add(lifetime)?,
        };
        if next.available < Decimal::ZERO {
            return None;
        }
        if next.available > next.lifetime {
            return None;
        }
        Some(next)
    }
}
