//! Balance domain: per-token free/locked/total accounting.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::IntegrityWarning;
use crate::shared::TokenId;

/// A token balance. `total == free + locked` holds after every accepted
/// mutation; the store re-derives `total` whenever an update would break it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub token: TokenId,
    pub free: Decimal,
    pub locked: Decimal,
    pub total: Decimal,
}

/// Partial balance update from either channel.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BalancePatch {
    pub token: Option<TokenId>,
    pub free: Option<Decimal>,
    pub locked: Option<Decimal>,
    pub total: Option<Decimal>,
}

impl Balance {
    pub fn from_patch(
        token: &TokenId,
        patch: BalancePatch,
        warnings: &mut Vec<IntegrityWarning>,
    ) -> Self {
        let mut balance = Self {
            token: token.clone(),
            free: Decimal::ZERO,
            locked: Decimal::ZERO,
            total: Decimal::ZERO,
        };
        balance.apply_patch(patch, warnings);
        balance
    }

    /// Applies a patch in place, clamping negatives to zero and re-deriving
    /// `total` from `free + locked` when the patched fields disagree.
    pub fn apply_patch(&mut self, patch: BalancePatch, warnings: &mut Vec<IntegrityWarning>) {
        let provided_total = patch.total.is_some();

        if let Some(free) = patch.free {
            self.free = self.clamped(free, "free", warnings);
        }
        if let Some(locked) = patch.locked {
            self.locked = self.clamped(locked, "locked", warnings);
        }
        if let Some(total) = patch.total {
            self.total = self.clamped(total, "total", warnings);
        }

        let expected = self.free + self.locked;
        if self.total != expected {
            // A silently re-derived total (partial patch) is expected; a
            // provided total that disagrees with its parts is not.
            if provided_total {
                warnings.push(IntegrityWarning::BalanceTotalMismatch {
                    token: self.token.clone(),
                    free: self.free,
                    locked: self.locked,
                    total: self.total,
                });
            }
            self.total = expected;
        }
    }

    fn clamped(
        &self,
        value: Decimal,
        field: &'static str,
        warnings: &mut Vec<IntegrityWarning>,
    ) -> Decimal {
        if value < Decimal::ZERO {
            warnings.push(IntegrityWarning::NegativeBalance {
                token: self.token.clone(),
                field,
            });
            Decimal::ZERO
        } else {
            value
        }
    }

    pub fn to_patch(&self) -> BalancePatch {
        BalancePatch {
            token: Some(self.token.clone()),
            free: Some(self.free),
            locked: Some(self.locked),
            total: Some(self.total),
        }
    }
}
