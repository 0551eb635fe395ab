//! Position domain: leveraged exposure per market.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::IntegrityWarning;
use crate::shared::{LeverageBounds, PositionId, PositionSide, Symbol};

/// An open (or just-closed) perpetual position.
///
/// Size is non-negative; direction lives in `side`. Liquidation price sits
/// below entry for longs and above entry for shorts; a feed that says
/// otherwise gets a warning, not a rejection, because pricing is the venue's
/// call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: PositionId,
    pub market: Symbol,
    pub side: PositionSide,
    pub size: Decimal,
    pub leverage: Decimal,
    pub entry_price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidation_price: Option<Decimal>,
    pub margin: Decimal,
    pub pnl: Decimal,
    pub pnl_percentage: Decimal,
}

/// Partial position update from either channel.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PositionPatch {
    pub id: Option<PositionId>,
    pub market: Option<Symbol>,
    pub side: Option<PositionSide>,
    pub size: Option<Decimal>,
    pub leverage: Option<Decimal>,
    pub entry_price: Option<Decimal>,
    pub liquidation_price: Option<Decimal>,
    pub margin: Option<Decimal>,
    pub pnl: Option<Decimal>,
    pub pnl_percentage: Option<Decimal>,
}

impl Position {
    pub fn from_patch(
        id: &PositionId,
        patch: PositionPatch,
        bounds: &LeverageBounds,
        warnings: &mut Vec<IntegrityWarning>,
    ) -> Self {
        let mut position = Self {
            id: id.clone(),
            market: Symbol::default(),
            side: PositionSide::Unknown,
            size: Decimal::ZERO,
            leverage: Decimal::ONE,
            entry_price: Decimal::ZERO,
            liquidation_price: None,
            margin: Decimal::ZERO,
            pnl: Decimal::ZERO,
            pnl_percentage: Decimal::ZERO,
        };
        position.apply_patch(patch, bounds, warnings);
        position
    }

    /// Applies a patch in place, then checks the position invariants against
    /// the adapter-declared leverage bounds.
    pub fn apply_patch(
        &mut self,
        patch: PositionPatch,
        bounds: &LeverageBounds,
        warnings: &mut Vec<IntegrityWarning>,
    ) {
        if let Some(market) = patch.market {
            self.market = market;
        }
        if let Some(side) = patch.side {
            self.side = side;
        }
        if let Some(size) = patch.size {
            if size < Decimal::ZERO {
                warnings.push(IntegrityWarning::NegativeSize { id: self.id.clone() });
                self.size = Decimal::ZERO;
            } else {
                self.size = size;
            }
        }
        if let Some(leverage) = patch.leverage {
            self.leverage = leverage;
        }
        if let Some(entry) = patch.entry_price {
            self.entry_price = entry;
        }
        if let Some(liquidation) = patch.liquidation_price {
            self.liquidation_price = Some(liquidation);
        }
        if let Some(margin) = patch.margin {
            self.margin = margin;
        }
        if let Some(pnl) = patch.pnl {
            self.pnl = pnl;
        }
        if let Some(pct) = patch.pnl_percentage {
            self.pnl_percentage = pct;
        }

        if !bounds.contains(self.leverage) {
            warnings.push(IntegrityWarning::LeverageOutOfBounds {
                id: self.id.clone(),
                leverage: self.leverage,
                min: bounds.min,
                max: bounds.max,
            });
        }

        if let Some(liquidation) = self.liquidation_price {
            if self.entry_price > Decimal::ZERO {
                let consistent = match self.side {
                    PositionSide::Long => liquidation < self.entry_price,
                    PositionSide::Short => liquidation > self.entry_price,
                    PositionSide::Unknown => true,
                };
                if !consistent {
                    warnings.push(IntegrityWarning::LiquidationSideMismatch {
                        id: self.id.clone(),
                        side: self.side,
                        entry: self.entry_price,
                        liquidation,
                    });
                }
            }
        }
    }

    pub fn to_patch(&self) -> PositionPatch {
        PositionPatch {
            id: Some(self.id.clone()),
            market: Some(self.market.clone()),
            side: Some(self.side),
            size: Some(self.size),
            leverage: Some(self.leverage),
            entry_price: Some(self.entry_price),
            liquidation_price: self.liquidation_price,
            margin: Some(self.margin),
            pnl: Some(self.pnl),
            pnl_percentage: Some(self.pnl_percentage),
        }
    }

    /// A position is flat once its size reaches zero.
    pub fn is_flat(&self) -> bool {
        self.size.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn long_patch() -> PositionPatch {
        PositionPatch {
            market: Some(Symbol::from("ETH-USDC")),
            side: Some(PositionSide::Long),
            size: Some(dec("2")),
            leverage: Some(dec("10")),
            entry_price: Some(dec("1700")),
            liquidation_price: Some(dec("1550")),
            margin: Some(dec("340")),
            ..Default::default()
        }
    }

    #[test]
    fn test_consistent_long_produces_no_warnings() {
        let mut warnings = Vec::new();
        let id = PositionId::from("pos-1");
        let position =
            Position::from_patch(&id, long_patch(), &LeverageBounds::default(), &mut warnings);
        assert_eq!(position.side, PositionSide::Long);
        assert!(warnings.is_empty(), "unexpected: {warnings:?}");
    }

    #[test]
    fn test_liquidation_above_entry_for_long_warns() {
        let mut warnings = Vec::new();
        let id = PositionId::from("pos-1");
        let mut patch = long_patch();
        patch.liquidation_price = Some(dec("1800"));
        Position::from_patch(&id, patch, &LeverageBounds::default(), &mut warnings);
        assert!(matches!(
            warnings.as_slice(),
            [IntegrityWarning::LiquidationSideMismatch { .. }]
        ));
    }

    #[test]
    fn test_liquidation_below_entry_for_short_warns() {
        let mut warnings = Vec::new();
        let id = PositionId::from("pos-2");
        let mut patch = long_patch();
        patch.side = Some(PositionSide::Short);
        patch.liquidation_price = Some(dec("1550"));
        Position::from_patch(&id, patch, &LeverageBounds::default(), &mut warnings);
        assert!(matches!(
            warnings.as_slice(),
            [IntegrityWarning::LiquidationSideMismatch { .. }]
        ));
    }

    #[test]
    fn test_negative_size_clamped() {
        let mut warnings = Vec::new();
        let id = PositionId::from("pos-3");
        let mut patch = long_patch();
        patch.size = Some(dec("-1"));
        patch.liquidation_price = None;
        let position =
            Position::from_patch(&id, patch, &LeverageBounds::default(), &mut warnings);
        assert_eq!(position.size, Decimal::ZERO);
        assert!(position.is_flat());
        assert!(matches!(
            warnings.as_slice(),
            [IntegrityWarning::NegativeSize { .. }]
        ));
    }

    #[test]
    fn test_leverage_out_of_bounds_warns_but_applies() {
        let mut warnings = Vec::new();
        let id = PositionId::from("pos-4");
        let mut patch = long_patch();
        patch.leverage = Some(dec("75"));
        patch.liquidation_price = None;
        let position =
            Position::from_patch(&id, patch, &LeverageBounds::default(), &mut warnings);
        assert_eq!(position.leverage, dec("75"));
        assert!(matches!(
            warnings.as_slice(),
            [IntegrityWarning::LeverageOutOfBounds { .. }]
        ));
    }
}
