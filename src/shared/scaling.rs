//! Pure conversion module between chain-native integer encodings and
//! canonical decimals.
//!
//! All math uses `rust_decimal::Decimal` for exact arithmetic. No async, no
//! network calls, no binary floating point anywhere near an amount.

use std::fmt;

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Fixed-point scale used for prices on the venue's EVM deployment.
pub const PRICE_DECIMALS: u32 = 8;

/// Largest scale `Decimal` can represent exactly.
const MAX_SCALE: u32 = 28;

/// Errors that can occur during raw/canonical conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalingError {
    Overflow { context: String },
    FractionalRemainder { value: String, decimals: u32 },
    Negative { value: String },
    NonPositiveLeverage { value: String },
    UnsupportedScale { decimals: u32 },
}

impl fmt::Display for ScalingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingError::Overflow { context } => write!(f, "Overflow: {}", context),
            ScalingError::FractionalRemainder { value, decimals } => {
                write!(f, "{} is not representable at {} decimals", value, decimals)
            }
            ScalingError::Negative { value } => {
                write!(f, "Negative amount not allowed: {}", value)
            }
            ScalingError::NonPositiveLeverage { value } => {
                write!(f, "Leverage must be positive, got {}", value)
            }
            ScalingError::UnsupportedScale { decimals } => {
                write!(f, "Scale of {} decimals exceeds supported precision", decimals)
            }
        }
    }
}

impl std::error::Error for ScalingError {}

/// Convert a raw chain integer into its canonical decimal value.
///
/// ```text
/// canonical = raw / 10^decimals
/// ```
///
/// Signed input so the same path serves PnL and funding values; balances and
/// amounts simply arrive non-negative.
pub fn to_canonical(raw: i128, decimals: u32) -> Result<Decimal, ScalingError> {
    if decimals > MAX_SCALE {
        return Err(ScalingError::UnsupportedScale { decimals });
    }
    let value =
        Decimal::try_from_i128_with_scale(raw, decimals).map_err(|_| ScalingError::Overflow {
            context: format!("{} at scale {} does not fit in Decimal", raw, decimals),
        })?;
    Ok(value.normalize())
}

/// Convert an unsigned raw chain integer into its canonical decimal value.
///
/// Same conversion as [`to_canonical`] for the amount, balance and price
/// fields chains encode as unsigned words.
pub fn to_canonical_unsigned(raw: u128, decimals: u32) -> Result<Decimal, ScalingError> {
    let signed = i128::try_from(raw).map_err(|_| ScalingError::Overflow {
        context: format!("{} does not fit in i128", raw),
    })?;
    to_canonical(signed, decimals)
}

/// Convert a canonical decimal back into the raw chain integer.
///
/// Exact by construction: values with a fractional remainder at the target
/// scale are rejected rather than silently rounded, and negatives are
/// rejected because every raw on-chain amount is unsigned.
pub fn from_canonical(value: Decimal, decimals: u32) -> Result<u128, ScalingError> {
    if value < Decimal::ZERO {
        return Err(ScalingError::Negative {
            value: value.to_string(),
        });
    }
    if decimals > MAX_SCALE {
        return Err(ScalingError::UnsupportedScale { decimals });
    }

    let mut scaled = value;
    for _ in 0..decimals {
        scaled = scaled
            .checked_mul(Decimal::TEN)
            .ok_or_else(|| ScalingError::Overflow {
                context: format!("{} * 10^{}", value, decimals),
            })?;
    }

    if scaled.fract() != Decimal::ZERO {
        return Err(ScalingError::FractionalRemainder {
            value: value.to_string(),
            decimals,
        });
    }

    scaled.trunc().to_u128().ok_or_else(|| ScalingError::Overflow {
        context: format!("{} * 10^{} does not fit in u128", value, decimals),
    })
}

/// Convert canonical leverage to its on-chain basis-point encoding.
///
/// The chain stores leverage ×100, so `2.5` becomes `250`. Conversion rounds
/// half away from zero to the nearest representable basis point.
pub fn leverage_to_bps(leverage: Decimal) -> Result<u32, ScalingError> {
    if leverage <= Decimal::ZERO {
        return Err(ScalingError::NonPositiveLeverage {
            value: leverage.to_string(),
        });
    }
    let bps = leverage
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(|| ScalingError::Overflow {
            context: format!("{} * 100", leverage),
        })?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    bps.to_u32().ok_or_else(|| ScalingError::Overflow {
        context: format!("{} bps does not fit in u32", bps),
    })
}

/// Convert on-chain basis-point leverage to its canonical decimal value.
pub fn leverage_from_bps(bps: u32) -> Decimal {
    Decimal::new(bps as i64, 2).normalize()
}
