//! Decimal string to fixed-point conversion.
//!
//! Subscription costs arrive as human-readable decimal strings (`"10"`,
//! `"4.99"`). On-chain amounts are integers scaled by a token's decimals.
//! [`to_fixed_point`] bridges the two without going through floating point.

use std::str::FromStr;
use std::sync::LazyLock;

use alloy_primitives::U256;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimals used by the custody contract for balances and rates.
pub const CUSTODY_DECIMALS: u8 = 18;

static DECIMAL_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(?:\.\d+)?$").expect("valid regex"));

/// Errors that can occur when converting a decimal string to fixed point.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// The input is not a plain decimal number.
    #[error("Invalid number format: {0:?}")]
    InvalidFormat(String),
    /// The value is zero or negative.
    #[error("Amount must be greater than zero")]
    NotPositive,
    /// The scaled value does not fit the target integer.
    #[error("Amount is too large for {decimals} decimals")]
    Overflow {
        /// Target decimal places.
        decimals: u8,
    },
}

/// Returns `10^exp` as a [`U256`].
#[must_use]
pub fn pow10(exp: u8) -> U256 {
    U256::from(10u8).pow(U256::from(exp))
}

/// Converts a decimal string into an integer scaled by `10^decimals`.
///
/// Fractional digits beyond `decimals` are rounded half away from zero.
///
/// # Errors
///
/// Returns [`AmountError::InvalidFormat`] for anything other than a plain
/// decimal number, [`AmountError::NotPositive`] for zero or negative values
/// and [`AmountError::Overflow`] when the result does not fit.
///
/// # Example
///
/// ```rust
/// use alloy_primitives::U256;
/// use papaya::amount::to_fixed_point;
///
/// assert_eq!(to_fixed_point("10", 6).unwrap(), U256::from(10_000_000u64));
/// assert_eq!(to_fixed_point("0.5", 2).unwrap(), U256::from(50u64));
/// ```
pub fn to_fixed_point(input: &str, decimals: u8) -> Result<U256, AmountError> {
    let trimmed = input.trim();
    if !DECIMAL_STRING.is_match(trimmed) {
        return Err(AmountError::InvalidFormat(input.to_owned()));
    }
    let parsed = Decimal::from_str(trimmed)
        .map_err(|_| AmountError::InvalidFormat(input.to_owned()))?;
    if parsed <= Decimal::ZERO {
        return Err(AmountError::NotPositive);
    }

    let target_scale = u32::from(decimals);
    let value = if parsed.scale() > target_scale {
        parsed.round_dp_with_strategy(target_scale, RoundingStrategy::MidpointAwayFromZero)
    } else {
        parsed
    };
    if value <= Decimal::ZERO {
        return Err(AmountError::NotPositive);
    }

    let mantissa = U256::from(value.mantissa().unsigned_abs());
    let shift = target_scale - value.scale();
    let shift = u8::try_from(shift).map_err(|_| AmountError::Overflow { decimals })?;
    mantissa
        .checked_mul(pow10(shift))
        .ok_or(AmountError::Overflow { decimals })
}

/// Converts an amount between two decimal scales, rounding down.
#[must_use]
pub fn rescale_floor(amount: U256, from_decimals: u8, to_decimals: u8) -> U256 {
    if from_decimals >= to_decimals {
        amount / pow10(from_decimals - to_decimals)
    } else {
        amount.saturating_mul(pow10(to_decimals - from_decimals))
    }
}

/// Converts an amount between two decimal scales, rounding up.
#[must_use]
pub fn rescale_ceil(amount: U256, from_decimals: u8, to_decimals: u8) -> U256 {
    if from_decimals >= to_decimals {
        amount.div_ceil(pow10(from_decimals - to_decimals))
    } else {
        amount.saturating_mul(pow10(to_decimals - from_decimals))
    }
}
