//! Decimal helpers and the `-1 = unlimited` cap type.

use bigdecimal::{BigDecimal, RoundingMode, Signed, Zero};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of decimal places credited amounts are rounded to.
pub const MONEY_SCALE: i64 = 2;

/// Rounds a computed amount to [`MONEY_SCALE`] places, half-up.
pub fn round_money(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(MONEY_SCALE, RoundingMode::HalfUp)
}

/// Returns `amount × percentage / 100`, rounded to money precision.
pub fn percent_of(amount: &BigDecimal, percentage: &BigDecimal) -> BigDecimal {
    round_money(&(amount * percentage / BigDecimal::from(100)))
}

/// Values that can be stored as a cap with `-1` meaning "no cap".
pub trait CapValue: Sized + PartialOrd {
    /// The wire/storage sentinel for "unlimited".
    fn unlimited_marker() -> Self;

    fn is_negative_value(&self) -> bool;
}

impl CapValue for i64 {
    fn unlimited_marker() -> Self {
        -1
    }

    fn is_negative_value(&self) -> bool {
        *self < 0
    }
}

impl CapValue for BigDecimal {
    fn unlimited_marker() -> Self {
        BigDecimal::from(-1)
    }

    fn is_negative_value(&self) -> bool {
        self.is_negative()
    }
}

/// An optional upper bound, persisted as `-1` when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Limit<T> {
    Unlimited,
    AtMost(T),
}

impl<T: CapValue> Limit<T> {
    /// Converts a stored value, mapping `-1` to [`Limit::Unlimited`].
    /// Any other negative value is rejected.
    pub fn from_raw(raw: T) -> Result<Self, String> {
        if raw == T::unlimited_marker() {
            Ok(Limit::Unlimited)
        } else if raw.is_negative_value() {
            Err("must be -1 (unlimited) or a non-negative value".to_string())
        } else {
            Ok(Limit::AtMost(raw))
        }
    }

    /// True once `used` has reached the limit.
    pub fn is_reached_by(&self, used: &T) -> bool {
        match self {
            Limit::Unlimited => false,
            Limit::AtMost(limit) => used >= limit,
        }
    }
}

impl<T: CapValue + Clone> Limit<T> {
    pub fn to_raw(&self) -> T {
        match self {
            Limit::Unlimited => T::unlimited_marker(),
            Limit::AtMost(value) => value.clone(),
        }
    }
}

impl<T: Serialize> Serialize for Limit<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Limit::Unlimited => serializer.serialize_i64(-1),
            Limit::AtMost(value) => value.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de> + CapValue> Deserialize<'de> for Limit<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = T::deserialize(deserializer)?;
        Limit::from_raw(raw).map_err(D::Error::custom)
    }
}

/// True if `amount` is strictly greater than zero.
pub fn is_positive(amount: &BigDecimal) -> bool {
    amount > &BigDecimal::zero()
}
