//! Money in Central African CFA francs.
//!
//! The franc has no minor unit in practice, so every amount that leaves a
//! calculation is rounded to whole francs with [`Xaf::round`].

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Sub, SubAssign};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// An amount of money in XAF (FCFA).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Xaf(Decimal);

impl Xaf {
    /// Zero francs.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Whole francs.
    #[must_use]
    pub fn from_francs(francs: i64) -> Self {
        Self(Decimal::from(francs))
    }

    /// The underlying decimal.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Round half away from zero to whole francs.
    #[must_use]
    pub fn round(self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Multiply by a rate (e.g. `0.08` for 8%) without rounding.
    #[must_use]
    pub fn times(self, rate: Decimal) -> Self {
        Self(self.0 * rate)
    }

    /// Lossy conversion for analytics.
    #[must_use]
    pub fn to_f64(self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    /// Whether the amount is strictly positive.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Clamp into `[min, max]`.
    #[must_use]
    pub fn clamp_between(self, min: Self, max: Self) -> Self {
        self.max(min).min(max)
    }
}

impl Add for Xaf {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Xaf {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Xaf {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Xaf {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for Xaf {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Self> for Xaf {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl From<Decimal> for Xaf {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

/// Formats as `12 500 FCFA`, grouping thousands with spaces.
impl fmt::Display for Xaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded = self.round().0;
        let digits = rounded.abs().trunc().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(' ');
            }
            grouped.push(c);
        }
        if rounded.is_sign_negative() && !rounded.is_zero() {
            write!(f, "-{grouped} FCFA")
        } else {
            write!(f, "{grouped} FCFA")
        }
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Xaf {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Xaf {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        Ok(Self(<Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Xaf {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

/// Errors returned by [`Price::new`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// Below the listing minimum.
    #[error("price must be at least {min}")]
    TooLow {
        /// Minimum listing price.
        min: Xaf,
    },
    /// Above the listing maximum.
    #[error("price must be at most {max}")]
    TooHigh {
        /// Maximum listing price.
        max: Xaf,
    },
    /// Fractional francs are not accepted on listings.
    #[error("price must be a whole number of francs")]
    Fractional,
}

/// A validated listing price.
///
/// ```
/// use vide_grenier_core::{Price, Xaf};
///
/// assert!(Price::new(Xaf::from_francs(15_000)).is_ok());
/// assert!(Price::new(Xaf::from_francs(999)).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Price(Xaf);

impl Price {
    /// Smallest accepted listing price.
    pub const MIN_FRANCS: i64 = 1_000;
    /// Largest accepted listing price.
    pub const MAX_FRANCS: i64 = 50_000_000;

    /// Validate a listing price.
    ///
    /// # Errors
    ///
    /// Returns an error when the amount is fractional or outside
    /// `1 000 ..= 50 000 000` XAF.
    pub fn new(amount: Xaf) -> Result<Self, PriceError> {
        if amount.amount().fract() != Decimal::ZERO {
            return Err(PriceError::Fractional);
        }
        let min = Xaf::from_francs(Self::MIN_FRANCS);
        let max = Xaf::from_francs(Self::MAX_FRANCS);
        if amount < min {
            return Err(PriceError::TooLow { min });
        }
        if amount > max {
            return Err(PriceError::TooHigh { max });
        }
        Ok(Self(amount))
    }

    /// The validated amount.
    #[must_use]
    pub const fn amount(&self) -> Xaf {
        self.0
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = Xaf::deserialize(deserializer)?;
        Self::new(amount).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Xaf::from_francs(0).to_string(), "0 FCFA");
        assert_eq!(Xaf::from_francs(950).to_string(), "950 FCFA");
        assert_eq!(Xaf::from_francs(12_500).to_string(), "12 500 FCFA");
        assert_eq!(Xaf::from_francs(1_250_000).to_string(), "1 250 000 FCFA");
        assert_eq!(Xaf::from_francs(-4_000).to_string(), "-4 000 FCFA");
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(Xaf::new(Decimal::new(25, 1)).round(), Xaf::from_francs(3));
        assert_eq!(Xaf::new(Decimal::new(24, 1)).round(), Xaf::from_francs(2));
    }

    #[test]
    fn test_times_rate() {
        let commission = Xaf::from_francs(25_000).times(Decimal::new(8, 2));
        assert_eq!(commission.round(), Xaf::from_francs(2_000));
    }

    #[test]
    fn test_sum_and_clamp() {
        let total: Xaf = [1_000, 2_000, 500].into_iter().map(Xaf::from_francs).sum();
        assert_eq!(total, Xaf::from_francs(3_500));
        assert_eq!(
            Xaf::from_francs(20).clamp_between(Xaf::from_francs(100), Xaf::from_francs(5_000)),
            Xaf::from_francs(100)
        );
    }

    #[test]
    fn test_price_bounds() {
        assert!(Price::new(Xaf::from_francs(1_000)).is_ok());
        assert!(Price::new(Xaf::from_francs(50_000_000)).is_ok());
        assert!(matches!(
            Price::new(Xaf::from_francs(999)),
            Err(PriceError::TooLow { .. })
        ));
        assert!(matches!(
            Price::new(Xaf::from_francs(50_000_001)),
            Err(PriceError::TooHigh { .. })
        ));
        assert_eq!(
            Price::new(Xaf::new(Decimal::new(15_0005, 1))),
            Err(PriceError::Fractional)
        );
    }

    #[test]
    fn test_price_deserialize_validates() {
        assert!(serde_json::from_str::<Price>("\"2500\"").is_ok());
        assert!(serde_json::from_str::<Price>("\"10\"").is_err());
    }
}
