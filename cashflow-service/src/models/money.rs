//! Fixed-point money in integer minor units (cents).
//!
//! Amounts are never negative and never fractional. Conversion from major
//! units happens only through [`Money::from_major`]; rounding happens only in
//! [`Money::from_major`], [`Money::multiply`] and [`Money::divide`], always
//! half-up (ties away from zero).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Minor units per major unit.
const MINOR_PER_MAJOR: i64 = 100;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_minor(minor: i64) -> Result<Self, EngineError> {
        if minor < 0 {
            return Err(EngineError::InvalidAmount(format!(
                "amount must not be negative, got {} minor units",
                minor
            )));
        }
        Ok(Self(minor))
    }

    /// Convert a major-unit amount, rounding half-up to the nearest cent.
    pub fn from_major(major: Decimal) -> Result<Self, EngineError> {
        if major.is_sign_negative() && !major.is_zero() {
            return Err(EngineError::InvalidAmount(format!(
                "amount must not be negative, got {}",
                major
            )));
        }
        let minor = major
            .checked_mul(Decimal::from(MINOR_PER_MAJOR))
            .map(|m| m.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|m| m.to_i64())
            .ok_or_else(|| EngineError::InvalidAmount(format!("amount {} out of range", major)))?;
        Self::from_minor(minor)
    }

    pub fn minor(&self) -> i64 {
        self.0
    }

    pub fn to_major(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn add(self, other: Money) -> Result<Money, EngineError> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| EngineError::InvalidAmount(format!("{} + {} overflows", self, other)))
    }

    /// Fails when `other` exceeds `self`.
    pub fn subtract(self, other: Money) -> Result<Money, EngineError> {
        if other.0 > self.0 {
            return Err(EngineError::InvalidAmount(format!(
                "{} - {} would be negative",
                self, other
            )));
        }
        Ok(Money(self.0 - other.0))
    }

    pub fn multiply(self, factor: Decimal) -> Result<Money, EngineError> {
        if factor.is_sign_negative() && !factor.is_zero() {
            return Err(EngineError::InvalidAmount(format!(
                "factor must not be negative, got {}",
                factor
            )));
        }
        Decimal::from(self.0)
            .checked_mul(factor)
            .map(|m| m.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|m| m.to_i64())
            .map(Money)
            .ok_or_else(|| EngineError::InvalidAmount(format!("{} * {} overflows", self, factor)))
    }

    /// Divide and round half-up to the nearest minor unit.
    pub fn divide(self, divisor: u32) -> Result<Money, EngineError> {
        if divisor == 0 {
            return Err(EngineError::InvalidAmount("division by zero".to_string()));
        }
        let n = self.0 as i128;
        let d = divisor as i128;
        Ok(Money(((2 * n + d) / (2 * d)) as i64))
    }

    /// `self - other` as a signed minor-unit value, for net figures.
    pub fn signed_difference(self, other: Money) -> i64 {
        self.0 - other.0
    }

    pub fn sum<I: IntoIterator<Item = Money>>(amounts: I) -> Result<Money, EngineError> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, amount| acc.add(amount))
    }
}

impl TryFrom<i64> for Money {
    type Error = EngineError;

    fn try_from(minor: i64) -> Result<Self, Self::Error> {
        Money::from_minor(minor)
    }
}

impl From<Money> for i64 {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:02}",
            self.0 / MINOR_PER_MAJOR,
            self.0 % MINOR_PER_MAJOR
        )
    }
}
