use crate::error::{Result, ServiceError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul};

/// Currency scale used for every persisted amount.
pub const CURRENCY_SCALE: u32 = 2;

/// A decimal currency amount.
///
/// Wraps `rust_decimal::Decimal` so billing arithmetic never touches binary
/// floating point. Rounding to the currency scale is explicit through
/// [`Money::rounded`] and always rounds half away from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Money(pub Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Builds a non-negative amount, rejecting anything below zero.
    pub fn non_negative(field: &'static str, value: Decimal) -> Result<Self> {
        if value < Decimal::ZERO {
            Err(ServiceError::invalid_field(field, "must not be negative"))
        } else {
            Ok(Self(value))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Round half-up to the currency scale.
    pub fn rounded(self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// `self * percentage / 100`, rounded to the currency scale.
    pub fn percent(self, percentage: Decimal) -> Self {
        Self(self.0 * percentage / Decimal::ONE_HUNDRED).rounded()
    }

    /// Amount in the smallest currency unit, truncated toward zero.
    pub fn to_minor_units(self) -> Result<i64> {
        (self.0 * Decimal::ONE_HUNDRED)
            .trunc()
            .to_i64()
            .ok_or_else(|| {
                ServiceError::PaymentProcessing(format!(
                    "amount {} does not fit in minor currency units",
                    self.0
                ))
            })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Mul<u32> for Money {
    type Output = Self;
    fn mul(self, rhs: u32) -> Self::Output {
        Self(self.0 * Decimal::from(rhs))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
