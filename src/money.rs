//! Fixed-point money stored as a whole number of minor units.

use std::{fmt::Display, str::FromStr};

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::Error;

/// The number of decimal places kept for an amount of money.
pub const MINOR_UNIT_SCALE: u32 = 2;

const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// An amount of money in minor units (e.g., cents).
///
/// Arithmetic is exact and checked. Amounts are read and written as decimal
/// strings such as `"12.50"`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Money(i64);

impl Money {
    /// No money at all.
    pub const ZERO: Money = Money(0);

    /// Create an amount from a whole number of minor units, e.g. `1050` for `10.50`.
    pub const fn from_minor_units(units: i64) -> Self {
        Self(units)
    }

    /// The amount as a whole number of minor units.
    pub const fn minor_units(self) -> i64 {
        self.0
    }

    /// Convert a decimal into money.
    ///
    /// # Errors
    /// Returns [Error::InvalidAmount] if `value` has more than
    /// [MINOR_UNIT_SCALE] decimal places or does not fit into 64 bits of
    /// minor units.
    pub fn from_decimal(value: Decimal) -> Result<Self, Error> {
        if value.normalize().scale() > MINOR_UNIT_SCALE {
            return Err(Error::InvalidAmount(format!(
                "{value} has more than {MINOR_UNIT_SCALE} decimal places"
            )));
        }

        value
            .checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))
            .and_then(|minor_units| minor_units.to_i64())
            .map(Self)
            .ok_or_else(|| Error::InvalidAmount(format!("{value} is out of range")))
    }

    /// The amount as a decimal with [MINOR_UNIT_SCALE] decimal places.
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, MINOR_UNIT_SCALE)
    }

    /// Whether the amount is strictly greater than zero.
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Add two amounts, returning `None` on overflow.
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Subtract `other` from this amount, returning `None` on overflow.
    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Self)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl FromStr for Money {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|_| Error::InvalidAmount(format!("\"{s}\" is not a decimal amount")))?;

        Self::from_decimal(value)
    }
}

impl TryFrom<String> for Money {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Money> for String {
    fn from(value: Money) -> Self {
        value.to_string()
    }
}

impl ToSql for Money {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for Money {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(Self)
    }
}
