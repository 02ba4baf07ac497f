//! Cart line quantity.

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when constructing a [`Quantity`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// Quantity was zero or negative.
    #[error("quantity must be at least 1 (got {0})")]
    NotPositive(i64),
    /// Quantity exceeds the supported maximum.
    #[error("quantity must be at most {max} (got {got})")]
    TooLarge {
        /// Maximum allowed quantity.
        max: u32,
        /// Requested quantity.
        got: i64,
    },
}

/// A strictly positive line quantity.
///
/// A cart never stores a line with a quantity below 1; operations that
/// would produce one remove the line instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Largest quantity a single line may hold.
    pub const MAX: u32 = 9_999;

    /// A quantity of one.
    pub const ONE: Self = Self(1);

    /// The largest quantity, [`Quantity::MAX`].
    pub const CEILING: Self = Self(Self::MAX);

    /// Validate a requested quantity.
    ///
    /// # Errors
    ///
    /// Returns `QuantityError::NotPositive` for values below 1 and
    /// `QuantityError::TooLarge` for values above [`Quantity::MAX`].
    pub fn new(value: i64) -> Result<Self, QuantityError> {
        if value < 1 {
            return Err(QuantityError::NotPositive(value));
        }
        match u32::try_from(value) {
            Ok(v) if v <= Self::MAX => Ok(Self(v)),
            _ => Err(QuantityError::TooLarge {
                max: Self::MAX,
                got: value,
            }),
        }
    }

    /// The raw value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Add two quantities, failing if the sum exceeds [`Quantity::MAX`].
    ///
    /// # Errors
    ///
    /// Returns `QuantityError::TooLarge` on overflow.
    pub fn checked_add(self, other: Self) -> Result<Self, QuantityError> {
        Self::new(i64::from(self.0) + i64::from(other.0))
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self {
        q.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
