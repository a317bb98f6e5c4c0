use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Minimum number of fractional digits kept on stored money values.
/// Inputs with more digits keep them; nothing is ever rounded.
pub const MONEY_SCALE: u32 = 2;

/// Zero with the standard money scale ("0.00").
pub fn zero() -> Decimal {
    Decimal::new(0, MONEY_SCALE)
}

/// Rescale a value up to `MONEY_SCALE` fractional digits.
/// Example: 100 -> 100.00, 12.5 -> 12.50, 0.125 -> 0.125
pub fn normalize(value: Decimal) -> Decimal {
    let mut value = value;
    if value.scale() < MONEY_SCALE {
        value.rescale(MONEY_SCALE);
    }
    value
}

/// Format a money value as a decimal string with at least two fractional digits.
pub fn format_money(value: Decimal) -> String {
    normalize(value).to_string()
}

/// A strictly positive monetary amount.
///
/// Every deposit, withdrawal and transfer takes an `Amount`, so a zero or
/// negative value can never reach the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }
        Ok(Self(normalize(value)))
    }

    /// Parse a decimal string such as "50", "12.5" or "0.01".
    pub fn parse(input: &str) -> Result<Self, AmountError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AmountError::Empty);
        }
        let value = Decimal::from_str_exact(input)
            .map_err(|_| AmountError::InvalidFormat(input.to_string()))?;
        Self::new(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    Empty,
    InvalidFormat(String),
    NotPositive(Decimal),
}

impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Empty => write!(f, "amount is required"),
            AmountError::InvalidFormat(input) => write!(f, "'{}' is not a decimal number", input),
            AmountError::NotPositive(value) => {
                write!(f, "amount must be greater than zero (got {})", value)
            }
        }
    }
}

impl std::error::Error for AmountError {}
