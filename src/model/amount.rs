//! Amount type for handling monetary values that arrive as sheet cells.
//!
//! Cells pushed from a sheet may be JSON numbers (`9.99`) or formatted strings (`"$1,200.00"`).
//! The `Amount` type wraps `Decimal` and accepts both, stripping a leading dollar sign and
//! thousands separators before parsing.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// Amounts are stored as `DECIMAL(10, 2)`, so the whole part must stay below this.
const MAX_STORED_WHOLE: i64 = 100_000_000;

/// Represents a monetary amount.
///
/// # Examples
///
/// ```
/// # use sheet_sync::model::Amount;
/// # use std::str::FromStr;
/// let a = Amount::from_str("-$5,000.00").unwrap();
/// let b = Amount::from_str("-5000.00").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "-5000.00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Whether the amount fits a `DECIMAL(10, 2)` column once rounded to cents.
    pub fn fits_stored_scale(&self) -> bool {
        self.0
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .abs() < Decimal::new(MAX_STORED_WHOLE, 0)
    }

    /// The amount as a number cell for a sheet write. Falls back to text if it has no `f64`
    /// form.
    pub fn to_cell(&self) -> Value {
        self.0
            .to_f64()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(self.to_string()))
    }

    /// Parses a JSON cell. Numbers are taken by their textual representation so that `9.99`
    /// stays `9.99` rather than picking up binary floating-point noise.
    pub fn from_cell(cell: &Value) -> Result<Self, AmountError> {
        match cell {
            Value::Number(n) => Amount::from_str(&n.to_string()),
            Value::String(s) => Amount::from_str(s),
            Value::Null => Err(AmountError::Empty),
            other => Err(AmountError::NotANumber(other.to_string())),
        }
    }
}

/// An error that can occur when parsing a cell into an `Amount`.
pub enum AmountError {
    /// The cell was blank.
    Empty,
    /// The cell held something other than a number or a string, e.g. a boolean.
    NotANumber(String),
    /// The string could not be parsed as a decimal.
    Invalid(String, rust_decimal::Error),
}

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Empty => write!(f, "amount is empty"),
            AmountError::NotANumber(s) => write!(f, "amount '{s}' is not a number"),
            AmountError::Invalid(s, e) => write!(f, "unable to parse amount '{s}': {e}"),
        }
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AmountError::Invalid(_, e) => Some(e),
            _ => None,
        }
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }

        // Remove a dollar sign if present: "-$50.00", "$50.00"
        let without_dollar = if let Some(after_minus) = trimmed.strip_prefix('-') {
            match after_minus.strip_prefix('$') {
                Some(after_dollar) => format!("-{after_dollar}"),
                None => trimmed.to_string(),
            }
        } else if let Some(after_dollar) = trimmed.strip_prefix('$') {
            after_dollar.to_string()
        } else {
            trimmed.to_string()
        };

        // Remove commas (thousand separators)
        let without_commas = without_dollar.replace(',', "");

        // Sheets hands back large or tiny numbers in exponent form
        let value = if without_commas.contains(['e', 'E']) {
            Decimal::from_scientific(&without_commas)
        } else {
            Decimal::from_str(&without_commas)
        }
        .map_err(|e| AmountError::Invalid(s.to_string(), e))?;
        Ok(Amount(value))
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // DECIMAL columns are served as strings so no precision is lost in transit
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AmountVisitor;

        impl Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "a number or a string holding a decimal amount")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                Amount::from_str(v).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                Ok(Amount(Decimal::from(v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(Amount(Decimal::from(v)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
                // Go through the shortest round-trip representation, e.g. 9.99 -> "9.99"
                Amount::from_str(&v.to_string()).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}
