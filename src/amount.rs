//! 256-bit token amounts
//!
//! Inscription amounts routinely exceed `u128` once multiplied (reserve × reserve, amount ×
//! total supply), so every ledger quantity is a `U256`. Arithmetic is always checked and an
//! overflow or underflow surfaces as `IndexerError::Consistency`. Amounts are stored in SQLite as
//! decimal `TEXT`.

use crate::error::{IndexerError, IndexerResult};
use alloy_primitives::U256;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(U256);

impl Amount {
    pub const ZERO: Amount = Amount(U256::ZERO);

    pub fn new(value: u64) -> Self {
        Amount(U256::from(value))
    }

    pub fn from_u128(value: u128) -> Self {
        Amount(U256::from(value))
    }

    /// Parse a plain decimal string (no sign, no hex prefix, no separators).
    pub fn parse(raw: &str) -> IndexerResult<Self> {
        let s = raw.trim();
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IndexerError::Decode(format!("invalid amount: {:?}", raw)));
        }
        U256::from_str_radix(s, 10)
            .map(Amount)
            .map_err(|_| IndexerError::Decode(format!("amount out of range: {}", s)))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, rhs: Amount) -> IndexerResult<Amount> {
        self.0
            .checked_add(rhs.0)
            .map(Amount)
            .ok_or_else(|| IndexerError::consistency(format!("overflow: {} + {}", self, rhs)))
    }

    pub fn checked_sub(self, rhs: Amount) -> IndexerResult<Amount> {
        self.0
            .checked_sub(rhs.0)
            .map(Amount)
            .ok_or_else(|| IndexerError::consistency(format!("underflow: {} - {}", self, rhs)))
    }

    pub fn checked_mul(self, rhs: Amount) -> IndexerResult<Amount> {
        self.0
            .checked_mul(rhs.0)
            .map(Amount)
            .ok_or_else(|| IndexerError::consistency(format!("overflow: {} * {}", self, rhs)))
    }

    /// Floor division; dividing by zero is a consistency error, never a panic.
    pub fn checked_div(self, rhs: Amount) -> IndexerResult<Amount> {
        self.0
            .checked_div(rhs.0)
            .map(Amount)
            .ok_or_else(|| IndexerError::consistency(format!("division by zero: {} / 0", self)))
    }

    /// `floor(sqrt(self))` by Newton iteration.
    pub fn isqrt(self) -> Amount {
        let n = self.0;
        if n < U256::from(2u8) {
            return self;
        }
        let one = U256::from(1u8);
        let mut x = n;
        let mut y = (n >> 1) + (n & one);
        while y < x {
            x = y;
            y = (x + n / x) >> 1;
        }
        Amount(x)
    }

    /// Lossy conversion for price quotes only.
    pub fn to_f64(self) -> f64 {
        self.0.to_string().parse::<f64>().unwrap_or(f64::MAX)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Amount::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl ToSql for Amount {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.to_string()))
    }
}

impl FromSql for Amount {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Text(bytes) => {
                let s = std::str::from_utf8(bytes).map_err(|e| FromSqlError::Other(Box::new(e)))?;
                Amount::parse(s).map_err(|e| FromSqlError::Other(Box::new(e)))
            }
            ValueRef::Integer(i) if i >= 0 => Ok(Amount::new(i as u64)),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}
