//! Value types for pathfinding: currencies, accounts, issues, amounts
//! and qualities.

use rtx_common::math::{big_divide_unsigned, Rounding};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-point scale for qualities: a quality of `QUALITY_ONE` is a 1:1
/// exchange rate.
pub const QUALITY_ONE: u64 = 1_000_000_000;

/// A 160-bit currency code. The all-zero value is the native currency
/// (XRP); three-letter codes occupy bytes 12..15 as ASCII.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Currency(pub [u8; 20]);

impl Currency {
    /// The native currency.
    pub const XRP: Currency = Currency([0u8; 20]);

    /// Build a currency from a three-letter code.
    pub fn from_code(code: &str) -> Self {
        let mut bytes = [0u8; 20];
        let code = code.as_bytes();
        let n = code.len().min(3);
        bytes[12..12 + n].copy_from_slice(&code[..n]);
        Self(bytes)
    }

    /// Whether this is the native currency.
    pub fn is_xrp(&self) -> bool {
        self.0 == [0u8; 20]
    }

    fn code(&self) -> Option<String> {
        if self.is_xrp() {
            return Some("XRP".to_string());
        }
        let code = &self.0[12..15];
        if code.iter().all(|b| b.is_ascii_uppercase()) && self.0[..12] == [0u8; 12] {
            return Some(String::from_utf8_lossy(code).into_owned());
        }
        None
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(code) => write!(f, "{}", code),
            None => write!(f, "{}", hex::encode(self.0)),
        }
    }
}

/// A 160-bit account identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub [u8; 20]);

impl AccountId {
    /// Construct from raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account({}…)", &hex::encode(self.0)[..8])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}…", &hex::encode(self.0)[..8])
    }
}

/// A currency together with its issuer. XRP has no issuer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Issue {
    /// The currency.
    pub currency: Currency,
    /// The issuing account; `None` for XRP.
    pub issuer: Option<AccountId>,
}

impl Issue {
    /// The native issue.
    pub const XRP: Issue = Issue {
        currency: Currency::XRP,
        issuer: None,
    };

    /// An issued currency.
    pub fn new(currency: Currency, issuer: AccountId) -> Self {
        Self {
            currency,
            issuer: Some(issuer),
        }
    }

    /// Whether this is the native issue.
    pub fn is_xrp(&self) -> bool {
        self.currency.is_xrp()
    }
}

impl fmt::Debug for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.issuer {
            Some(issuer) => write!(f, "{}/{}", self.currency, issuer),
            None => write!(f, "{}", self.currency),
        }
    }
}

/// An amount of some issue.
///
/// XRP values are drops; issued values are fixed 10⁻⁶ units. Arithmetic
/// is checked where overflow is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    /// What is being counted.
    pub issue: Issue,
    /// How much, non-negative in well-formed amounts.
    pub value: i64,
}

impl Amount {
    /// Native amount in drops.
    pub fn xrp(drops: i64) -> Self {
        Self {
            issue: Issue::XRP,
            value: drops,
        }
    }

    /// Issued amount.
    pub fn issued(issue: Issue, value: i64) -> Self {
        Self { issue, value }
    }

    /// Zero of the same issue.
    pub fn zero(issue: Issue) -> Self {
        Self { issue, value: 0 }
    }

    /// Whether the value is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.value > 0
    }

    /// Subtract, clamping at zero.
    pub fn saturating_sub(&self, other: i64) -> Self {
        Self {
            issue: self.issue,
            value: (self.value - other).max(0),
        }
    }
}

/// Fixed-point exchange quality: input per unit of output, scaled by
/// [`QUALITY_ONE`]. Lower is better.
pub fn quality_from_in_out(input: u64, output: u64) -> Option<u64> {
    big_divide_unsigned(input, QUALITY_ONE, output, Rounding::Up).ok()
}

/// Compose two qualities along a path.
pub fn compose_quality(a: u64, b: u64) -> u64 {
    big_divide_unsigned(a, b, QUALITY_ONE, Rounding::Up).unwrap_or(u64::MAX)
}

/// Output obtainable by spending `input` at `quality`.
pub fn output_at_quality(input: i64, quality: u64) -> i64 {
    if input == i64::MAX {
        return i64::MAX;
    }
    if input <= 0 || quality == 0 {
        return 0;
    }
    match big_divide_unsigned(input as u64, QUALITY_ONE, quality, Rounding::Down) {
        Ok(out) if out <= i64::MAX as u64 => out as i64,
        _ => i64::MAX,
    }
}
