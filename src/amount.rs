//! Fixed-point money types
//!
//! Stakes and rewards are held as integer base units (six fractional digits)
//! so that every observer of a settlement computes the exact same figure.
//! Multipliers are basis points and performance is an exact rational, which
//! keeps the reward formula free of binary floating point.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

/// Base units per whole token.
pub const PRECISION: i128 = 1_000_000;
/// Fractional digits carried by [`Amount`].
pub const DECIMALS: usize = 6;
/// Basis points per 1.0x.
pub const BPS_SCALE: u32 = 10_000;

/// Errors raised while parsing amounts and multipliers from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountParseError {
    #[error("empty amount")]
    Empty,

    #[error("invalid amount '{0}'")]
    Invalid(String),

    #[error("'{value}' has more than {max} fractional digits")]
    TooPrecise { value: String, max: usize },

    #[error("amount '{0}' is out of range")]
    Overflow(String),
}

/// Signed token amount in base units.
///
/// Signed so that `net_gain` can go below zero without a second type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_units(units: i128) -> Self {
        Self(units)
    }

    pub const fn units(self) -> i128 {
        self.0
    }

    pub fn from_whole(whole: i64) -> Self {
        Self(whole as i128 * PRECISION)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// `self × numerator / denominator`, truncated toward zero.
    pub fn checked_mul_div(self, numerator: u128, denominator: u128) -> Option<Amount> {
        if denominator == 0 {
            return None;
        }
        let magnitude = self.0.unsigned_abs().checked_mul(numerator)?.checked_div(denominator)?;
        let magnitude = i128::try_from(magnitude).ok()?;
        Some(Amount(if self.0 < 0 { -magnitude } else { magnitude }))
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let scale = PRECISION as u128;
        let whole = magnitude / scale;
        let frac = magnitude % scale;
        if frac == 0 {
            return write!(f, "{}{}", sign, whole);
        }
        let digits = format!("{:0width$}", frac, width = DECIMALS);
        write!(f, "{}{}.{}", sign, whole, digits.trim_end_matches('0'))
    }
}

/// Parses `[-]whole[.fraction]` into base units scaled by `10^decimals`.
fn parse_fixed(s: &str, decimals: usize) -> Result<i128, AmountParseError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(AmountParseError::Empty);
    }
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (whole, frac) = match body.split_once('.') {
        Some((w, f)) => (w, f),
        None => (body, ""),
    };
    let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
        return Err(AmountParseError::Invalid(s.to_string()));
    }
    if frac.len() > decimals {
        return Err(AmountParseError::TooPrecise {
            value: s.to_string(),
            max: decimals,
        });
    }

    let overflow = || AmountParseError::Overflow(s.to_string());
    let scale = 10_i128.pow(decimals as u32);
    let whole_units = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<i128>()
            .map_err(|_| overflow())?
            .checked_mul(scale)
            .ok_or_else(overflow)?
    };
    let frac_units = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = decimals);
        padded.parse::<i128>().map_err(|_| overflow())?
    };
    let units = whole_units.checked_add(frac_units).ok_or_else(overflow)?;
    Ok(if negative { -units } else { units })
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed(s, DECIMALS).map(Amount)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Payout scalar in basis points (`1.5x == 15_000`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Multiplier(u32);

impl Multiplier {
    pub const ONE: Multiplier = Multiplier(BPS_SCALE);

    pub const fn from_bps(bps: u32) -> Self {
        Self(bps)
    }

    pub const fn bps(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / BPS_SCALE;
        let frac = self.0 % BPS_SCALE;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let digits = format!("{:04}", frac);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

impl FromStr for Multiplier {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bps = parse_fixed(s, 4)?;
        u32::try_from(bps)
            .map(Multiplier)
            .map_err(|_| AmountParseError::Overflow(s.to_string()))
    }
}

impl Serialize for Multiplier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Multiplier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Normalised performance as the exact fraction `achieved / target`.
///
/// Values above the target are kept so callers can display them, but
/// [`PerformanceRatio::clamped`] caps the fraction at one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceRatio {
    pub achieved: u64,
    pub target: u64,
}

impl PerformanceRatio {
    pub const ZERO: PerformanceRatio = PerformanceRatio { achieved: 0, target: 1 };
    pub const FULL: PerformanceRatio = PerformanceRatio { achieved: 1, target: 1 };

    pub fn new(achieved: u64, target: u64) -> Self {
        Self { achieved, target }
    }

    /// Fraction limited to `[0, 1]`; a zero target counts as no performance.
    pub fn clamped(self) -> (u64, u64) {
        if self.target == 0 {
            return (0, 1);
        }
        (self.achieved.min(self.target), self.target)
    }

    pub fn is_zero(self) -> bool {
        self.clamped().0 == 0
    }

    pub fn is_full(self) -> bool {
        let (num, den) = self.clamped();
        num == den
    }

    /// Compares the clamped fractions by cross-multiplication.
    pub fn cmp_clamped(&self, other: &PerformanceRatio) -> Ordering {
        let (a, b) = self.clamped();
        let (c, d) = other.clamped();
        (a as u128 * d as u128).cmp(&(c as u128 * b as u128))
    }

    /// Lossy view for display only.
    pub fn as_f64(self) -> f64 {
        let (num, den) = self.clamped();
        num as f64 / den as f64
    }
}
