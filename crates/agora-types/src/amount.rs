use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 100% expressed in basis points
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Token amount in indivisible base units
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// `self * bps / 10000`, rounded down. Computed in u128 so it cannot overflow.
    pub fn mul_bps(&self, bps: BasisPoints) -> Self {
        let scaled = (self.0 as u128) * (bps.value() as u128) / (BPS_DENOMINATOR as u128);
        Self(scaled as u64)
    }

    /// Split into `parts` equal shares; returns (share, remainder)
    pub fn split_even(&self, parts: usize) -> (Self, Self) {
        if parts == 0 {
            return (Self::ZERO, *self);
        }
        let parts = parts as u64;
        (Self(self.0 / parts), Self(self.0 % parts))
    }

    pub fn sum<'a, I: IntoIterator<Item = &'a Amount>>(iter: I) -> Result<Self> {
        iter.into_iter().try_fold(Self::ZERO, |acc, a| {
            acc.checked_add(*a)
                .ok_or_else(|| TypesError::Overflow("amount sum".to_string()))
        })
    }
}

impl From<u64> for Amount {
    fn from(units: u64) -> Self {
        Self(units)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fraction of 10000 (1 bp = 0.01%)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct BasisPoints(u16);

impl BasisPoints {
    pub const ZERO: Self = Self(0);
    pub const FULL: Self = Self(BPS_DENOMINATOR as u16);

    pub fn new(value: u16) -> Result<Self> {
        if value as u64 > BPS_DENOMINATOR {
            return Err(TypesError::BasisPointsOutOfRange(value as u32));
        }
        Ok(Self(value))
    }

    /// For compile-time constants; panics when out of range
    pub const fn new_const(value: u16) -> Self {
        assert!(value as u64 <= BPS_DENOMINATOR, "basis points out of range");
        Self(value)
    }

    pub const fn value(&self) -> u16 {
        self.0
    }

    /// `10000 - self`
    pub fn complement(&self) -> Self {
        Self(BPS_DENOMINATOR as u16 - self.0)
    }

    /// True when `approvals / total >= self`, evaluated without division
    pub fn is_met_by(&self, approvals: u64, total: u64) -> bool {
        if total == 0 {
            return false;
        }
        (approvals as u128) * (BPS_DENOMINATOR as u128) >= (self.0 as u128) * (total as u128)
    }
}

impl TryFrom<u16> for BasisPoints {
    type Error = TypesError;

    fn try_from(value: u16) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BasisPoints> for u16 {
    fn from(bps: BasisPoints) -> Self {
        bps.0
    }
}

impl fmt::Display for BasisPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}
