//! Compact proof-of-work target
//!
//! A target is stored as a 24-bit coefficient and an exponent, representing
//! `coefficient * 2^(8 * (exponent - 3))`. Arithmetic happens on the
//! expanded integer and is re-encoded afterwards.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::crypto::Hash;

/// Largest coefficient that fits the wire field
pub const MAX_COEFFICIENT: u32 = 0x00ff_ffff;

/// Largest exponent whose target still fits in 256 bits
pub const MAX_EXPONENT: u8 = 32;

/// Coefficient/exponent pair describing a 256-bit threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompactTarget {
    pub coefficient: u32,
    pub exponent: u8,
}

impl CompactTarget {
    pub const fn new(coefficient: u32, exponent: u8) -> Self {
        Self {
            coefficient,
            exponent,
        }
    }

    /// Hardest representable target (the integer 1)
    pub const fn min_target() -> Self {
        Self::new(1, 3)
    }

    /// Easiest representable target
    pub const fn max_target() -> Self {
        Self::new(MAX_COEFFICIENT, MAX_EXPONENT)
    }

    /// Expand to the integer threshold
    pub fn to_integer(&self) -> BigUint {
        let coefficient = BigUint::from(self.coefficient);
        if self.exponent >= 3 {
            coefficient << (8 * (self.exponent as usize - 3))
        } else {
            coefficient >> (8 * (3 - self.exponent as usize))
        }
    }

    /// Re-encode an integer, clamped to `[min_target, max_target]`
    pub fn from_integer(value: &BigUint) -> Self {
        let min = Self::min_target().to_integer();
        let max = Self::max_target().to_integer();
        if *value < min {
            return Self::min_target();
        }
        if *value > max {
            return Self::max_target();
        }

        let len = value.to_bytes_be().len();
        if len <= 3 {
            let coefficient = value.iter_u32_digits().next().unwrap_or(0);
            Self::new(coefficient, 3)
        } else {
            let shifted: BigUint = value >> (8 * (len - 3));
            let coefficient = shifted.iter_u32_digits().next().unwrap_or(0);
            Self::new(coefficient, len as u8)
        }
    }

    /// Whether `hash`, read as a big-endian integer, is at or below the target
    pub fn is_met_by(&self, hash: &Hash) -> bool {
        BigUint::from_bytes_be(hash.as_bytes()) <= self.to_integer()
    }

    /// Target lowered by `amount` (harder)
    pub fn lowered_by(&self, amount: u64) -> Self {
        let current = self.to_integer();
        let amount = BigUint::from(amount);
        if amount >= current {
            Self::min_target()
        } else {
            Self::from_integer(&(current - amount))
        }
    }

    /// Target raised by `amount` (easier)
    pub fn raised_by(&self, amount: u64) -> Self {
        Self::from_integer(&(self.to_integer() + BigUint::from(amount)))
    }
}

impl std::fmt::Display for CompactTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06x}e{:02x}", self.coefficient, self.exponent)
    }
}
