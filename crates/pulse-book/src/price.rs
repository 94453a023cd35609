//! Fixed-point price arithmetic.
//!
//! Prices are signed 64-bit integers in units of 10⁻⁴ of the display
//! currency: `Price(1_500_000)` is $150.0000. Integer arithmetic keeps the
//! book deterministic; floats appear only in derived analytics.

use core::fmt;
use core::ops::{Add, Sub};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Price(pub i64);

impl Price {
    /// Ticks per display-currency unit.
    pub const SCALE: i64 = 10_000;

    pub const ZERO: Self = Self(0);

    #[inline(always)]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    #[inline(always)]
    pub const fn as_raw(self) -> i64 {
        self.0
    }

    #[inline(always)]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Display-currency value. Analytics only, never book state.
    #[inline(always)]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }
}

impl Add for Price {
    type Output = Self;

    #[inline(always)]
    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sub for Price {
    type Output = Self;

    #[inline(always)]
    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.to_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_scale() {
        assert_eq!(Price(1_500_000).to_f64(), 150.0);
        assert_eq!(Price(1_500_050).to_f64(), 150.005);
        assert_eq!(Price(1_500_000).to_string(), "150.0000");
    }

    #[test]
    fn ordering_is_raw_ordering() {
        assert!(Price(1_500_100) > Price(1_500_000));
        assert!(Price(-1) < Price::ZERO);
    }

    #[test]
    fn arithmetic() {
        assert_eq!(Price(1_500_100) - Price(1_500_000), Price(100));
        assert_eq!(Price(100) + Price(50), Price(150));
    }
}
