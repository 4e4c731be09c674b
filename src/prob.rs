//! Log-domain wrapper for reported densities.
//!
//! The DP itself runs in ordinary floating point; only the final value handed
//! to the caller is wrapped, so that an MCMC driver can form acceptance ratios
//! by subtraction.

use std::fmt;

/// A non-negative value stored as its natural logarithm.
///
/// Unlike a probability, a density may exceed one, so any value in
/// `[0, +inf)` is representable. Zero maps to negative infinity.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct LogDouble(f64);

impl LogDouble {
    /// Wraps a plain value. Negative and NaN inputs are treated as zero.
    pub fn from_value(value: f64) -> Self {
        if value > 0.0 {
            Self(value.ln())
        } else {
            Self(f64::NEG_INFINITY)
        }
    }

    /// Wraps a value that is already a natural logarithm.
    pub const fn from_ln(ln: f64) -> Self {
        Self(ln)
    }

    /// The natural logarithm.
    pub fn ln(self) -> f64 {
        self.0
    }

    /// Back to linear scale; may underflow to zero.
    pub fn value(self) -> f64 {
        self.0.exp()
    }

    pub fn is_zero(self) -> bool {
        self.0 == f64::NEG_INFINITY
    }

    /// Product in linear space.
    pub fn mul(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }

    /// Quotient in linear space, e.g. a Metropolis-Hastings ratio.
    pub fn div(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl fmt::Display for LogDouble {
    /// Prints the logarithm, which is what sample files record.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
