use crate::CoreError;

/// Floating point type used throughout the simulator.
pub type Real = f64;

/// Tolerance pair used for float comparisons.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

impl Tolerances {
    /// Tolerance used for composition sums.
    pub const FRACTION: Tolerances = Tolerances {
        abs: 1e-6,
        rel: 0.0,
    };

    /// Loose tolerance for mass bookkeeping in kg.
    pub const MASS: Tolerances = Tolerances {
        abs: 1e-6,
        rel: 1e-12,
    };
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Finite and `>= 0`.
pub fn ensure_non_negative(v: Real, what: &'static str) -> Result<Real, CoreError> {
    let v = ensure_finite(v, what)?;
    if v < 0.0 {
        return Err(CoreError::Negative { what, value: v });
    }
    Ok(v)
}

/// Clamp tiny negative round-off to zero. NaN passes through untouched so
/// callers can still detect it with [`ensure_finite`].
#[inline]
pub fn clamp_non_negative(v: Real) -> Real {
    if v < 0.0 { 0.0 } else { v }
}
