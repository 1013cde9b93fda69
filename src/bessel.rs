//! Exponentially scaled modified Bessel functions of the first kind.
//!
//! `bessel_i0e(x) = exp(-|x|)·I₀(x)` and `bessel_i1e(x) = exp(-|x|)·I₁(x)`.
//!
//! # Evaluation
//!
//! Below `|x| = 20` both functions are summed from their power series
//!
//! ```text
//! I₀(x) = Σ (x²/4)ᵏ / (k!)²        I₁(x) = (x/2)·Σ (x²/4)ᵏ / (k!(k+1)!)
//! ```
//!
//! whose terms are all positive, so the sums carry full relative precision.
//! From `|x| = 20` on, the Hankel expansion
//!
//! ```text
//! √(2πx)·e⁻ˣ·I_ν(x) ~ Σ tₖ,  tₖ = tₖ₋₁·((2k-1)² - 4ν²) / (8kx),  t₀ = 1
//! ```
//!
//! is truncated at its smallest term, which is of order `e^(-2x)`. For ν = 0
//! every term is positive and for ν = 1 every term past the first is
//! negative, so `S₀ - S₁` is a sum of positive terms. That difference gives
//! `1 - I₁/I₀` without cancellation, which the modulus posterior variance
//! `1 - (I₁/I₀)²` depends on.

use ndarray::{ArrayD, ArrayViewD};

/// Beyond this argument `I₁/I₀` is returned as its limit `1`.
pub const BESSEL_RATIO_CUTOFF: f64 = 1e9;

const SERIES_LIMIT: f64 = 20.0;
const MAX_TERMS: usize = 200;

/// Unscaled `(I₀(x), I₁(x))` for `0 <= x < SERIES_LIMIT`.
fn power_series(x: f64) -> (f64, f64) {
    let q = 0.25 * x * x;
    let (mut t0, mut t1) = (1.0, 0.5 * x);
    let (mut s0, mut s1) = (t0, t1);
    for k in 1..MAX_TERMS {
        let k = k as f64;
        t0 *= q / (k * k);
        t1 *= q / (k * (k + 1.0));
        s0 += t0;
        s1 += t1;
        if t0 <= f64::EPSILON * s0 && t1 <= f64::EPSILON * s1 {
            break;
        }
    }
    (s0, s1)
}

/// Hankel sums `(S₀, S₁, S₀ - S₁)` for `x >= SERIES_LIMIT`.
fn hankel_sums(x: f64) -> (f64, f64, f64) {
    let (mut t0, mut t1) = (1.0_f64, 1.0_f64);
    let (mut s0, mut s1, mut diff) = (1.0, 1.0, 0.0);
    for k in 1..MAX_TERMS {
        let m = (2 * k - 1) as f64;
        let scale = 8.0 * k as f64 * x;
        let next0 = t0 * m * m / scale;
        let next1 = t1 * (m * m - 4.0) / scale;
        // the series is asymptotic; stop once terms start growing
        if k > 1 && next0 > t0 {
            break;
        }
        t0 = next0;
        t1 = next1;
        s0 += t0;
        s1 += t1;
        diff += t0 - t1;
        if t0 - t1 <= 0.25 * f64::EPSILON * diff {
            break;
        }
    }
    (s0, s1, diff)
}

pub fn bessel_i0e(x: f64) -> f64 {
    let ax = x.abs();
    if ax < SERIES_LIMIT {
        power_series(ax).0 * (-ax).exp()
    } else {
        hankel_sums(ax).0 / (2.0 * std::f64::consts::PI * ax).sqrt()
    }
}

pub fn bessel_i1e(x: f64) -> f64 {
    let ax = x.abs();
    let i1e = if ax < SERIES_LIMIT {
        power_series(ax).1 * (-ax).exp()
    } else {
        hankel_sums(ax).1 / (2.0 * std::f64::consts::PI * ax).sqrt()
    };
    if x < 0.0 { -i1e } else { i1e }
}

/// `I₁(r)/I₀(r)`; exactly `1` from [`BESSEL_RATIO_CUTOFF`] on.
#[inline]
pub fn bessel_ratio(r: f64) -> f64 {
    let ar = r.abs();
    let ratio = if ar >= BESSEL_RATIO_CUTOFF {
        1.0
    } else if ar < SERIES_LIMIT {
        let (i0, i1) = power_series(ar);
        i1 / i0
    } else {
        let (s0, s1, _) = hankel_sums(ar);
        s1 / s0
    };
    if r < 0.0 { -ratio } else { ratio }
}

/// `1 - I₁(r)/I₀(r)`, accurate where the ratio is close to one.
///
/// Consistent with [`bessel_ratio`]: zero from the cutoff on.
pub fn bessel_ratio_complement(r: f64) -> f64 {
    if r < 0.0 {
        return 1.0 + bessel_ratio(-r);
    }
    if r >= BESSEL_RATIO_CUTOFF {
        0.0
    } else if r < SERIES_LIMIT {
        let (i0, i1) = power_series(r);
        (i0 - i1) / i0
    } else {
        let (s0, _, diff) = hankel_sums(r);
        diff / s0
    }
}

/// Elementwise `bessel_ratio`.
pub fn bessel_ratio_array(r: ArrayViewD<'_, f64>) -> ArrayD<f64> {
    r.mapv(bessel_ratio)
}
