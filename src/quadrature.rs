//! Gaussian-measure integration
//!
//! Every expectation the nodes need reduces to one of
//!
//! - `E[f(X)]`, `X ~ N(m, s²)`
//! - `E[f(X₁, X₂)]` with independent Gaussian coordinates
//! - `E[f(X₁, X₂)]` with a full 2×2 covariance
//!
//! All three are evaluated in standardized coordinates: the integration
//! variable `u` ranges over `[-T, T]` (`T = 10` standard deviations by
//! default), is weighted by the standard normal density, and is mapped back
//! through `x = m + s·u` (or `x = L·u + m` with `L·Lᵀ = Σ`) before `f` is
//! called. Truncating at 10σ drops mass below `1e-23`, far under the
//! quadrature tolerance.
//!
//! # Implementation
//!
//! Globally adaptive Gauss-Kronrod (7-point Gauss embedded in a 15-point
//! Kronrod rule). The segment with the largest error estimate is bisected
//! until the summed error is below `max(abs_tol, rel_tol·|I|)` or the
//! subinterval budget is exhausted. The scheme is deterministic: identical
//! inputs always visit identical nodes.
//!
//! Two-dimensional measures are iterated one-dimensional integrals (outer
//! over the first coordinate), so integrands with kinks or jumps along either
//! axis (`rectify`, `sign`) are handled by the same bisection.
//!
//! A standard deviation of zero is valid and collapses the corresponding
//! coordinate to its mean; callers rely on this for saturated effective
//! noise.

use crate::linalg::faer_ndarray::{FaerCholesky, FaerLinalgError};
use crate::probability::normal_pdf;
use ndarray::{ArrayBase, Data, Ix2};
use serde::{Deserialize, Serialize};

/// Kronrod abscissae on `[0, 1]`; odd indices are the embedded Gauss nodes,
/// the last entry is the centre.
const XGK: [f64; 8] = [
    0.991_455_371_120_812_6,
    0.949_107_912_342_758_5,
    0.864_864_423_359_769_1,
    0.741_531_185_599_394_4,
    0.586_087_235_467_691_1,
    0.405_845_151_377_397_2,
    0.207_784_955_007_898_5,
    0.0,
];

const WGK: [f64; 8] = [
    0.022_935_322_010_529_22,
    0.063_092_092_629_978_55,
    0.104_790_010_322_250_2,
    0.140_653_259_715_525_9,
    0.169_004_726_639_267_9,
    0.190_350_578_064_785_4,
    0.204_432_940_075_298_9,
    0.209_482_141_084_727_8,
];

/// Gauss weights for `XGK[1]`, `XGK[3]`, `XGK[5]` and the centre.
const WG: [f64; 4] = [
    0.129_484_966_168_869_7,
    0.279_705_391_489_276_7,
    0.381_830_050_505_118_9,
    0.417_959_183_673_469_4,
];

pub const DEFAULT_TRUNCATION: f64 = 10.0;

pub fn default_abs_tol() -> f64 {
    1.49e-8
}

pub fn default_rel_tol() -> f64 {
    1.49e-8
}

pub fn default_max_subintervals() -> usize {
    50
}

pub fn default_truncation() -> f64 {
    DEFAULT_TRUNCATION
}

/// Tolerances and truncation of the adaptive quadrature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadratureConfig {
    #[serde(default = "default_abs_tol")]
    pub abs_tol: f64,
    #[serde(default = "default_rel_tol")]
    pub rel_tol: f64,
    /// Upper bound on the number of segments of one 1D integral.
    #[serde(default = "default_max_subintervals")]
    pub max_subintervals: usize,
    /// Half-width of the standardized integration range, in standard deviations.
    #[serde(default = "default_truncation")]
    pub truncation: f64,
}

impl Default for QuadratureConfig {
    fn default() -> Self {
        Self {
            abs_tol: default_abs_tol(),
            rel_tol: default_rel_tol(),
            max_subintervals: default_max_subintervals(),
            truncation: default_truncation(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Segment {
    a: f64,
    b: f64,
    integral: f64,
    error: f64,
}

fn gauss_kronrod_15<F: Fn(f64) -> f64>(f: &F, a: f64, b: f64) -> Segment {
    let center = 0.5 * (a + b);
    let half = 0.5 * (b - a);

    let fc = f(center);
    let mut kronrod = WGK[7] * fc;
    let mut gauss = WG[3] * fc;
    for j in 0..7 {
        let dx = half * XGK[j];
        let pair = f(center - dx) + f(center + dx);
        kronrod += WGK[j] * pair;
        if j % 2 == 1 {
            gauss += WG[j / 2] * pair;
        }
    }

    Segment {
        a,
        b,
        integral: kronrod * half,
        error: ((kronrod - gauss) * half).abs(),
    }
}

fn adaptive<F: Fn(f64) -> f64>(f: &F, a: f64, b: f64, config: &QuadratureConfig) -> f64 {
    let mut segments = vec![gauss_kronrod_15(f, a, b)];
    loop {
        let (integral, error) = segments
            .iter()
            .fold((0.0, 0.0), |(i, e), s| (i + s.integral, e + s.error));
        let tolerance = config.abs_tol.max(config.rel_tol * integral.abs());
        // Negated comparison so a NaN error estimate terminates as well.
        if !(error > tolerance) {
            return integral;
        }
        if segments.len() >= config.max_subintervals.max(1) {
            log::debug!(
                "quadrature on [{a}, {b}] stopped at {} subintervals (error {error:.3e} > tolerance {tolerance:.3e})",
                segments.len()
            );
            return integral;
        }

        let worst = segments
            .iter()
            .enumerate()
            .fold(0usize, |best, (idx, s)| {
                if s.error > segments[best].error { idx } else { best }
            });
        let seg = segments.swap_remove(worst);
        let mid = 0.5 * (seg.a + seg.b);
        segments.push(gauss_kronrod_15(f, seg.a, mid));
        segments.push(gauss_kronrod_15(f, mid, seg.b));
    }
}

/// Adaptive integral of `f` over `[a, b]`.
///
/// Either bound may be infinite. A half line `[a, ∞)` is mapped onto `[0, 1)`
/// through `x = a + t/(1-t)`, the whole line onto `(-1, 1)` through
/// `x = t/(1-t²)`. Kronrod nodes never touch the ends of the mapped range, so
/// `f` is only ever called at finite points.
pub fn integrate_with<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, config: &QuadratureConfig) -> f64 {
    if a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    if a == b {
        return 0.0;
    }
    if a > b {
        return -integrate_with(f, b, a, config);
    }
    match (a.is_finite(), b.is_finite()) {
        (true, true) => adaptive(&f, a, b, config),
        (true, false) => {
            let g = |t: f64| {
                let d = 1.0 - t;
                f(a + t / d) / (d * d)
            };
            adaptive(&g, 0.0, 1.0, config)
        }
        (false, true) => {
            let g = |t: f64| {
                let d = 1.0 - t;
                f(b - t / d) / (d * d)
            };
            adaptive(&g, 0.0, 1.0, config)
        }
        (false, false) => {
            let g = |t: f64| {
                let d = 1.0 - t * t;
                f(t / d) * (1.0 + t * t) / (d * d)
            };
            adaptive(&g, -1.0, 1.0, config)
        }
    }
}

/// Adaptive integral of `f` over `[a, b]` with default tolerances.
pub fn integrate<F: Fn(f64) -> f64>(f: F, a: f64, b: f64) -> f64 {
    integrate_with(f, a, b, &QuadratureConfig::default())
}

/// `∫ N(x | m, s²) f(x) dx`.
pub fn gaussian_measure<F: Fn(f64) -> f64>(m: f64, s: f64, f: F) -> f64 {
    gaussian_measure_with(m, s, f, &QuadratureConfig::default())
}

pub fn gaussian_measure_with<F: Fn(f64) -> f64>(
    m: f64,
    s: f64,
    f: F,
    config: &QuadratureConfig,
) -> f64 {
    let t = config.truncation;
    integrate_with(|u| normal_pdf(u) * f(m + s * u), -t, t, config)
}

/// `∫∫ N(x₁ | m1, s1²) N(x₂ | m2, s2²) f(x₁, x₂) dx₁ dx₂`.
pub fn gaussian_measure_2d<F: Fn(f64, f64) -> f64>(
    m1: f64,
    s1: f64,
    m2: f64,
    s2: f64,
    f: F,
) -> f64 {
    gaussian_measure_2d_with(m1, s1, m2, s2, f, &QuadratureConfig::default())
}

pub fn gaussian_measure_2d_with<F: Fn(f64, f64) -> f64>(
    m1: f64,
    s1: f64,
    m2: f64,
    s2: f64,
    f: F,
    config: &QuadratureConfig,
) -> f64 {
    let t = config.truncation;
    let outer = |u1: f64| {
        let x1 = m1 + s1 * u1;
        let inner = integrate_with(|u2| normal_pdf(u2) * f(x1, m2 + s2 * u2), -t, t, config);
        normal_pdf(u1) * inner
    };
    integrate_with(outer, -t, t, config)
}

/// `∫ N(x | mean, cov) f(x₁, x₂) dx` for a jointly Gaussian 2-vector.
///
/// Fails when `cov` is not a positive-definite 2×2 matrix.
pub fn gaussian_measure_2d_full<S, F>(
    cov: &ArrayBase<S, Ix2>,
    mean: [f64; 2],
    f: F,
) -> Result<f64, FaerLinalgError>
where
    S: Data<Elem = f64>,
    F: Fn(f64, f64) -> f64,
{
    gaussian_measure_2d_full_with(cov, mean, f, &QuadratureConfig::default())
}

pub fn gaussian_measure_2d_full_with<S, F>(
    cov: &ArrayBase<S, Ix2>,
    mean: [f64; 2],
    f: F,
    config: &QuadratureConfig,
) -> Result<f64, FaerLinalgError>
where
    S: Data<Elem = f64>,
    F: Fn(f64, f64) -> f64,
{
    let (rows, cols) = cov.dim();
    if rows != 2 || cols != 2 {
        return Err(FaerLinalgError::InvalidShape { rows, cols });
    }
    let l = cov.cholesky_lower()?;
    let (l00, l10, l11) = (l[[0, 0]], l[[1, 0]], l[[1, 1]]);

    let t = config.truncation;
    let outer = |u1: f64| {
        let y1 = l00 * u1 + mean[0];
        let inner = integrate_with(
            |u2| normal_pdf(u2) * f(y1, l10 * u1 + l11 * u2 + mean[1]),
            -t,
            t,
            config,
        );
        normal_pdf(u1) * inner
    };
    Ok(integrate_with(outer, -t, t, config))
}
