use statrs::function::erf::erfc;

const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
const SQRT_2PI: f64 = 2.506_628_274_631_000_7;
const FRAC_1_SQRT_PI: f64 = 0.564_189_583_547_756_3;

/// Above this argument `erfcx` switches from `exp(x²)·erfc(x)` to the
/// Laplace continued fraction.
const ERFCX_CONTINUED_FRACTION_START: f64 = 5.0;
const ERFCX_CONTINUED_FRACTION_TERMS: usize = 60;

/// Elementwise `max(0, x)`. NaN propagates.
#[inline]
pub fn rectify(x: f64) -> f64 {
    if x < 0.0 { 0.0 } else { x }
}

/// Sign with `sign(0) = 0`; NaN propagates.
#[inline]
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        x * 0.0
    }
}

/// Standard normal PDF φ(x).
#[inline]
pub fn normal_pdf(x: f64) -> f64 {
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF Φ(x).
///
/// Written as `erfc(-x/√2)/2` so that the lower tail keeps full relative
/// precision instead of cancelling against 1.
#[inline]
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Scaled complementary error function `erfcx(x) = exp(x²)·erfc(x)`.
///
/// Finite for every `x` above roughly `-26.6`; below that it overflows to
/// `+inf`, which callers rely on (`1/erfcx → 0`).
pub fn erfcx(x: f64) -> f64 {
    if x < ERFCX_CONTINUED_FRACTION_START {
        return (x * x).exp() * erfc(x);
    }
    // erfc(x) = exp(-x²)/√π · 1/(x + (1/2)/(x + 1/(x + (3/2)/(x + ...))))
    let mut tail = x;
    for k in (1..=ERFCX_CONTINUED_FRACTION_TERMS).rev() {
        tail = x + 0.5 * (k as f64) / tail;
    }
    FRAC_1_SQRT_PI / tail
}

/// `(log Φ)'(x) = φ(x)/Φ(x)`.
///
/// Evaluated as `1 / (√(2π)·erfcx(-x/√2)/2)`: the Gaussian factors cancel
/// analytically, so the ratio stays finite where φ and Φ both underflow.
#[inline]
pub fn log_normal_cdf_prime(x: f64) -> f64 {
    let d = SQRT_2PI * 0.5 * erfcx(-x / std::f64::consts::SQRT_2);
    1.0 / d
}

/// `phi_0(x) = x²/2 + log Φ(x)`.
pub fn phi_0(x: f64) -> f64 {
    if x < 0.0 {
        // x²/2 + log Φ(x) = log(erfcx(-x/√2)/2) without forming Φ(x).
        (0.5 * erfcx(-x / std::f64::consts::SQRT_2)).ln()
    } else {
        0.5 * x * x + normal_cdf(x).ln()
    }
}

/// `phi_1 = phi_0' = x + φ(x)/Φ(x)`.
#[inline]
pub fn phi_1(x: f64) -> f64 {
    x + log_normal_cdf_prime(x)
}

/// `phi_2 = phi_1' = 1 - φ/Φ·(x + φ/Φ)`.
#[inline]
pub fn phi_2(x: f64) -> f64 {
    let y = log_normal_cdf_prime(x);
    1.0 - y * (x + y)
}

/// Logistic sigmoid, clamped so `exp` never overflows.
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    let x_clamped = x.clamp(-700.0, 700.0);
    1.0 / (1.0 + f64::exp(-x_clamped))
}
