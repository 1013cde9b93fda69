use super::Likelihood;
use crate::bessel::{bessel_i0e, bessel_ratio_array, bessel_ratio_complement};
use crate::probability::rectify;
use crate::quadrature::{gaussian_measure, gaussian_measure_2d, integrate};
use crate::types::{Estimate, NodeError, broadcast_shapes, broadcast_to, pair_modulus, split_pair};
use ndarray::{ArrayD, ArrayViewD, Axis, Zip, stack};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Observed modulus `y = |z|` of a complex latent `z`.
///
/// Complex arrays travel as real arrays with a leading `[re, im]` axis, so
/// `bz` and the posterior mean have shape `(2, *y.shape)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModulusLikelihood {
    y: ArrayD<f64>,
}

impl ModulusLikelihood {
    pub fn new(y: ArrayD<f64>) -> Self {
        Self { y }
    }
}

impl Likelihood for ModulusLikelihood {
    fn observation(&self) -> ArrayViewD<'_, f64> {
        self.y.view()
    }

    fn sample(
        &self,
        z: ArrayViewD<'_, f64>,
        _rng: &mut dyn RngCore,
    ) -> Result<ArrayD<f64>, NodeError> {
        pair_modulus(&z)
    }

    fn compute_backward_posterior(
        &self,
        az: ArrayViewD<'_, f64>,
        bz: ArrayViewD<'_, f64>,
        y: ArrayViewD<'_, f64>,
    ) -> Result<Estimate, NodeError> {
        let (re, im) = split_pair(&bz)?;
        let shape = broadcast_shapes(&[az.shape(), re.shape(), y.shape()])?;
        let re = broadcast_to(&re, &shape)?;
        let im = broadcast_to(&im, &shape)?;
        let y = broadcast_to(&y, &shape)?;

        let b = Zip::from(&re).and(&im).map_collect(|&re, &im| re.hypot(im));
        let by = &b * &y;
        let ratio = bessel_ratio_array(by.view());

        // |rz| = y·I(b·y) along bz/|bz|; no direction when bz = 0.
        let scale = Zip::from(&b)
            .and(&y)
            .and(&ratio)
            .map_collect(|&b, &y, &ratio| if b != 0.0 { y * ratio / b } else { 0.0 });
        let rz_re = &re * &scale;
        let rz_im = &im * &scale;
        let rz = stack(Axis(0), &[rz_re.view(), rz_im.view()])?;

        // 1 - I² = c·(2 - c) with c = 1 - I, exact as I → 1
        let v = Zip::from(&y).and(&by).map_collect(|&y, &by| {
            let c = bessel_ratio_complement(by);
            0.5 * y * y * c * (2.0 - c)
        });
        Ok(Estimate::from_variances(rz, &v))
    }

    fn beliefs_measure(&self, az: f64, tau: f64, f: &dyn Fn(&[f64], f64) -> f64) -> f64 {
        let u_eff = rectify(az * tau - 1.0);
        let sqrt_az = az.sqrt();

        if u_eff == 0.0 {
            // bz is pinned at zero; only y is random.
            log::trace!("modulus beliefs measure at saturated precision az={az} tau={tau}");
            let coef = (2.0 * PI * az).sqrt();
            return gaussian_measure(0.0, 1.0, |xi_y| {
                let y = xi_y / sqrt_az;
                coef * rectify(y) * f(&[0.0, 0.0], y)
            });
        }

        let s_eff = (az * u_eff).sqrt();
        let coef = 2.0 * PI / u_eff.sqrt();
        gaussian_measure_2d(0.0, 1.0, 0.0, 1.0, |xi_b, xi_y| {
            let b = s_eff * xi_b;
            let y = b / az + xi_y / sqrt_az;
            coef * rectify(b) * rectify(y) * bessel_i0e(b * y) * f(&[b, 0.0], y)
        })
    }

    fn measure(&self, y: f64, f: &dyn Fn(&[f64]) -> f64) -> f64 {
        integrate(
            |theta| {
                let (sin, cos) = theta.sin_cos();
                y * f(&[y * cos, y * sin])
            },
            0.0,
            2.0 * PI,
        )
    }

    fn compute_log_partition(
        &self,
        az: ArrayViewD<'_, f64>,
        bz: ArrayViewD<'_, f64>,
        y: ArrayViewD<'_, f64>,
    ) -> Result<f64, NodeError> {
        let modulus = pair_modulus(&bz)?;
        let b = modulus.view();
        let shape = broadcast_shapes(&[az.shape(), b.shape(), y.shape()])?;
        let az = broadcast_to(&az, &shape)?;
        let b = broadcast_to(&b, &shape)?;
        let y = broadcast_to(&y, &shape)?;

        let terms = Zip::from(&az).and(&b).and(&y).map_collect(|&az, &b, &y| {
            -0.5 * az * y * y + (2.0 * PI * y * bessel_i0e(b * y)).ln() + b * y
        });
        Ok(terms.sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::{arr0, array};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn likelihood() -> ModulusLikelihood {
        ModulusLikelihood::new(array![1.3, 0.0].into_dyn())
    }

    #[test]
    fn zero_modulus_gives_zero_mean() {
        let lik = likelihood();
        let az = arr0(2.0).into_dyn();
        let bz = array![[0.5, 0.5], [-1.0, 2.0]].into_dyn();
        let est = lik.backward_posterior(az.view(), bz.view()).expect("posterior");
        assert_eq!(est.r.shape(), &[2, 2]);
        assert_eq!(est.r[[0, 1]], 0.0);
        assert_eq!(est.r[[1, 1]], 0.0);
    }

    #[test]
    fn zero_message_has_no_direction() {
        let lik = likelihood();
        let az = arr0(1.0).into_dyn();
        let bz = array![[0.0, 0.0], [0.0, 0.0]].into_dyn();
        let est = lik.backward_posterior(az.view(), bz.view()).expect("posterior");
        assert!(est.r.iter().all(|&r| r == 0.0));
        // uniform phase: E|z|² = y², split evenly between components
        assert_relative_eq!(est.v, 0.25 * 1.3 * 1.3, epsilon = 1e-15);
    }

    #[test]
    fn backward_posterior_rejects_real_messages() {
        let lik = likelihood();
        let az = arr0(1.0).into_dyn();
        let bz = array![1.0, 2.0, 3.0].into_dyn();
        assert!(matches!(
            lik.backward_posterior(az.view(), bz.view()),
            Err(NodeError::NotComplexPair { .. })
        ));
    }

    #[test]
    fn posterior_matches_phase_average() {
        let lik = likelihood();
        let y = 1.3;
        let (b_re, b_im) = (0.9, -1.6);
        let b = f64::hypot(b_re, b_im);
        // exp(bz·z) on the circle, scaled by exp(-b·y)
        let weight = |z: &[f64]| (b_re * z[0] + b_im * z[1] - b * y).exp();
        let norm = lik.measure(y, &|z| weight(z));
        let m_re = lik.measure(y, &|z| z[0] * weight(z)) / norm;
        let m_im = lik.measure(y, &|z| z[1] * weight(z)) / norm;
        let second = lik.measure(y, &|z| z[0] * z[0] * weight(z)) / norm;
        let second_im = lik.measure(y, &|z| z[1] * z[1] * weight(z)) / norm;

        let az = arr0(1.0).into_dyn();
        let bz = array![b_re, b_im].into_dyn();
        let y_a = arr0(y).into_dyn();
        let est = lik
            .compute_backward_posterior(az.view(), bz.view(), y_a.view())
            .expect("posterior");
        assert_abs_diff_eq!(est.r[[0]], m_re, epsilon = 1e-9);
        assert_abs_diff_eq!(est.r[[1]], m_im, epsilon = 1e-9);
        // the reported variance is the per-component average
        let avg_var = 0.5 * (second + second_im - m_re * m_re - m_im * m_im);
        assert_abs_diff_eq!(est.v, avg_var, epsilon = 1e-9);
    }

    #[test]
    fn variance_stays_relatively_accurate_for_sharp_phases() {
        // b·y = 1e4: 1 - I² = 1.000000001250250e-4 to sixteen digits
        let y = 2.0;
        let lik = ModulusLikelihood::new(arr0(y).into_dyn());
        let az = arr0(1.0).into_dyn();
        let bz = array![3e3, -4e3].into_dyn();
        let est = lik.backward_posterior(az.view(), bz.view()).expect("posterior");
        let expected = 0.5 * y * y * 1.000_000_001_250_250_1e-4;
        assert_relative_eq!(est.v, expected, max_relative = 1e-12);
        let ratio = 1.0 - 5.000_125_012_501_953_5e-5;
        assert_relative_eq!(est.r[[0]], 0.6 * y * ratio, max_relative = 1e-13);
        assert_relative_eq!(est.r[[1]], -0.8 * y * ratio, max_relative = 1e-13);
    }

    #[test]
    fn log_partition_derivative_is_the_posterior_mean() {
        let lik = ModulusLikelihood::new(array![1.3].into_dyn());
        let az = arr0(1.5).into_dyn();
        let bz = array![[0.6], [-0.8]].into_dyn();
        let est = lik.backward_posterior(az.view(), bz.view()).expect("posterior");
        let h = 1e-5;
        for c in 0..2 {
            let mut up = bz.clone();
            let mut down = bz.clone();
            up[[c, 0]] += h;
            down[[c, 0]] -= h;
            let z_up = lik
                .compute_log_partition(az.view(), up.view(), lik.observation())
                .expect("logZ");
            let z_down = lik
                .compute_log_partition(az.view(), down.view(), lik.observation())
                .expect("logZ");
            assert_abs_diff_eq!((z_up - z_down) / (2.0 * h), est.r[[c, 0]], epsilon = 1e-8);
        }
    }

    #[test]
    fn log_partition_matches_circle_integral() {
        let lik = likelihood();
        let (az, y) = (2.0, 0.8);
        let (b_re, b_im) = (0.3, 0.4);
        let direct = lik
            .measure(y, &|z| (-0.5 * az * y * y + b_re * z[0] + b_im * z[1]).exp())
            .ln();
        let log_z = lik
            .compute_log_partition(
                arr0(az).into_dyn().view(),
                array![b_re, b_im].into_dyn().view(),
                arr0(y).into_dyn().view(),
            )
            .expect("logZ");
        assert_relative_eq!(log_z, direct, max_relative = 1e-6);
    }

    #[test]
    fn beliefs_measure_is_normalized_in_both_regimes() {
        let lik = likelihood();
        // u_eff > 0
        assert_abs_diff_eq!(lik.beliefs_measure(2.0, 1.0, &|_, _| 1.0), 1.0, epsilon = 1e-5);
        // u_eff = 0 exactly
        assert_abs_diff_eq!(lik.beliefs_measure(1.0, 1.0, &|_, _| 1.0), 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(lik.beliefs_measure(0.5, 1.0, &|_, _| 1.0), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn beliefs_measure_moments() {
        let lik = likelihood();
        let (az, tau) = (2.0, 1.5);
        // E[y²] = E|z|² = 2τ
        let y2 = lik.beliefs_measure(az, tau, &|_, y| y * y);
        assert_relative_eq!(y2, 2.0 * tau, max_relative = 1e-5);
        // E|bz|² = 2·az·(az·τ - 1)
        let b2 = lik.beliefs_measure(az, tau, &|bz, _| bz[0] * bz[0] + bz[1] * bz[1]);
        assert_relative_eq!(b2, 2.0 * az * (az * tau - 1.0), max_relative = 1e-5);
        // saturated regime: E[y²] = 2/az
        let y2_sat = lik.beliefs_measure(1.0, 1.0, &|_, y| y * y);
        assert_relative_eq!(y2_sat, 2.0, max_relative = 1e-5);
    }

    #[test]
    fn measure_covers_the_circle() {
        let lik = likelihood();
        assert_relative_eq!(lik.measure(1.3, &|_| 1.0), 2.0 * PI * 1.3, epsilon = 1e-10);
        assert_abs_diff_eq!(lik.measure(1.3, &|z| z[0]), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn sample_returns_the_modulus() {
        let mut rng = StdRng::seed_from_u64(5);
        let z = array![[3.0, 0.0], [-4.0, -2.5]].into_dyn();
        let y = likelihood().sample(z.view(), &mut rng).expect("sample");
        assert_relative_eq!(y[[0]], 5.0);
        assert_relative_eq!(y[[1]], 2.5);
    }
}
