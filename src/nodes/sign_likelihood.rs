use super::Likelihood;
use crate::probability::{normal_cdf, phi_0, phi_1, phi_2, rectify, sign};
use crate::quadrature::{gaussian_measure, integrate};
use crate::types::{Estimate, NodeError, broadcast_shapes, broadcast_to};
use ndarray::{ArrayD, ArrayViewD, Zip};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Half-line length used by [`Likelihood::measure`] for the sign likelihood.
pub const DEFAULT_MEASURE_EXTENT: f64 = 10.0;

/// Observed sign `y = sign(z)`, one entry of `±1` per coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignLikelihood {
    y: ArrayD<f64>,
}

impl SignLikelihood {
    pub fn new(y: ArrayD<f64>) -> Self {
        Self { y }
    }

    /// `∫ f(z) dz` over `[0, extent]` when `y > 0`, `[-extent, 0]` otherwise.
    pub fn measure_within(&self, y: f64, f: &dyn Fn(&[f64]) -> f64, extent: f64) -> f64 {
        if y > 0.0 {
            integrate(|z| f(&[z]), 0.0, extent)
        } else {
            integrate(|z| f(&[z]), -extent, 0.0)
        }
    }
}

impl Likelihood for SignLikelihood {
    fn observation(&self) -> ArrayViewD<'_, f64> {
        self.y.view()
    }

    fn sample(
        &self,
        z: ArrayViewD<'_, f64>,
        _rng: &mut dyn RngCore,
    ) -> Result<ArrayD<f64>, NodeError> {
        Ok(z.mapv(sign))
    }

    fn compute_backward_posterior(
        &self,
        az: ArrayViewD<'_, f64>,
        bz: ArrayViewD<'_, f64>,
        y: ArrayViewD<'_, f64>,
    ) -> Result<Estimate, NodeError> {
        let shape = broadcast_shapes(&[az.shape(), bz.shape(), y.shape()])?;
        let az = broadcast_to(&az, &shape)?;
        let bz = broadcast_to(&bz, &shape)?;
        let y = broadcast_to(&y, &shape)?;

        let mut rz = ArrayD::zeros(shape.clone());
        let mut v = ArrayD::zeros(shape);
        Zip::from(&mut rz)
            .and(&mut v)
            .and(&az)
            .and(&bz)
            .and(&y)
            .for_each(|rz, v, &az, &bz, &y| {
                let sqrt_az = az.sqrt();
                let t = y * bz / sqrt_az;
                *rz = phi_1(t) * y / sqrt_az;
                *v = phi_2(t) / az;
            });
        Ok(Estimate::from_variances(rz, &v))
    }

    fn beliefs_measure(&self, az: f64, tau: f64, f: &dyn Fn(&[f64], f64) -> f64) -> f64 {
        let u_eff = rectify(az * tau - 1.0);
        let s_eff = (az * u_eff).sqrt();
        let sqrt_az = az.sqrt();
        let mu_pos = gaussian_measure(0.0, s_eff, |bz| normal_cdf(bz / sqrt_az) * f(&[bz], 1.0));
        let mu_neg = gaussian_measure(0.0, s_eff, |bz| normal_cdf(-bz / sqrt_az) * f(&[bz], -1.0));
        mu_pos + mu_neg
    }

    fn measure(&self, y: f64, f: &dyn Fn(&[f64]) -> f64) -> f64 {
        self.measure_within(y, f, DEFAULT_MEASURE_EXTENT)
    }

    fn compute_log_partition(
        &self,
        az: ArrayViewD<'_, f64>,
        bz: ArrayViewD<'_, f64>,
        y: ArrayViewD<'_, f64>,
    ) -> Result<f64, NodeError> {
        let shape = broadcast_shapes(&[az.shape(), bz.shape(), y.shape()])?;
        let az = broadcast_to(&az, &shape)?;
        let bz = broadcast_to(&bz, &shape)?;
        let y = broadcast_to(&y, &shape)?;

        let terms = Zip::from(&az).and(&bz).and(&y).map_collect(|&az, &bz, &y| {
            phi_0(y * bz / az.sqrt()) + 0.5 * (2.0 * std::f64::consts::PI / az).ln()
        });
        Ok(terms.sum())
    }
}
