use super::Channel;
use crate::probability::{normal_cdf, phi_1, phi_2, rectify, sigmoid, sign};
use crate::quadrature::{gaussian_measure_2d, integrate};
use crate::types::{Estimate, NodeError, broadcast_shapes, broadcast_to};
use ndarray::{ArrayD, ArrayViewD, Zip};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Deterministic channel `x = sign(z)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignChannel;

impl SignChannel {
    pub fn new() -> Self {
        Self
    }
}

/// Log-odds `log(Φ(t)/Φ(-t))` of the two half lines at `t = bz/√az`.
#[inline]
fn half_line_log_odds(t: f64) -> f64 {
    (normal_cdf(t) / normal_cdf(-t)).ln()
}

impl Channel for SignChannel {
    fn sample(&self, z: ArrayViewD<'_, f64>, _rng: &mut dyn RngCore) -> ArrayD<f64> {
        z.mapv(sign)
    }

    fn second_moment(&self, _tau: f64) -> f64 {
        1.0
    }

    fn compute_forward_posterior(
        &self,
        az: ArrayViewD<'_, f64>,
        bz: ArrayViewD<'_, f64>,
        ax: ArrayViewD<'_, f64>,
        bx: ArrayViewD<'_, f64>,
    ) -> Result<Estimate, NodeError> {
        let shape = broadcast_shapes(&[az.shape(), bz.shape(), ax.shape(), bx.shape()])?;
        let az = broadcast_to(&az, &shape)?;
        let bz = broadcast_to(&bz, &shape)?;
        let bx = broadcast_to(&bx, &shape)?;

        let rx = Zip::from(&az).and(&bz).and(&bx).map_collect(|&az, &bz, &bx| {
            let eta = bx + 0.5 * half_line_log_odds(bz / az.sqrt());
            eta.tanh()
        });
        let v = rx.mapv(|r| 1.0 - r * r);
        Ok(Estimate::from_variances(rx, &v))
    }

    fn compute_backward_posterior(
        &self,
        az: ArrayViewD<'_, f64>,
        bz: ArrayViewD<'_, f64>,
        ax: ArrayViewD<'_, f64>,
        bx: ArrayViewD<'_, f64>,
    ) -> Result<Estimate, NodeError> {
        let shape = broadcast_shapes(&[az.shape(), bz.shape(), ax.shape(), bx.shape()])?;
        let az = broadcast_to(&az, &shape)?;
        let bz = broadcast_to(&bz, &shape)?;
        let bx = broadcast_to(&bx, &shape)?;

        let mut rz = ArrayD::zeros(shape.clone());
        let mut v = ArrayD::zeros(shape);
        Zip::from(&mut rz)
            .and(&mut v)
            .and(&az)
            .and(&bz)
            .and(&bx)
            .for_each(|rz, v, &az, &bz, &bx| {
                let sqrt_az = az.sqrt();
                let t = bz / sqrt_az;
                let delta = 2.0 * bx + half_line_log_odds(t);
                let (sigma_pos, sigma_neg) = (sigmoid(delta), sigmoid(-delta));
                // one-sided estimators on z > 0 and z < 0
                let r_pos = phi_1(t) / sqrt_az;
                let r_neg = -phi_1(-t) / sqrt_az;
                let v_pos = phi_2(t) / az;
                let v_neg = phi_2(-t) / az;
                let gap = r_pos - r_neg;
                *rz = sigma_pos * r_pos + sigma_neg * r_neg;
                *v = sigma_pos * sigma_neg * gap * gap + sigma_pos * v_pos + sigma_neg * v_neg;
            });
        Ok(Estimate::from_variances(rz, &v))
    }

    fn beliefs_measure(&self, az: f64, ax: f64, tau: f64, f: &dyn Fn(f64, f64) -> f64) -> f64 {
        let u_eff = rectify(az * tau - 1.0);
        let s_eff = (az * u_eff).sqrt();
        let sqrt_az = az.sqrt();
        let mu_pos = gaussian_measure_2d(0.0, s_eff, ax, ax.sqrt(), |bz, bx| {
            normal_cdf(bz / sqrt_az) * f(bz, bx)
        });
        let mu_neg = gaussian_measure_2d(0.0, s_eff, -ax, ax.sqrt(), |bz, bx| {
            normal_cdf(-bz / sqrt_az) * f(bz, bx)
        });
        mu_pos + mu_neg
    }

    fn measure(&self, f: &dyn Fn(f64, f64) -> f64, zmin: f64, zmax: f64) -> f64 {
        integrate(|z| f(z, sign(z)), zmin, zmax)
    }
}
