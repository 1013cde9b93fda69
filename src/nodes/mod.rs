//! Node contract for message passing.
//!
//! A node is an immutable configuration object. The scheduler hands it the
//! current Gaussian messages `(a, b)` on its edges and gets back a posterior
//! [`Estimate`]; nodes never talk to each other.
//!
//! Three roles exist, each with its own trait:
//!
//! - [`Prior`]: source of a variable `x`; sees the message `(ax, bx)`.
//! - [`Channel`]: links `z` to `x`; sees `(az, bz)` and `(ax, bx)`.
//! - [`Likelihood`]: holds an observation `y` of `z`; sees `(az, bz)`.
//!
//! Measure functions are borrowed for the duration of one call. Likelihood
//! measures receive the latent message as a slice: length 1 for a real
//! variable, `[re, im]` for a complex one.

mod gaussian_prior;
mod modulus_likelihood;
mod sign_channel;
mod sign_likelihood;

pub use gaussian_prior::GaussianPrior;
pub use modulus_likelihood::ModulusLikelihood;
pub use sign_channel::SignChannel;
pub use sign_likelihood::{DEFAULT_MEASURE_EXTENT, SignLikelihood};

use crate::types::{Estimate, NodeError};
use ndarray::{ArrayD, ArrayViewD};
use rand::RngCore;

pub trait Prior {
    /// Shape of the variable drawn by [`Prior::sample`].
    fn shape(&self) -> &[usize];

    fn sample(&self, rng: &mut dyn RngCore) -> Result<ArrayD<f64>, NodeError>;

    /// Second moment of the prior law.
    fn second_moment(&self) -> f64;

    fn compute_forward_posterior(
        &self,
        ax: ArrayViewD<'_, f64>,
        bx: ArrayViewD<'_, f64>,
    ) -> Result<Estimate, NodeError>;

    /// `E[f(bx, x)]` with `x` from the prior and `bx | x ~ N(ax·x, ax)`.
    fn beliefs_measure(&self, ax: f64, f: &dyn Fn(f64, f64) -> f64) -> Result<f64, NodeError>;

    /// `E[f(x)]` under the prior.
    fn measure(&self, f: &dyn Fn(f64) -> f64) -> f64;

    fn compute_log_partition(
        &self,
        ax: ArrayViewD<'_, f64>,
        bx: ArrayViewD<'_, f64>,
    ) -> Result<f64, NodeError>;

    fn compute_mutual_information(&self, ax: f64) -> f64;

    fn compute_free_energy(&self, ax: f64) -> f64 {
        0.5 * ax * self.second_moment() - self.compute_mutual_information(ax)
    }
}

pub trait Channel {
    fn sample(&self, z: ArrayViewD<'_, f64>, rng: &mut dyn RngCore) -> ArrayD<f64>;

    /// Second moment of `x` given the second moment `tau` of `z`.
    fn second_moment(&self, tau: f64) -> f64;

    /// Estimate of the downstream variable `x`.
    fn compute_forward_posterior(
        &self,
        az: ArrayViewD<'_, f64>,
        bz: ArrayViewD<'_, f64>,
        ax: ArrayViewD<'_, f64>,
        bx: ArrayViewD<'_, f64>,
    ) -> Result<Estimate, NodeError>;

    /// Estimate of the upstream variable `z`.
    fn compute_backward_posterior(
        &self,
        az: ArrayViewD<'_, f64>,
        bz: ArrayViewD<'_, f64>,
        ax: ArrayViewD<'_, f64>,
        bx: ArrayViewD<'_, f64>,
    ) -> Result<Estimate, NodeError>;

    /// `E[f(bz, bx)]` under the state-evolution law at precisions `az`, `ax`
    /// and second moment `tau`.
    fn beliefs_measure(&self, az: f64, ax: f64, tau: f64, f: &dyn Fn(f64, f64) -> f64) -> f64;

    /// `∫ f(z, x(z)) dz` over `[zmin, zmax]`.
    fn measure(&self, f: &dyn Fn(f64, f64) -> f64, zmin: f64, zmax: f64) -> f64;
}

pub trait Likelihood {
    fn observation(&self) -> ArrayViewD<'_, f64>;

    fn sample(&self, z: ArrayViewD<'_, f64>, rng: &mut dyn RngCore)
    -> Result<ArrayD<f64>, NodeError>;

    fn compute_backward_posterior(
        &self,
        az: ArrayViewD<'_, f64>,
        bz: ArrayViewD<'_, f64>,
        y: ArrayViewD<'_, f64>,
    ) -> Result<Estimate, NodeError>;

    /// Backward posterior against the stored observation.
    fn backward_posterior(
        &self,
        az: ArrayViewD<'_, f64>,
        bz: ArrayViewD<'_, f64>,
    ) -> Result<Estimate, NodeError> {
        self.compute_backward_posterior(az, bz, self.observation())
    }

    /// `E[f(bz, y)]` under the state-evolution law at precision `az` and
    /// second moment `tau`.
    fn beliefs_measure(&self, az: f64, tau: f64, f: &dyn Fn(&[f64], f64) -> f64) -> f64;

    /// Integral of `f(z)` over the latent values compatible with `y`.
    fn measure(&self, y: f64, f: &dyn Fn(&[f64]) -> f64) -> f64;

    fn compute_log_partition(
        &self,
        az: ArrayViewD<'_, f64>,
        bz: ArrayViewD<'_, f64>,
        y: ArrayViewD<'_, f64>,
    ) -> Result<f64, NodeError>;
}
