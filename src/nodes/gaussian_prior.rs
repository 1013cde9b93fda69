use super::Prior;
use crate::quadrature::{gaussian_measure, gaussian_measure_2d_full};
use crate::types::{Estimate, GaussianMessage, NodeError, broadcast_shapes, broadcast_to};
use ndarray::{ArrayD, ArrayViewD, IxDyn, Zip, arr0, array};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Conjugate prior `x ~ N(mean, var)`, identical across coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianPrior {
    shape: Vec<usize>,
    mean: f64,
    var: f64,
}

impl GaussianPrior {
    pub fn new(shape: &[usize], mean: f64, var: f64) -> Result<Self, NodeError> {
        if !mean.is_finite() {
            return Err(NodeError::InvalidParameter(format!(
                "Gaussian prior mean must be finite, got {mean}"
            )));
        }
        if !(var.is_finite() && var > 0.0) {
            return Err(NodeError::InvalidParameter(format!(
                "Gaussian prior variance must be positive and finite, got {var}"
            )));
        }
        Ok(Self {
            shape: shape.to_vec(),
            mean,
            var,
        })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn var(&self) -> f64 {
        self.var
    }

    /// Prior precision `1/var`.
    #[inline]
    pub fn precision(&self) -> f64 {
        1.0 / self.var
    }

    /// Prior precision-weighted mean `mean/var`.
    #[inline]
    pub fn weighted_mean(&self) -> f64 {
        self.mean / self.var
    }

    /// Mean posterior variance; only depends on the precision.
    pub fn compute_forward_error(&self, ax: ArrayViewD<'_, f64>) -> f64 {
        let a0 = self.precision();
        ax.mapv(|ax| 1.0 / (ax + a0)).mean().unwrap_or(f64::NAN)
    }

    /// The prior acting as a message source: its own precision and
    /// precision-weighted mean, shaped like `bx`.
    pub fn compute_forward_message(
        &self,
        _ax: ArrayViewD<'_, f64>,
        bx: ArrayViewD<'_, f64>,
    ) -> GaussianMessage {
        GaussianMessage {
            a: arr0(self.precision()).into_dyn(),
            b: ArrayD::from_elem(bx.raw_dim(), self.weighted_mean()),
        }
    }

    pub fn compute_forward_state_evolution(&self, _ax: f64) -> f64 {
        self.precision()
    }
}

impl Prior for GaussianPrior {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Result<ArrayD<f64>, NodeError> {
        let dist = rand_distr::Normal::new(self.mean, self.var.sqrt()).map_err(|e| {
            NodeError::InvalidParameter(format!("invalid Gaussian prior parameters: {e}"))
        })?;
        Ok(ArrayD::from_shape_simple_fn(IxDyn(&self.shape), || {
            rand_distr::Distribution::sample(&dist, &mut *rng)
        }))
    }

    fn second_moment(&self) -> f64 {
        self.mean * self.mean + self.var
    }

    fn compute_forward_posterior(
        &self,
        ax: ArrayViewD<'_, f64>,
        bx: ArrayViewD<'_, f64>,
    ) -> Result<Estimate, NodeError> {
        let shape = broadcast_shapes(&[ax.shape(), bx.shape()])?;
        let ax = broadcast_to(&ax, &shape)?;
        let bx = broadcast_to(&bx, &shape)?;
        let (a0, b0) = (self.precision(), self.weighted_mean());

        let a = ax.mapv(|ax| ax + a0);
        let r = Zip::from(&a).and(&bx).map_collect(|&a, &bx| (bx + b0) / a);
        let v = a.mapv(|a| 1.0 / a);
        Ok(Estimate::from_variances(r, &v))
    }

    fn beliefs_measure(&self, ax: f64, f: &dyn Fn(f64, f64) -> f64) -> Result<f64, NodeError> {
        // (bx, x) is jointly Gaussian: x ~ N(mean, var), bx = ax·x + √ax·ξ.
        let cov = array![
            [ax * ax * self.var + ax, ax * self.var],
            [ax * self.var, self.var]
        ];
        let mean = [ax * self.mean, self.mean];
        Ok(gaussian_measure_2d_full(&cov, mean, |bx, x| f(bx, x))?)
    }

    fn measure(&self, f: &dyn Fn(f64) -> f64) -> f64 {
        gaussian_measure(self.mean, self.var.sqrt(), f)
    }

    fn compute_log_partition(
        &self,
        ax: ArrayViewD<'_, f64>,
        bx: ArrayViewD<'_, f64>,
    ) -> Result<f64, NodeError> {
        let shape = broadcast_shapes(&[ax.shape(), bx.shape()])?;
        let ax = broadcast_to(&ax, &shape)?;
        let bx = broadcast_to(&bx, &shape)?;
        let (a0, b0) = (self.precision(), self.weighted_mean());

        let terms = Zip::from(&ax).and(&bx).map_collect(|&ax, &bx| {
            let a = ax + a0;
            let b = bx + b0;
            b * b / a - b0 * b0 / a0 + (a0 / a).ln()
        });
        Ok(0.5 * terms.sum())
    }

    fn compute_mutual_information(&self, ax: f64) -> f64 {
        let a = ax + self.precision();
        0.5 * (a * self.var).ln()
    }
}
