use crate::linalg::faer_ndarray::FaerLinalgError;
use ndarray::{ArrayD, ArrayViewD, Axis, Dimension, IxDyn, Zip};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by node operations.
///
/// Non-positive precisions are not reported here; they flow through the
/// arithmetic as non-finite values.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("shapes {lhs:?} and {rhs:?} cannot be broadcast together")]
    ShapeMismatch { lhs: Vec<usize>, rhs: Vec<usize> },

    #[error("expected a leading axis of length 2 holding [re, im], got shape {shape:?}")]
    NotComplexPair { shape: Vec<usize> },

    #[error("invalid node parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Linalg(#[from] FaerLinalgError),

    #[error("array construction failed: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Posterior estimate returned to the scheduler: elementwise means `r` and
/// the average of the elementwise variances `v`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub r: ArrayD<f64>,
    pub v: f64,
}

impl Estimate {
    /// Builds an estimate from an elementwise variance array.
    pub fn from_variances(r: ArrayD<f64>, variances: &ArrayD<f64>) -> Self {
        Self {
            r,
            v: mean_or_nan(variances),
        }
    }
}

/// Gaussian message: precision `a`, precision-weighted mean `b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianMessage {
    pub a: ArrayD<f64>,
    pub b: ArrayD<f64>,
}

impl GaussianMessage {
    pub fn mean(&self) -> Result<ArrayD<f64>, NodeError> {
        let shape = broadcast_shape(self.a.shape(), self.b.shape())?;
        let (a, b) = (self.a.view(), self.b.view());
        let a = broadcast_to(&a, &shape)?;
        let b = broadcast_to(&b, &shape)?;
        Ok(Zip::from(&a).and(&b).map_collect(|&a, &b| b / a))
    }

    /// Per-coordinate variance `1/a`, shaped like [`Self::mean`].
    pub fn variance(&self) -> Result<ArrayD<f64>, NodeError> {
        let shape = broadcast_shape(self.a.shape(), self.b.shape())?;
        let a = self.a.view();
        Ok(broadcast_to(&a, &shape)?.mapv(|a| 1.0 / a))
    }
}

pub(crate) fn mean_or_nan(values: &ArrayD<f64>) -> f64 {
    values.mean().unwrap_or(f64::NAN)
}

/// Numpy broadcasting rule for two shapes.
pub fn broadcast_shape(lhs: &[usize], rhs: &[usize]) -> Result<IxDyn, NodeError> {
    let ndim = lhs.len().max(rhs.len());
    let mut out = vec![0usize; ndim];
    for k in 0..ndim {
        let l = if k + lhs.len() >= ndim { lhs[k + lhs.len() - ndim] } else { 1 };
        let r = if k + rhs.len() >= ndim { rhs[k + rhs.len() - ndim] } else { 1 };
        out[k] = match (l, r) {
            (l, r) if l == r => l,
            (1, r) => r,
            (l, 1) => l,
            _ => {
                return Err(NodeError::ShapeMismatch {
                    lhs: lhs.to_vec(),
                    rhs: rhs.to_vec(),
                });
            }
        };
    }
    Ok(IxDyn(&out))
}

/// Common broadcast shape of several array shapes.
pub fn broadcast_shapes(shapes: &[&[usize]]) -> Result<IxDyn, NodeError> {
    let mut out = IxDyn(&[]);
    for shape in shapes {
        out = broadcast_shape(out.slice(), shape)?;
    }
    Ok(out)
}

pub fn broadcast_to<'a>(
    array: &'a ArrayViewD<'_, f64>,
    shape: &IxDyn,
) -> Result<ArrayViewD<'a, f64>, NodeError> {
    array
        .broadcast(shape.clone())
        .ok_or_else(|| NodeError::ShapeMismatch {
            lhs: array.shape().to_vec(),
            rhs: shape.slice().to_vec(),
        })
}

/// Complex array to a real array with a leading `[re, im]` axis.
pub fn complex_to_pair(z: ArrayViewD<'_, Complex64>) -> ArrayD<f64> {
    let mut shape = Vec::with_capacity(z.ndim() + 1);
    shape.push(2);
    shape.extend_from_slice(z.shape());
    ArrayD::from_shape_fn(IxDyn(&shape), |idx| {
        let c = z[&idx.slice()[1..]];
        if idx[0] == 0 { c.re } else { c.im }
    })
}

/// Inverse of [`complex_to_pair`].
pub fn pair_to_complex(pair: ArrayViewD<'_, f64>) -> Result<ArrayD<Complex64>, NodeError> {
    let (re, im) = split_pair(&pair)?;
    Ok(Zip::from(&re)
        .and(&im)
        .map_collect(|&re, &im| Complex64::new(re, im)))
}

/// Splits a `[re, im]` array into its two component views.
pub fn split_pair<'a>(
    pair: &'a ArrayViewD<'_, f64>,
) -> Result<(ArrayViewD<'a, f64>, ArrayViewD<'a, f64>), NodeError> {
    if pair.ndim() == 0 || pair.len_of(Axis(0)) != 2 {
        return Err(NodeError::NotComplexPair {
            shape: pair.shape().to_vec(),
        });
    }
    Ok((pair.index_axis(Axis(0), 0), pair.index_axis(Axis(0), 1)))
}

/// Elementwise modulus of a `[re, im]` array.
pub fn pair_modulus(pair: &ArrayViewD<'_, f64>) -> Result<ArrayD<f64>, NodeError> {
    let (re, im) = split_pair(pair)?;
    Ok(Zip::from(&re).and(&im).map_collect(|&re, &im| re.hypot(im)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr0, array};

    #[test]
    fn broadcast_follows_numpy_rules() {
        assert_eq!(broadcast_shape(&[3, 1], &[4]).unwrap(), IxDyn(&[3, 4]));
        assert_eq!(broadcast_shape(&[], &[5]).unwrap(), IxDyn(&[5]));
        assert!(matches!(
            broadcast_shape(&[3], &[4]),
            Err(NodeError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn broadcast_shapes_folds_scalars() {
        let a = arr0(2.0).into_dyn();
        let b = array![1.0, 2.0, 3.0].into_dyn();
        let shape = broadcast_shapes(&[a.shape(), b.shape()]).unwrap();
        assert_eq!(shape, IxDyn(&[3]));
        let av = a.view();
        let a_b = broadcast_to(&av, &shape).unwrap();
        assert_eq!(a_b, array![2.0, 2.0, 2.0].into_dyn());
    }

    #[test]
    fn complex_pair_conversion_layout() {
        let z = array![Complex64::new(1.0, -2.0), Complex64::new(0.5, 3.0)].into_dyn();
        let pair = complex_to_pair(z.view());
        assert_eq!(pair.shape(), &[2, 2]);
        assert_eq!(pair[[0, 1]], 0.5);
        assert_eq!(pair[[1, 0]], -2.0);
        let back = pair_to_complex(pair.view()).unwrap();
        assert_eq!(back, z);
    }

    #[test]
    fn pair_requires_leading_axis_of_two() {
        let bad = array![1.0, 2.0, 3.0].into_dyn();
        assert!(matches!(
            pair_to_complex(bad.view()),
            Err(NodeError::NotComplexPair { .. })
        ));
        let scalar = arr0(1.0).into_dyn();
        assert!(split_pair(&scalar.view()).is_err());
    }

    #[test]
    fn modulus_of_pair() {
        let pair = array![[3.0, 0.0], [4.0, -2.0]].into_dyn();
        let m = pair_modulus(&pair.view()).unwrap();
        assert_relative_eq!(m[[0]], 5.0);
        assert_relative_eq!(m[[1]], 2.0);
    }

    #[test]
    fn message_moments() {
        let msg = GaussianMessage {
            a: arr0(2.0).into_dyn(),
            b: array![1.0, -4.0].into_dyn(),
        };
        assert_eq!(msg.mean().unwrap(), array![0.5, -2.0].into_dyn());
        assert_eq!(msg.variance().unwrap(), array![0.5, 0.5].into_dyn());
    }

    #[test]
    fn message_moments_share_the_broadcast_shape() {
        let msg = GaussianMessage {
            a: array![[1.0], [4.0]].into_dyn(),
            b: array![2.0, -2.0, 0.0].into_dyn(),
        };
        let mean = msg.mean().unwrap();
        let var = msg.variance().unwrap();
        assert_eq!(var.shape(), &[2, 3]);
        assert_eq!(var.shape(), mean.shape());
        assert_eq!(var[[1, 2]], 0.25);

        let bad = GaussianMessage {
            a: array![1.0, 2.0].into_dyn(),
            b: array![1.0, 2.0, 3.0].into_dyn(),
        };
        assert!(matches!(bad.variance(), Err(NodeError::ShapeMismatch { .. })));
    }
}
