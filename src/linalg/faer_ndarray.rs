use faer::linalg::solvers;
use faer::{MatRef, Side};
use ndarray::{Array2, ArrayBase, Data, Ix2};
use std::marker::PhantomData;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaerLinalgError {
    #[error("Cholesky factorization failed: {0:?}")]
    Cholesky(solvers::LltError),
    #[error("matrix has unsupported shape {rows}x{cols}")]
    InvalidShape { rows: usize, cols: usize },
}

/// Borrowed `faer` view over an `ndarray` matrix.
///
/// Layouts with non-positive strides are copied into a compact owned buffer
/// first; everything else is viewed in place.
pub struct FaerArrayView<'a> {
    ptr: *const f64,
    rows: usize,
    cols: usize,
    row_stride: isize,
    col_stride: isize,
    owned: Option<Array2<f64>>,
    _marker: PhantomData<&'a f64>,
}

impl<'a> FaerArrayView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let (rows, cols) = array.dim();
        let strides = array.strides();
        if strides[0] <= 0 || strides[1] <= 0 {
            let owned = array.as_standard_layout().into_owned();
            let owned_strides = owned.strides();
            return Self {
                ptr: owned.as_ptr(),
                rows,
                cols,
                row_stride: owned_strides[0],
                col_stride: owned_strides[1],
                owned: Some(owned),
                _marker: PhantomData,
            };
        }

        Self {
            ptr: array.as_ptr(),
            rows,
            cols,
            row_stride: strides[0],
            col_stride: strides[1],
            owned: None,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        let ptr = match &self.owned {
            Some(owned) => owned.as_ptr(),
            None => self.ptr,
        };
        // SAFETY: the pointer, shape and strides come either from a live ndarray
        // view with positive strides or from the owned copy held by `self`.
        unsafe {
            MatRef::from_raw_parts(ptr, self.rows, self.cols, self.row_stride, self.col_stride)
        }
    }
}

fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

pub trait FaerCholesky {
    /// Lower-triangular `L` with `L·Lᵀ = self`.
    fn cholesky_lower(&self) -> Result<Array2<f64>, FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerCholesky for ArrayBase<S, Ix2> {
    fn cholesky_lower(&self) -> Result<Array2<f64>, FaerLinalgError> {
        let (rows, cols) = self.dim();
        if rows != cols {
            return Err(FaerLinalgError::InvalidShape { rows, cols });
        }
        let faer_view = FaerArrayView::new(self);
        let factor = faer_view
            .as_ref()
            .llt(Side::Lower)
            .map_err(FaerLinalgError::Cholesky)?;
        Ok(mat_to_array(factor.L()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn cholesky_reconstructs_matrix() {
        let cov = array![[4.0, 1.2], [1.2, 2.5]];
        let l = cov.cholesky_lower().expect("positive definite");
        assert_eq!(l[[0, 1]], 0.0);
        let rebuilt = l.dot(&l.t());
        for (a, b) in rebuilt.iter().zip(cov.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn cholesky_handles_transposed_views() {
        let cov = array![[2.0, 0.5], [0.5, 1.0]];
        let l = cov.t().cholesky_lower().expect("positive definite");
        assert_relative_eq!(l[[0, 0]], 2.0_f64.sqrt(), epsilon = 1e-14);
        assert_relative_eq!(l[[1, 0]], 0.5 / 2.0_f64.sqrt(), epsilon = 1e-14);
    }

    #[test]
    fn cholesky_rejects_indefinite_matrix() {
        let cov = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(matches!(
            cov.cholesky_lower(),
            Err(FaerLinalgError::Cholesky(_))
        ));
    }

    #[test]
    fn cholesky_rejects_non_square_matrix() {
        let m = array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        assert!(matches!(
            m.cholesky_lower(),
            Err(FaerLinalgError::InvalidShape { rows: 2, cols: 3 })
        ));
    }
}
