#![deny(dead_code)]
#![deny(unused_imports)]
#![allow(non_snake_case)]

pub mod bessel;
pub mod linalg;
pub mod nodes;
pub mod probability;
pub mod quadrature;
pub mod types;

pub use linalg::faer_ndarray::FaerLinalgError;
pub use nodes::{
    Channel, DEFAULT_MEASURE_EXTENT, GaussianPrior, Likelihood, ModulusLikelihood, Prior,
    SignChannel, SignLikelihood,
};
pub use quadrature::{
    QuadratureConfig, gaussian_measure, gaussian_measure_2d, gaussian_measure_2d_full, integrate,
};
pub use types::{Estimate, GaussianMessage, NodeError};
