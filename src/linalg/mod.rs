pub mod faer_ndarray;
