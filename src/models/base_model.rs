use ndarray::{Array1, ArrayView2};
use rand::rngs::StdRng;

use crate::error::Result;

/// A fitted density over 2D coordinates.
pub trait DensityModel {
    /// Number of mixture components.
    fn n_components(&self) -> usize;

    /// Number of free parameters, used by the BIC penalty.
    fn n_parameters(&self) -> usize;

    /// Log-likelihood of each row of `x`.
    fn score_samples(&self, x: ArrayView2<f64>) -> Array1<f64>;

    /// Default: mean log-likelihood over the rows.
    fn score(&self, x: ArrayView2<f64>) -> f64 {
        let samples = self.score_samples(x);
        if samples.is_empty() {
            return f64::NAN;
        }
        samples.sum() / samples.len() as f64
    }

    /// Default: Bayesian Information Criterion, lower is better.
    fn bic(&self, x: ArrayView2<f64>) -> f64 {
        let n = x.nrows() as f64;
        -2.0 * self.score_samples(x).sum() + self.n_parameters() as f64 * n.ln()
    }
}

/// Fits a [`DensityModel`] with a fixed component count.
pub trait DensityEstimator: Send + Sync {
    type Model: DensityModel + Send;

    fn fit(&self, x: ArrayView2<f64>, n_components: usize, rng: &mut StdRng)
        -> Result<Self::Model>;
}
