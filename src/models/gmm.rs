use std::f64::consts::PI;

use linfa::traits::Fit;
use linfa::DatasetBase;
use linfa_clustering::{GaussianMixtureModel, GmmCovarType, GmmInitMethod};
use linfa_linalg::cholesky::Cholesky;
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::CvConfig;
use crate::error::{CvError, Result};
use crate::models::base_model::{DensityEstimator, DensityModel};

/// Full-covariance Gaussian mixture fitted with linfa's EM.
pub struct LinfaGmm {
    tolerance: f64,
    reg_covariance: f64,
    max_n_iterations: u64,
    n_runs: u64,
}

impl LinfaGmm {
    pub fn new(tolerance: f64, reg_covariance: f64, max_n_iterations: u64, n_runs: u64) -> Self {
        LinfaGmm {
            tolerance,
            reg_covariance,
            max_n_iterations,
            n_runs,
        }
    }

    pub fn from_config(config: &CvConfig) -> Self {
        Self::new(
            config.tolerance,
            config.reg_covariance,
            config.max_n_iterations,
            config.n_runs,
        )
    }
}

impl Default for LinfaGmm {
    fn default() -> Self {
        Self::from_config(&CvConfig::default())
    }
}

impl DensityEstimator for LinfaGmm {
    type Model = Gmm;

    fn fit(&self, x: ArrayView2<f64>, n_components: usize, rng: &mut StdRng) -> Result<Gmm> {
        let fit_error = |message: String| CvError::Fit {
            components: n_components,
            message,
        };
        if x.nrows() < n_components {
            return Err(CvError::InsufficientPoints {
                n_points: x.nrows(),
                min_components: n_components,
            });
        }

        // linfa clones the rng per run; fork it so the caller's stream advances
        let em_rng = StdRng::seed_from_u64(rng.gen());
        let dataset = DatasetBase::from(x.to_owned());
        let fitted = GaussianMixtureModel::params_with_rng(n_components, em_rng)
            .covariance_type(GmmCovarType::Full)
            .init_method(GmmInitMethod::KMeans)
            .tolerance(self.tolerance)
            .reg_covariance(self.reg_covariance)
            .max_n_iterations(self.max_n_iterations)
            .n_runs(self.n_runs)
            .fit(&dataset)
            .map_err(|e| fit_error(e.to_string()))?;

        Gmm::from_parameters(
            fitted.weights().clone(),
            fitted.means().clone(),
            fitted.covariances().clone(),
        )
        .map_err(|e| match e {
            CvError::InvalidInput(message) => fit_error(message),
            other => other,
        })
    }
}

/// Parameters of a fitted full-covariance mixture, with the Cholesky
/// factors of each covariance cached for scoring.
#[derive(Debug, Clone)]
pub struct Gmm {
    weights: Array1<f64>,
    means: Array2<f64>,
    covariances: Array3<f64>,
    chol: Array3<f64>,
    log_dets: Array1<f64>,
}

impl Gmm {
    /// `weights` (k), `means` (k × d), `covariances` (k × d × d).
    pub fn from_parameters(
        weights: Array1<f64>,
        means: Array2<f64>,
        covariances: Array3<f64>,
    ) -> Result<Self> {
        let (k, d) = means.dim();
        if k == 0 || weights.len() != k || covariances.dim() != (k, d, d) {
            return Err(CvError::InvalidInput(format!(
                "inconsistent mixture shapes: weights={:?}, means={:?}, covariances={:?}",
                weights.dim(),
                means.dim(),
                covariances.dim()
            )));
        }
        if weights.iter().any(|&w| !(w > 0.0)) {
            return Err(CvError::InvalidInput(
                "mixture weights must be positive".into(),
            ));
        }

        let mut chol = Array3::zeros((k, d, d));
        let mut log_dets = Array1::zeros(k);
        for (c, cov) in covariances.outer_iter().enumerate() {
            let l = cholesky(cov).ok_or_else(|| {
                CvError::InvalidInput(format!(
                    "covariance of component {} is not positive definite",
                    c
                ))
            })?;
            log_dets[c] = 2.0 * l.diag().mapv(f64::ln).sum();
            chol.index_axis_mut(Axis(0), c).assign(&l);
        }

        Ok(Gmm {
            weights,
            means,
            covariances,
            chol,
            log_dets,
        })
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    pub fn means(&self) -> &Array2<f64> {
        &self.means
    }

    pub fn covariances(&self) -> &Array3<f64> {
        &self.covariances
    }

    fn dim(&self) -> usize {
        self.means.ncols()
    }

    fn log_density(&self, x: ArrayView1<f64>) -> f64 {
        let d = self.dim();
        let log_norm = d as f64 * (2.0 * PI).ln();
        let terms: Vec<f64> = (0..self.weights.len())
            .map(|c| {
                let maha = mahalanobis_sq(
                    self.chol.index_axis(Axis(0), c),
                    x,
                    self.means.row(c),
                );
                self.weights[c].ln() - 0.5 * (log_norm + self.log_dets[c] + maha)
            })
            .collect();
        logsumexp(&terms)
    }
}

impl DensityModel for Gmm {
    fn n_components(&self) -> usize {
        self.weights.len()
    }

    fn n_parameters(&self) -> usize {
        let k = self.n_components();
        let d = self.dim();
        k * d * (d + 1) / 2 + k * d + k - 1
    }

    fn score_samples(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.outer_iter().map(|row| self.log_density(row)).collect()
    }
}

/// Lower Cholesky factor of a symmetric positive definite matrix.
fn cholesky(a: ArrayView2<f64>) -> Option<Array2<f64>> {
    let l = a.cholesky().ok()?;
    if l.diag().iter().all(|&v| v > 0.0 && v.is_finite()) {
        Some(l)
    } else {
        None
    }
}

/// `(x - mean)^T Σ^-1 (x - mean)` given the lower factor `l` of Σ.
fn mahalanobis_sq(l: ArrayView2<f64>, x: ArrayView1<f64>, mean: ArrayView1<f64>) -> f64 {
    let n = l.nrows();
    let mut z = vec![0.0; n];
    for i in 0..n {
        let mut v = x[i] - mean[i];
        for k in 0..i {
            v -= l[[i, k]] * z[k];
        }
        z[i] = v / l[[i, i]];
    }
    z.iter().map(|v| v * v).sum()
}

fn logsumexp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};

    fn standard_normal() -> Gmm {
        Gmm::from_parameters(
            array![1.0],
            array![[0.0, 0.0]],
            Array::from_shape_vec((1, 2, 2), vec![1.0, 0.0, 0.0, 1.0]).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn standard_normal_density() {
        let gmm = standard_normal();
        let scores = gmm.score_samples(array![[0.0, 0.0], [1.0, 1.0]].view());
        let log_norm = -(2.0 * PI).ln();
        assert_abs_diff_eq!(scores[0], log_norm, epsilon = 1e-12);
        assert_abs_diff_eq!(scores[1], log_norm - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn correlated_covariance_matches_closed_form() {
        // Σ = [[2, 1], [1, 2]], det = 3, Σ^-1 = [[2, -1], [-1, 2]] / 3
        let gmm = Gmm::from_parameters(
            array![1.0],
            array![[1.0, -1.0]],
            Array::from_shape_vec((1, 2, 2), vec![2.0, 1.0, 1.0, 2.0]).unwrap(),
        )
        .unwrap();
        let x = array![[2.0, 0.0]];
        // diff = (1, 1): maha = (2 - 1 - 1 + 2) / 3 = 2/3
        let expected = -0.5 * (2.0 * (2.0 * PI).ln() + 3.0f64.ln() + 2.0 / 3.0);
        assert_abs_diff_eq!(gmm.score_samples(x.view())[0], expected, epsilon = 1e-12);
    }

    #[test]
    fn two_components_mix_densities() {
        let cov = Array::from_shape_vec((2, 2, 2), vec![1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0])
            .unwrap();
        let gmm = Gmm::from_parameters(array![0.5, 0.5], array![[0.0, 0.0], [0.0, 0.0]], cov)
            .unwrap();
        let single = standard_normal();
        let x = array![[0.3, -0.2]];
        assert_abs_diff_eq!(
            gmm.score_samples(x.view())[0],
            single.score_samples(x.view())[0],
            epsilon = 1e-12
        );
    }

    #[test]
    fn parameter_count_and_bic() {
        let gmm = standard_normal();
        // 3 covariance + 2 mean + 0 free weights
        assert_eq!(gmm.n_parameters(), 5);
        let x = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let expected = -2.0 * gmm.score_samples(x.view()).sum() + 5.0 * 4.0f64.ln();
        assert_abs_diff_eq!(gmm.bic(x.view()), expected, epsilon = 1e-12);
        assert_abs_diff_eq!(
            gmm.score(x.view()),
            gmm.score_samples(x.view()).sum() / 4.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn rejects_singular_covariance() {
        let res = Gmm::from_parameters(
            array![1.0],
            array![[0.0, 0.0]],
            Array::from_shape_vec((1, 2, 2), vec![1.0, 1.0, 1.0, 1.0]).unwrap(),
        );
        assert!(matches!(res, Err(CvError::InvalidInput(_))));
    }

    #[test]
    fn cholesky_factor_is_lower_triangular() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let l = cholesky(a.view()).unwrap();
        assert_abs_diff_eq!(l[[0, 0]], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(l[[1, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(l[[1, 1]], 2.0f64.sqrt(), epsilon = 1e-12);
        assert_eq!(l[[0, 1]], 0.0);
        assert!(cholesky(array![[1.0, 0.0], [0.0, -1.0]].view()).is_none());
    }

    #[test]
    fn linfa_fit_recovers_two_blobs() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut data = Vec::new();
        for i in 0..60 {
            let (cx, cy) = if i % 2 == 0 { (0.0, 0.0) } else { (10.0, 10.0) };
            data.push(cx + rng.gen_range(-0.5..0.5));
            data.push(cy + rng.gen_range(-0.5..0.5));
        }
        let x = Array2::from_shape_vec((60, 2), data).unwrap();

        let gmm = LinfaGmm::default().fit(x.view(), 2, &mut rng).unwrap();
        assert_eq!(gmm.n_components(), 2);
        assert_abs_diff_eq!(gmm.weights().sum(), 1.0, epsilon = 1e-6);
        let near = gmm.score_samples(array![[0.0, 0.0], [10.0, 10.0]].view());
        let far = gmm.score_samples(array![[5.0, 5.0]].view());
        assert!(near.iter().all(|&s| s > far[0]));
    }

    #[test]
    fn linfa_fit_needs_enough_points() {
        let mut rng = StdRng::seed_from_u64(0);
        let x = array![[0.0, 0.0], [1.0, 1.0]];
        let res = LinfaGmm::default().fit(x.view(), 3, &mut rng);
        assert!(matches!(res, Err(CvError::InsufficientPoints { .. })));
    }
}
