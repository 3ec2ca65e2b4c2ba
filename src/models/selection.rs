use log::trace;
use ndarray::ArrayView2;
use rand::rngs::StdRng;

use crate::error::{CvError, Result};
use crate::models::base_model::{DensityEstimator, DensityModel};

/// Outcome of a BIC search.
#[derive(Debug, Clone)]
pub struct Selection<M> {
    pub n_components: usize,
    pub bic: f64,
    pub model: M,
}

/// Picks the component count in `[min_components, min(max_components, n_points))`
/// whose fitted model has the lowest BIC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSelector {
    pub min_components: usize,
    pub max_components: usize,
}

impl ModelSelector {
    pub fn new(min_components: usize, max_components: usize) -> Self {
        ModelSelector {
            min_components,
            max_components,
        }
    }

    /// Candidate counts for `n_points` samples.
    pub fn candidates(&self, n_points: usize) -> std::ops::Range<usize> {
        self.min_components..self.max_components.min(n_points)
    }

    pub fn select<E: DensityEstimator>(
        &self,
        estimator: &E,
        coords: ArrayView2<f64>,
        rng: &mut StdRng,
    ) -> Result<Selection<E::Model>> {
        let n_points = coords.nrows();
        if n_points < self.min_components {
            return Err(CvError::InsufficientPoints {
                n_points,
                min_components: self.min_components,
            });
        }
        let candidates = self.candidates(n_points);
        if candidates.is_empty() {
            return Err(CvError::EmptyComponentRange {
                min: self.min_components,
                max: self.max_components,
                n_points,
            });
        }

        let mut best: Option<Selection<E::Model>> = None;
        for n_components in candidates {
            let model = estimator.fit(coords, n_components, rng)?;
            let bic = model.bic(coords);
            trace!("{} components: bic={}", n_components, bic);
            if !bic.is_finite() {
                return Err(CvError::Fit {
                    components: n_components,
                    message: format!("non-finite BIC {}", bic),
                });
            }
            // strict comparison keeps the lowest count on ties
            if best.as_ref().map_or(true, |b| bic < b.bic) {
                best = Some(Selection {
                    n_components,
                    bic,
                    model,
                });
            }
        }
        best.ok_or(CvError::EmptyComponentRange {
            min: self.min_components,
            max: self.max_components,
            n_points,
        })
    }
}
