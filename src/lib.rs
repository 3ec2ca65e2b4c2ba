//! Cross-validated Gaussian mixtures over trajectory clusters.
//!
//! For each fold, one full-covariance mixture per trajectory-cluster label is
//! fitted on the training trajectories of that label, with the component count
//! chosen by BIC. Every held-out point is then scored under every label's
//! mixture; per-trajectory cumulative scores feed a per-label ROC analysis.

pub mod config;
pub mod cv;
pub mod data;
pub mod error;
pub mod models;
pub mod utils;

#[cfg(feature = "python")]
mod python;

pub use config::CvConfig;
pub use cv::partition::{FoldPartitioner, FoldSplit, TestFrame};
pub use cv::runner::{CrossValidationRunner, CvOutcome, FoldModels, SelectedModel};
pub use cv::table::ScoreTable;
pub use data::{random_folds, Fold, Label, Labels, RowId, TrajectoryId, TrajectoryPoints};
pub use error::{CvError, Result};
pub use models::base_model::{DensityEstimator, DensityModel};
pub use models::gmm::{Gmm, LinfaGmm};
pub use models::selection::{ModelSelector, Selection};
pub use utils::aggregate::{cumulative_sum, CumulativeScores, ScoreAggregator, TerminalScores};
pub use utils::evaluation::{auc, roc_curve, roc_dict, DiscriminationEvaluator, RocCurve, RocRecord};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// A Python module implemented in Rust.
#[cfg(feature = "python")]
#[pymodule]
fn trajmix(_py: Python, m: &PyModule) -> PyResult<()> {
    // Cross-validation:
    m.add_class::<python::GmmCrossValidation>()?;
    Ok(())
}
