use numpy::{PyReadonlyArray1, PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::config::CvConfig;
use crate::cv::runner::CrossValidationRunner;
use crate::data::{Fold, Labels, TrajectoryPoints};
use crate::error::CvError;
use crate::utils::aggregate::{cumulative_sum, ScoreAggregator};
use crate::utils::evaluation::DiscriminationEvaluator;

/// Maps crate errors into Python exception classes.
fn cv_error_to_pyerr(err: CvError) -> PyErr {
    match err {
        CvError::Fit { .. } | CvError::ModelFit { .. } => PyRuntimeError::new_err(err.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

/// Python-exposed wrapper around CrossValidationRunner
#[pyclass]
pub struct GmmCrossValidation {
    config: CvConfig,
}

#[pymethods]
impl GmmCrossValidation {
    #[new]
    #[pyo3(signature = (
        min_components = 2,
        max_components = 20,
        subsample_cap = 10000,
        random_state = None,
        parallel = false,
        n_threads = None
    ))]
    fn new(
        min_components: usize,
        max_components: usize,
        subsample_cap: usize,
        random_state: Option<u64>,
        parallel: bool,
        n_threads: Option<usize>,
    ) -> PyResult<Self> {
        let config = CvConfig {
            min_components,
            max_components,
            subsample_cap,
            random_state,
            parallel,
            n_threads,
            ..CvConfig::default()
        };
        config.validate().map_err(cv_error_to_pyerr)?;
        Ok(GmmCrossValidation { config })
    }

    /// Runs every fold. `folds[i]` holds the trajectory ids held out by fold
    /// `i`; `labels[id]` is the cluster of trajectory `id`.
    ///
    /// Returns a dict with `scores` (rows × labels), `cv`, `seed` and `models`.
    #[pyo3(signature = (lons, lats, id_traj, folds, labels, index = None))]
    fn run<'py>(
        &self,
        py: Python<'py>,
        lons: PyReadonlyArray1<'py, f64>,
        lats: PyReadonlyArray1<'py, f64>,
        id_traj: Vec<u64>,
        folds: Vec<Vec<u64>>,
        labels: Vec<usize>,
        index: Option<Vec<u64>>,
    ) -> PyResult<&'py PyDict> {
        let lons = lons.as_array().to_owned();
        let lats = lats.as_array().to_owned();
        let points = match index {
            Some(index) => TrajectoryPoints::new(index, lons, lats, id_traj),
            None => TrajectoryPoints::from_columns(lons, lats, id_traj),
        }
        .map_err(cv_error_to_pyerr)?;
        let labels = Labels::from_slice(&labels).map_err(cv_error_to_pyerr)?;
        let folds: Vec<Fold> = folds
            .into_iter()
            .enumerate()
            .map(|(i, ids)| Fold::new(i, ids))
            .collect();

        let runner = CrossValidationRunner::new(self.config.clone()).map_err(cv_error_to_pyerr)?;
        let outcome = py
            .allow_threads(|| runner.run(&points, &folds, &labels))
            .map_err(cv_error_to_pyerr)?;

        let models = PyList::empty(py);
        for fold_models in &outcome.models_by_fold {
            let per_label = PyDict::new(py);
            for (label, selected) in &fold_models.models {
                let entry = PyDict::new(py);
                entry.set_item("n_components", selected.n_components)?;
                entry.set_item("bic", selected.bic)?;
                entry.set_item("n_train", selected.n_train)?;
                entry.set_item("subsampled", selected.subsampled)?;
                entry.set_item("weights", selected.model.weights().to_pyarray(py))?;
                entry.set_item("means", selected.model.means().to_pyarray(py))?;
                entry.set_item("covariances", selected.model.covariances().to_pyarray(py))?;
                per_label.set_item(label, entry)?;
            }
            models.append(per_label)?;
        }

        let table = &outcome.score_table;
        let results = PyDict::new(py);
        results.set_item("scores", table.scores().to_pyarray(py))?;
        results.set_item("cv", table.cv().to_vec())?;
        results.set_item("seed", outcome.seed)?;
        results.set_item("models", models)?;
        Ok(results)
    }

    /// Per-label ROC from a score matrix aligned with `id_traj`.
    ///
    /// Returns `{label: (fpr, tpr, auc)}`.
    fn roc<'py>(
        &self,
        py: Python<'py>,
        scores: PyReadonlyArray2<'py, f64>,
        id_traj: Vec<u64>,
        labels: Vec<usize>,
    ) -> PyResult<&'py PyDict> {
        let scores = scores.as_array();
        if scores.nrows() != id_traj.len() {
            return Err(PyValueError::new_err(format!(
                "scores has {} rows but id_traj has {}",
                scores.nrows(),
                id_traj.len()
            )));
        }
        let labels = Labels::from_slice(&labels).map_err(cv_error_to_pyerr)?;
        if scores.ncols() != labels.num_labels() {
            return Err(PyValueError::new_err(format!(
                "scores has {} columns but there are {} labels",
                scores.ncols(),
                labels.num_labels()
            )));
        }

        let cumulative = cumulative_sum(&id_traj, scores);
        let terminal = ScoreAggregator
            .terminal(&cumulative, &labels)
            .map_err(cv_error_to_pyerr)?;
        let records = DiscriminationEvaluator
            .evaluate(&terminal, labels.num_labels())
            .map_err(cv_error_to_pyerr)?;

        let roc_dict = PyDict::new(py);
        for (label, record) in records {
            roc_dict.set_item(label, (record.fpr, record.tpr, record.auc))?;
        }
        Ok(roc_dict)
    }
}
