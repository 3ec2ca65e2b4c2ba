use thiserror::Error;

use crate::data::{Label, TrajectoryId};

pub type Result<T> = std::result::Result<T, CvError>;

/// Failures raised while partitioning, fitting or evaluating.
///
/// Nothing here is recovered internally: a failing (fold, label) cell aborts
/// the whole run.
#[derive(Debug, Error)]
pub enum CvError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("empty component range: min={min}, max={max}, n_points={n_points}")]
    EmptyComponentRange {
        min: usize,
        max: usize,
        n_points: usize,
    },

    #[error("{n_points} training points cannot support {min_components} components")]
    InsufficientPoints {
        n_points: usize,
        min_components: usize,
    },

    #[error("fold {fold} holds out no points")]
    EmptyFold { fold: usize },

    #[error("fold {fold} holds out trajectory {id} which has no points")]
    UnknownTrajectory { fold: usize, id: TrajectoryId },

    #[error("trajectory {0} has no cluster label")]
    UnlabeledTrajectory(TrajectoryId),

    #[error("labelled trajectory {0} has no points")]
    MissingTrajectory(TrajectoryId),

    #[error("trajectory {id} is held out by folds {first} and {second}")]
    OverlappingFolds {
        id: TrajectoryId,
        first: usize,
        second: usize,
    },

    #[error("fit failed with {components} components: {message}")]
    Fit { components: usize, message: String },

    #[error("fit failed (fold {fold}, label {label}, {components} components): {message}")]
    ModelFit {
        fold: usize,
        label: Label,
        components: usize,
        message: String,
    },

    #[error("label {label} has {positives} positive and {negatives} negative trajectories")]
    DegenerateLabels {
        label: Label,
        positives: usize,
        negatives: usize,
    },

    #[error("non-finite score for trajectory {id}, label {label}")]
    NonFiniteScore { id: TrajectoryId, label: Label },
}

impl CvError {
    /// Attach the (fold, label) cell to a fit failure.
    pub(crate) fn in_cell(self, fold: usize, label: Label) -> Self {
        match self {
            CvError::Fit {
                components,
                message,
            } => CvError::ModelFit {
                fold,
                label,
                components,
                message,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_failure_gains_its_cell() {
        let err = CvError::Fit {
            components: 3,
            message: "diverged".into(),
        };
        assert_eq!(err.to_string(), "fit failed with 3 components: diverged");
        match err.in_cell(2, 1) {
            CvError::ModelFit {
                fold,
                label,
                components,
                message,
            } => {
                assert_eq!((fold, label, components), (2, 1, 3));
                assert_eq!(message, "diverged");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn other_errors_pass_through_in_cell() {
        let err = CvError::EmptyFold { fold: 4 }.in_cell(0, 0);
        assert!(matches!(err, CvError::EmptyFold { fold: 4 }));
    }
}
