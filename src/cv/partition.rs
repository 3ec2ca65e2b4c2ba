use std::collections::{BTreeMap, HashSet};

use ndarray::{Array1, Array2};

use crate::data::{Fold, Label, RowId, TrajectoryId, TrajectoryPoints};
use crate::error::{CvError, Result};

/// Test rows of one fold, keyed by their position in the input table, with
/// one score column per label once the fold is scored.
#[derive(Debug, Clone)]
pub struct TestFrame {
    pub cv: usize,
    pub positions: Vec<usize>,
    pub index: Vec<RowId>,
    pub scores: BTreeMap<Label, Array1<f64>>,
}

impl TestFrame {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub(crate) fn insert_scores(&mut self, label: Label, scores: Array1<f64>) {
        debug_assert_eq!(scores.len(), self.positions.len());
        self.scores.insert(label, scores);
    }
}

/// Train/test partition of the input table for one fold.
#[derive(Debug, Clone)]
pub struct FoldSplit {
    pub train_positions: Vec<usize>,
    /// `(lon, lat)` of the training points.
    pub train_coords: Array2<f64>,
    /// Trajectory of each training point, aligned with `train_coords`.
    pub train_traj: Vec<TrajectoryId>,
    pub test_coords: Array2<f64>,
    pub test_frame: TestFrame,
}

impl FoldSplit {
    pub fn n_train(&self) -> usize {
        self.train_positions.len()
    }

    pub fn n_test(&self) -> usize {
        self.test_frame.len()
    }
}

/// Splits points by whether their trajectory is held out by a fold.
#[derive(Debug, Clone, Copy, Default)]
pub struct FoldPartitioner;

impl FoldPartitioner {
    pub fn split(&self, points: &TrajectoryPoints, fold: &Fold) -> Result<FoldSplit> {
        let mut train_positions = Vec::new();
        let mut test_positions = Vec::new();
        let mut matched: HashSet<TrajectoryId> = HashSet::new();

        for (pos, id) in points.id_traj().iter().enumerate() {
            if fold.held_out.contains(id) {
                matched.insert(*id);
                test_positions.push(pos);
            } else {
                train_positions.push(pos);
            }
        }

        if test_positions.is_empty() {
            return Err(CvError::EmptyFold { fold: fold.index });
        }
        if matched.len() != fold.held_out.len() {
            let mut missing: Vec<TrajectoryId> =
                fold.held_out.difference(&matched).copied().collect();
            missing.sort_unstable();
            return Err(CvError::UnknownTrajectory {
                fold: fold.index,
                id: missing[0],
            });
        }

        let train_traj = train_positions
            .iter()
            .map(|&p| points.id_traj()[p])
            .collect();
        let test_frame = TestFrame {
            cv: fold.index,
            index: test_positions.iter().map(|&p| points.index()[p]).collect(),
            positions: test_positions,
            scores: BTreeMap::new(),
        };

        Ok(FoldSplit {
            train_coords: points.coords(&train_positions),
            train_traj,
            test_coords: points.coords(&test_frame.positions),
            train_positions,
            test_frame,
        })
    }
}
