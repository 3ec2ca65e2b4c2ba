use log::warn;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::cv::partition::TestFrame;
use crate::data::{Label, RowId, TrajectoryId, TrajectoryPoints};

/// The input table extended with one log-likelihood column per label and
/// the fold that held each row out.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTable {
    points: TrajectoryPoints,
    cv: Vec<Option<usize>>,
    scores: Array2<f64>,
}

impl ScoreTable {
    /// Writes each fold's scores back at the rows it held out, in the input
    /// table's row order. Rows no fold held out keep NaN scores.
    pub fn assemble(points: &TrajectoryPoints, num_labels: usize, frames: &[TestFrame]) -> Self {
        let n = points.len();
        let mut scores = Array2::from_elem((n, num_labels), f64::NAN);
        let mut cv = vec![None; n];

        for frame in frames {
            for (i, &pos) in frame.positions.iter().enumerate() {
                debug_assert!(cv[pos].is_none(), "row {} held out twice", pos);
                cv[pos] = Some(frame.cv);
                for (&label, column) in &frame.scores {
                    scores[[pos, label]] = column[i];
                }
            }
        }

        let uncovered = cv.iter().filter(|c| c.is_none()).count();
        if uncovered > 0 {
            warn!("{} of {} rows are not held out by any fold", uncovered, n);
        }

        ScoreTable {
            points: points.clone(),
            cv,
            scores,
        }
    }

    #[cfg(test)]
    pub(crate) fn from_parts(points: TrajectoryPoints, cv: Vec<Option<usize>>, scores: Array2<f64>) -> Self {
        debug_assert_eq!(points.len(), cv.len());
        debug_assert_eq!(points.len(), scores.nrows());
        ScoreTable { points, cv, scores }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn num_labels(&self) -> usize {
        self.scores.ncols()
    }

    pub fn points(&self) -> &TrajectoryPoints {
        &self.points
    }

    pub fn index(&self) -> &[RowId] {
        self.points.index()
    }

    pub fn id_traj(&self) -> &[TrajectoryId] {
        self.points.id_traj()
    }

    /// Fold that held each row out.
    pub fn cv(&self) -> &[Option<usize>] {
        &self.cv
    }

    /// Rows × labels.
    pub fn scores(&self) -> ArrayView2<f64> {
        self.scores.view()
    }

    pub fn column(&self, label: Label) -> ArrayView1<f64> {
        self.scores.index_axis(Axis(1), label)
    }

    /// Positions of rows with at least one missing score.
    pub fn missing_rows(&self) -> Vec<usize> {
        self.scores
            .outer_iter()
            .enumerate()
            .filter(|(_, row)| row.iter().any(|v| v.is_nan()))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_rows().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::collections::BTreeMap;

    fn frame(cv: usize, positions: Vec<usize>, cols: Vec<Vec<f64>>) -> TestFrame {
        let scores: BTreeMap<Label, _> = cols
            .into_iter()
            .enumerate()
            .map(|(l, c)| (l, ndarray::Array1::from(c)))
            .collect();
        TestFrame {
            cv,
            index: positions.iter().map(|&p| p as RowId + 100).collect(),
            positions,
            scores,
        }
    }

    #[test]
    fn scores_land_on_original_rows() {
        let points = TrajectoryPoints::from_columns(
            array![0.0, 0.0, 0.0, 0.0],
            array![0.0, 0.0, 0.0, 0.0],
            vec![0, 1, 0, 1],
        )
        .unwrap();
        let frames = vec![
            frame(1, vec![1, 3], vec![vec![-1.0, -3.0], vec![-10.0, -30.0]]),
            frame(0, vec![0, 2], vec![vec![-0.5, -2.5], vec![-5.0, -25.0]]),
        ];
        let table = ScoreTable::assemble(&points, 2, &frames);
        assert_eq!(table.column(0), array![-0.5, -1.0, -2.5, -3.0]);
        assert_eq!(table.column(1), array![-5.0, -10.0, -25.0, -30.0]);
        assert_eq!(table.cv(), &[Some(0), Some(1), Some(0), Some(1)]);
        assert!(table.is_complete());
    }

    #[test]
    fn uncovered_rows_stay_missing() {
        let points =
            TrajectoryPoints::from_columns(array![0.0, 0.0, 0.0], array![0.0, 0.0, 0.0], vec![0, 1, 2])
                .unwrap();
        let frames = vec![frame(0, vec![0, 2], vec![vec![-1.0, -2.0]])];
        let table = ScoreTable::assemble(&points, 1, &frames);
        assert_eq!(table.missing_rows(), vec![1]);
        assert_eq!(table.cv()[1], None);
        assert!(!table.is_complete());
    }
}
