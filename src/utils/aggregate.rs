use std::collections::{BTreeMap, HashMap};

use ndarray::{Array1, Array2, ArrayView2};

use crate::cv::table::ScoreTable;
use crate::data::{Label, Labels, TrajectoryId};
use crate::error::{CvError, Result};

/// Running sums of each score column within each trajectory, in row order.
#[derive(Debug, Clone, PartialEq)]
pub struct CumulativeScores {
    pub id_traj: Vec<TrajectoryId>,
    pub sums: Array2<f64>,
}

/// Final cumulative score of each trajectory with its ground-truth label.
/// Rows are ordered by ascending trajectory id.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalScores {
    pub id_traj: Vec<TrajectoryId>,
    pub labels: Vec<Label>,
    pub scores: Array2<f64>,
}

impl TerminalScores {
    pub fn len(&self) -> usize {
        self.id_traj.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_traj.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreAggregator;

impl ScoreAggregator {
    pub fn cumulative(&self, table: &ScoreTable) -> CumulativeScores {
        cumulative_sum(table.id_traj(), table.scores())
    }

    pub fn terminal(&self, cumulative: &CumulativeScores, labels: &Labels) -> Result<TerminalScores> {
        labels.check_present(&cumulative.id_traj)?;
        // last row of each trajectory; BTreeMap keeps ids sorted
        let mut last: BTreeMap<TrajectoryId, usize> = BTreeMap::new();
        for (pos, &id) in cumulative.id_traj.iter().enumerate() {
            last.insert(id, pos);
        }

        let mut scores = Array2::zeros((last.len(), cumulative.sums.ncols()));
        let mut id_traj = Vec::with_capacity(last.len());
        let mut traj_labels = Vec::with_capacity(last.len());
        for (row, (&id, &pos)) in last.iter().enumerate() {
            scores.row_mut(row).assign(&cumulative.sums.row(pos));
            id_traj.push(id);
            traj_labels.push(labels.label_of(id)?);
        }

        Ok(TerminalScores {
            id_traj,
            labels: traj_labels,
            scores,
        })
    }
}

/// Per-group running sum of each column, keyed by `groups`, in row order.
pub fn cumulative_sum(groups: &[TrajectoryId], scores: ArrayView2<f64>) -> CumulativeScores {
    debug_assert_eq!(groups.len(), scores.nrows());
    let mut running: HashMap<TrajectoryId, Array1<f64>> = HashMap::new();
    let mut sums = Array2::zeros(scores.dim());

    for (pos, (&id, row)) in groups.iter().zip(scores.outer_iter()).enumerate() {
        let acc = running
            .entry(id)
            .or_insert_with(|| Array1::zeros(scores.ncols()));
        *acc += &row;
        sums.row_mut(pos).assign(&*acc);
    }

    CumulativeScores {
        id_traj: groups.to_vec(),
        sums,
    }
}

/// Terminal scores of one label's column, rejecting non-finite values.
pub(crate) fn finite_column(terminal: &TerminalScores, label: Label) -> Result<Vec<f64>> {
    terminal
        .scores
        .column(label)
        .iter()
        .zip(&terminal.id_traj)
        .map(|(&s, &id)| {
            if s.is_finite() {
                Ok(s)
            } else {
                Err(CvError::NonFiniteScore { id, label })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TrajectoryPoints;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn running_sum_restarts_per_trajectory() {
        let groups = [5, 5, 2, 5, 2];
        let scores = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0], [5.0, 50.0]];
        let cum = cumulative_sum(&groups, scores.view());
        assert_eq!(
            cum.sums,
            array![[1.0, 10.0], [3.0, 30.0], [3.0, 30.0], [7.0, 70.0], [8.0, 80.0]]
        );
    }

    #[test]
    fn terminal_takes_last_row_per_trajectory() {
        let points = TrajectoryPoints::from_columns(
            array![0.0, 0.0, 0.0, 0.0, 0.0],
            array![0.0, 0.0, 0.0, 0.0, 0.0],
            vec![5, 5, 2, 5, 2],
        )
        .unwrap();
        let table = ScoreTable::from_parts(
            points,
            vec![Some(0); 5],
            array![[-1.0, -2.0], [-1.5, -0.5], [-3.0, -1.0], [-0.5, -0.5], [-2.0, -4.0]],
        );
        let labels = Labels::new([(2, 1), (5, 0)].into_iter().collect(), 2).unwrap();

        let agg = ScoreAggregator;
        let terminal = agg.terminal(&agg.cumulative(&table), &labels).unwrap();
        assert_eq!(terminal.id_traj, vec![2, 5]);
        assert_eq!(terminal.labels, vec![1, 0]);
        assert_abs_diff_eq!(terminal.scores[[0, 0]], -5.0);
        assert_abs_diff_eq!(terminal.scores[[0, 1]], -5.0);
        assert_abs_diff_eq!(terminal.scores[[1, 0]], -3.0);
        assert_abs_diff_eq!(terminal.scores[[1, 1]], -3.0);
    }

    #[test]
    fn terminal_needs_labels() {
        let cum = cumulative_sum(&[1, 2], array![[0.0], [0.0]].view());
        let labels = Labels::new([(1, 0)].into_iter().collect(), 1).unwrap();
        assert!(matches!(
            ScoreAggregator.terminal(&cum, &labels),
            Err(CvError::UnlabeledTrajectory(2))
        ));
    }

    #[test]
    fn terminal_rejects_labels_without_rows() {
        let cum = cumulative_sum(&[0, 1, 1], array![[0.0], [0.0], [0.0]].view());
        let labels = Labels::from_slice(&[0, 0, 0]).unwrap();
        assert!(matches!(
            ScoreAggregator.terminal(&cum, &labels),
            Err(CvError::MissingTrajectory(2))
        ));
    }

    #[test]
    fn missing_scores_are_rejected() {
        let terminal = TerminalScores {
            id_traj: vec![1, 4],
            labels: vec![0, 0],
            scores: array![[-1.0], [f64::NAN]],
        };
        assert!(matches!(
            finite_column(&terminal, 0),
            Err(CvError::NonFiniteScore { id: 4, label: 0 })
        ));
    }
}
