use std::cmp::Ordering;
use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::cv::table::ScoreTable;
use crate::data::{Label, Labels};
use crate::error::{CvError, Result};
use crate::utils::aggregate::{finite_column, ScoreAggregator, TerminalScores};

/// Receiver operating characteristic over decreasing thresholds.
/// The first point is `(0, 0)` at threshold `+inf`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
}

/// ROC curve of one label with its area. Interior points lying on a straight
/// segment of the curve are dropped, as in `roc_curve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocRecord {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub auc: f64,
}

/// ROC curve for binary `truth` ranked by `scores` (higher means positive).
///
/// Tied scores form a single point, and points that are collinear with both
/// neighbours are dropped. The area is unchanged by the thinning.
pub fn roc_curve(truth: &[bool], scores: &[f64]) -> Result<RocCurve> {
    if truth.len() != scores.len() {
        return Err(CvError::InvalidInput(format!(
            "labels length {} != scores length {}",
            truth.len(),
            scores.len()
        )));
    }
    if scores.iter().any(|s| s.is_nan()) {
        return Err(CvError::InvalidInput("scores contain NaN".into()));
    }
    let positives = truth.iter().filter(|&&t| t).count();
    let negatives = truth.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(CvError::InvalidInput(format!(
            "need both classes, got {} positives and {} negatives",
            positives, negatives
        )));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

    // (false positives, true positives, threshold) at each distinct score
    let mut steps: Vec<(i64, i64, f64)> = Vec::new();
    let (mut tp, mut fp) = (0i64, 0i64);
    for (i, &idx) in order.iter().enumerate() {
        if truth[idx] {
            tp += 1;
        } else {
            fp += 1;
        }
        let boundary = order
            .get(i + 1)
            .map_or(true, |&next| scores[next] != scores[idx]);
        if boundary {
            steps.push((fp, tp, scores[idx]));
        }
    }

    let mut curve = RocCurve {
        fpr: vec![0.0],
        tpr: vec![0.0],
        thresholds: vec![f64::INFINITY],
    };
    let last = steps.len() - 1;
    for (i, &(fp, tp, threshold)) in steps.iter().enumerate() {
        let keep = i == 0 || i == last || {
            let (prev, next) = (steps[i - 1], steps[i + 1]);
            next.0 - 2 * fp + prev.0 != 0 || next.1 - 2 * tp + prev.1 != 0
        };
        if keep {
            curve.fpr.push(fp as f64 / negatives as f64);
            curve.tpr.push(tp as f64 / positives as f64);
            curve.thresholds.push(threshold);
        }
    }
    Ok(curve)
}

/// Trapezoidal area under a curve given by increasing `x`.
pub fn auc(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[1] + ys[0]) / 2.0)
        .sum()
}

/// Scores how well each label's terminal cumulative score separates that
/// label's trajectories from the others.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscriminationEvaluator;

impl DiscriminationEvaluator {
    pub fn evaluate(
        &self,
        terminal: &TerminalScores,
        num_labels: usize,
    ) -> Result<BTreeMap<Label, RocRecord>> {
        let mut records = BTreeMap::new();
        for label in 0..num_labels {
            let truth: Vec<bool> = terminal.labels.iter().map(|&l| l == label).collect();
            let positives = truth.iter().filter(|&&t| t).count();
            if positives == 0 || positives == truth.len() {
                return Err(CvError::DegenerateLabels {
                    label,
                    positives,
                    negatives: truth.len() - positives,
                });
            }
            let scores = finite_column(terminal, label)?;
            let curve = roc_curve(&truth, &scores)?;
            let area = auc(&curve.fpr, &curve.tpr);
            debug!("label {}: auc {:.4} over {} trajectories", label, area, truth.len());
            records.insert(
                label,
                RocRecord {
                    fpr: curve.fpr,
                    tpr: curve.tpr,
                    auc: area,
                },
            );
        }
        Ok(records)
    }
}

/// Cumulative, terminal and per-label ROC in one pass over a score table.
pub fn roc_dict(table: &ScoreTable, labels: &Labels) -> Result<BTreeMap<Label, RocRecord>> {
    let aggregator = ScoreAggregator;
    let terminal = aggregator.terminal(&aggregator.cumulative(table), labels)?;
    DiscriminationEvaluator.evaluate(&terminal, labels.num_labels())
}
