use std::collections::{BTreeMap, HashMap};

use log::{debug, info};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::config::CvConfig;
use crate::cv::partition::{FoldPartitioner, TestFrame};
use crate::cv::table::ScoreTable;
use crate::data::{Fold, Label, Labels, TrajectoryId, TrajectoryPoints};
use crate::error::{CvError, Result};
use crate::models::base_model::{DensityEstimator, DensityModel};
use crate::models::gmm::LinfaGmm;
use crate::models::selection::ModelSelector;

/// Model chosen for one (fold, label) cell.
#[derive(Debug, Clone)]
pub struct SelectedModel<M> {
    pub label: Label,
    pub n_components: usize,
    pub bic: f64,
    /// Training points of the label before subsampling.
    pub n_train: usize,
    pub subsampled: bool,
    pub model: M,
}

/// Models fitted on one fold, one per label.
#[derive(Debug, Clone)]
pub struct FoldModels<M> {
    pub fold: usize,
    pub models: BTreeMap<Label, SelectedModel<M>>,
}

#[derive(Debug, Clone)]
pub struct CvOutcome<M> {
    /// In the order the folds were given.
    pub models_by_fold: Vec<FoldModels<M>>,
    pub score_table: ScoreTable,
    /// Seed actually used, for replaying a run that was not seeded.
    pub seed: u64,
}

/// Fits one mixture per (fold, label) on the training trajectories of that
/// label and scores every held-out point of the fold under it.
pub struct CrossValidationRunner<E = LinfaGmm> {
    config: CvConfig,
    selector: ModelSelector,
    estimator: E,
}

impl CrossValidationRunner<LinfaGmm> {
    pub fn new(config: CvConfig) -> Result<Self> {
        let estimator = LinfaGmm::from_config(&config);
        Self::with_estimator(config, estimator)
    }
}

impl<E: DensityEstimator> CrossValidationRunner<E> {
    pub fn with_estimator(config: CvConfig, estimator: E) -> Result<Self> {
        config.validate()?;
        Ok(CrossValidationRunner {
            selector: ModelSelector::new(config.min_components, config.max_components),
            config,
            estimator,
        })
    }

    pub fn config(&self) -> &CvConfig {
        &self.config
    }

    pub fn run(
        &self,
        points: &TrajectoryPoints,
        folds: &[Fold],
        labels: &Labels,
    ) -> Result<CvOutcome<E::Model>> {
        check_folds_disjoint(folds)?;
        labels.check_present(points.id_traj())?;
        // label of every row, looked up once for all folds
        let row_labels: Vec<Label> = points
            .id_traj()
            .iter()
            .map(|&id| labels.label_of(id))
            .collect::<Result<_>>()?;

        let seed = self.config.random_state.unwrap_or_else(rand::random);
        info!(
            "cross-validating {} points over {} folds and {} labels (seed {})",
            points.len(),
            folds.len(),
            labels.num_labels(),
            seed
        );

        let results: Vec<(FoldModels<E::Model>, TestFrame)> = if self.config.parallel {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.thread_count())
                .build()
                .map_err(|e| CvError::InvalidConfig(e.to_string()))?;
            pool.install(|| {
                folds
                    .par_iter()
                    .map(|fold| self.run_fold(points, fold, folds.len(), &row_labels, labels.num_labels(), seed))
                    .collect::<Result<Vec<_>>>()
            })?
        } else {
            folds
                .iter()
                .map(|fold| self.run_fold(points, fold, folds.len(), &row_labels, labels.num_labels(), seed))
                .collect::<Result<Vec<_>>>()?
        };

        let (models_by_fold, frames): (Vec<_>, Vec<_>) = results.into_iter().unzip();
        let score_table = ScoreTable::assemble(points, labels.num_labels(), &frames);
        Ok(CvOutcome {
            models_by_fold,
            score_table,
            seed,
        })
    }

    fn run_fold(
        &self,
        points: &TrajectoryPoints,
        fold: &Fold,
        n_folds: usize,
        row_labels: &[Label],
        num_labels: usize,
        seed: u64,
    ) -> Result<(FoldModels<E::Model>, TestFrame)> {
        info!("CV: {}/{}", fold.index, n_folds);

        let split = FoldPartitioner.split(points, fold)?;
        let mut frame = split.test_frame;
        let mut models = BTreeMap::new();

        for label in 0..num_labels {
            let rows: Vec<usize> = split
                .train_positions
                .iter()
                .enumerate()
                .filter(|(_, &pos)| row_labels[pos] == label)
                .map(|(i, _)| i)
                .collect();

            let mut rng = StdRng::seed_from_u64(cell_seed(seed, fold.index, label));
            let n_train = rows.len();
            let (coords, subsampled) =
                subsample(&split.train_coords, &rows, self.config.subsample_cap, &mut rng);

            let selection = self
                .selector
                .select(&self.estimator, coords.view(), &mut rng)
                .map_err(|e| e.in_cell(fold.index, label))?;
            debug!(
                "fold {} label {}: {} training points{}, {} components, bic {:.3}",
                fold.index,
                label,
                n_train,
                if subsampled { " (subsampled)" } else { "" },
                selection.n_components,
                selection.bic
            );

            // every test point of the fold, whatever its own label
            frame.insert_scores(label, selection.model.score_samples(split.test_coords.view()));
            models.insert(
                label,
                SelectedModel {
                    label,
                    n_components: selection.model.n_components(),
                    bic: selection.bic,
                    n_train,
                    subsampled,
                    model: selection.model,
                },
            );
        }

        Ok((
            FoldModels {
                fold: fold.index,
                models,
            },
            frame,
        ))
    }
}

fn check_folds_disjoint(folds: &[Fold]) -> Result<()> {
    let mut owner: HashMap<TrajectoryId, usize> = HashMap::new();
    for fold in folds {
        for &id in &fold.held_out {
            if let Some(&first) = owner.get(&id) {
                return Err(CvError::OverlappingFolds {
                    id,
                    first,
                    second: fold.index,
                });
            }
            owner.insert(id, fold.index);
        }
    }
    Ok(())
}

/// Seed of one (fold, label) cell, independent of the order cells run in.
/// Adjacent run seeds do not share cell streams.
fn cell_seed(seed: u64, fold: usize, label: Label) -> u64 {
    let h = splitmix64(seed);
    let h = splitmix64(h ^ fold as u64);
    splitmix64(h ^ label as u64)
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Rows of `coords` at `rows`, uniformly sampled down to `cap` without
/// replacement when there are more.
fn subsample(coords: &Array2<f64>, rows: &[usize], cap: usize, rng: &mut StdRng) -> (Array2<f64>, bool) {
    if rows.len() <= cap {
        return (coords.select(Axis(0), rows), false);
    }
    let picked: Vec<usize> = index::sample(rng, rows.len(), cap)
        .into_iter()
        .map(|i| rows[i])
        .collect();
    (coords.select(Axis(0), &picked), true)
}
