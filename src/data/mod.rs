//! Point table, trajectory labels and fold definitions.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{CvError, Result};

/// Identifier of a row of the input table.
pub type RowId = u64;
/// Identifier of a trajectory.
pub type TrajectoryId = u64;
/// Trajectory-cluster label, in `[0, num_labels)`.
pub type Label = usize;

/// Per-point input table: longitude, latitude and owning trajectory,
/// indexed by a unique row id.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPoints {
    index: Vec<RowId>,
    lons: Array1<f64>,
    lats: Array1<f64>,
    id_traj: Vec<TrajectoryId>,
}

impl TrajectoryPoints {
    pub fn new(
        index: Vec<RowId>,
        lons: Array1<f64>,
        lats: Array1<f64>,
        id_traj: Vec<TrajectoryId>,
    ) -> Result<Self> {
        let n = index.len();
        if lons.len() != n || lats.len() != n || id_traj.len() != n {
            return Err(CvError::InvalidInput(format!(
                "column lengths differ: index={}, lons={}, lats={}, id_traj={}",
                n,
                lons.len(),
                lats.len(),
                id_traj.len()
            )));
        }
        let mut seen = HashSet::with_capacity(n);
        for row in &index {
            if !seen.insert(*row) {
                return Err(CvError::InvalidInput(format!("duplicate row id {}", row)));
            }
        }
        Ok(TrajectoryPoints {
            index,
            lons,
            lats,
            id_traj,
        })
    }

    /// Builds a table whose row ids are the positions `0..n`.
    pub fn from_columns(
        lons: Array1<f64>,
        lats: Array1<f64>,
        id_traj: Vec<TrajectoryId>,
    ) -> Result<Self> {
        let index = (0..id_traj.len() as RowId).collect();
        Self::new(index, lons, lats, id_traj)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[RowId] {
        &self.index
    }

    pub fn id_traj(&self) -> &[TrajectoryId] {
        &self.id_traj
    }

    pub fn lons(&self) -> &Array1<f64> {
        &self.lons
    }

    pub fn lats(&self) -> &Array1<f64> {
        &self.lats
    }

    /// `(lon, lat)` of the rows at the given positions, one row per point.
    pub fn coords(&self, positions: &[usize]) -> Array2<f64> {
        let mut out = Array2::zeros((positions.len(), 2));
        for (i, &p) in positions.iter().enumerate() {
            out[[i, 0]] = self.lons[p];
            out[[i, 1]] = self.lats[p];
        }
        out
    }

    /// Distinct trajectory ids, ascending.
    pub fn trajectory_ids(&self) -> Vec<TrajectoryId> {
        let ids: BTreeSet<TrajectoryId> = self.id_traj.iter().copied().collect();
        ids.into_iter().collect()
    }
}

/// Mapping from trajectory id to its cluster label.
#[derive(Debug, Clone, PartialEq)]
pub struct Labels {
    by_trajectory: BTreeMap<TrajectoryId, Label>,
    num_labels: usize,
}

impl Labels {
    pub fn new(by_trajectory: BTreeMap<TrajectoryId, Label>, num_labels: usize) -> Result<Self> {
        if num_labels == 0 {
            return Err(CvError::InvalidInput("num_labels must be positive".into()));
        }
        if let Some((id, label)) = by_trajectory.iter().find(|(_, &l)| l >= num_labels) {
            return Err(CvError::InvalidInput(format!(
                "trajectory {} has label {} outside [0, {})",
                id, label, num_labels
            )));
        }
        Ok(Labels {
            by_trajectory,
            num_labels,
        })
    }

    /// Labels given as an array indexed by trajectory id.
    pub fn from_slice(labels: &[Label]) -> Result<Self> {
        let num_labels = labels.iter().max().map_or(0, |&m| m + 1);
        let by_trajectory = labels
            .iter()
            .enumerate()
            .map(|(id, &label)| (id as TrajectoryId, label))
            .collect();
        Self::new(by_trajectory, num_labels)
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    pub fn get(&self, id: TrajectoryId) -> Option<Label> {
        self.by_trajectory.get(&id).copied()
    }

    pub fn label_of(&self, id: TrajectoryId) -> Result<Label> {
        self.get(id).ok_or(CvError::UnlabeledTrajectory(id))
    }

    /// Fails on the smallest labelled trajectory absent from `present`.
    pub fn check_present<'a, I>(&self, present: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a TrajectoryId>,
    {
        let present: HashSet<TrajectoryId> = present.into_iter().copied().collect();
        match self.by_trajectory.keys().find(|&&id| !present.contains(&id)) {
            Some(&id) => Err(CvError::MissingTrajectory(id)),
            None => Ok(()),
        }
    }

    /// Trajectories assigned to `label`.
    pub fn members(&self, label: Label) -> HashSet<TrajectoryId> {
        self.by_trajectory
            .iter()
            .filter(|(_, &l)| l == label)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Number of trajectories per label.
    pub fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_labels];
        for &label in self.by_trajectory.values() {
            counts[label] += 1;
        }
        counts
    }
}

/// One cross-validation partition: the trajectories held out for testing.
#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    pub index: usize,
    pub held_out: HashSet<TrajectoryId>,
}

impl Fold {
    pub fn new<I: IntoIterator<Item = TrajectoryId>>(index: usize, held_out: I) -> Self {
        Fold {
            index,
            held_out: held_out.into_iter().collect(),
        }
    }
}

/// Randomly partitions trajectory ids into `cv_size` disjoint folds that
/// together cover every id. Fold sizes differ by at most one.
pub fn random_folds<R: Rng + ?Sized>(
    trajectory_ids: &[TrajectoryId],
    cv_size: usize,
    rng: &mut R,
) -> Result<Vec<Fold>> {
    if cv_size == 0 || cv_size > trajectory_ids.len() {
        return Err(CvError::InvalidInput(format!(
            "cannot split {} trajectories into {} folds",
            trajectory_ids.len(),
            cv_size
        )));
    }
    let mut ids = trajectory_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    if ids.len() != trajectory_ids.len() {
        return Err(CvError::InvalidInput("duplicate trajectory ids".into()));
    }
    ids.shuffle(rng);

    let mut groups = vec![Vec::new(); cv_size];
    for (i, id) in ids.into_iter().enumerate() {
        groups[i % cv_size].push(id);
    }
    Ok(groups
        .into_iter()
        .enumerate()
        .map(|(i, group)| Fold::new(i, group))
        .collect())
}
