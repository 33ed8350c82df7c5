//! Lineage trees of single-cell trajectories.
//!
//! A schnitz is one cell's trace between divisions; a lineage owns a flat
//! vector of schnitzes linked by indices (parent and up to two
//! daughters), the same index-linked representation used for the
//! stoichiometry-bound reactions elsewhere in the crate.

/// One cell's trajectory segment: sampled times, per-time state rows, and
/// the volume trace, plus links into the owning [`Lineage`].
#[derive(Clone, Debug, Default)]
pub struct Schnitz {
    pub times: Vec<f64>,
    pub data: Vec<Vec<f64>>,
    pub volumes: Vec<f64>,
    pub parent: Option<usize>,
    pub daughter1: Option<usize>,
    pub daughter2: Option<usize>,
}

impl Schnitz {
    pub fn new(times: Vec<f64>, data: Vec<Vec<f64>>, volumes: Vec<f64>) -> Self {
        Schnitz {
            times,
            data,
            volumes,
            parent: None,
            daughter1: None,
            daughter2: None,
        }
    }

    /// Append one sampled point.
    pub fn push_point(&mut self, time: f64, state: &[f64], volume: f64) {
        self.times.push(time);
        self.data.push(state.to_vec());
        self.volumes.push(volume);
    }

    /// Birth time, if any point was recorded.
    pub fn birth_time(&self) -> Option<f64> {
        self.times.first().copied()
    }
}

/// A tree of schnitzes descended from a common ancestor.
#[derive(Clone, Debug, Default)]
pub struct Lineage {
    schnitzes: Vec<Schnitz>,
}

impl Lineage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a schnitz and return its index.
    pub fn push(&mut self, schnitz: Schnitz) -> usize {
        self.schnitzes.push(schnitz);
        self.schnitzes.len() - 1
    }

    /// Append a daughter of `parent`, wiring both directions of the link.
    pub fn push_daughter(&mut self, parent: usize, mut schnitz: Schnitz) -> usize {
        schnitz.parent = Some(parent);
        let idx = self.push(schnitz);
        let slot = &mut self.schnitzes[parent];
        if slot.daughter1.is_none() {
            slot.daughter1 = Some(idx);
        } else {
            slot.daughter2 = Some(idx);
        }
        idx
    }

    pub fn len(&self) -> usize {
        self.schnitzes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schnitzes.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Schnitz> {
        self.schnitzes.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Schnitz> {
        self.schnitzes.get_mut(idx)
    }

    pub fn schnitzes(&self) -> &[Schnitz] {
        &self.schnitzes
    }

    /// Restrict the lineage to the time window `[t_min, t_max]`.
    ///
    /// A schnitz survives only if it was born inside the window; a cell
    /// straddling the left edge has no complete birth-to-division record
    /// and is dropped. Surviving traces are clipped to `t_max`, and
    /// parent/daughter links are remapped so every non-null link targets
    /// a surviving schnitz.
    pub fn truncate(&self, t_min: f64, t_max: f64) -> Lineage {
        let mut index_map: Vec<Option<usize>> = vec![None; self.schnitzes.len()];
        let mut kept: Vec<Schnitz> = Vec::new();

        for (idx, schnitz) in self.schnitzes.iter().enumerate() {
            let Some(birth) = schnitz.birth_time() else {
                continue;
            };
            if birth < t_min || birth > t_max {
                continue;
            }
            let end = schnitz.times.partition_point(|&t| t <= t_max);
            if end == 0 {
                continue;
            }
            index_map[idx] = Some(kept.len());
            kept.push(Schnitz {
                times: schnitz.times[..end].to_vec(),
                data: schnitz.data.iter().take(end).cloned().collect(),
                volumes: schnitz.volumes.iter().take(end).copied().collect(),
                parent: schnitz.parent,
                daughter1: schnitz.daughter1,
                daughter2: schnitz.daughter2,
            });
        }

        for schnitz in &mut kept {
            schnitz.parent = schnitz.parent.and_then(|p| index_map[p]);
            schnitz.daughter1 = schnitz.daughter1.and_then(|d| index_map[d]);
            schnitz.daughter2 = schnitz.daughter2.and_then(|d| index_map[d]);
        }

        Lineage { schnitzes: kept }
    }
}
