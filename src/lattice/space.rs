//! Solution Space
//!
//! The bijection between user-facing generalization vectors and the
//! lattice's internal coordinate system, plus the shared registries for
//! node properties and cached scores.
//!
//! Internal coordinates are zero-based against each quasi-identifier's
//! configured minimum level; node ids are mixed-radix integers over the
//! internal coordinates, so raising any component raises the id.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::data::DataDefinition;
use crate::error::{EngineError, EngineResult};
use crate::lattice::transformation::{Property, PropertySet, Transformation};
use crate::metric::InformationLoss;

#[derive(Debug, Default, Clone, Copy)]
struct NodeScores {
    information_loss: Option<InformationLoss>,
    lower_bound: Option<InformationLoss>,
}

/// Coordinate conversion, node identity, and per-node registries
#[derive(Debug)]
pub struct SolutionSpace {
    min_levels: Vec<u32>,
    max_levels: Vec<u32>,
    /// Number of internal coordinate values per column (`max - min + 1`)
    dims: Vec<u32>,
    /// Mixed-radix strides; the last column is the fastest-moving digit
    strides: Vec<u64>,
    properties: RwLock<HashMap<u64, PropertySet>>,
    scores: RwLock<HashMap<u64, NodeScores>>,
}

impl SolutionSpace {
    /// Build the space from a definition's per-column level ranges
    pub fn from_definition(definition: &DataDefinition) -> EngineResult<Arc<Self>> {
        let qis = definition.quasi_identifiers();
        if qis.is_empty() {
            return Err(EngineError::InvalidArgument(
                "definition declares no quasi-identifiers".to_string(),
            ));
        }
        let mut min_levels = Vec::with_capacity(qis.len());
        let mut max_levels = Vec::with_capacity(qis.len());
        for qi in qis {
            let top = qi.hierarchy.levels().saturating_sub(1) as u32;
            if qi.min_level > qi.max_level || qi.max_level > top {
                return Err(EngineError::InvalidArgument(format!(
                    "invalid level range [{}, {}] for '{}' (hierarchy has {} levels)",
                    qi.min_level,
                    qi.max_level,
                    qi.name,
                    qi.hierarchy.levels()
                )));
            }
            min_levels.push(qi.min_level);
            max_levels.push(qi.max_level);
        }
        let dims: Vec<u32> = min_levels
            .iter()
            .zip(&max_levels)
            .map(|(lo, hi)| hi - lo + 1)
            .collect();
        let mut strides = vec![1u64; dims.len()];
        for i in (0..dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * u64::from(dims[i + 1]);
        }
        Ok(Arc::new(SolutionSpace {
            min_levels,
            max_levels,
            dims,
            strides,
            properties: RwLock::new(HashMap::new()),
            scores: RwLock::new(HashMap::new()),
        }))
    }

    /// Number of quasi-identifier columns
    pub fn columns(&self) -> usize {
        self.dims.len()
    }

    /// Total number of lattice nodes
    pub fn size(&self) -> u64 {
        self.dims.iter().map(|&d| u64::from(d)).product()
    }

    pub fn min_levels(&self) -> &[u32] {
        &self.min_levels
    }

    pub fn max_levels(&self) -> &[u32] {
        &self.max_levels
    }

    /// Convert a user-space generalization vector to internal coordinates
    pub fn to_internal(&self, generalization: &[u32]) -> EngineResult<Vec<u32>> {
        if generalization.len() != self.dims.len() {
            return Err(EngineError::InvalidArgument(format!(
                "generalization vector has {} components, lattice has {}",
                generalization.len(),
                self.dims.len()
            )));
        }
        generalization
            .iter()
            .enumerate()
            .map(|(i, &level)| {
                if level < self.min_levels[i] || level > self.max_levels[i] {
                    Err(EngineError::InvalidArgument(format!(
                        "level {} out of range [{}, {}] for column {}",
                        level, self.min_levels[i], self.max_levels[i], i
                    )))
                } else {
                    Ok(level - self.min_levels[i])
                }
            })
            .collect()
    }

    /// Convert internal coordinates back to a user-space vector
    pub fn from_internal(&self, index: &[u32]) -> Vec<u32> {
        index
            .iter()
            .zip(&self.min_levels)
            .map(|(&i, &min)| i + min)
            .collect()
    }

    /// Mixed-radix id of an internal coordinate vector
    pub fn id_of(&self, index: &[u32]) -> u64 {
        index
            .iter()
            .zip(&self.strides)
            .map(|(&i, &s)| u64::from(i) * s)
            .sum()
    }

    /// Internal coordinates of a node id
    pub fn index_of(&self, id: u64) -> Vec<u32> {
        let mut rest = id;
        self.strides
            .iter()
            .map(|&s| {
                let digit = rest / s;
                rest %= s;
                digit as u32
            })
            .collect()
    }

    /// Resolve a user-space vector to a [`Transformation`]
    pub fn transformation_for(self: &Arc<Self>, generalization: &[u32]) -> EngineResult<Transformation> {
        let index = self.to_internal(generalization)?;
        let id = self.id_of(&index);
        Ok(Transformation::new(
            generalization.to_vec(),
            index,
            id,
            Arc::clone(self),
        ))
    }

    /// Resolve a node id to a [`Transformation`]
    pub fn transformation_for_id(self: &Arc<Self>, id: u64) -> Transformation {
        let index = self.index_of(id);
        let generalization = self.from_internal(&index);
        Transformation::new(generalization, index, id, Arc::clone(self))
    }

    /// Ids of all direct successors of `index` (one component raised)
    pub fn successors_of(&self, index: &[u32]) -> Vec<u64> {
        let id = self.id_of(index);
        (0..index.len())
            .filter(|&i| index[i] + 1 < self.dims[i])
            .map(|i| id + self.strides[i])
            .collect()
    }

    /// Ids of all direct predecessors of `index` (one component lowered)
    pub fn predecessors_of(&self, index: &[u32]) -> Vec<u64> {
        let id = self.id_of(index);
        (0..index.len())
            .filter(|&i| index[i] > 0)
            .map(|i| id - self.strides[i])
            .collect()
    }

    pub fn has_property(&self, id: u64, p: Property) -> bool {
        self.properties
            .read()
            .get(&id)
            .is_some_and(|set| set.contains(p))
    }

    pub fn set_property(&self, id: u64, p: Property) {
        self.properties.write().entry(id).or_default().insert(p);
    }

    pub fn properties_of(&self, id: u64) -> PropertySet {
        self.properties.read().get(&id).copied().unwrap_or_default()
    }

    pub fn information_loss(&self, id: u64) -> Option<InformationLoss> {
        self.scores.read().get(&id).and_then(|s| s.information_loss)
    }

    /// Write-once: an equal re-write is a legal idempotent update, a
    /// differing one is ignored (debug-asserted)
    pub fn set_information_loss(&self, id: u64, loss: InformationLoss) {
        let mut scores = self.scores.write();
        let entry = scores.entry(id).or_default();
        debug_assert!(
            entry.information_loss.is_none() || entry.information_loss == Some(loss),
            "information loss for node {id} written with a second distinct value"
        );
        if entry.information_loss.is_none() {
            entry.information_loss = Some(loss);
        }
    }

    pub fn lower_bound(&self, id: u64) -> Option<InformationLoss> {
        self.scores.read().get(&id).and_then(|s| s.lower_bound)
    }

    pub fn set_lower_bound(&self, id: u64, bound: InformationLoss) {
        let mut scores = self.scores.write();
        let entry = scores.entry(id).or_default();
        debug_assert!(
            entry.lower_bound.is_none() || entry.lower_bound == Some(bound),
            "lower bound for node {id} written with a second distinct value"
        );
        if entry.lower_bound.is_none() {
            entry.lower_bound = Some(bound);
        }
    }

    /// Minimum and maximum of all scores recorded so far
    pub fn score_extremes(&self) -> Option<(InformationLoss, InformationLoss)> {
        let scores = self.scores.read();
        let mut min: Option<InformationLoss> = None;
        let mut max: Option<InformationLoss> = None;
        for entry in scores.values() {
            for candidate in [entry.information_loss, entry.lower_bound].into_iter().flatten() {
                min = Some(min.map_or(candidate, |m| m.min(candidate)));
            }
            if let Some(loss) = entry.information_loss {
                max = Some(max.map_or(loss, |m| m.max(loss)));
            }
        }
        Some((min?, max?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Hierarchy;

    fn space_2x3() -> Arc<SolutionSpace> {
        // Column 0: levels 0..=1, column 1: levels 0..=2
        let def = DataDefinition::new()
            .quasi_identifier(
                "a",
                Hierarchy::from_slices(&[&["x", "*"]]),
            )
            .quasi_identifier(
                "b",
                Hierarchy::from_slices(&[&["y", "y0", "*"]]),
            );
        SolutionSpace::from_definition(&def).unwrap()
    }

    #[test]
    fn test_size_and_bijection() {
        let space = space_2x3();
        assert_eq!(space.size(), 6);
        for id in 0..space.size() {
            let index = space.index_of(id);
            assert_eq!(space.id_of(&index), id);
            let gen = space.from_internal(&index);
            assert_eq!(space.to_internal(&gen).unwrap(), index);
        }
    }

    #[test]
    fn test_id_is_monotone_in_each_component() {
        let space = space_2x3();
        let base = space.id_of(&[0, 1]);
        assert!(space.id_of(&[1, 1]) > base);
        assert!(space.id_of(&[0, 2]) > base);
    }

    #[test]
    fn test_neighbors_respect_bounds() {
        let space = space_2x3();
        let bottom = space.successors_of(&[0, 0]);
        assert_eq!(bottom.len(), 2);
        let top_index = [1, 2];
        assert!(space.successors_of(&top_index).is_empty());
        assert_eq!(space.predecessors_of(&[0, 0]).len(), 0);
        assert_eq!(space.predecessors_of(&top_index).len(), 2);
    }

    #[test]
    fn test_out_of_range_vector_rejected() {
        let space = space_2x3();
        assert!(space.to_internal(&[2, 0]).is_err());
        assert!(space.to_internal(&[0]).is_err());
    }

    #[test]
    fn test_score_write_once() {
        let space = space_2x3();
        space.set_information_loss(3, InformationLoss::from(0.5));
        space.set_information_loss(3, InformationLoss::from(0.5));
        assert_eq!(space.information_loss(3), Some(InformationLoss::from(0.5)));
    }
}
