//! Generalization Lattice
//!
//! The partial order of all generalization vectors under componentwise
//! `<=`. The lattice tracks the search's global optimum and maintains an
//! estimate of the global information-loss range from the scores recorded
//! in the solution space.

pub mod space;
pub mod transformation;

pub use space::SolutionSpace;
pub use transformation::{Direction, Property, PropertySet, Transformation};

use parking_lot::RwLock;
use std::sync::Arc;

use crate::metric::InformationLoss;

/// Search-level bookkeeping over a solution space
#[derive(Debug)]
pub struct Lattice {
    space: Arc<SolutionSpace>,
    optimum: RwLock<Option<u64>>,
    loss_bounds: RwLock<Option<(InformationLoss, InformationLoss)>>,
}

impl Lattice {
    pub fn new(space: Arc<SolutionSpace>) -> Self {
        Lattice {
            space,
            optimum: RwLock::new(None),
            loss_bounds: RwLock::new(None),
        }
    }

    pub fn space(&self) -> &Arc<SolutionSpace> {
        &self.space
    }

    /// Node id of the global optimum, if the search found one
    pub fn optimum(&self) -> Option<u64> {
        *self.optimum.read()
    }

    pub fn set_optimum(&self, id: u64) {
        *self.optimum.write() = Some(id);
    }

    /// Current estimate of the global (min, max) information loss
    pub fn loss_bounds(&self) -> Option<(InformationLoss, InformationLoss)> {
        *self.loss_bounds.read()
    }

    /// Re-estimate the global information-loss range from all scores
    /// recorded so far
    pub fn update_loss_bounds(&self) {
        if let Some(extremes) = self.space.score_extremes() {
            *self.loss_bounds.write() = Some(extremes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataDefinition, Hierarchy};

    #[test]
    fn test_optimum_and_bounds() {
        let def = DataDefinition::new()
            .quasi_identifier("a", Hierarchy::from_slices(&[&["x", "*"]]));
        let space = SolutionSpace::from_definition(&def).unwrap();
        let lattice = Lattice::new(Arc::clone(&space));
        assert!(lattice.optimum().is_none());
        assert!(lattice.loss_bounds().is_none());

        space.set_information_loss(0, InformationLoss::from(0.2));
        space.set_information_loss(1, InformationLoss::from(0.9));
        space.set_lower_bound(0, InformationLoss::from(0.1));
        lattice.set_optimum(0);
        lattice.update_loss_bounds();

        assert_eq!(lattice.optimum(), Some(0));
        let (lo, hi) = lattice.loss_bounds().unwrap();
        assert_eq!(lo, InformationLoss::from(0.1));
        assert_eq!(hi, InformationLoss::from(0.9));
    }
}
