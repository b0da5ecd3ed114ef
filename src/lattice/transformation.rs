//! Lattice Node Identity
//!
//! A [`Transformation`] names one point of the generalization lattice. Its
//! identity (generalization vector, internal index, id, level) is fixed at
//! construction; property bits and cached scores live in the solution
//! space's shared registries and only ever transition monotonically.

use std::sync::Arc;

use crate::lattice::space::SolutionSpace;
use crate::metric::InformationLoss;

/// Inheritance direction of a property along the lattice's partial order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Successors of a node carrying the property logically carry it too
    Up,
    /// Predecessors inherit it
    Down,
    /// No inheritance
    None,
}

/// Property bits a lattice node can carry. Once set, never unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Property {
    Anonymous = 1 << 0,
    NotAnonymous = 1 << 1,
    KAnonymous = 1 << 2,
    NotKAnonymous = 1 << 3,
    Checked = 1 << 4,
    ForceSnapshot = 1 << 5,
    InsufficientUtility = 1 << 6,
    SuccessorsPruned = 1 << 7,
    Visited = 1 << 8,
}

impl Property {
    /// The monotone inheritance direction of this property
    pub fn direction(self) -> Direction {
        match self {
            Property::Anonymous | Property::KAnonymous | Property::InsufficientUtility => {
                Direction::Up
            }
            Property::NotAnonymous | Property::NotKAnonymous => Direction::Down,
            Property::Checked
            | Property::ForceSnapshot
            | Property::SuccessorsPruned
            | Property::Visited => Direction::None,
        }
    }

    fn bit(self) -> u16 {
        self as u16
    }
}

/// A node's property bitmap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropertySet(u16);

impl PropertySet {
    pub fn empty() -> Self {
        PropertySet(0)
    }

    pub fn contains(self, p: Property) -> bool {
        self.0 & p.bit() != 0
    }

    pub fn insert(&mut self, p: Property) {
        self.0 |= p.bit();
    }

    pub fn with(mut self, p: Property) -> Self {
        self.insert(p);
        self
    }
}

/// Identity of a point in the generalization lattice
#[derive(Debug, Clone)]
pub struct Transformation {
    generalization: Vec<u32>,
    index: Vec<u32>,
    id: u64,
    level: u32,
    space: Arc<SolutionSpace>,
}

impl Transformation {
    pub(crate) fn new(
        generalization: Vec<u32>,
        index: Vec<u32>,
        id: u64,
        space: Arc<SolutionSpace>,
    ) -> Self {
        let level = generalization.iter().sum();
        Transformation {
            generalization,
            index,
            id,
            level,
            space,
        }
    }

    /// User-space generalization vector, one level per quasi-identifier
    pub fn generalization(&self) -> &[u32] {
        &self.generalization
    }

    /// The same vector in the lattice's internal coordinates
    pub fn index(&self) -> &[u32] {
        &self.index
    }

    /// Unique, componentwise-monotone node id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Sum of the generalization vector
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn has_property(&self, p: Property) -> bool {
        self.space.has_property(self.id, p)
    }

    pub fn set_property(&self, p: Property) {
        self.space.set_property(self.id, p);
    }

    /// Write `p` into the property bitmap of every direct successor (if
    /// `p` inherits Up) or predecessor (Down). The neighbor id list is
    /// snapshotted before any write; no per-neighbor node is allocated.
    pub fn propagate_to_neighbors(&self, p: Property) {
        let neighbors: Vec<u64> = match p.direction() {
            Direction::Up => self.space.successors_of(&self.index),
            Direction::Down => self.space.predecessors_of(&self.index),
            Direction::None => return,
        };
        for id in neighbors {
            self.space.set_property(id, p);
        }
    }

    /// Mark this node checked with its classification and scores.
    ///
    /// Idempotent for equal scores; the registries never expose two
    /// distinct non-null score values for one node.
    pub fn set_checked(
        &self,
        anonymous: bool,
        loss: InformationLoss,
        lower_bound: InformationLoss,
    ) {
        self.space.set_information_loss(self.id, loss);
        self.space.set_lower_bound(self.id, lower_bound);
        self.set_property(if anonymous {
            Property::Anonymous
        } else {
            Property::NotAnonymous
        });
        self.set_property(Property::Checked);
    }

    pub fn information_loss(&self) -> Option<InformationLoss> {
        self.space.information_loss(self.id)
    }

    pub fn lower_bound(&self) -> Option<InformationLoss> {
        self.space.lower_bound(self.id)
    }

    /// Lowest possible score of this node; equals the information loss
    /// once the node has been fully checked
    pub fn lowest_score(&self) -> Option<InformationLoss> {
        self.information_loss()
    }

    /// Highest possible score; equals the loss once fully checked
    pub fn highest_score(&self) -> Option<InformationLoss> {
        self.information_loss()
    }

    /// Whether a prior check fully resolved this node's score range
    pub fn is_score_resolved(&self) -> bool {
        self.has_property(Property::Checked)
            && self.lowest_score().is_some()
            && self.lowest_score() == self.highest_score()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_directions() {
        assert_eq!(Property::Anonymous.direction(), Direction::Up);
        assert_eq!(Property::NotAnonymous.direction(), Direction::Down);
        assert_eq!(Property::Checked.direction(), Direction::None);
        assert_eq!(Property::InsufficientUtility.direction(), Direction::Up);
    }

    #[test]
    fn test_property_set_bits() {
        let mut set = PropertySet::empty();
        assert!(!set.contains(Property::Visited));
        set.insert(Property::Visited);
        set.insert(Property::Checked);
        assert!(set.contains(Property::Visited));
        assert!(set.contains(Property::Checked));
        assert!(!set.contains(Property::Anonymous));
    }
}
