//! Result Registry
//!
//! Tracks the live output handles of one result and enforces the buffer
//! lock: at most one unforked handle exists at any time, modeled as a
//! two-state machine.
//!
//! ```text
//! Free ──set_lock──> Locked { handle, node }
//!   ^                      │
//!   └──────release─────────┘
//! ```
//!
//! The node cache maps node id to the unforked handle last produced for
//! it; forked handles are exclusively owned by their caller and never
//! registered.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::data::RowSet;
use crate::output::handle::DataHandleOutput;

#[derive(Debug, Default)]
enum LockState {
    #[default]
    Free,
    Locked {
        handle: DataHandleOutput,
        node: u64,
    },
}

/// Per-result handle bookkeeping
#[derive(Debug, Default)]
pub struct ResultRegistry {
    lock: Mutex<LockState>,
    cache: Mutex<HashMap<u64, DataHandleOutput>>,
    input_subset: Mutex<Option<RowSet>>,
}

impl ResultRegistry {
    pub fn new() -> Self {
        ResultRegistry::default()
    }

    /// Whether an unforked handle is outstanding
    pub fn is_locked(&self) -> bool {
        matches!(*self.lock.lock(), LockState::Locked { .. })
    }

    /// The locked handle and its node, if any
    pub fn locked_entry(&self) -> Option<(DataHandleOutput, u64)> {
        match &*self.lock.lock() {
            LockState::Free => None,
            LockState::Locked { handle, node } => Some((handle.clone(), *node)),
        }
    }

    /// Transition `Free -> Locked`. Must not be called while locked.
    pub fn set_lock(&self, handle: DataHandleOutput, node: u64) {
        let mut state = self.lock.lock();
        debug_assert!(
            matches!(*state, LockState::Free),
            "registry locked while already locked"
        );
        *state = LockState::Locked { handle, node };
    }

    /// Release `handle`: clears the lock if `handle` holds it and evicts
    /// it from the node cache. A no-op for any other handle.
    pub fn release(&self, handle: &DataHandleOutput) -> bool {
        let mut released = false;
        {
            let mut state = self.lock.lock();
            if let LockState::Locked { handle: locked, .. } = &*state {
                if locked.same_handle(handle) {
                    *state = LockState::Free;
                    released = true;
                }
            }
        }
        let mut cache = self.cache.lock();
        cache.retain(|_, cached| !cached.same_handle(handle));
        if released {
            tracing::debug!(node = handle.node_id(), "buffer_lock_released");
        }
        released
    }

    /// The unforked handle cached for `node`, if any
    pub fn cached(&self, node: u64) -> Option<DataHandleOutput> {
        self.cache.lock().get(&node).cloned()
    }

    /// Cache the unforked handle produced for `node`
    pub fn register(&self, node: u64, handle: DataHandleOutput) {
        self.cache.lock().insert(node, handle);
    }

    /// The row subset the input handle was created with, if any
    pub fn input_subset(&self) -> Option<RowSet> {
        self.input_subset.lock().clone()
    }

    pub fn set_input_subset(&self, subset: RowSet) {
        *self.input_subset.lock() = Some(subset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataDefinition, DataMatrix, Dictionary};
    use crate::output::buffer::OutputBuffer;
    use std::sync::Arc;

    fn handle(node: u64) -> DataHandleOutput {
        let buffer = OutputBuffer::new(
            DataMatrix::new(1, 1),
            DataMatrix::new(1, 0),
            Arc::new(DataMatrix::new(1, 1)),
            node,
            vec![0],
        );
        DataHandleOutput::new(
            buffer,
            Arc::new(Dictionary::with_columns(1)),
            DataDefinition::new(),
            false,
        )
    }

    #[test]
    fn test_lock_state_machine() {
        let registry = ResultRegistry::new();
        assert!(!registry.is_locked());

        let h = handle(3);
        registry.set_lock(h.clone(), 3);
        assert!(registry.is_locked());
        let (locked, node) = registry.locked_entry().unwrap();
        assert!(locked.same_handle(&h));
        assert_eq!(node, 3);

        // Releasing an unrelated handle is a no-op
        let other = handle(4);
        assert!(!registry.release(&other));
        assert!(registry.is_locked());

        assert!(registry.release(&h));
        assert!(!registry.is_locked());
    }

    #[test]
    fn test_release_evicts_cache() {
        let registry = ResultRegistry::new();
        let h = handle(5);
        registry.register(5, h.clone());
        assert!(registry.cached(5).is_some());
        registry.release(&h);
        assert!(registry.cached(5).is_none());
    }
}
