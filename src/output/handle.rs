//! Data Handles
//!
//! [`DataHandleOutput`] is the caller-facing view over an output buffer.
//! Cloning a handle clones the reference, not the buffer; handle identity
//! (used by the registry's lock and cache) is reference identity.
//!
//! [`DataHandleInput`] is the minimal input-side handle the deserializing
//! result constructor operates on: it carries the attached definition,
//! exposes the manager's matrices, and is locked while results exist.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::data::{DataDefinition, DataManager, DataMatrix, Dictionary, MemoryDataManager, RowSet, SUPPRESSED};
use crate::output::buffer::OutputBuffer;

/// Caller-facing handle over one materialized output
#[derive(Debug, Clone)]
pub struct DataHandleOutput {
    inner: Arc<HandleShared>,
}

#[derive(Debug)]
struct HandleShared {
    buffer: RwLock<OutputBuffer>,
    dictionary: Arc<Dictionary>,
    definition: DataDefinition,
    forked: bool,
}

impl DataHandleOutput {
    pub(crate) fn new(
        buffer: OutputBuffer,
        dictionary: Arc<Dictionary>,
        definition: DataDefinition,
        forked: bool,
    ) -> Self {
        DataHandleOutput {
            inner: Arc::new(HandleShared {
                buffer: RwLock::new(buffer),
                dictionary,
                definition,
                forked,
            }),
        }
    }

    /// Reference identity: true iff both handles view the same buffer
    pub fn same_handle(&self, other: &DataHandleOutput) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn rows(&self) -> usize {
        self.inner.buffer.read().rows()
    }

    /// Whether row `r` is still re-identifiable (carries the outlier mask)
    pub fn is_outlier(&self, r: usize) -> bool {
        self.inner.buffer.read().is_outlier(r)
    }

    pub fn outlier_count(&self) -> usize {
        self.inner.buffer.read().outlier_count()
    }

    pub fn outlier_rows(&self) -> RowSet {
        self.inner.buffer.read().outlier_rows()
    }

    /// Whether local recoding has mutated this output
    pub fn optimized(&self) -> bool {
        self.inner.buffer.read().optimized()
    }

    /// Whether this handle exclusively owns its buffer
    pub fn is_forked(&self) -> bool {
        self.inner.forked
    }

    /// Id of the lattice node this output was produced from
    pub fn node_id(&self) -> u64 {
        self.inner.buffer.read().node_id()
    }

    /// Generalization vector of the last transformation written into the
    /// buffer (updated by local recoding)
    pub fn node_generalization(&self) -> Vec<u32> {
        self.inner.buffer.read().node_generalization().to_vec()
    }

    /// The input buffer this output was derived from
    pub fn input_buffer(&self) -> Arc<DataMatrix> {
        Arc::clone(self.inner.buffer.read().input())
    }

    pub fn definition(&self) -> &DataDefinition {
        &self.inner.definition
    }

    pub(crate) fn dictionary(&self) -> &Arc<Dictionary> {
        &self.inner.dictionary
    }

    pub(crate) fn with_buffer<R>(&self, f: impl FnOnce(&OutputBuffer) -> R) -> R {
        f(&self.inner.buffer.read())
    }

    pub(crate) fn with_buffer_mut<R>(&self, f: impl FnOnce(&mut OutputBuffer) -> R) -> R {
        f(&mut self.inner.buffer.write())
    }

    /// Decode row `r` to strings: quasi-identifier columns first, then
    /// microaggregated columns. Outlier rows render fully suppressed.
    pub fn row_strings(&self, r: usize) -> Vec<String> {
        let buffer = self.inner.buffer.read();
        let qi_count = self.inner.definition.quasi_identifiers().len();
        let micro_count = self.inner.definition.microaggregations().len();
        let mut out = Vec::with_capacity(qi_count + micro_count);
        let suppressed = buffer.is_outlier(r);
        for c in 0..qi_count {
            if suppressed {
                out.push(SUPPRESSED.to_string());
            } else {
                let code = buffer.generalized().get(r, c);
                out.push(
                    self.inner
                        .dictionary
                        .value(c, code)
                        .unwrap_or_else(|| SUPPRESSED.to_string()),
                );
            }
        }
        for m in 0..micro_count {
            let code = buffer.microaggregated().get(r, m);
            out.push(
                self.inner
                    .dictionary
                    .value(qi_count + m, code)
                    .unwrap_or_else(|| SUPPRESSED.to_string()),
            );
        }
        out
    }

    /// Iterate all rows in decoded string form
    pub fn iter_rows(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        (0..self.rows()).map(|r| self.row_strings(r))
    }
}

/// Input-side handle used by the deserializing constructor
#[derive(Debug, Default)]
pub struct DataHandleInput {
    definition: Option<DataDefinition>,
    generalized: Option<Arc<DataMatrix>>,
    analyzed: Option<DataMatrix>,
    statics: Option<DataMatrix>,
    locked: bool,
}

impl DataHandleInput {
    pub fn new() -> Self {
        DataHandleInput::default()
    }

    /// Attach the data definition this input is interpreted under
    pub fn attach_definition(&mut self, definition: DataDefinition) {
        self.definition = Some(definition);
    }

    pub fn definition(&self) -> Option<&DataDefinition> {
        self.definition.as_ref()
    }

    /// Expose the manager's three matrices through this handle
    pub fn expose(&mut self, manager: &MemoryDataManager) {
        self.generalized = Some(Arc::clone(manager.generalized_matrix()));
        self.analyzed = Some(manager.analyzed_matrix().clone());
        self.statics = Some(manager.static_matrix().clone());
    }

    /// Lock the input: read-only to outsiders while results exist
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn generalized(&self) -> Option<&Arc<DataMatrix>> {
        self.generalized.as_ref()
    }

    pub fn analyzed(&self) -> Option<&DataMatrix> {
        self.analyzed.as_ref()
    }

    pub fn statics(&self) -> Option<&DataMatrix> {
        self.statics.as_ref()
    }
}
