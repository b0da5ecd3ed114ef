//! Output Buffer
//!
//! The materialized result of applying one lattice node: a generalized
//! code matrix (outlier mask in the high bit of column 0) and a
//! row-aligned microaggregation matrix, plus provenance back to the input
//! buffer they were derived from.

use std::sync::Arc;

use crate::data::{DataMatrix, RowSet, OUTLIER_MASK};

/// A pair of row-aligned result matrices bound to their input buffer
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    generalized: DataMatrix,
    microaggregated: DataMatrix,
    input: Arc<DataMatrix>,
    node_id: u64,
    node_generalization: Vec<u32>,
    optimized: bool,
}

impl OutputBuffer {
    pub fn new(
        generalized: DataMatrix,
        microaggregated: DataMatrix,
        input: Arc<DataMatrix>,
        node_id: u64,
        node_generalization: Vec<u32>,
    ) -> Self {
        debug_assert_eq!(generalized.rows(), input.rows());
        debug_assert!(
            microaggregated.is_empty() || microaggregated.rows() == generalized.rows()
        );
        OutputBuffer {
            generalized,
            microaggregated,
            input,
            node_id,
            node_generalization,
            optimized: false,
        }
    }

    pub fn rows(&self) -> usize {
        self.generalized.rows()
    }

    /// Whether row `r` carries the outlier mask
    pub fn is_outlier(&self, r: usize) -> bool {
        self.generalized.get(r, 0) & OUTLIER_MASK != 0
    }

    pub fn outlier_count(&self) -> usize {
        (0..self.rows()).filter(|&r| self.is_outlier(r)).count()
    }

    /// All outlier rows as a row set
    pub fn outlier_rows(&self) -> RowSet {
        let mut set = RowSet::new(self.rows());
        for r in 0..self.rows() {
            if self.is_outlier(r) {
                set.insert(r);
            }
        }
        set
    }

    pub fn generalized(&self) -> &DataMatrix {
        &self.generalized
    }

    pub fn generalized_mut(&mut self) -> &mut DataMatrix {
        &mut self.generalized
    }

    pub fn microaggregated(&self) -> &DataMatrix {
        &self.microaggregated
    }

    pub fn microaggregated_mut(&mut self) -> &mut DataMatrix {
        &mut self.microaggregated
    }

    /// The input buffer these matrices were derived from
    pub fn input(&self) -> &Arc<DataMatrix> {
        &self.input
    }

    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    pub fn node_generalization(&self) -> &[u32] {
        &self.node_generalization
    }

    /// Record the generalization vector of the last transformation merged
    /// into this buffer
    pub fn set_node_generalization(&mut self, generalization: Vec<u32>) {
        self.node_generalization = generalization;
    }

    /// Whether local recoding has mutated this buffer
    pub fn optimized(&self) -> bool {
        self.optimized
    }

    pub fn set_optimized(&mut self, optimized: bool) {
        self.optimized = optimized;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> OutputBuffer {
        let mut generalized = DataMatrix::new(3, 2);
        generalized.set(1, 0, 5 | OUTLIER_MASK);
        let input = Arc::new(DataMatrix::new(3, 2));
        OutputBuffer::new(generalized, DataMatrix::new(3, 0), input, 7, vec![1, 0])
    }

    #[test]
    fn test_outlier_mask_detection() {
        let buf = buffer();
        assert!(!buf.is_outlier(0));
        assert!(buf.is_outlier(1));
        assert_eq!(buf.outlier_count(), 1);
        let rows: Vec<usize> = buf.outlier_rows().iter().collect();
        assert_eq!(rows, vec![1]);
    }
}
