//! Core Data Representation
//!
//! Row-major code matrices, the append-only dictionary shared between the
//! data manager and every output buffer, and row subsets.
//!
//! # Architecture
//!
//! ```text
//! MemoryDataManager
//!   |-- DataMatrix (generalized)   level-0 quasi-identifier codes
//!   |-- DataMatrix (analyzed)      microaggregated attribute codes
//!   |-- DataMatrix (static)        untouched attribute codes
//!   |-- Vec<MaterializedHierarchy> value code -> level -> generalized code
//!   `-- Arc<Dictionary>            code <-> string, append-only
//! ```
//!
//! All cell values are `u32` dictionary codes. The high bit of column 0 of
//! a generalized output matrix is reserved as the outlier mask.

pub mod definition;
pub mod manager;
pub mod rowset;

pub use definition::{
    Aggregator, DataDefinition, Hierarchy, MicroAggregationKind, MicroAggregationSpec,
    QuasiIdentifier,
};
pub use manager::{DataManager, MaterializedHierarchy, MemoryDataManager};
pub use rowset::RowSet;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// High bit of generalized column 0: set iff the row is an outlier
pub const OUTLIER_MASK: u32 = 1 << 31;

/// Removes the outlier mask from a code
pub const VALUE_MASK: u32 = OUTLIER_MASK - 1;

/// Rendering of a suppressed cell
pub const SUPPRESSED: &str = "*";

/// Dense row-major matrix of dictionary codes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMatrix {
    rows: usize,
    cols: usize,
    cells: Vec<u32>,
}

impl DataMatrix {
    /// Create a zero-filled matrix
    pub fn new(rows: usize, cols: usize) -> Self {
        DataMatrix {
            rows,
            cols,
            cells: vec![0; rows * cols],
        }
    }

    /// Create a matrix from row-major cells. Panics in debug builds if the
    /// cell count does not match `rows * cols`.
    pub fn from_cells(rows: usize, cols: usize, cells: Vec<u32>) -> Self {
        debug_assert_eq!(cells.len(), rows * cols);
        DataMatrix { rows, cols, cells }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> u32 {
        self.cells[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: u32) {
        self.cells[row * self.cols + col] = value;
    }

    /// Borrow one row as a slice
    pub fn row(&self, row: usize) -> &[u32] {
        &self.cells[row * self.cols..(row + 1) * self.cols]
    }

    /// Borrow one row mutably
    pub fn row_mut(&mut self, row: usize) -> &mut [u32] {
        &mut self.cells[row * self.cols..(row + 1) * self.cols]
    }

    /// Copy a whole row from `src` into row `dst_row` of `self`.
    /// Both matrices must have the same column count.
    pub fn copy_row_from(&mut self, dst_row: usize, src: &DataMatrix, src_row: usize) {
        debug_assert_eq!(self.cols, src.cols);
        let dst = dst_row * self.cols;
        let s = src_row * src.cols;
        self.cells[dst..dst + self.cols].copy_from_slice(&src.cells[s..s + src.cols]);
    }

    /// CRC32 over the cell contents, used for buffer provenance checks
    pub fn content_hash(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for cell in &self.cells {
            hasher.update(&cell.to_le_bytes());
        }
        hasher.finalize()
    }
}

/// Per-column interning table
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct DictColumn {
    values: Vec<String>,
    #[serde(skip)]
    codes: HashMap<String, u32>,
}

impl DictColumn {
    fn rebuild_codes(&mut self) {
        self.codes = self
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| (v.clone(), i as u32))
            .collect();
    }
}

/// Append-only string dictionary, one interning table per column.
///
/// Shared by reference between the manager and every output buffer; codes
/// are stable for the lifetime of a result.
#[derive(Debug, Default)]
pub struct Dictionary {
    columns: RwLock<Vec<DictColumn>>,
}

/// Serializable copy of a dictionary's contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictionarySnapshot {
    columns: Vec<Vec<String>>,
}

impl DictionarySnapshot {
    /// Interned values per column, in code order
    pub fn columns(&self) -> &[Vec<String>] {
        &self.columns
    }
}

impl Dictionary {
    /// Create a dictionary with `columns` empty interning tables
    pub fn with_columns(columns: usize) -> Self {
        Dictionary {
            columns: RwLock::new(vec![DictColumn::default(); columns]),
        }
    }

    /// Number of columns
    pub fn columns(&self) -> usize {
        self.columns.read().len()
    }

    /// Intern `value` in `col`, returning its stable code
    pub fn register(&self, col: usize, value: &str) -> u32 {
        let mut columns = self.columns.write();
        let column = &mut columns[col];
        if let Some(&code) = column.codes.get(value) {
            return code;
        }
        let code = column.values.len() as u32;
        column.values.push(value.to_string());
        column.codes.insert(value.to_string(), code);
        code
    }

    /// Decode `code` in `col`
    pub fn value(&self, col: usize, code: u32) -> Option<String> {
        self.columns
            .read()
            .get(col)
            .and_then(|c| c.values.get(code as usize))
            .cloned()
    }

    /// Number of codes interned in `col`
    pub fn len(&self, col: usize) -> usize {
        self.columns.read()[col].values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.read().iter().all(|c| c.values.is_empty())
    }

    /// Serializable copy of the current contents
    pub fn snapshot(&self) -> DictionarySnapshot {
        DictionarySnapshot {
            columns: self
                .columns
                .read()
                .iter()
                .map(|c| c.values.clone())
                .collect(),
        }
    }

    /// Restore a dictionary from a snapshot
    pub fn from_snapshot(snapshot: DictionarySnapshot) -> Self {
        let mut columns: Vec<DictColumn> = snapshot
            .columns
            .into_iter()
            .map(|values| DictColumn {
                values,
                codes: HashMap::new(),
            })
            .collect();
        for column in &mut columns {
            column.rebuild_codes();
        }
        Dictionary {
            columns: RwLock::new(columns),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_roundtrip() {
        let mut m = DataMatrix::new(2, 3);
        m.set(0, 0, 7);
        m.set(1, 2, 9);
        assert_eq!(m.get(0, 0), 7);
        assert_eq!(m.get(1, 2), 9);
        assert_eq!(m.row(0), &[7, 0, 0]);
    }

    #[test]
    fn test_matrix_content_hash_changes_with_cells() {
        let a = DataMatrix::from_cells(1, 2, vec![1, 2]);
        let b = DataMatrix::from_cells(1, 2, vec![1, 3]);
        assert_ne!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash(), a.clone().content_hash());
    }

    #[test]
    fn test_dictionary_is_append_only() {
        let dict = Dictionary::with_columns(1);
        let a = dict.register(0, "alpha");
        let b = dict.register(0, "beta");
        assert_eq!(dict.register(0, "alpha"), a);
        assert_ne!(a, b);
        assert_eq!(dict.value(0, a).as_deref(), Some("alpha"));
        assert_eq!(dict.len(0), 2);
    }

    #[test]
    fn test_dictionary_snapshot_roundtrip() {
        let dict = Dictionary::with_columns(2);
        dict.register(0, "x");
        dict.register(1, "y");
        let restored = Dictionary::from_snapshot(dict.snapshot());
        assert_eq!(restored.value(0, 0).as_deref(), Some("x"));
        assert_eq!(restored.register(1, "y"), 0);
        assert_eq!(restored.register(1, "z"), 1);
    }
}
