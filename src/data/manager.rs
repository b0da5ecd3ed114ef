//! Data Manager
//!
//! Owns the three row-aligned code matrices (generalized / analyzed /
//! static), the materialized hierarchies, and the shared dictionary.
//! Column order follows the data definition: analyzed column `m` is the
//! `m`-th declared microaggregation, static column `s` the `s`-th declared
//! static attribute.
//!
//! Dictionary column layout: quasi-identifiers first, then microaggregated
//! attributes, then static attributes.

use std::collections::HashMap;
use std::sync::Arc;

use crate::data::{DataDefinition, DataMatrix, Dictionary, RowSet};
use crate::error::{EngineError, EngineResult};

/// A hierarchy with all labels interned: `map[value_code][level]` is the
/// dictionary code of the value's label at that level
#[derive(Debug, Clone)]
pub struct MaterializedHierarchy {
    map: Vec<Vec<u32>>,
    levels: usize,
}

impl MaterializedHierarchy {
    /// Number of generalization levels
    pub fn levels(&self) -> usize {
        self.levels
    }

    /// Generalize a level-0 value code to `level`
    pub fn generalize(&self, code: u32, level: u32) -> u32 {
        self.map[code as usize][level as usize]
    }
}

/// Access to the matrices and hierarchies the engine operates on
pub trait DataManager {
    fn generalized_matrix(&self) -> &Arc<DataMatrix>;
    fn analyzed_matrix(&self) -> &DataMatrix;
    fn static_matrix(&self) -> &DataMatrix;
    fn hierarchies(&self) -> &[MaterializedHierarchy];
    fn dictionary(&self) -> &Arc<Dictionary>;
    /// Number of data rows
    fn rows(&self) -> usize;
    /// Project this manager onto `rows`, reindexing densely in ascending
    /// row order. Hierarchies and the dictionary are shared by reference.
    fn subset_instance(&self, rows: &RowSet) -> Self
    where
        Self: Sized;
}

/// In-memory data manager over an interned string table
#[derive(Debug, Clone)]
pub struct MemoryDataManager {
    header: Vec<String>,
    generalized: Arc<DataMatrix>,
    analyzed: DataMatrix,
    statics: DataMatrix,
    hierarchies: Arc<Vec<MaterializedHierarchy>>,
    dictionary: Arc<Dictionary>,
    rows: usize,
    qi_count: usize,
}

impl MemoryDataManager {
    /// Build a manager from a header row, a string table, and a definition.
    ///
    /// Every quasi-identifier cell must be covered by its hierarchy's
    /// level-0 column.
    pub fn from_table(
        header: &[&str],
        table: &[Vec<String>],
        definition: &DataDefinition,
    ) -> EngineResult<Self> {
        let column_of = |name: &str| -> EngineResult<usize> {
            header.iter().position(|h| *h == name).ok_or_else(|| {
                EngineError::InvalidArgument(format!("attribute '{name}' not in header"))
            })
        };

        let qis = definition.quasi_identifiers();
        let micros = definition.microaggregations();
        let statics = definition.static_attributes();
        let qi_count = qis.len();
        let dictionary = Arc::new(Dictionary::with_columns(
            qi_count + micros.len() + statics.len(),
        ));

        // Materialize hierarchies first so level-0 codes are dense and the
        // data pass below can reuse them.
        let mut hierarchies = Vec::with_capacity(qi_count);
        let mut level0: Vec<HashMap<String, u32>> = Vec::with_capacity(qi_count);
        for (q, qi) in qis.iter().enumerate() {
            let levels = qi.hierarchy.levels();
            if levels == 0 {
                return Err(EngineError::InvalidArgument(format!(
                    "hierarchy for '{}' is empty",
                    qi.name
                )));
            }
            // Intern level-0 values first so their codes are dense and can
            // index the materialized map directly
            let mut lookup = HashMap::new();
            for row in qi.hierarchy.rows() {
                if row.len() != levels {
                    return Err(EngineError::InvalidArgument(format!(
                        "hierarchy for '{}' has rows of unequal length",
                        qi.name
                    )));
                }
                let code0 = dictionary.register(q, &row[0]);
                if lookup.insert(row[0].clone(), code0).is_some() {
                    return Err(EngineError::InvalidArgument(format!(
                        "hierarchy for '{}' lists value '{}' twice",
                        qi.name, row[0]
                    )));
                }
            }
            let mut map = Vec::with_capacity(qi.hierarchy.rows().len());
            for row in qi.hierarchy.rows() {
                let codes: Vec<u32> = row.iter().map(|label| dictionary.register(q, label)).collect();
                debug_assert_eq!(map.len(), codes[0] as usize);
                map.push(codes);
            }
            hierarchies.push(MaterializedHierarchy { map, levels });
            level0.push(lookup);
        }

        let qi_cols: Vec<usize> = qis
            .iter()
            .map(|qi| column_of(&qi.name))
            .collect::<EngineResult<_>>()?;
        let micro_cols: Vec<usize> = micros
            .iter()
            .map(|m| column_of(&m.attribute))
            .collect::<EngineResult<_>>()?;
        let static_cols: Vec<usize> = statics
            .iter()
            .map(|s| column_of(s))
            .collect::<EngineResult<_>>()?;

        let rows = table.len();
        let mut generalized = DataMatrix::new(rows, qi_count);
        let mut analyzed = DataMatrix::new(rows, micros.len());
        let mut static_matrix = DataMatrix::new(rows, statics.len());

        for (r, record) in table.iter().enumerate() {
            if record.len() != header.len() {
                return Err(EngineError::InvalidArgument(format!(
                    "row {r} has {} cells, header has {}",
                    record.len(),
                    header.len()
                )));
            }
            for (q, &col) in qi_cols.iter().enumerate() {
                let value = &record[col];
                let code = level0[q].get(value).copied().ok_or_else(|| {
                    EngineError::InvalidArgument(format!(
                        "value '{value}' in row {r} not covered by hierarchy for '{}'",
                        qis[q].name
                    ))
                })?;
                generalized.set(r, q, code);
            }
            for (m, &col) in micro_cols.iter().enumerate() {
                analyzed.set(r, m, dictionary.register(qi_count + m, &record[col]));
            }
            for (s, &col) in static_cols.iter().enumerate() {
                static_matrix.set(
                    r,
                    s,
                    dictionary.register(qi_count + micros.len() + s, &record[col]),
                );
            }
        }

        Ok(MemoryDataManager {
            header: header.iter().map(|h| h.to_string()).collect(),
            generalized: Arc::new(generalized),
            analyzed,
            statics: static_matrix,
            hierarchies: Arc::new(hierarchies),
            dictionary,
            rows,
            qi_count,
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Dictionary column index of analyzed (microaggregated) column `m`
    pub fn micro_dict_col(&self, m: usize) -> usize {
        self.qi_count + m
    }

    /// Dictionary column index of static column `s`
    pub fn static_dict_col(&self, s: usize) -> usize {
        self.qi_count + self.analyzed.cols() + s
    }
}

impl DataManager for MemoryDataManager {
    fn generalized_matrix(&self) -> &Arc<DataMatrix> {
        &self.generalized
    }

    fn analyzed_matrix(&self) -> &DataMatrix {
        &self.analyzed
    }

    fn static_matrix(&self) -> &DataMatrix {
        &self.statics
    }

    fn hierarchies(&self) -> &[MaterializedHierarchy] {
        &self.hierarchies
    }

    fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dictionary
    }

    fn rows(&self) -> usize {
        self.rows
    }

    fn subset_instance(&self, rows: &RowSet) -> Self {
        let selected = rows.len();
        let mut generalized = DataMatrix::new(selected, self.generalized.cols());
        let mut analyzed = DataMatrix::new(selected, self.analyzed.cols());
        let mut statics = DataMatrix::new(selected, self.statics.cols());
        for (dense, row) in rows.iter().enumerate() {
            generalized.copy_row_from(dense, &self.generalized, row);
            analyzed.copy_row_from(dense, &self.analyzed, row);
            statics.copy_row_from(dense, &self.statics, row);
        }
        MemoryDataManager {
            header: self.header.clone(),
            generalized: Arc::new(generalized),
            analyzed,
            statics,
            hierarchies: Arc::clone(&self.hierarchies),
            dictionary: Arc::clone(&self.dictionary),
            rows: selected,
            qi_count: self.qi_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Hierarchy, MicroAggregationKind};

    fn age_hierarchy() -> Hierarchy {
        Hierarchy::from_slices(&[
            &["34", "30-39", "*"],
            &["45", "40-49", "*"],
            &["66", "60-69", "*"],
        ])
    }

    fn table() -> Vec<Vec<String>> {
        vec![
            vec!["34".into(), "50000".into(), "a".into()],
            vec!["45".into(), "60000".into(), "b".into()],
            vec!["66".into(), "70000".into(), "c".into()],
        ]
    }

    fn definition() -> DataDefinition {
        DataDefinition::new()
            .quasi_identifier("age", age_hierarchy())
            .microaggregated("income", MicroAggregationKind::ArithmeticMean)
            .static_attribute("id")
    }

    #[test]
    fn test_from_table_interns_codes() {
        let manager =
            MemoryDataManager::from_table(&["age", "income", "id"], &table(), &definition())
                .unwrap();
        assert_eq!(manager.rows(), 3);
        assert_eq!(manager.generalized_matrix().cols(), 1);
        // Level-0 codes are assigned in hierarchy order
        assert_eq!(manager.generalized_matrix().get(0, 0), 0);
        assert_eq!(manager.generalized_matrix().get(1, 0), 1);
        let h = &manager.hierarchies()[0];
        let top = h.generalize(0, 2);
        assert_eq!(manager.dictionary().value(0, top).as_deref(), Some("*"));
    }

    #[test]
    fn test_uncovered_value_is_rejected() {
        let mut rows = table();
        rows[0][0] = "99".into();
        let err = MemoryDataManager::from_table(&["age", "income", "id"], &rows, &definition())
            .unwrap_err();
        assert!(err.to_string().contains("not covered"));
    }

    #[test]
    fn test_subset_instance_reindexes_ascending() {
        let manager =
            MemoryDataManager::from_table(&["age", "income", "id"], &table(), &definition())
                .unwrap();
        let subset = manager.subset_instance(&RowSet::from_indices(3, &[2, 0]));
        assert_eq!(subset.rows(), 2);
        // Dense row 0 is original row 0, dense row 1 is original row 2
        assert_eq!(
            subset.generalized_matrix().row(0),
            manager.generalized_matrix().row(0)
        );
        assert_eq!(
            subset.generalized_matrix().row(1),
            manager.generalized_matrix().row(2)
        );
        assert!(Arc::ptr_eq(subset.dictionary(), manager.dictionary()));
    }
}
