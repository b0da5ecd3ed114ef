//! Output Statistics
//!
//! Equivalence-class statistics computed in one pass over an output
//! buffer: class count, class-size extremes and mean, and the number of
//! suppressed rows.

use std::collections::HashMap;

use crate::output::DataHandleOutput;

/// Summary of an output's equivalence classes
#[derive(Debug, Clone, PartialEq)]
pub struct OutputStatistics {
    /// Number of equivalence classes among non-suppressed rows
    pub class_count: usize,
    pub min_class_size: usize,
    pub max_class_size: usize,
    pub avg_class_size: f64,
    /// Rows carrying the outlier mask
    pub suppressed_rows: usize,
    pub total_rows: usize,
}

impl OutputStatistics {
    /// Compute statistics for `handle`'s current buffer contents
    pub fn from_handle(handle: &DataHandleOutput) -> Self {
        handle.with_buffer(|buffer| {
            let mut sizes: HashMap<Vec<u32>, usize> = HashMap::new();
            let mut suppressed = 0usize;
            for r in 0..buffer.rows() {
                if buffer.is_outlier(r) {
                    suppressed += 1;
                } else {
                    *sizes.entry(buffer.generalized().row(r).to_vec()).or_insert(0) += 1;
                }
            }
            let class_count = sizes.len();
            let min = sizes.values().min().copied().unwrap_or(0);
            let max = sizes.values().max().copied().unwrap_or(0);
            let kept = buffer.rows() - suppressed;
            let avg = if class_count == 0 {
                0.0
            } else {
                kept as f64 / class_count as f64
            };
            OutputStatistics {
                class_count,
                min_class_size: min,
                max_class_size: max,
                avg_class_size: avg,
                suppressed_rows: suppressed,
                total_rows: buffer.rows(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anonymizer::Anonymizer;
    use crate::data::{DataDefinition, Hierarchy, MemoryDataManager};
    use crate::model::{AnonymizationConfig, KAnonymity};

    #[test]
    fn test_statistics_over_anonymized_output() {
        let definition = DataDefinition::new().quasi_identifier(
            "age",
            Hierarchy::from_slices(&[
                &["34", "30-39", "*"],
                &["36", "30-39", "*"],
                &["45", "40-49", "*"],
            ]),
        );
        let table = vec![
            vec!["34".to_string()],
            vec!["36".to_string()],
            vec!["45".to_string()],
        ];
        let manager = MemoryDataManager::from_table(&["age"], &table, &definition).unwrap();
        let config = AnonymizationConfig::new()
            .with_model(KAnonymity::new(2))
            .with_suppression_limit(0.4);
        let result = Anonymizer::new().anonymize(manager, definition, config).unwrap();
        let handle = result.output().unwrap();
        let stats = result.statistics_for(&handle);
        assert_eq!(stats.total_rows, 3);
        assert_eq!(stats.suppressed_rows, 1);
        assert_eq!(stats.class_count, 1);
        assert_eq!(stats.min_class_size, 2);
        assert_eq!(stats.max_class_size, 2);
        assert!((stats.avg_class_size - 2.0).abs() < f64::EPSILON);
    }
}
