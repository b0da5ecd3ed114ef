//! Node Checker
//!
//! Applies a transformation to the managed data and classifies the result:
//! generalize every quasi-identifier cell to the node's levels, group rows
//! into equivalence classes, test the privacy models against each class,
//! mark violating rows as outliers, microaggregate within classes, and
//! score the node through the metric.
//!
//! ```text
//! Transformation -> [generalize rows (rayon)] -> [group] -> [classify]
//!                -> [mark outliers] -> [microaggregate] -> TransformedData
//! ```
//!
//! The checker memoizes class assignments per node id, bounded by the
//! configured history size and snapshot budget; the memo is cleared
//! whenever a budget would be exceeded.

use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::CheckerConfig;
use crate::data::{
    DataDefinition, DataManager, DataMatrix, Dictionary, MemoryDataManager, OUTLIER_MASK,
    SUPPRESSED,
};
use crate::error::EngineResult;
use crate::lattice::{Property, PropertySet, Transformation};
use crate::metric::{InformationLoss, Metric};
use crate::model::AnonymizationConfig;

/// The scored and classified outcome of applying one transformation
#[derive(Debug)]
pub struct TransformedData {
    pub buffer_generalized: DataMatrix,
    pub buffer_microaggregated: DataMatrix,
    pub properties: PropertySet,
    pub information_loss: InformationLoss,
    pub lower_bound: InformationLoss,
    /// Number of rows carrying the outlier mask
    pub suppressed: usize,
}

impl TransformedData {
    pub fn is_anonymous(&self) -> bool {
        self.properties.contains(Property::Anonymous)
    }
}

/// Applies transformations and classifies their results
pub trait NodeChecker {
    /// Apply `transformation`, interning microaggregates into the
    /// manager's own dictionary
    fn apply(&mut self, transformation: &Transformation) -> EngineResult<TransformedData>;

    /// Apply `transformation`, interning microaggregates into `dictionary`
    /// so codes remain comparable with an existing output
    fn apply_with_dictionary(
        &mut self,
        transformation: &Transformation,
        dictionary: &Arc<Dictionary>,
    ) -> EngineResult<TransformedData>;

    /// Drop per-application scratch state
    fn reset(&mut self);

    /// The input buffer this checker reads from
    fn input_buffer(&self) -> &Arc<DataMatrix>;
}

#[derive(Debug)]
struct MemoEntry {
    /// Equivalence class of each row, dense ids
    class_of: Vec<u32>,
    class_count: usize,
}

/// The crate's concrete checker over an in-memory manager
#[derive(Debug)]
pub struct TransformationChecker {
    manager: MemoryDataManager,
    definition: DataDefinition,
    config: AnonymizationConfig,
    metric: Box<dyn Metric>,
    checker_config: CheckerConfig,
    memo: HashMap<u64, MemoEntry>,
    memo_rows: usize,
    /// Grouping scratch reused across applications
    scratch: HashMap<Vec<u32>, u32>,
}

impl TransformationChecker {
    pub fn new(
        manager: MemoryDataManager,
        definition: DataDefinition,
        config: AnonymizationConfig,
        metric: Box<dyn Metric>,
        checker_config: CheckerConfig,
    ) -> Self {
        TransformationChecker {
            manager,
            definition,
            config,
            metric,
            checker_config,
            memo: HashMap::new(),
            memo_rows: 0,
            scratch: HashMap::new(),
        }
    }

    pub fn manager(&self) -> &MemoryDataManager {
        &self.manager
    }

    pub fn config(&self) -> &AnonymizationConfig {
        &self.config
    }

    /// Generalize all quasi-identifier cells to the node's levels
    fn generalize_rows(&self, transformation: &Transformation) -> DataMatrix {
        let input = self.manager.generalized_matrix();
        let hierarchies = self.manager.hierarchies();
        let rows = self.manager.rows();
        let cols = input.cols();
        let levels = transformation.generalization();
        let cells: Vec<u32> = (0..rows)
            .into_par_iter()
            .flat_map_iter(|r| {
                let row = input.row(r);
                (0..cols)
                    .map(move |c| hierarchies[c].generalize(row[c], levels[c]))
                    .collect::<Vec<u32>>()
            })
            .collect();
        DataMatrix::from_cells(rows, cols, cells)
    }

    /// Assign each row to a dense equivalence-class id
    fn group(&mut self, node: u64, generalized: &DataMatrix) -> (Vec<u32>, usize) {
        if let Some(entry) = self.memo.get(&node) {
            return (entry.class_of.clone(), entry.class_count);
        }

        self.scratch.clear();
        let rows = generalized.rows();
        let mut class_of = Vec::with_capacity(rows);
        for r in 0..rows {
            let next = self.scratch.len() as u32;
            let class = *self
                .scratch
                .entry(generalized.row(r).to_vec())
                .or_insert(next);
            class_of.push(class);
        }
        let class_count = self.scratch.len();

        // Budgeted memoization: clear the history rather than exceed it
        if self.memo.len() >= self.checker_config.history_size
            || self.memo_rows + rows > self.checker_config.snapshot_budget
        {
            self.memo.clear();
            self.memo_rows = 0;
        }
        if rows <= self.checker_config.snapshot_budget {
            self.memo.insert(
                node,
                MemoEntry {
                    class_of: class_of.clone(),
                    class_count,
                },
            );
            self.memo_rows += rows;
        }
        (class_of, class_count)
    }

    fn apply_inner(
        &mut self,
        transformation: &Transformation,
        dictionary: &Arc<Dictionary>,
    ) -> EngineResult<TransformedData> {
        let rows = self.manager.rows();
        let mut generalized = self.generalize_rows(transformation);
        let (class_of, class_count) = self.group(transformation.id(), &generalized);

        let mut class_sizes = vec![0usize; class_count];
        for &class in &class_of {
            class_sizes[class as usize] += 1;
        }

        // A class violates iff any model rejects its size
        let models = self.config.privacy_models();
        let violating: Vec<bool> = class_sizes
            .iter()
            .map(|&size| !models.iter().all(|m| m.is_anonymous(size)))
            .collect();
        let outlier_rows: usize = class_of
            .iter()
            .filter(|&&class| violating[class as usize])
            .count();

        let k_satisfied = !violating.iter().any(|&v| v);
        let allowed = (self.config.max_outliers() * rows as f64).floor() as usize;
        let anonymous = outlier_rows <= allowed;

        for (r, &class) in class_of.iter().enumerate() {
            if violating[class as usize] {
                let masked = generalized.get(r, 0) | OUTLIER_MASK;
                generalized.set(r, 0, masked);
            }
        }

        let microaggregated =
            self.microaggregate(&class_of, class_count, &violating, dictionary)?;

        let mut properties = PropertySet::empty().with(Property::Checked);
        properties.insert(if anonymous {
            Property::Anonymous
        } else {
            Property::NotAnonymous
        });
        properties.insert(if k_satisfied {
            Property::KAnonymous
        } else {
            Property::NotKAnonymous
        });

        let score = self.metric.evaluate(transformation, outlier_rows, rows);
        tracing::debug!(
            node = transformation.id(),
            level = transformation.level(),
            classes = class_count,
            outliers = outlier_rows,
            anonymous,
            loss = %score.information_loss,
            "node_checked"
        );

        Ok(TransformedData {
            buffer_generalized: generalized,
            buffer_microaggregated: microaggregated,
            properties,
            information_loss: score.information_loss,
            lower_bound: score.lower_bound,
            suppressed: outlier_rows,
        })
    }

    /// Aggregate analyzed attributes within each non-violating class;
    /// rows of violating classes get the suppressed marker
    fn microaggregate(
        &self,
        class_of: &[u32],
        class_count: usize,
        violating: &[bool],
        dictionary: &Arc<Dictionary>,
    ) -> EngineResult<DataMatrix> {
        let analyzed = self.manager.analyzed_matrix();
        let rows = analyzed.rows();
        let cols = analyzed.cols();
        let mut out = DataMatrix::new(rows, cols);
        if cols == 0 {
            return Ok(out);
        }

        let mut members: Vec<Vec<usize>> = vec![Vec::new(); class_count];
        for (r, &class) in class_of.iter().enumerate() {
            members[class as usize].push(r);
        }

        for (m, spec) in self.definition.microaggregations().iter().enumerate() {
            let dict_col = self.manager.micro_dict_col(m);
            let suppressed_code = dictionary.register(dict_col, SUPPRESSED);
            let mut aggregator = spec.function();
            for (class, rows_of_class) in members.iter().enumerate() {
                if violating[class] {
                    for &r in rows_of_class {
                        out.set(r, m, suppressed_code);
                    }
                    continue;
                }
                aggregator.reset();
                for &r in rows_of_class {
                    let code = analyzed.get(r, m);
                    if let Some(value) = self.manager.dictionary().value(dict_col, code) {
                        aggregator.add(&value);
                    }
                }
                let label = aggregator.finish();
                let code = dictionary.register(dict_col, &label);
                for &r in rows_of_class {
                    out.set(r, m, code);
                }
            }
        }
        Ok(out)
    }
}

impl NodeChecker for TransformationChecker {
    fn apply(&mut self, transformation: &Transformation) -> EngineResult<TransformedData> {
        let dictionary = Arc::clone(self.manager.dictionary());
        self.apply_inner(transformation, &dictionary)
    }

    fn apply_with_dictionary(
        &mut self,
        transformation: &Transformation,
        dictionary: &Arc<Dictionary>,
    ) -> EngineResult<TransformedData> {
        self.apply_inner(transformation, dictionary)
    }

    fn reset(&mut self) {
        self.scratch.clear();
    }

    fn input_buffer(&self) -> &Arc<DataMatrix> {
        self.manager.generalized_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Hierarchy, MicroAggregationKind};
    use crate::lattice::SolutionSpace;
    use crate::metric::PrecisionMetric;
    use crate::model::KAnonymity;

    fn build() -> (TransformationChecker, Arc<SolutionSpace>) {
        let definition = DataDefinition::new()
            .quasi_identifier(
                "age",
                Hierarchy::from_slices(&[
                    &["34", "30-39", "*"],
                    &["36", "30-39", "*"],
                    &["45", "40-49", "*"],
                ]),
            )
            .microaggregated("income", MicroAggregationKind::ArithmeticMean);
        let table = vec![
            vec!["34".to_string(), "10".to_string()],
            vec!["36".to_string(), "30".to_string()],
            vec!["45".to_string(), "50".to_string()],
        ];
        let manager =
            MemoryDataManager::from_table(&["age", "income"], &table, &definition).unwrap();
        let config = AnonymizationConfig::new()
            .with_model(KAnonymity::new(2))
            .with_suppression_limit(0.5)
            .with_gs_factor(0.5);
        let mut metric = PrecisionMetric::new();
        let generalized = Arc::clone(manager.generalized_matrix());
        metric
            .initialize(
                &manager,
                &definition,
                &generalized,
                manager.hierarchies(),
                &config,
            )
            .unwrap();
        let space = SolutionSpace::from_definition(&definition).unwrap();
        let checker = TransformationChecker::new(
            manager,
            definition,
            config,
            Box::new(metric),
            CheckerConfig::default(),
        );
        (checker, space)
    }

    #[test]
    fn test_level_one_groups_and_suppresses() {
        let (mut checker, space) = build();
        let t = space.transformation_for(&[1]).unwrap();
        let out = checker.apply(&t).unwrap();
        // Rows 0 and 1 share "30-39"; row 2 is alone in "40-49" and becomes
        // an outlier within the 50% suppression budget.
        assert!(out.is_anonymous());
        assert_eq!(out.suppressed, 1);
        assert_eq!(out.buffer_generalized.get(2, 0) & OUTLIER_MASK, OUTLIER_MASK);
        assert_eq!(out.buffer_generalized.get(0, 0) & OUTLIER_MASK, 0);
        assert!(out.properties.contains(Property::NotKAnonymous));
    }

    #[test]
    fn test_level_zero_is_not_anonymous() {
        let (mut checker, space) = build();
        let t = space.transformation_for(&[0]).unwrap();
        let out = checker.apply(&t).unwrap();
        // Three singleton classes, 3 outliers > 50% of 3 rows
        assert!(!out.is_anonymous());
        assert_eq!(out.suppressed, 3);
    }

    #[test]
    fn test_microaggregation_writes_class_mean() {
        let (mut checker, space) = build();
        let t = space.transformation_for(&[1]).unwrap();
        let out = checker.apply(&t).unwrap();
        let dict = Arc::clone(checker.manager().dictionary());
        let col = checker.manager().micro_dict_col(0);
        let mean = dict.value(col, out.buffer_microaggregated.get(0, 0)).unwrap();
        assert_eq!(mean, "20");
        let row2 = dict.value(col, out.buffer_microaggregated.get(2, 0)).unwrap();
        assert_eq!(row2, SUPPRESSED);
    }

    #[test]
    fn test_memo_survives_reset_and_repeats() {
        let (mut checker, space) = build();
        let t = space.transformation_for(&[1]).unwrap();
        let first = checker.apply(&t).unwrap();
        checker.reset();
        let second = checker.apply(&t).unwrap();
        assert_eq!(first.suppressed, second.suppressed);
        assert_eq!(first.buffer_generalized, second.buffer_generalized);
    }
}
