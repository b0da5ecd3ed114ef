//! Local Recoding Optimizer
//!
//! Refines an existing output by re-anonymizing only its outlier rows: the
//! outliers are projected into a subset manager and a reparameterized
//! configuration, a fresh inner search runs over them, and the inner
//! optimum is merged back into the caller's buffer row by row.
//!
//! ```text
//! handle -> [outlier RowSet] -> [subset manager + config + definition]
//!        -> [inner Anonymizer::anonymize] -> [merge ascending] -> count
//! ```
//!
//! Steps before the merge never touch the caller's buffer; a failure
//! inside the merge surfaces as [`EngineError::RollbackRequired`] and the
//! handle must be rebuilt.

use std::sync::Arc;

use crate::anonymizer::{Anonymizer, ExhaustiveSearch};
use crate::checker::NodeChecker;
use crate::data::{DataManager, RowSet, OUTLIER_MASK};
use crate::error::{EngineError, EngineResult};
use crate::listener::{NoopListener, ProgressListener, SubRange};
use crate::model::AnonymizationConfig;
use crate::output::DataHandleOutput;
use crate::result::AnonymizationResult;

/// Single-step and iterative local recoding over one result
pub struct LocalRecodingOptimizer<'a> {
    result: &'a AnonymizationResult,
    #[cfg(test)]
    merge_fault: Option<usize>,
}

impl<'a> LocalRecodingOptimizer<'a> {
    pub fn new(result: &'a AnonymizationResult) -> Self {
        LocalRecodingOptimizer {
            result,
            #[cfg(test)]
            merge_fault: None,
        }
    }

    /// Inject a failure before the given merge step, for rollback tests
    #[cfg(test)]
    pub(crate) fn with_merge_fault(mut self, step: usize) -> Self {
        self.merge_fault = Some(step);
        self
    }

    fn same_input_buffer(&self, handle: &DataHandleOutput) -> bool {
        let checker = self.result.checker().lock();
        let handle_input = handle.input_buffer();
        Arc::ptr_eq(&handle_input, checker.input_buffer())
            || handle_input.content_hash() == checker.input_buffer().content_hash()
    }

    /// Whether `handle` qualifies for local recoding: it must view this
    /// result's input buffer, every model must tolerate local recoding,
    /// and the outlier count must clear the minimal group size.
    pub fn is_optimizable(&self, handle: &DataHandleOutput) -> bool {
        if !self.same_input_buffer(handle) {
            return false;
        }
        if !self.result.configuration().supports_local_recoding() {
            return false;
        }
        let outliers = handle.outlier_count();
        // The group-size rejection precedes the emptiness check and keeps
        // its original inequality direction; see DESIGN.md.
        if let Some(minimal) = self.result.configuration().minimal_group_size() {
            if outliers < minimal {
                return false;
            }
        }
        if outliers == 0 {
            return false;
        }
        true
    }

    /// Project the configuration onto `rows`, overriding the gs-factor
    /// and deriving the subset suppression limit from `records`
    fn build_subset_config(
        &self,
        rows: &RowSet,
        total_rows: usize,
        records: Option<f64>,
        gs_factor: Option<f64>,
    ) -> AnonymizationConfig {
        let mut config = self
            .result
            .configuration()
            .subset_for(rows.clone(), gs_factor);
        if let Some(records) = records {
            let absolute = records * total_rows as f64;
            let relative = (absolute / rows.len() as f64).clamp(0.0, 1.0);
            config.set_max_outliers(1.0 - relative);
        }
        config
    }

    /// One local-recoding step. Returns the number of rows whose outlier
    /// mask was cleared by the merge.
    pub fn optimize_fast(
        &self,
        handle: &DataHandleOutput,
        records: Option<f64>,
        gs_factor: Option<f64>,
        listener: &mut dyn ProgressListener,
    ) -> EngineResult<usize> {
        if let Some(records) = records {
            if !records.is_finite() || records <= 0.0 || records > 1.0 {
                return Err(EngineError::InvalidArgument(format!(
                    "records {records} out of (0, 1]"
                )));
            }
        }
        if let Some(gs) = gs_factor {
            if !gs.is_finite() || !(0.0..=1.0).contains(&gs) {
                return Err(EngineError::InvalidArgument(format!(
                    "gs-factor {gs} out of [0, 1]"
                )));
            }
        }
        if !self.same_input_buffer(handle) {
            return Err(EngineError::InvalidArgument(
                "handle was not derived from this result's input buffer".to_string(),
            ));
        }
        if !self.is_optimizable(handle) {
            return Ok(0);
        }

        let total_rows = handle.rows();
        let rows = handle.outlier_rows();
        debug_assert!(!rows.is_empty());

        let inner_config = self.build_subset_config(&rows, total_rows, records, gs_factor);
        let inner_definition = handle.definition().clone();
        let subset_manager = self.result.manager().subset_instance(&rows);

        // A fresh anonymizer, parameterized from the borrowed original
        // when it is still alive
        let engine_config = self
            .result
            .anonymizer()
            .upgrade()
            .map_or_else(|| self.result.engine_config().clone(), |state| {
                state.engine_config.clone()
            });
        let inner = Anonymizer::with_config(engine_config);
        tracing::debug!(
            outliers = rows.len(),
            records,
            gs_factor,
            "local_recoding_step_started"
        );
        let inner_result = inner.anonymize_with(
            subset_manager,
            inner_definition,
            inner_config,
            &mut ExhaustiveSearch,
            &mut *listener,
        )?;

        let Some(inner_optimum) = inner_result.global_optimum() else {
            tracing::debug!("local_recoding_step_unsolvable");
            return Ok(0);
        };

        let optimized = self
            .merge(handle, &inner_result, &rows)
            .map_err(|e| EngineError::RollbackRequired(e.to_string()))?;

        tracing::debug!(
            optimized,
            node = ?inner_optimum.generalization(),
            "local_recoding_step_finished"
        );
        listener.progress(1.0);
        Ok(optimized)
    }

    /// Apply the inner optimum with the outer dictionary and copy each
    /// selected row back, walking the row set in ascending order. Any
    /// failure in here leaves the buffer in an unknown state.
    fn merge(
        &self,
        handle: &DataHandleOutput,
        inner_result: &AnonymizationResult,
        rows: &RowSet,
    ) -> EngineResult<usize> {
        let inner_optimum = inner_result.global_optimum().ok_or_else(|| {
            EngineError::Internal("merge invoked without an inner optimum".to_string())
        })?;
        let bundle = {
            let mut inner_checker = inner_result.checker().lock();
            let bundle =
                inner_checker.apply_with_dictionary(&inner_optimum, handle.dictionary())?;
            inner_checker.reset();
            bundle
        };

        handle.with_buffer_mut(|buffer| {
            let mut optimized = 0usize;
            for (dense, outer_row) in rows.iter().enumerate() {
                #[cfg(test)]
                if self.merge_fault == Some(dense) {
                    return Err(EngineError::Internal(
                        "injected merge fault".to_string(),
                    ));
                }
                buffer
                    .generalized_mut()
                    .copy_row_from(outer_row, &bundle.buffer_generalized, dense);
                if bundle.buffer_microaggregated.cols() > 0 {
                    buffer
                        .microaggregated_mut()
                        .copy_row_from(outer_row, &bundle.buffer_microaggregated, dense);
                }
                if bundle.buffer_generalized.get(dense, 0) & OUTLIER_MASK == 0 {
                    optimized += 1;
                }
            }
            buffer.set_node_generalization(inner_optimum.generalization().to_vec());
            if optimized > 0 {
                buffer.set_optimized(true);
            }
            Ok(optimized)
        })
    }

    /// Greedy iterative refinement: repeat single steps until the handle
    /// stops being optimizable, the iteration cap is reached, or a step
    /// yields nothing and the adaption cannot raise the gs-factor further.
    pub fn optimize_iterative(
        &self,
        handle: &DataHandleOutput,
        gs_factor: f64,
        max_iterations: usize,
        adaption: f64,
        listener: &mut dyn ProgressListener,
    ) -> EngineResult<usize> {
        if !gs_factor.is_finite() || !(0.0..=1.0).contains(&gs_factor) {
            return Err(EngineError::InvalidArgument(format!(
                "gs-factor {gs_factor} out of [0, 1]"
            )));
        }
        if max_iterations == 0 {
            return Err(EngineError::InvalidArgument(
                "max_iterations must be positive".to_string(),
            ));
        }
        if !adaption.is_finite() || !(0.0..=1.0).contains(&adaption) {
            return Err(EngineError::InvalidArgument(format!(
                "adaption factor {adaption} out of [0, 1]"
            )));
        }

        let goal = handle.outlier_count();
        let mut gs = gs_factor;
        let mut total = 0usize;
        let mut current = usize::MAX;
        let mut iteration = 0usize;

        while self.is_optimizable(handle) && iteration < max_iterations && current > 0 {
            let mut inner_listener = NoopListener;
            current = self.optimize_fast(handle, None, Some(gs), &mut inner_listener)?;
            total += current;
            if current == 0 && adaption > 0.0 {
                gs += adaption;
                if gs <= 1.0 {
                    // Escape the fixpoint: retry with the raised factor
                    current = usize::MAX;
                }
            }
            iteration += 1;
            let progress = (total as f64 / goal as f64)
                .max(iteration as f64 / max_iterations as f64)
                .min(1.0);
            listener.progress(progress);
        }
        listener.progress(1.0);
        Ok(total)
    }

    /// Batched iterative refinement: each step optimizes up to `records`
    /// of all rows and owns the matching slice of the progress range.
    pub fn optimize_iterative_fast(
        &self,
        handle: &DataHandleOutput,
        records: f64,
        gs_factor: Option<f64>,
        listener: &mut dyn ProgressListener,
    ) -> EngineResult<usize> {
        if !records.is_finite() || records <= 0.0 || records > 1.0 {
            return Err(EngineError::InvalidArgument(format!(
                "records {records} out of (0, 1]"
            )));
        }

        let mut total = 0usize;
        let mut min_progress = 0.0f64;
        while self.is_optimizable(handle) {
            let max_progress = (min_progress + records).min(1.0);
            let mut sub = SubRange::new(&mut *listener, min_progress, max_progress);
            let current = self.optimize_fast(handle, Some(records), gs_factor, &mut sub)?;
            total += current;
            min_progress = max_progress;
            if current == 0 {
                break;
            }
        }
        listener.progress(1.0);
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataDefinition, Hierarchy, MemoryDataManager};
    use crate::model::KAnonymity;

    fn anonymized() -> AnonymizationResult {
        let definition = DataDefinition::new().quasi_identifier(
            "age",
            Hierarchy::from_slices(&[
                &["34", "30-39", "*"],
                &["36", "30-39", "*"],
                &["45", "40-49", "*"],
                &["52", "50-59", "*"],
            ]),
        );
        let table = vec![
            vec!["34".to_string()],
            vec!["36".to_string()],
            vec!["45".to_string()],
            vec!["52".to_string()],
        ];
        let manager = MemoryDataManager::from_table(&["age"], &table, &definition).unwrap();
        // Half the rows may be suppressed; gs-factor 0 makes suppression
        // free, so the optimum keeps two outliers
        let config = AnonymizationConfig::new()
            .with_model(KAnonymity::new(2))
            .with_suppression_limit(0.5)
            .with_gs_factor(0.0);
        Anonymizer::new().anonymize(manager, definition, config).unwrap()
    }

    #[test]
    fn test_records_clamp_in_projected_config() {
        let result = anonymized();
        let optimizer = LocalRecodingOptimizer::new(&result);

        // 100 total rows, 10 outliers, records = 0.5: the absolute bound
        // (50) exceeds the subset, so the relative share clamps to 1.0 and
        // the projected suppression limit drops to 0.0
        let rows = RowSet::from_indices(100, &(0..10).collect::<Vec<_>>());
        let config = optimizer.build_subset_config(&rows, 100, Some(0.5), None);
        let snapshot = config.snapshot();
        assert_eq!(snapshot.max_outliers, 0.0);
        assert_eq!(snapshot.subset_rows, Some(10));

        // An absolute bound of 5 over 10 outliers leaves half the subset
        // suppressible
        let config = optimizer.build_subset_config(&rows, 100, Some(0.05), None);
        assert!((config.snapshot().max_outliers - 0.5).abs() < 1e-9);

        // Without a records bound the original limit survives the clone
        let config = optimizer.build_subset_config(&rows, 100, None, Some(0.9));
        let snapshot = config.snapshot();
        assert_eq!(snapshot.max_outliers, result.configuration().max_outliers());
        assert_eq!(snapshot.gs_factor, 0.9);
    }

    #[test]
    fn test_merge_fault_surfaces_rollback_required() {
        let result = anonymized();
        let handle = result.output().unwrap();
        assert_eq!(handle.outlier_count(), 2);
        assert!(result.is_optimizable(&handle));

        let optimizer = LocalRecodingOptimizer::new(&result).with_merge_fault(1);
        let mut listener = NoopListener;
        let err = optimizer
            .optimize_fast(&handle, None, Some(1.0), &mut listener)
            .unwrap_err();
        assert!(matches!(err, EngineError::RollbackRequired(_)));
        // The optimized flag was never set; the caller must rebuild
        assert!(!handle.optimized());

        result.release_handle(&handle);
        let rebuilt = result.output().unwrap();
        assert_eq!(rebuilt.outlier_count(), 2);
    }

    #[test]
    fn test_fault_before_first_row_leaves_buffer_intact() {
        let result = anonymized();
        let handle = result.output().unwrap();
        let before: Vec<Vec<String>> = handle.iter_rows().collect();

        let optimizer = LocalRecodingOptimizer::new(&result).with_merge_fault(0);
        let mut listener = NoopListener;
        let err = optimizer
            .optimize_fast(&handle, None, Some(1.0), &mut listener)
            .unwrap_err();
        assert!(matches!(err, EngineError::RollbackRequired(_)));
        let after: Vec<Vec<String>> = handle.iter_rows().collect();
        assert_eq!(before, after);
    }
}
