//! Anonymizer
//!
//! Orchestrates one anonymization run: validates the configuration,
//! builds the solution space and lattice, initializes the metric, drives
//! a [`SearchStrategy`] over the lattice, and wraps the outcome in an
//! [`AnonymizationResult`].
//!
//! ```text
//! (manager, definition, config)
//!     -> [config.initialize] -> [SolutionSpace/Lattice]
//!     -> [metric.initialize] -> [TransformationChecker]
//!     -> [strategy.search]   -> AnonymizationResult
//! ```
//!
//! The result keeps a weak reference back to the anonymizer so local
//! recoding can inherit its parameters without an ownership cycle.

use std::sync::{Arc, Weak};
use std::time::Instant;

use crate::checker::{NodeChecker, TransformationChecker};
use crate::config::EngineConfig;
use crate::data::{DataDefinition, DataManager, MemoryDataManager};
use crate::error::EngineResult;
use crate::lattice::{Lattice, Property, SolutionSpace};
use crate::listener::{NoopListener, ProgressListener};
use crate::metric::{InformationLoss, Metric, PrecisionMetric};
use crate::model::AnonymizationConfig;
use crate::result::AnonymizationResult;

/// Parameters a result can inherit when it spawns an inner run
#[derive(Debug)]
pub struct AnonymizerState {
    pub(crate) engine_config: EngineConfig,
}

/// Entry point for anonymization runs
#[derive(Debug)]
pub struct Anonymizer {
    state: Arc<AnonymizerState>,
}

impl Default for Anonymizer {
    fn default() -> Self {
        Anonymizer::new()
    }
}

impl Anonymizer {
    pub fn new() -> Self {
        Anonymizer::with_config(EngineConfig::default())
    }

    pub fn with_config(engine_config: EngineConfig) -> Self {
        Anonymizer {
            state: Arc::new(AnonymizerState { engine_config }),
        }
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.state.engine_config
    }

    pub(crate) fn state_ref(&self) -> Weak<AnonymizerState> {
        Arc::downgrade(&self.state)
    }

    /// Run a full anonymization with the default search strategy
    pub fn anonymize(
        &self,
        manager: MemoryDataManager,
        definition: DataDefinition,
        config: AnonymizationConfig,
    ) -> EngineResult<AnonymizationResult> {
        let mut listener = NoopListener;
        self.anonymize_with(
            manager,
            definition,
            config,
            &mut ExhaustiveSearch,
            &mut listener,
        )
    }

    /// Run a full anonymization with an explicit strategy and listener
    pub fn anonymize_with(
        &self,
        manager: MemoryDataManager,
        definition: DataDefinition,
        config: AnonymizationConfig,
        strategy: &mut dyn SearchStrategy,
        listener: &mut dyn ProgressListener,
    ) -> EngineResult<AnonymizationResult> {
        let started = Instant::now();
        config.initialize(manager.rows())?;

        let space = SolutionSpace::from_definition(&definition)?;
        let lattice = Lattice::new(Arc::clone(&space));

        let mut metric: Box<dyn Metric> = Box::new(PrecisionMetric::new());
        let generalized = Arc::clone(manager.generalized_matrix());
        metric.initialize(
            &manager,
            &definition,
            &generalized,
            manager.hierarchies(),
            &config,
        )?;

        let mut checker = TransformationChecker::new(
            manager.clone(),
            definition.clone(),
            config.clone(),
            metric,
            self.state.engine_config.checker.clone(),
        );

        tracing::info!(
            rows = manager.rows(),
            nodes = space.size(),
            config = %serde_json::to_string(&config.snapshot()).unwrap_or_default(),
            "anonymization_started"
        );
        let optimum = strategy.search(&space, &lattice, &mut checker, listener)?;
        if let Some(id) = optimum {
            lattice.set_optimum(id);
        }
        lattice.update_loss_bounds();

        let duration_millis = started.elapsed().as_millis() as u64;
        tracing::info!(
            optimum = ?optimum,
            duration_millis,
            "anonymization_finished"
        );
        Ok(AnonymizationResult::from_run(
            self.state_ref(),
            manager,
            checker,
            definition,
            config,
            self.state.engine_config.clone(),
            lattice,
            space,
            duration_millis,
        ))
    }
}

/// Lattice traversal strategy: returns the id of the optimum, if any
pub trait SearchStrategy {
    fn search(
        &mut self,
        space: &Arc<SolutionSpace>,
        lattice: &Lattice,
        checker: &mut dyn NodeChecker,
        listener: &mut dyn ProgressListener,
    ) -> EngineResult<Option<u64>>;
}

/// Checks every node in descending level order, pruning with the monotone
/// properties: a node found not anonymous condemns all its predecessors,
/// which are then skipped without a check. Anonymous nodes are never
/// skipped — the suppression-weighted metric is not monotone along the
/// order, so any of them may hold the optimum.
#[derive(Debug, Default)]
pub struct ExhaustiveSearch;

impl SearchStrategy for ExhaustiveSearch {
    fn search(
        &mut self,
        space: &Arc<SolutionSpace>,
        _lattice: &Lattice,
        checker: &mut dyn NodeChecker,
        listener: &mut dyn ProgressListener,
    ) -> EngineResult<Option<u64>> {
        let size = space.size();
        let mut ids: Vec<u64> = (0..size).collect();
        ids.sort_by_key(|&id| {
            let level: u32 = space.index_of(id).iter().sum();
            std::cmp::Reverse(level)
        });

        // (loss, level, id): strictly better loss wins, ties resolve to
        // the less general node, then the smaller id
        let mut best: Option<(InformationLoss, u32, u64)> = None;
        for (visited, &id) in ids.iter().enumerate() {
            let transformation = space.transformation_for_id(id);
            transformation.set_property(Property::Visited);

            if transformation.has_property(Property::NotAnonymous)
                && !transformation.has_property(Property::Checked)
            {
                // Condemned by a successor; cascade the verdict downward
                transformation.propagate_to_neighbors(Property::NotAnonymous);
                listener.progress((visited + 1) as f64 / size as f64);
                continue;
            }

            let outcome = checker.apply(&transformation)?;
            checker.reset();
            if !transformation.is_score_resolved() {
                transformation.set_checked(
                    outcome.is_anonymous(),
                    outcome.information_loss,
                    outcome.lower_bound,
                );
            }

            if outcome.is_anonymous() {
                // Successors were visited first; this materializes their
                // inherited anonymous bit, it does not prune
                transformation.propagate_to_neighbors(Property::Anonymous);
                let candidate = (
                    outcome.information_loss,
                    transformation.level(),
                    id,
                );
                if best.is_none_or(|b| candidate < b) {
                    best = Some(candidate);
                }
            } else {
                transformation.propagate_to_neighbors(Property::NotAnonymous);
            }
            listener.progress((visited + 1) as f64 / size as f64);
        }
        listener.progress(1.0);
        Ok(best.map(|(_, _, id)| id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Hierarchy;
    use crate::model::KAnonymity;

    fn dataset() -> (MemoryDataManager, DataDefinition) {
        let definition = DataDefinition::new().quasi_identifier(
            "age",
            Hierarchy::from_slices(&[
                &["34", "30-39", "*"],
                &["36", "30-39", "*"],
                &["45", "40-49", "*"],
                &["47", "40-49", "*"],
            ]),
        );
        let table = vec![
            vec!["34".to_string()],
            vec!["36".to_string()],
            vec!["45".to_string()],
            vec!["47".to_string()],
        ];
        let manager = MemoryDataManager::from_table(&["age"], &table, &definition).unwrap();
        (manager, definition)
    }

    #[test]
    fn test_search_finds_minimal_anonymous_node() {
        let (manager, definition) = dataset();
        let config = AnonymizationConfig::new()
            .with_model(KAnonymity::new(2))
            .with_gs_factor(0.5);
        let result = Anonymizer::new()
            .anonymize(manager, definition, config)
            .unwrap();
        let optimum = result.global_optimum().expect("a solution exists");
        // Level 1 groups ages into decades of two rows each; level 2 would
        // lose strictly more information
        assert_eq!(optimum.generalization(), &[1]);
    }

    #[test]
    fn test_unsatisfiable_run_has_no_optimum() {
        let (manager, definition) = dataset();
        // k = 5 with four rows and no suppression budget cannot be met
        let config = AnonymizationConfig::new()
            .with_model(KAnonymity::new(5))
            .with_gs_factor(0.5);
        let result = Anonymizer::new()
            .anonymize(manager, definition, config)
            .unwrap();
        assert!(!result.is_available());
        assert!(result.global_optimum().is_none());
        assert!(result.output().is_err());
    }

    #[test]
    fn test_search_progress_is_monotone() {
        struct Recorder(Vec<f64>);
        impl ProgressListener for Recorder {
            fn progress(&mut self, value: f64) {
                self.0.push(value);
            }
        }
        let (manager, definition) = dataset();
        let config = AnonymizationConfig::new().with_model(KAnonymity::new(2));
        let mut recorder = Recorder(Vec::new());
        Anonymizer::new()
            .anonymize_with(
                manager,
                definition,
                config,
                &mut ExhaustiveSearch,
                &mut recorder,
            )
            .unwrap();
        assert!(recorder.0.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(recorder.0.last().copied(), Some(1.0));
    }
}
