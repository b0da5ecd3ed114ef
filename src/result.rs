//! Anonymization Result
//!
//! The façade over a finished run: it owns the manager, the checker, the
//! lattice, and the handle registry, and materializes outputs for chosen
//! lattice nodes under the buffer-lock protocol. Local-recoding entry
//! points delegate to [`crate::optimizer::LocalRecodingOptimizer`].
//!
//! A result can also be reconstructed from persisted state; the byte
//! stream is a bincode-encoded atom readable only by this module.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};

use crate::anonymizer::AnonymizerState;
use crate::checker::{NodeChecker, TransformationChecker};
use crate::config::EngineConfig;
use crate::data::{
    DataDefinition, DataManager, DictionarySnapshot, MemoryDataManager, RowSet,
};
use crate::error::{EngineError, EngineResult};
use crate::lattice::{Lattice, Property, SolutionSpace, Transformation};
use crate::listener::{NoopListener, ProgressListener};
use crate::metric::Metric;
use crate::model::{AnonymizationConfig, ConfigSnapshot};
use crate::optimizer::LocalRecodingOptimizer;
use crate::output::{DataHandleInput, DataHandleOutput, OutputBuffer, ResultRegistry};
use crate::statistics::OutputStatistics;

/// Bincode-encoded persistence atom
#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    header: Vec<String>,
    table: Vec<Vec<String>>,
    dictionary: DictionarySnapshot,
    definition: DataDefinition,
    optimum: Vec<u32>,
    duration_millis: u64,
    config: ConfigSnapshot,
}

/// Result of one anonymization run
#[derive(Debug)]
pub struct AnonymizationResult {
    anonymizer: Weak<AnonymizerState>,
    manager: MemoryDataManager,
    checker: Mutex<TransformationChecker>,
    definition: DataDefinition,
    config: AnonymizationConfig,
    engine_config: EngineConfig,
    lattice: Lattice,
    space: Arc<SolutionSpace>,
    registry: ResultRegistry,
    input_handle: Mutex<DataHandleInput>,
    duration_millis: u64,
}

impl AnonymizationResult {
    /// Wrap a just-finished run
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_run(
        anonymizer: Weak<AnonymizerState>,
        manager: MemoryDataManager,
        checker: TransformationChecker,
        definition: DataDefinition,
        config: AnonymizationConfig,
        engine_config: EngineConfig,
        lattice: Lattice,
        space: Arc<SolutionSpace>,
        duration_millis: u64,
    ) -> Self {
        let mut input_handle = DataHandleInput::new();
        input_handle.attach_definition(definition.clone());
        input_handle.expose(&manager);
        input_handle.lock();
        AnonymizationResult {
            anonymizer,
            manager,
            checker: Mutex::new(checker),
            definition,
            config,
            engine_config,
            lattice,
            space,
            registry: ResultRegistry::new(),
            input_handle: Mutex::new(input_handle),
            duration_millis,
        }
    }

    /// Reconstruct a result from a persisted byte stream.
    ///
    /// The privacy configuration and metric are supplied by the caller
    /// (models are not serialized); the stream carries the data, the
    /// definition, the dictionary, and the optimum.
    pub fn from_persisted(
        bytes: &[u8],
        config: AnonymizationConfig,
        mut metric: Box<dyn Metric>,
        engine_config: &EngineConfig,
    ) -> EngineResult<Self> {
        let state: PersistedState = bincode::deserialize(bytes)
            .map_err(|e| EngineError::Persistence(e.to_string()))?;

        let mut input_handle = DataHandleInput::new();
        input_handle.attach_definition(state.definition.clone());

        let registry = ResultRegistry::new();
        let all_rows: Vec<usize> = (0..state.table.len()).collect();
        registry.set_input_subset(RowSet::from_indices(state.table.len(), &all_rows));

        let space = SolutionSpace::from_definition(&state.definition)?;
        let lattice = Lattice::new(Arc::clone(&space));
        let optimum = space.transformation_for(&state.optimum)?;
        lattice.set_optimum(optimum.id());

        let header: Vec<&str> = state.header.iter().map(String::as_str).collect();
        let manager = MemoryDataManager::from_table(&header, &state.table, &state.definition)?;
        // Replay the persisted dictionary so previously interned codes
        // (microaggregates in particular) keep their values
        for (col, values) in state.dictionary.columns().iter().enumerate() {
            for value in values {
                manager.dictionary().register(col, value);
            }
        }

        input_handle.expose(&manager);
        input_handle.lock();

        config.initialize(manager.rows())?;
        let generalized = Arc::clone(manager.generalized_matrix());
        metric.initialize(
            &manager,
            &state.definition,
            &generalized,
            manager.hierarchies(),
            &config,
        )?;
        let checker = TransformationChecker::new(
            manager.clone(),
            state.definition.clone(),
            config.clone(),
            metric,
            engine_config.checker.clone(),
        );
        tracing::info!(
            rows = manager.rows(),
            optimum = ?state.optimum,
            "result_deserialized"
        );

        Ok(AnonymizationResult {
            anonymizer: Weak::new(),
            manager,
            checker: Mutex::new(checker),
            definition: state.definition,
            config,
            engine_config: engine_config.clone(),
            lattice,
            space,
            registry,
            input_handle: Mutex::new(input_handle),
            duration_millis: state.duration_millis,
        })
    }

    /// Encode this result into the persistence atom
    pub fn to_persisted(&self) -> EngineResult<Vec<u8>> {
        let optimum = self.global_optimum().ok_or_else(|| {
            EngineError::InvalidArgument("an unsatisfiable result cannot be persisted".to_string())
        })?;

        let qis = self.definition.quasi_identifiers();
        let micros = self.definition.microaggregations();
        let statics = self.definition.static_attributes();
        let mut header: Vec<String> = qis.iter().map(|q| q.name.clone()).collect();
        header.extend(micros.iter().map(|m| m.attribute.clone()));
        header.extend(statics.iter().cloned());

        let dict = self.manager.dictionary();
        let generalized = self.manager.generalized_matrix();
        let analyzed = self.manager.analyzed_matrix();
        let static_matrix = self.manager.static_matrix();
        let mut table = Vec::with_capacity(self.manager.rows());
        for r in 0..self.manager.rows() {
            let mut row = Vec::with_capacity(header.len());
            for q in 0..qis.len() {
                row.push(dict.value(q, generalized.get(r, q)).unwrap_or_default());
            }
            for m in 0..micros.len() {
                row.push(
                    dict.value(self.manager.micro_dict_col(m), analyzed.get(r, m))
                        .unwrap_or_default(),
                );
            }
            for s in 0..statics.len() {
                row.push(
                    dict.value(self.manager.static_dict_col(s), static_matrix.get(r, s))
                        .unwrap_or_default(),
                );
            }
            table.push(row);
        }

        let state = PersistedState {
            header,
            table,
            dictionary: dict.snapshot(),
            definition: self.definition.clone(),
            optimum: optimum.generalization().to_vec(),
            duration_millis: self.duration_millis,
            config: self.config.snapshot(),
        };
        bincode::serialize(&state).map_err(|e| EngineError::Persistence(e.to_string()))
    }

    /// The transformation the search found optimal, if any
    pub fn global_optimum(&self) -> Option<Transformation> {
        self.lattice
            .optimum()
            .map(|id| self.space.transformation_for_id(id))
    }

    /// Whether the search found any privacy-preserving transformation
    pub fn is_available(&self) -> bool {
        self.lattice.optimum().is_some()
    }

    /// Unforked output for the global optimum
    pub fn output(&self) -> EngineResult<DataHandleOutput> {
        let optimum = self.global_optimum().ok_or_else(|| {
            EngineError::InvalidArgument("no privacy-preserving transformation found".to_string())
        })?;
        self.output_with(&optimum, false)
    }

    /// Unforked output for `node`
    pub fn output_for(&self, node: &Transformation) -> EngineResult<DataHandleOutput> {
        self.output_with(node, false)
    }

    /// Materialize an output for `node`.
    ///
    /// `fork = false` produces (or reuses) the single locked handle;
    /// `fork = true` produces a handle that exclusively owns its freshly
    /// materialized buffers and fails with [`EngineError::BufferLocked`]
    /// while an unforked handle is outstanding.
    pub fn output_with(
        &self,
        node: &Transformation,
        fork: bool,
    ) -> EngineResult<DataHandleOutput> {
        let transformation = self.space.transformation_for(node.generalization())?;

        if fork && self.registry.is_locked() {
            return Err(EngineError::BufferLocked);
        }

        if !fork {
            if let Some((handle, locked_node)) = self.registry.locked_entry() {
                if locked_node == transformation.id() && !handle.optimized() {
                    return Ok(handle);
                }
                self.registry.release(&handle);
            }
            if let Some(handle) = self.registry.cached(transformation.id()) {
                // A locally-recoded handle is released, not returned: a
                // fresh request re-applies the un-optimized transformation
                if !handle.optimized() {
                    return Ok(handle);
                }
                self.registry.release(&handle);
            }
        }

        let (outcome, input) = {
            let mut checker = self.checker.lock();
            let outcome = checker.apply(&transformation)?;
            checker.reset();
            (outcome, Arc::clone(checker.input_buffer()))
        };

        if !transformation.is_score_resolved() {
            transformation.set_checked(
                outcome.is_anonymous(),
                outcome.information_loss,
                outcome.lower_bound,
            );
            transformation.set_property(if outcome.properties.contains(Property::KAnonymous) {
                Property::KAnonymous
            } else {
                Property::NotKAnonymous
            });
            self.lattice.update_loss_bounds();
        }

        let buffer = OutputBuffer::new(
            outcome.buffer_generalized,
            outcome.buffer_microaggregated,
            input,
            transformation.id(),
            transformation.generalization().to_vec(),
        );
        let handle = DataHandleOutput::new(
            buffer,
            Arc::clone(self.manager.dictionary()),
            self.definition.clone(),
            fork,
        );
        if !fork {
            self.registry.register(transformation.id(), handle.clone());
            self.registry.set_lock(handle.clone(), transformation.id());
        }
        tracing::debug!(
            node = transformation.id(),
            fork,
            outliers = handle.outlier_count(),
            "output_materialized"
        );
        Ok(handle)
    }

    /// Release `handle`'s buffer lock and cache entry
    pub fn release_handle(&self, handle: &DataHandleOutput) -> bool {
        self.registry.release(handle)
    }

    /// Whether `handle` qualifies for local recoding
    pub fn is_optimizable(&self, handle: &DataHandleOutput) -> bool {
        LocalRecodingOptimizer::new(self).is_optimizable(handle)
    }

    /// One local-recoding step with configured parameters
    pub fn optimize(&self, handle: &DataHandleOutput) -> EngineResult<usize> {
        let mut listener = NoopListener;
        self.optimize_fast(handle, None, None, &mut listener)
    }

    /// One local-recoding step with an explicit gs-factor
    pub fn optimize_with(
        &self,
        handle: &DataHandleOutput,
        gs_factor: Option<f64>,
        listener: &mut dyn ProgressListener,
    ) -> EngineResult<usize> {
        self.optimize_fast(handle, None, gs_factor, listener)
    }

    /// One local-recoding step bounded to a fraction of all records
    pub fn optimize_fast(
        &self,
        handle: &DataHandleOutput,
        records: Option<f64>,
        gs_factor: Option<f64>,
        listener: &mut dyn ProgressListener,
    ) -> EngineResult<usize> {
        LocalRecodingOptimizer::new(self).optimize_fast(handle, records, gs_factor, listener)
    }

    /// Greedy iterative refinement with fixpoint escape
    pub fn optimize_iterative(
        &self,
        handle: &DataHandleOutput,
        gs_factor: f64,
        max_iterations: usize,
        adaption: f64,
        listener: &mut dyn ProgressListener,
    ) -> EngineResult<usize> {
        LocalRecodingOptimizer::new(self).optimize_iterative(
            handle,
            gs_factor,
            max_iterations,
            adaption,
            listener,
        )
    }

    /// Batched-by-fraction iterative refinement
    pub fn optimize_iterative_fast(
        &self,
        handle: &DataHandleOutput,
        records: f64,
        gs_factor: Option<f64>,
        listener: &mut dyn ProgressListener,
    ) -> EngineResult<usize> {
        LocalRecodingOptimizer::new(self).optimize_iterative_fast(
            handle, records, gs_factor, listener,
        )
    }

    /// Equivalence-class statistics over an output
    pub fn statistics_for(&self, handle: &DataHandleOutput) -> OutputStatistics {
        OutputStatistics::from_handle(handle)
    }

    pub fn configuration(&self) -> &AnonymizationConfig {
        &self.config
    }

    pub fn data_definition(&self) -> &DataDefinition {
        &self.definition
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn solution_space(&self) -> &Arc<SolutionSpace> {
        &self.space
    }

    /// Wall-clock duration of the producing search
    pub fn duration_millis(&self) -> u64 {
        self.duration_millis
    }

    /// Whether the input handle is locked (always true while this result
    /// exists)
    pub fn input_locked(&self) -> bool {
        self.input_handle.lock().is_locked()
    }

    pub(crate) fn manager(&self) -> &MemoryDataManager {
        &self.manager
    }

    pub(crate) fn checker(&self) -> &Mutex<TransformationChecker> {
        &self.checker
    }

    pub(crate) fn engine_config(&self) -> &EngineConfig {
        &self.engine_config
    }

    pub(crate) fn anonymizer(&self) -> Weak<AnonymizerState> {
        self.anonymizer.clone()
    }
}
