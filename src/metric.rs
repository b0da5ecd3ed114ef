//! Information-Loss Metrics
//!
//! A [`Metric`] scores a transformation after the checker has classified
//! its equivalence classes. Scores are opaque ordered scalars
//! ([`InformationLoss`]); the engine only ever compares them.
//!
//! The built-in [`PrecisionMetric`] charges the average normalized
//! generalization level, weighted against the suppressed-row fraction by
//! the configured generalization/suppression factor.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::{DataDefinition, DataMatrix, MaterializedHierarchy, MemoryDataManager};
use crate::error::{EngineError, EngineResult};
use crate::lattice::Transformation;
use crate::model::AnonymizationConfig;

/// Opaque ordered utility score; lower is better
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InformationLoss(OrderedFloat<f64>);

impl InformationLoss {
    pub fn value(self) -> f64 {
        self.0.into_inner()
    }
}

impl From<f64> for InformationLoss {
    fn from(v: f64) -> Self {
        InformationLoss(OrderedFloat(v))
    }
}

impl fmt::Display for InformationLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0.into_inner())
    }
}

/// A transformation's score pair as produced by a metric
#[derive(Debug, Clone, Copy)]
pub struct MetricScore {
    pub information_loss: InformationLoss,
    /// Loss achievable by this node in the best case (no suppression)
    pub lower_bound: InformationLoss,
}

/// Scoring strategy over checked transformations
pub trait Metric: fmt::Debug + Send + Sync {
    /// Bind the metric to a dataset before any evaluation
    fn initialize(
        &mut self,
        manager: &MemoryDataManager,
        definition: &DataDefinition,
        generalized: &DataMatrix,
        hierarchies: &[MaterializedHierarchy],
        config: &AnonymizationConfig,
    ) -> EngineResult<()>;

    /// Score `transformation` given the number of suppressed rows
    fn evaluate(
        &self,
        transformation: &Transformation,
        suppressed: usize,
        total: usize,
    ) -> MetricScore;
}

/// Precision-style loss: average per-column `level / max_level`, traded
/// against the suppressed fraction by the gs-factor. A factor of 0 makes
/// suppression free (favoring it), 1 makes generalization free.
#[derive(Debug, Default)]
pub struct PrecisionMetric {
    max_levels: Vec<u32>,
    gs_factor: f64,
    initialized: bool,
}

impl PrecisionMetric {
    pub fn new() -> Self {
        PrecisionMetric::default()
    }

    fn generalization_part(&self, transformation: &Transformation) -> f64 {
        let mut sum = 0.0;
        let mut counted = 0usize;
        for (level, &max) in transformation.generalization().iter().zip(&self.max_levels) {
            if max > 0 {
                sum += f64::from(*level) / f64::from(max);
                counted += 1;
            }
        }
        if counted == 0 {
            0.0
        } else {
            sum / counted as f64
        }
    }
}

impl Metric for PrecisionMetric {
    fn initialize(
        &mut self,
        _manager: &MemoryDataManager,
        definition: &DataDefinition,
        _generalized: &DataMatrix,
        hierarchies: &[MaterializedHierarchy],
        config: &AnonymizationConfig,
    ) -> EngineResult<()> {
        if definition.quasi_identifiers().len() != hierarchies.len() {
            return Err(EngineError::Internal(
                "definition and hierarchies disagree on column count".to_string(),
            ));
        }
        self.max_levels = hierarchies
            .iter()
            .map(|h| h.levels().saturating_sub(1) as u32)
            .collect();
        self.gs_factor = config.gs_factor();
        self.initialized = true;
        Ok(())
    }

    fn evaluate(
        &self,
        transformation: &Transformation,
        suppressed: usize,
        total: usize,
    ) -> MetricScore {
        debug_assert!(self.initialized, "metric evaluated before initialize");
        let generalization = self.generalization_part(transformation);
        let suppression = if total == 0 {
            0.0
        } else {
            suppressed as f64 / total as f64
        };
        let gs = self.gs_factor;
        let loss = gs * suppression + (1.0 - gs) * generalization;
        let bound = (1.0 - gs) * generalization;
        MetricScore {
            information_loss: InformationLoss::from(loss),
            lower_bound: InformationLoss::from(bound),
        }
    }
}
