//! Privacy Models and Anonymization Configuration
//!
//! The engine treats privacy models as pluggable class-level predicates.
//! [`KAnonymity`] is the built-in model; further models implement
//! [`PrivacyModel`] and advertise whether they tolerate local recoding.
//!
//! [`AnonymizationConfig`] bundles the models with the suppression limit,
//! the generalization/suppression factor, and (for local recoding) the row
//! subset a projected run is restricted to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::data::RowSet;
use crate::error::{EngineError, EngineResult};

/// A class-level privacy predicate
pub trait PrivacyModel: fmt::Debug + Send + Sync {
    /// Human-readable model name, used in logs and config snapshots
    fn name(&self) -> &str;

    /// Whether an equivalence class of `class_size` rows satisfies the model
    fn is_anonymous(&self, class_size: usize) -> bool;

    /// The smallest class size the model accepts, if it implies one
    fn minimal_group_size(&self) -> Option<usize>;

    /// Whether re-anonymizing a row subset preserves this model's guarantee
    fn supports_local_recoding(&self) -> bool;
}

/// k-anonymity: every equivalence class must contain at least `k` rows
#[derive(Debug, Clone)]
pub struct KAnonymity {
    k: usize,
    display_name: String,
}

impl KAnonymity {
    pub fn new(k: usize) -> Self {
        debug_assert!(k >= 1, "k-anonymity requires k >= 1");
        KAnonymity {
            k,
            display_name: format!("{k}-anonymity"),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

impl PrivacyModel for KAnonymity {
    fn name(&self) -> &str {
        &self.display_name
    }

    fn is_anonymous(&self, class_size: usize) -> bool {
        class_size >= self.k
    }

    fn minimal_group_size(&self) -> Option<usize> {
        Some(self.k)
    }

    fn supports_local_recoding(&self) -> bool {
        true
    }
}

/// Serializable summary of a configuration, for logs, tests, and persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub models: Vec<String>,
    pub max_outliers: f64,
    pub gs_factor: f64,
    pub subset_rows: Option<usize>,
}

/// Privacy configuration for one anonymization run
#[derive(Debug, Clone)]
pub struct AnonymizationConfig {
    models: Vec<Arc<dyn PrivacyModel>>,
    /// Fraction of rows that may be suppressed, in [0, 1]
    max_outliers: f64,
    /// 0 favors suppression, 1 favors generalization
    gs_factor: f64,
    row_subset: Option<RowSet>,
}

impl Default for AnonymizationConfig {
    fn default() -> Self {
        AnonymizationConfig {
            models: Vec::new(),
            max_outliers: 0.0,
            gs_factor: 0.5,
            row_subset: None,
        }
    }
}

impl AnonymizationConfig {
    pub fn new() -> Self {
        AnonymizationConfig::default()
    }

    pub fn with_model<M: PrivacyModel + 'static>(mut self, model: M) -> Self {
        self.models.push(Arc::new(model));
        self
    }

    /// Set the fraction of rows that may be suppressed
    pub fn with_suppression_limit(mut self, max_outliers: f64) -> Self {
        self.max_outliers = max_outliers;
        self
    }

    pub fn with_gs_factor(mut self, gs_factor: f64) -> Self {
        self.gs_factor = gs_factor;
        self
    }

    pub fn privacy_models(&self) -> &[Arc<dyn PrivacyModel>] {
        &self.models
    }

    pub fn max_outliers(&self) -> f64 {
        self.max_outliers
    }

    pub fn set_max_outliers(&mut self, max_outliers: f64) {
        self.max_outliers = max_outliers.clamp(0.0, 1.0);
    }

    pub fn gs_factor(&self) -> f64 {
        self.gs_factor
    }

    pub fn row_subset(&self) -> Option<&RowSet> {
        self.row_subset.as_ref()
    }

    /// The strictest minimal group size any model implies
    pub fn minimal_group_size(&self) -> Option<usize> {
        self.models
            .iter()
            .filter_map(|m| m.minimal_group_size())
            .max()
    }

    /// Whether every configured model tolerates local recoding
    pub fn supports_local_recoding(&self) -> bool {
        self.models.iter().all(|m| m.supports_local_recoding())
    }

    /// Clone this configuration restricted to `rows`, optionally overriding
    /// the generalization/suppression factor
    pub fn subset_for(&self, rows: RowSet, gs_factor: Option<f64>) -> Self {
        let mut clone = self.clone();
        clone.row_subset = Some(rows);
        if let Some(gs) = gs_factor {
            clone.gs_factor = gs;
        }
        clone
    }

    /// Validate the configuration against a dataset of `rows` rows
    pub fn initialize(&self, rows: usize) -> EngineResult<()> {
        if self.models.is_empty() {
            return Err(EngineError::InvalidArgument(
                "no privacy model configured".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_outliers) {
            return Err(EngineError::InvalidArgument(format!(
                "suppression limit {} out of [0, 1]",
                self.max_outliers
            )));
        }
        if !(0.0..=1.0).contains(&self.gs_factor) {
            return Err(EngineError::InvalidArgument(format!(
                "gs-factor {} out of [0, 1]",
                self.gs_factor
            )));
        }
        if rows == 0 {
            return Err(EngineError::InvalidArgument(
                "dataset has no rows".to_string(),
            ));
        }
        Ok(())
    }

    /// Serializable summary of this configuration
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            models: self.models.iter().map(|m| m.name().to_string()).collect(),
            max_outliers: self.max_outliers,
            gs_factor: self.gs_factor,
            subset_rows: self.row_subset.as_ref().map(RowSet::len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_anonymity_threshold() {
        let model = KAnonymity::new(3);
        assert!(!model.is_anonymous(2));
        assert!(model.is_anonymous(3));
        assert_eq!(model.minimal_group_size(), Some(3));
        assert!(model.supports_local_recoding());
    }

    #[test]
    fn test_minimal_group_size_is_strictest() {
        let config = AnonymizationConfig::new()
            .with_model(KAnonymity::new(2))
            .with_model(KAnonymity::new(5));
        assert_eq!(config.minimal_group_size(), Some(5));
    }

    #[test]
    fn test_subset_for_overrides_gs() {
        let config = AnonymizationConfig::new()
            .with_model(KAnonymity::new(2))
            .with_gs_factor(0.3);
        let rows = RowSet::from_indices(10, &[1, 4]);
        let subset = config.subset_for(rows, Some(0.9));
        assert_eq!(subset.gs_factor(), 0.9);
        assert_eq!(subset.row_subset().unwrap().len(), 2);
        // Original is untouched
        assert_eq!(config.gs_factor(), 0.3);
        assert!(config.row_subset().is_none());
    }

    #[test]
    fn test_initialize_rejects_empty_models() {
        let config = AnonymizationConfig::new();
        assert!(config.initialize(10).is_err());
    }

    #[test]
    fn test_snapshot_contents() {
        let config = AnonymizationConfig::new()
            .with_model(KAnonymity::new(2))
            .with_suppression_limit(0.25);
        let snap = config.snapshot();
        assert_eq!(snap.models, vec!["2-anonymity".to_string()]);
        assert_eq!(snap.max_outliers, 0.25);
        assert_eq!(snap.subset_rows, None);
    }
}
