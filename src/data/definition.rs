//! Data Definition
//!
//! Describes how each attribute of the input participates in
//! anonymization: quasi-identifiers carry a generalization hierarchy and a
//! level range, microaggregated attributes carry an aggregate function, and
//! static attributes pass through untouched.

use serde::{Deserialize, Serialize};

/// A generalization hierarchy in string form.
///
/// One row per distinct level-0 value; column `l` of a row is the value's
/// label at generalization level `l`. All rows have the same length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hierarchy {
    rows: Vec<Vec<String>>,
}

impl Hierarchy {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Hierarchy { rows }
    }

    /// Build from string slices, for tests and embedded hierarchies
    pub fn from_slices(rows: &[&[&str]]) -> Self {
        Hierarchy {
            rows: rows
                .iter()
                .map(|row| row.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    /// Number of generalization levels (0 = untransformed)
    pub fn levels(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

/// Aggregate functions available for microaggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MicroAggregationKind {
    ArithmeticMean,
    GeometricMean,
    Median,
    Mode,
}

impl MicroAggregationKind {
    /// Create a fresh, stateless-start aggregator for this function
    pub fn aggregator(self) -> Aggregator {
        Aggregator::new(self)
    }
}

/// Stateful aggregate accumulator. Feed cell values with [`Aggregator::add`],
/// read the class aggregate with [`Aggregator::finish`], and [`Aggregator::reset`]
/// between equivalence classes.
#[derive(Debug, Clone)]
pub struct Aggregator {
    kind: MicroAggregationKind,
    numbers: Vec<f64>,
    labels: Vec<String>,
}

impl Aggregator {
    pub fn new(kind: MicroAggregationKind) -> Self {
        Aggregator {
            kind,
            numbers: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Accumulate one cell value. Non-numeric cells still participate in
    /// mode aggregation and in the fallback for numeric functions.
    pub fn add(&mut self, raw: &str) {
        if let Ok(v) = raw.trim().parse::<f64>() {
            self.numbers.push(v);
        }
        self.labels.push(raw.to_string());
    }

    /// Clear accumulated state
    pub fn reset(&mut self) {
        self.numbers.clear();
        self.labels.clear();
    }

    /// Compute the aggregate label for the accumulated class.
    ///
    /// Numeric functions fall back to the mode when no cell parsed as a
    /// number; the geometric mean falls back to the arithmetic mean when a
    /// non-positive value is present.
    pub fn finish(&self) -> String {
        match self.kind {
            MicroAggregationKind::ArithmeticMean => self
                .arithmetic_mean()
                .map_or_else(|| self.mode(), format_number),
            MicroAggregationKind::GeometricMean => self
                .geometric_mean()
                .or_else(|| self.arithmetic_mean())
                .map_or_else(|| self.mode(), format_number),
            MicroAggregationKind::Median => {
                self.median().map_or_else(|| self.mode(), format_number)
            }
            MicroAggregationKind::Mode => self.mode(),
        }
    }

    fn arithmetic_mean(&self) -> Option<f64> {
        if self.numbers.is_empty() {
            return None;
        }
        Some(self.numbers.iter().sum::<f64>() / self.numbers.len() as f64)
    }

    fn geometric_mean(&self) -> Option<f64> {
        if self.numbers.is_empty() || self.numbers.iter().any(|&v| v <= 0.0) {
            return None;
        }
        let log_sum: f64 = self.numbers.iter().map(|v| v.ln()).sum();
        Some((log_sum / self.numbers.len() as f64).exp())
    }

    fn median(&self) -> Option<f64> {
        if self.numbers.is_empty() {
            return None;
        }
        let mut sorted = self.numbers.clone();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 1 {
            Some(sorted[mid])
        } else {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        }
    }

    /// Most frequent label; ties resolve to the lexicographically smallest
    /// so the result is deterministic
    fn mode(&self) -> String {
        let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for label in &self.labels {
            *counts.entry(label.as_str()).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(label, _)| label.to_string())
            .unwrap_or_default()
    }
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v:.2}")
    }
}

/// A quasi-identifier attribute with its hierarchy and level range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuasiIdentifier {
    pub name: String,
    pub hierarchy: Hierarchy,
    /// Minimum generalization level the search may use
    pub min_level: u32,
    /// Maximum generalization level the search may use (inclusive)
    pub max_level: u32,
}

/// A microaggregated attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroAggregationSpec {
    pub attribute: String,
    pub kind: MicroAggregationKind,
}

impl MicroAggregationSpec {
    /// Fresh stateful aggregator for this attribute
    pub fn function(&self) -> Aggregator {
        self.kind.aggregator()
    }
}

/// Attribute roles for one dataset.
///
/// Cloning a definition isolates all microaggregation state: aggregators
/// are created from the owning instance at use time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDefinition {
    quasi_identifiers: Vec<QuasiIdentifier>,
    microaggregations: Vec<MicroAggregationSpec>,
    static_attributes: Vec<String>,
}

impl DataDefinition {
    pub fn new() -> Self {
        DataDefinition::default()
    }

    /// Declare a quasi-identifier using the hierarchy's full level range
    pub fn quasi_identifier(self, name: &str, hierarchy: Hierarchy) -> Self {
        let max = hierarchy.levels().saturating_sub(1) as u32;
        self.quasi_identifier_bounded(name, hierarchy, 0, max)
    }

    /// Declare a quasi-identifier restricted to `[min_level, max_level]`
    pub fn quasi_identifier_bounded(
        mut self,
        name: &str,
        hierarchy: Hierarchy,
        min_level: u32,
        max_level: u32,
    ) -> Self {
        self.quasi_identifiers.push(QuasiIdentifier {
            name: name.to_string(),
            hierarchy,
            min_level,
            max_level,
        });
        self
    }

    /// Declare a microaggregated attribute
    pub fn microaggregated(mut self, name: &str, kind: MicroAggregationKind) -> Self {
        self.microaggregations.push(MicroAggregationSpec {
            attribute: name.to_string(),
            kind,
        });
        self
    }

    /// Declare an attribute that passes through untouched
    pub fn static_attribute(mut self, name: &str) -> Self {
        self.static_attributes.push(name.to_string());
        self
    }

    pub fn quasi_identifiers(&self) -> &[QuasiIdentifier] {
        &self.quasi_identifiers
    }

    pub fn microaggregations(&self) -> &[MicroAggregationSpec] {
        &self.microaggregations
    }

    pub fn static_attributes(&self) -> &[String] {
        &self.static_attributes
    }

    /// Look up the microaggregation declared for `name`
    pub fn microaggregation_for(&self, name: &str) -> Option<&MicroAggregationSpec> {
        self.microaggregations.iter().find(|m| m.attribute == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_mean() {
        let mut agg = MicroAggregationKind::ArithmeticMean.aggregator();
        agg.add("10");
        agg.add("20");
        agg.add("30");
        assert_eq!(agg.finish(), "20");
    }

    #[test]
    fn test_median_even_count() {
        let mut agg = MicroAggregationKind::Median.aggregator();
        agg.add("1");
        agg.add("2");
        agg.add("3");
        agg.add("10");
        assert_eq!(agg.finish(), "2.50");
    }

    #[test]
    fn test_mode_tie_is_deterministic() {
        let mut agg = MicroAggregationKind::Mode.aggregator();
        agg.add("b");
        agg.add("a");
        assert_eq!(agg.finish(), "a");
    }

    #[test]
    fn test_geometric_mean_falls_back_on_nonpositive() {
        let mut agg = MicroAggregationKind::GeometricMean.aggregator();
        agg.add("0");
        agg.add("8");
        assert_eq!(agg.finish(), "4");
    }

    #[test]
    fn test_reset_clears_state() {
        let mut agg = MicroAggregationKind::ArithmeticMean.aggregator();
        agg.add("100");
        agg.reset();
        agg.add("4");
        assert_eq!(agg.finish(), "4");
    }
}
