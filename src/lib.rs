//! # LatticeVeil Anonymization Engine
//!
//! A data-anonymization engine: given a tabular dataset and a privacy
//! configuration, it searches the lattice of generalization strategies for
//! a transformation that satisfies every declared privacy model while
//! minimizing information loss, then offers iterative local-recoding
//! refinement of the still-re-identifiable rows.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Table + DataDefinition + AnonymizationConfig
//!     ↓
//! [MemoryDataManager]        → code matrices + hierarchies + dictionary
//!     ↓
//! [SolutionSpace / Lattice]  → generalization vectors ↔ node ids
//!     ↓
//! [SearchStrategy]           → checks nodes via TransformationChecker
//!     ↓
//! [AnonymizationResult]      → output handles (buffer lock, forking)
//!     ↓
//! [LocalRecodingOptimizer]   → re-anonymize outlier rows, merge back
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use latticeveil::{
//!     Anonymizer, AnonymizationConfig, DataDefinition, Hierarchy,
//!     KAnonymity, MemoryDataManager,
//! };
//!
//! let definition = DataDefinition::new()
//!     .quasi_identifier("age", age_hierarchy);
//! let manager = MemoryDataManager::from_table(&header, &rows, &definition)?;
//! let config = AnonymizationConfig::new()
//!     .with_model(KAnonymity::new(2))
//!     .with_suppression_limit(0.1);
//!
//! let result = Anonymizer::new().anonymize(manager, definition, config)?;
//! let output = result.output()?;
//!
//! // Refine the remaining outliers without losing privacy
//! let recoded = result.optimize(&output)?;
//! println!("{recoded} rows rescued from suppression");
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `data` | Code matrices, dictionary, row sets, definition, manager |
//! | `lattice` | Transformations, solution space, lattice bookkeeping |
//! | `model` | Privacy models and the anonymization configuration |
//! | `metric` | Information-loss scoring |
//! | `checker` | Node application and classification |
//! | `output` | Buffers, handles, and the lock-enforcing registry |
//! | `result` | The result façade and persistence |
//! | `optimizer` | Local-recoding refinement |
//! | `anonymizer` | Run orchestration and search strategies |
//! | `statistics` | Equivalence-class statistics over outputs |

pub mod anonymizer;
pub mod checker;
pub mod config;
pub mod data;
pub mod error;
pub mod lattice;
pub mod listener;
pub mod metric;
pub mod model;
pub mod optimizer;
pub mod output;
pub mod result;
pub mod statistics;

pub use anonymizer::{Anonymizer, ExhaustiveSearch, SearchStrategy};
pub use checker::{NodeChecker, TransformationChecker, TransformedData};
pub use config::EngineConfig;
pub use data::{
    DataDefinition, DataManager, Hierarchy, MemoryDataManager, MicroAggregationKind, RowSet,
    OUTLIER_MASK,
};
pub use error::{EngineError, EngineResult};
pub use lattice::{Lattice, Property, SolutionSpace, Transformation};
pub use listener::{NoopListener, ProgressListener};
pub use metric::{InformationLoss, Metric, PrecisionMetric};
pub use model::{AnonymizationConfig, KAnonymity, PrivacyModel};
pub use optimizer::LocalRecodingOptimizer;
pub use output::{DataHandleOutput, ResultRegistry};
pub use result::AnonymizationResult;
pub use statistics::OutputStatistics;
