//! Output Materialization
//!
//! Buffers, caller-facing handles, and the registry that enforces the
//! single-unforked-handle lock.

pub mod buffer;
pub mod handle;
pub mod registry;

pub use buffer::OutputBuffer;
pub use handle::{DataHandleInput, DataHandleOutput};
pub use registry::ResultRegistry;
