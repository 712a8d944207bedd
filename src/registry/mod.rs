//! # Registry Infrastructure
//!
//! Startup-time registry mapping each `query_type` to the decomposer that
//! splits it into CREATE tasks.
//!
//! ```text
//! ExecutorsConfig ──► ExecutorRegistry ──► query_type → Arc<dyn QueryDecomposer>
//!                                             ├── SlotDecomposer  ("slot")
//!                                             └── RangeDecomposer ("range")
//! ```

pub mod decomposers;
pub mod executor_registry;

// Re-export main types for easy access
pub use decomposers::{QueryDecomposer, RangeDecomposer, SlotDecomposer};
pub use executor_registry::{ExecutorRegistry, BUILTIN_DECOMPOSERS};
