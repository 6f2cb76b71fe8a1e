//! Domain model for callscope
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{
    BuildId, DisassemblyLine, FunctionId, LibId, LineRange, Period, Pid, SourceFileId, SourceLine,
    Tid,
};

pub use errors::{AggregationError, CacheError, ElfError, ResolveError, SampleError};
