//! Structured error types for callscope
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure reading the sample stream. Always fatal for the run.
#[derive(Error, Debug)]
pub enum SampleError {
    #[error("Malformed sample record at line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("Function registry is frozen; cannot intern {name} after pruning")]
    RegistryFrozen { name: String },
}

#[derive(Error, Debug)]
pub enum ElfError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a supported ELF file: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: object::Error,
    },
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to copy {from} to {to}: {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure of an external tool run (line tables or disassembly)
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("{0} doesn't contain a .debug_line section")]
    NoDebugLine(PathBuf),

    #[error("Failed to start {tool}: {source}")]
    ToolSpawn {
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} timed out after {timeout:?}")]
    ToolTimeout { tool: PathBuf, timeout: Duration },

    #[error(transparent)]
    Elf(#[from] ElfError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
