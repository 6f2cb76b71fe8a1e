//! # Shared Sample Records (producer ↔ callscope)
//!
//! Defines the record vocabulary exchanged between a sample producer (a
//! recorder, a file reader, an FFI binding) and the callscope aggregation
//! engine. Producers only need this crate; they never link the engine.
//!
//! ## Key Types
//!
//! - [`Sample`] - one performance-counter sample with its callchain
//! - [`SymbolEntry`] - a resolved frame: binary path, symbol, addresses
//!
//! ## Placeholder Binaries
//!
//! Some frames do not belong to a file on disk (anonymous JIT mappings, the
//! kernel, frames the recorder could not attribute). Their `dso_path` is one
//! of the synthetic names below, and [`is_placeholder_dso`] tells consumers
//! never to look them up on disk.

// ============================================================================
// Placeholder DSO Names
// ============================================================================

/// Anonymous executable mapping (JIT code, `mmap`ed trampolines)
pub const ANON_DSO: &str = "//anon";

/// Frame the recorder could not attribute to any mapping
pub const UNKNOWN_DSO: &str = "unknown";

/// Kernel frames, symbolized from the kernel symbol table
pub const KERNEL_DSO: &str = "[kernel.kallsyms]";

/// Returns true if `dso_path` names a synthetic mapping rather than a file.
///
/// Anything that is not an absolute path counts as synthetic, which also
/// covers `[vdso]`, `[stack]` and similar bracketed names.
#[must_use]
pub fn is_placeholder_dso(dso_path: &str) -> bool {
    !dso_path.starts_with('/') || dso_path == ANON_DSO
}

// ============================================================================
// Shared Data Structures
// ============================================================================

/// One resolved frame of a sample
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SymbolEntry {
    /// Path of the binary on the profiled device (or a placeholder name)
    pub dso_path: String,

    /// Symbol name as reported by the recorder (may still be mangled)
    pub symbol_name: String,

    /// Start address of the symbol, in the binary's virtual address space
    #[cfg_attr(feature = "serde", serde(default))]
    pub symbol_addr: u64,

    /// Length of the symbol in bytes (0 if unknown)
    #[cfg_attr(feature = "serde", serde(default))]
    pub symbol_len: u64,

    /// Address of this frame, in the binary's virtual address space
    #[cfg_attr(feature = "serde", serde(default))]
    pub vaddr_in_file: u64,
}

/// A performance-counter sample
///
/// `symbol` is the interrupted instruction (the leaf). `callchain` lists the
/// callers outward from the leaf, so `callchain[i + 1]` called `callchain[i]`
/// and `callchain[0]` called `symbol`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// Process ID (thread group leader)
    pub pid: u32,

    /// Thread ID
    pub tid: u32,

    /// Thread name at the time of the sample (`comm`), may be empty
    #[cfg_attr(feature = "serde", serde(default))]
    pub thread_comm: String,

    /// Name of the event that fired (e.g. `cpu-cycles`)
    pub event_name: String,

    /// Event count attributed to this sample
    pub period: u64,

    /// Leaf frame
    pub symbol: SymbolEntry,

    /// Caller frames, innermost first
    #[cfg_attr(feature = "serde", serde(default))]
    pub callchain: Vec<SymbolEntry>,
}

impl Sample {
    /// Iterate over the leaf frame followed by every callchain frame.
    pub fn frames(&self) -> impl Iterator<Item = &SymbolEntry> {
        std::iter::once(&self.symbol).chain(self.callchain.iter())
    }
}
