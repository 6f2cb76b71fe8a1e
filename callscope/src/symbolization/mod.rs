//! # Binary Lookup and Source Line Resolution
//!
//! Maps addresses recorded in samples back to source files and line numbers.
//! This is best effort: every failure here degrades the annotation, never
//! the cost totals.
//!
//! ## Key Concepts
//!
//! ### Build-ids
//!
//! A binary recorded on a device is identified by its path and its
//! **build-id**, a hash the linker stores in a `.note.gnu.build-id` section.
//! A local copy is only trusted when its build-id equals the recorded one;
//! a stale copy is re-fetched rather than silently used.
//!
//! ### Line tables
//!
//! Source lines come from the binary's `.debug_line` section, read by an
//! external line-table tool (`addr2line`) rather than in-process. Binaries
//! without `.debug_line` are skipped up front.
//!
//! ### Widening retries
//!
//! Some addresses have no line of their own (thunks, jump tables, tail-call
//! return sites) but follow an instruction that does. Unresolved addresses
//! are retried at earlier addresses, stepping by the minimum instruction
//! alignment, never leaving the enclosing function:
//!
//! ```text
//! step:  x86/x86_64 = 1    arm = 2    arm64 = 4
//! ```
//!
//! ## Module Structure
//!
//! - **`elf`**: build-id, architecture and `.debug_line` presence
//! - **`binary_cache`**: build-id verified local copies of device binaries
//! - **`subprocess`**: bounded tool runs shared by the two drivers below
//! - **`line_tool`**: subprocess driver and output parser for `addr2line`
//! - **`disassembler`**: per-function `objdump` driver and output parser
//! - **`address_resolver`**: per-binary batching, retry passes, worker pool
//! - **`source_files`**: interned source files and source text loading
//! - **`demangle`**: display names for mangled Rust symbols

pub mod address_resolver;
pub mod binary_cache;
pub mod demangle;
pub mod disassembler;
pub mod elf;
pub mod line_tool;
pub mod source_files;
pub mod subprocess;

pub use address_resolver::{AddressResolver, Dso, ResolveStats};
pub use binary_cache::{
    BinaryCache, BinaryLocations, BinaryProvider, BinaryRequest, HostFileProvider, SymfsIndex,
};
pub use demangle::demangle_symbol;
pub use disassembler::Disassembler;
pub use elf::{inspect, read_build_id, ElfInfo};
pub use line_tool::LineTableTool;
pub use source_files::{SourceFile, SourceFileLoader, SourceFileRegistry};
