//! Analysis over the aggregated report
//!
//! This module contains the passes that read (or annotate) the aggregation
//! trees after pruning, separated from export and presentation.

pub mod disassembly;
pub mod hotspot_analyzer;
pub mod source_annotation;

pub use disassembly::{disassemble_functions, DisassemblyStats};
pub use hotspot_analyzer::{analyze_hotspots, EventHotspots, FunctionHotspot};
pub use source_annotation::{annotate, request_addresses, AnnotationStats};
