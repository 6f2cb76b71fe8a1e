//! Report export functionality
//!
//! This module serializes the aggregated record tree for downstream
//! renderers. Currently supports a single JSON document.

pub mod record_info;

pub use record_info::RecordInfo;
