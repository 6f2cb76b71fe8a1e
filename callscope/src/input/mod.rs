//! Sample sources.
//!
//! The aggregation engine reads samples through [`SampleSource`] and never
//! cares where they come from: a recorder binding, a subprocess, or a file.

pub mod json_lines;

use std::path::Path;

use callscope_common::Sample;
use serde::Deserialize;

use crate::domain::{BuildId, SampleError};

pub use json_lines::JsonLinesSampleReader;

/// Facts about the recording as a whole
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RecordMeta {
    /// Architecture of the profiled device (`arm64`, `x86_64`, ...)
    pub arch: String,
    /// Command line used to record
    pub cmdline: String,
    /// Wall-clock time of the recording, free-form
    pub record_time: String,
}

/// A single forward pass over a recording
pub trait SampleSource {
    /// Next sample, or `None` at the end of the stream.
    ///
    /// # Errors
    /// A record that cannot be decoded is fatal for the whole run.
    fn next_sample(&mut self) -> Result<Option<Sample>, SampleError>;

    /// Build-id recorded for the binary at `path`, if any
    fn build_id_for_path(&self, path: &str) -> Option<BuildId>;

    fn record_meta(&self) -> &RecordMeta;

    /// Directory mirroring the device's binary layout.
    ///
    /// Only sources that symbolize samples themselves need it; recordings
    /// that already carry symbol names ignore it.
    fn set_symfs(&mut self, _dir: &Path) {}

    /// Host copy of the kernel symbol table. Ignored by default, like
    /// [`Self::set_symfs`].
    fn set_kallsyms(&mut self, _path: &Path) {}
}
