//! Run configuration.
//!
//! Every recognized option lives in [`ReportConfig`] with its default; the
//! CLI only fills it in.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// Options of one report run
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Functions below this share of their event total are removed
    pub min_func_percent: f64,
    /// Call tree edges below this share of the event total are cut
    pub min_callchain_percent: f64,
    /// Resolve addresses to source lines and load source text
    pub annotate_source: bool,
    /// Disassemble every kept function and export per-address hits
    pub add_disassembly: bool,
    /// Disassembler invoked per function
    pub objdump_path: PathBuf,
    /// Directories searched for source files
    pub source_dirs: Vec<PathBuf>,
    /// Local trees mirroring the device's binary layout
    pub symfs_dirs: Vec<PathBuf>,
    /// Host copy of the kernel symbol table
    pub kallsyms_path: Option<PathBuf>,
    pub binary_cache_dir: PathBuf,
    pub resolver: ResolverConfig,
}

impl ReportConfig {
    /// Whether any stage needs local copies of the recorded binaries
    #[must_use]
    pub fn needs_binaries(&self) -> bool {
        self.annotate_source || self.add_disassembly
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            min_func_percent: 0.01,
            min_callchain_percent: 0.01,
            annotate_source: false,
            add_disassembly: false,
            objdump_path: PathBuf::from("objdump"),
            source_dirs: Vec::new(),
            symfs_dirs: Vec::new(),
            kallsyms_path: None,
            binary_cache_dir: PathBuf::from("binary_cache"),
            resolver: ResolverConfig::default(),
        }
    }
}

/// Options of the line-table tool and the resolution worker pool
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub tool_path: PathBuf,
    /// Per-invocation limit; the tool is killed when it expires
    pub tool_timeout: Duration,
    /// Maximum number of addresses per invocation
    pub max_batch_addrs: usize,
    /// Number of binaries resolved concurrently
    pub jobs: usize,
}

impl ResolverConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_MAX_BATCH: usize = 65_536;
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tool_path: PathBuf::from("addr2line"),
            tool_timeout: Self::DEFAULT_TIMEOUT,
            max_batch_addrs: Self::DEFAULT_MAX_BATCH,
            jobs: thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReportConfig::default();
        assert!((config.min_func_percent - 0.01).abs() < f64::EPSILON);
        assert!(!config.annotate_source);
        assert!(!config.add_disassembly);
        assert!(!config.needs_binaries());
        assert_eq!(config.objdump_path, PathBuf::from("objdump"));
        assert_eq!(config.binary_cache_dir, PathBuf::from("binary_cache"));
        assert_eq!(config.resolver.tool_path, PathBuf::from("addr2line"));
        assert_eq!(config.resolver.tool_timeout, Duration::from_secs(60));
        assert!(config.resolver.jobs >= 1);
    }
}
