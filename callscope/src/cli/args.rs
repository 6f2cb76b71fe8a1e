//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{ReportConfig, ResolverConfig};

#[derive(Parser, Debug)]
#[command(
    name = "callscope",
    about = "Aggregate profiling samples into call graphs and annotate them with source lines",
    after_help = "\
EXAMPLES:
    callscope -i perf.jsonl                                  Report with default thresholds
    callscope -i perf.jsonl -o report.json --min-func-percent 0.5
    callscope -i perf.jsonl --add-source-code --source-dirs ~/aosp --symfs ./symbols
    callscope -i perf.jsonl --add-disassembly --objdump llvm-objdump --symfs ./symbols"
)]
pub struct Args {
    /// Recorded samples, one JSON record per line
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Write the report JSON to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Drop functions below this percentage of their event total
    #[arg(long, default_value = "0.01", value_name = "PERCENT")]
    pub min_func_percent: f64,

    /// Cut call chains below this percentage of their event total
    #[arg(long, default_value = "0.01", value_name = "PERCENT")]
    pub min_callchain_percent: f64,

    /// Resolve sampled addresses to source lines and include source code
    #[arg(long)]
    pub add_source_code: bool,

    /// Directories to search for source files
    #[arg(long, num_args = 1.., value_name = "DIR", requires = "add_source_code")]
    pub source_dirs: Vec<PathBuf>,

    /// Disassemble sampled functions and include per-address hits
    #[arg(long)]
    pub add_disassembly: bool,

    /// Disassembler used by --add-disassembly
    #[arg(long, default_value = "objdump", value_name = "PATH")]
    pub objdump: PathBuf,

    /// Directories mirroring the device's binary layout
    #[arg(long, num_args = 1.., value_name = "DIR")]
    pub symfs: Vec<PathBuf>,

    /// Host copy of the kernel symbol table (/proc/kallsyms)
    #[arg(long, value_name = "FILE")]
    pub kallsyms: Option<PathBuf>,

    /// Local cache of binaries pulled for symbolization
    #[arg(long, default_value = "binary_cache", value_name = "DIR")]
    pub binary_cache: PathBuf,

    /// Line-table tool used to map addresses to source lines
    #[arg(long, default_value = "addr2line", value_name = "PATH")]
    pub addr2line: PathBuf,

    /// Kill the line-table tool or disassembler after this many seconds
    #[arg(long, default_value = "60", value_name = "SECS")]
    pub tool_timeout: u64,

    /// Maximum addresses per line-table tool invocation
    #[arg(long, default_value = "65536", value_name = "N")]
    pub max_batch: usize,

    /// Binaries resolved in parallel (default: number of CPUs)
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Number of hotspots printed per event
    #[arg(long, default_value = "10", value_name = "N")]
    pub top: usize,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    #[must_use]
    pub fn into_config(self) -> ReportConfig {
        let defaults = ResolverConfig::default();
        ReportConfig {
            min_func_percent: self.min_func_percent,
            min_callchain_percent: self.min_callchain_percent,
            annotate_source: self.add_source_code,
            add_disassembly: self.add_disassembly,
            objdump_path: self.objdump,
            source_dirs: self.source_dirs,
            symfs_dirs: self.symfs,
            kallsyms_path: self.kallsyms,
            binary_cache_dir: self.binary_cache,
            resolver: ResolverConfig {
                tool_path: self.addr2line,
                tool_timeout: Duration::from_secs(self.tool_timeout),
                max_batch_addrs: self.max_batch,
                jobs: self.jobs.unwrap_or(defaults.jobs),
            },
        }
    }
}
