//! Pre-flight checks for callscope
//!
//! Validates inputs and external tools before any samples are read, so a
//! long aggregation is not wasted on a typo in a directory name.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::ReportConfig;

/// Run all pre-flight checks for the given input and configuration
///
/// # Errors
/// Returns an error describing the first unmet requirement.
pub fn run_preflight_checks(input: &Path, config: &ReportConfig) -> Result<()> {
    check_input_exists(input)?;
    check_percentages(config)?;
    if config.needs_binaries() {
        for dir in &config.symfs_dirs {
            check_directory(dir, "--symfs")?;
        }
        if let Some(kallsyms) = &config.kallsyms_path {
            check_file_readable(kallsyms)?;
        }
    }
    if config.annotate_source {
        for dir in &config.source_dirs {
            check_directory(dir, "--source-dirs")?;
        }
        check_line_tool(&config.resolver.tool_path)?;
    }
    if config.add_disassembly {
        check_disassembler(&config.objdump_path)?;
    }
    Ok(())
}

/// Check that the sample file exists and is a regular file
///
/// # Errors
/// Returns an error if the path is missing or is not a file.
pub fn check_input_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!(
            "Input not found: {}\n\n\
             Pass the recorded samples with -i/--input.",
            path.display()
        );
    }
    if !path.is_file() {
        bail!(
            "Not a file: {}\n\n\
             --input must point to a sample file, not a directory.",
            path.display()
        );
    }
    Ok(())
}

fn check_percentages(config: &ReportConfig) -> Result<()> {
    for (flag, value) in [
        ("--min-func-percent", config.min_func_percent),
        ("--min-callchain-percent", config.min_callchain_percent),
    ] {
        if !(0.0..=100.0).contains(&value) {
            bail!("Invalid {flag} {value}: must be between 0 and 100");
        }
    }
    Ok(())
}

fn check_directory(dir: &Path, flag: &str) -> Result<()> {
    if !dir.is_dir() {
        bail!(
            "Directory not found: {}\n\n\
             Every {flag} entry must be an existing directory.",
            dir.display()
        );
    }
    Ok(())
}

fn check_file_readable(path: &Path) -> Result<()> {
    std::fs::File::open(path).with_context(|| format!("Cannot read {}", path.display()))?;
    Ok(())
}

/// Check that the line-table tool can be launched
///
/// # Errors
/// Returns an error if `<tool> --version` cannot be run or fails.
pub fn check_line_tool(tool: &Path) -> Result<()> {
    check_tool(tool, "Line-table tool", "--addr2line", "addr2line (binutils or llvm-addr2line)")
}

/// Check that the disassembler can be launched
///
/// # Errors
/// Returns an error if `<tool> --version` cannot be run or fails.
pub fn check_disassembler(tool: &Path) -> Result<()> {
    check_tool(tool, "Disassembler", "--objdump", "objdump (binutils or llvm-objdump)")
}

fn check_tool(tool: &Path, kind: &str, flag: &str, expected: &str) -> Result<()> {
    let status = Command::new(tool)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => bail!(
            "{kind} {} exited with {status}\n\n\
             Point {flag} at a working {expected}.",
            tool.display()
        ),
        Err(e) => bail!(
            "{kind} not found: {} ({e})\n\n\
             Install binutils or pass {flag} <PATH>.",
            tool.display()
        ),
    }
}
