//! Driver for the external line-table tool (`addr2line`).
//!
//! ## Protocol
//!
//! The tool runs as `<tool> -e <binary> -aiC`. Stdin receives lowercase hex
//! addresses, sorted, one per line. Stdout holds one block per address:
//!
//! ```text
//! 0x0000000000002000        ← header: starts a block
//! /src/inline.h:12          ← innermost (inlined) frame
//! /src/main.c:10            ← outermost frame
//! 0x0000000000002004
//! ??:0                      ← no info: the block stays empty
//! ```
//!
//! Lines that do not parse are skipped without ending the block.
//!
//! ## Limits
//!
//! Each invocation is bounded by a timeout (the child is killed when it
//! expires) and by a maximum number of addresses; larger requests are split
//! into several invocations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use log::debug;

use super::subprocess::run_with_deadline;
use crate::domain::ResolveError;

/// Raw `(file, line)` frames of one address, innermost first
pub type RawFrames = Vec<(String, u32)>;

#[derive(Debug, Clone)]
pub struct LineTableTool {
    path: PathBuf,
    timeout: Duration,
    max_batch: usize,
}

impl LineTableTool {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, timeout: Duration, max_batch: usize) -> Self {
        Self { path: path.into(), timeout, max_batch: max_batch.max(1) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up `addrs` in `binary`.
    ///
    /// Every address the tool answered gets an entry, empty if the tool had no
    /// line information for it.
    ///
    /// # Errors
    /// Returns an error if the tool cannot be started or times out.
    pub fn query(
        &self,
        binary: &Path,
        addrs: &[u64],
    ) -> Result<HashMap<u64, RawFrames>, ResolveError> {
        let mut sorted = addrs.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut results = HashMap::with_capacity(sorted.len());
        for batch in sorted.chunks(self.max_batch) {
            let output = self.run_batch(binary, batch)?;
            results.extend(parse_output(&output));
        }
        Ok(results)
    }

    fn run_batch(&self, binary: &Path, batch: &[u64]) -> Result<String, ResolveError> {
        debug!("Querying {} addresses in {}", batch.len(), binary.display());
        let input: String = batch.iter().map(|addr| format!("{addr:x}\n")).collect();
        let mut command = Command::new(&self.path);
        command.arg("-e").arg(binary).arg("-aiC");
        run_with_deadline(&mut command, Some(input), self.timeout)
    }
}

/// Parse the tool's stdout into address blocks.
#[must_use]
pub fn parse_output(output: &str) -> HashMap<u64, RawFrames> {
    let mut results: HashMap<u64, RawFrames> = HashMap::new();
    let mut current: Option<u64> = None;
    let mut truncated = false;

    for line in output.lines() {
        let line = line.trim();
        if let Some(hex) = line.strip_prefix("0x") {
            current = u64::from_str_radix(hex, 16).ok();
            if let Some(addr) = current {
                results.insert(addr, Vec::new());
            }
            truncated = false;
            continue;
        }

        let Some(addr) = current else { continue };
        if truncated {
            continue;
        }
        let Some(frames) = results.get_mut(&addr) else { continue };

        if line.contains('?') {
            // "??:0" as the first frame means no info for the whole block
            if frames.is_empty() {
                truncated = true;
            }
            continue;
        }

        // Line numbers may be followed by " (discriminator N)"
        let Some((file, rest)) = line.rsplit_once(':') else { continue };
        let Some(number) = rest.split_whitespace().next().and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        frames.push((file.to_string(), number));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inlined_frames_innermost_first() {
        let output = "0x0000000000002000\n/src/inline.h:12\n/src/main.c:10\n";
        let results = parse_output(output);
        assert_eq!(
            results[&0x2000],
            vec![("/src/inline.h".to_string(), 12), ("/src/main.c".to_string(), 10)]
        );
    }

    #[test]
    fn test_parse_unknown_first_line_empties_block() {
        let output = "0x10\n??:0\n/src/late.c:3\n0x20\n/src/a.c:1\n";
        let results = parse_output(output);
        assert!(results[&0x10].is_empty());
        assert_eq!(results[&0x20], vec![("/src/a.c".to_string(), 1)]);
    }

    #[test]
    fn test_parse_skips_bad_lines_without_ending_block() {
        let output = "0x30\n/src/a.c:notanumber\ngarbage\n/src/a.c:7 (discriminator 2)\n/src/b.c:?\n";
        let results = parse_output(output);
        assert_eq!(results[&0x30], vec![("/src/a.c".to_string(), 7)]);
    }

    #[test]
    fn test_parse_ignores_lines_before_first_header() {
        let results = parse_output("/src/a.c:1\n0x40\n");
        assert_eq!(results.len(), 1);
        assert!(results[&0x40].is_empty());
    }

    #[test]
    fn test_missing_tool_is_spawn_error() {
        let tool = LineTableTool::new("/nonexistent/addr2line", Duration::from_secs(1), 16);
        let err = tool.query(Path::new("/bin/sh"), &[0x10]).unwrap_err();
        assert!(matches!(err, ResolveError::ToolSpawn { .. }));
    }
}
