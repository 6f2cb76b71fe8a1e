//! Driver for the external disassembler (`objdump`).
//!
//! One invocation per function:
//!
//! ```text
//! <tool> -dlC --no-show-raw-insn --start-address=0x1000 --stop-address=0x1040 <binary>
//! ```
//!
//! Every output line is kept, paired with the address before its first
//! `:` when that parses as hex, otherwise 0 (headers, source lines, blanks).

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use log::debug;

use super::subprocess::run_with_deadline;
use crate::domain::{DisassemblyLine, ResolveError};

#[derive(Debug, Clone)]
pub struct Disassembler {
    path: PathBuf,
    timeout: Duration,
}

impl Disassembler {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { path: path.into(), timeout }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disassemble `[start, start + len)` of `binary`.
    ///
    /// Returns `None` when the tool printed nothing.
    ///
    /// # Errors
    /// Returns an error if the tool cannot be started or times out.
    pub fn disassemble_function(
        &self,
        binary: &Path,
        start: u64,
        len: u64,
    ) -> Result<Option<Vec<DisassemblyLine>>, ResolveError> {
        debug!("Disassembling {}, {start:#x}+{len:#x}", binary.display());
        let mut command = Command::new(&self.path);
        command
            .arg("-dlC")
            .arg("--no-show-raw-insn")
            .arg(format!("--start-address={start:#x}"))
            .arg(format!("--stop-address={:#x}", start.saturating_add(len)))
            .arg(binary);
        let output = run_with_deadline(&mut command, None, self.timeout)?;
        if output.is_empty() {
            return Ok(None);
        }
        Ok(Some(parse_disassembly(&output)))
    }
}

/// Pair each output line with its leading address.
#[must_use]
pub fn parse_disassembly(output: &str) -> Vec<DisassemblyLine> {
    output
        .lines()
        .map(|line| {
            let head = line.split_once(':').map_or(line, |(head, _)| head).trim();
            let hex = head.strip_prefix("0x").unwrap_or(head);
            let addr = u64::from_str_radix(hex, 16).unwrap_or(0);
            (line.to_string(), addr)
        })
        .collect()
}
