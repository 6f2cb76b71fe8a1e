//! Attaching disassembly to functions.
//!
//! Every function still in the registry after pruning is disassembled from
//! the cached copy of its binary, over `[start_addr, start_addr + addr_len)`.
//! Functions are independent, so they run on a worker pool; a failed or
//! empty run leaves the function without disassembly.

use std::path::PathBuf;
use std::thread;

use crossbeam_channel::unbounded;
use log::{info, warn};

use super::source_annotation::binary_of;
use crate::aggregation::EventAggregator;
use crate::domain::FunctionId;
use crate::symbolization::{BinaryLocations, Disassembler};

/// What [`disassemble_functions`] attached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisassemblyStats {
    /// Functions whose binary is in the cache
    pub functions: usize,
    pub disassembled: usize,
    pub failed: usize,
}

struct Job {
    function: FunctionId,
    binary: PathBuf,
    start: u64,
    len: u64,
}

/// Disassemble every live function whose binary is cached.
pub fn disassemble_functions(
    aggregator: &mut EventAggregator,
    binaries: &BinaryLocations,
    disassembler: &Disassembler,
    jobs: usize,
) -> DisassemblyStats {
    let (libs, functions, _) = aggregator.parts_mut();
    let work: Vec<Job> = functions
        .iter()
        .filter_map(|function| {
            let binary = binaries.get(binary_of(libs, function)?)?;
            Some(Job {
                function: function.id,
                binary: binary.clone(),
                start: function.start_addr,
                len: function.addr_len,
            })
        })
        .collect();
    let mut stats = DisassemblyStats { functions: work.len(), ..DisassemblyStats::default() };

    let (job_tx, job_rx) = unbounded::<Job>();
    let (result_tx, result_rx) = unbounded();
    let workers = jobs.min(work.len()).max(1);
    for job in work {
        // Sends only fail without a receiver, and job_rx is alive here
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    thread::scope(|s| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            s.spawn(move || {
                for job in job_rx {
                    let outcome = disassembler.disassemble_function(&job.binary, job.start, job.len);
                    if result_tx.send((job, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    for (job, outcome) in result_rx {
        match outcome {
            Ok(Some(code)) => {
                if let Some(function) = functions.get_mut(job.function) {
                    function.disassembly = Some(code);
                    stats.disassembled += 1;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to disassemble {:#x} in {}: {e}", job.start, job.binary.display());
                stats.failed += 1;
            }
        }
    }

    info!(
        "Disassembled {} of {} functions ({} failed)",
        stats.disassembled, stats.functions, stats.failed
    );
    stats
}
