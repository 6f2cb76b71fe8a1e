//! Batched address → source line resolution with a widening retry window.
//!
//! Requests are grouped per binary. Each binary is resolved in up to three
//! passes, each a single tool invocation (split only by the batch cap):
//!
//! ```text
//! pass 1:  addr
//! pass 2:  addr - 1·step ... addr - 4·step
//! pass 3:  addr - 5·step ... addr - 128·step
//! ```
//!
//! Candidates never go below the start of the owning function, and a pass
//! only touches addresses the earlier passes left unresolved. `step` is the
//! minimum instruction alignment of the binary's architecture.
//!
//! Binaries are independent, so they are resolved on a worker pool. Workers
//! return raw file paths; source file ids are assigned afterwards on the
//! calling thread.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::unbounded;
use log::{debug, info, warn};

use super::binary_cache::BinaryLocations;
use super::elf;
use super::line_tool::{LineTableTool, RawFrames};
use super::source_files::SourceFileRegistry;
use crate::config::ResolverConfig;
use crate::domain::{ResolveError, SourceLine};

/// Offsets (in steps) tried by each pass
pub const PASSES: [RangeInclusive<u64>; 3] = [0..=0, 1..=4, 5..=128];

/// Addresses requested from one binary, and what they resolved to
#[derive(Debug, Clone)]
pub struct Dso {
    /// Local copy of the binary
    pub real_path: PathBuf,
    /// Minimum instruction alignment; known once the binary was inspected
    pub addr_step: u64,
    /// addr → start address of the function containing it
    requests: BTreeMap<u64, u64>,
    /// addr → frames, innermost first; only resolved addresses
    resolved: HashMap<u64, Vec<SourceLine>>,
}

impl Dso {
    fn new(real_path: PathBuf) -> Self {
        Self { real_path, addr_step: 1, requests: BTreeMap::new(), resolved: HashMap::new() }
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }
}

/// Result of [`AddressResolver::resolve_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub binaries: usize,
    pub binaries_skipped: usize,
    pub addresses: usize,
    pub resolved: usize,
}

pub struct AddressResolver {
    tool: LineTableTool,
    jobs: usize,
    binaries: BinaryLocations,
    dsos: BTreeMap<String, Dso>,
}

impl AddressResolver {
    #[must_use]
    pub fn new(config: &ResolverConfig, binaries: BinaryLocations) -> Self {
        Self {
            tool: LineTableTool::new(&config.tool_path, config.tool_timeout, config.max_batch_addrs),
            jobs: config.jobs.max(1),
            binaries,
            dsos: BTreeMap::new(),
        }
    }

    /// Queue `addr` in the binary recorded as `dso_path`.
    ///
    /// `func_addr` is the start of the function containing `addr`; retries
    /// never go below it. Requests for binaries that are not in the cache
    /// are dropped.
    pub fn add_addr(&mut self, dso_path: &str, func_addr: u64, addr: u64) {
        let Some(real_path) = self.binaries.get(dso_path) else { return };
        self.dsos
            .entry(dso_path.to_string())
            .or_insert_with(|| Dso::new(real_path.clone()))
            .requests
            .entry(addr)
            .or_insert(func_addr);
    }

    /// Resolve every queued address, interning source paths into `files`.
    pub fn resolve_all(&mut self, files: &mut SourceFileRegistry) -> ResolveStats {
        let mut stats = ResolveStats { binaries: self.dsos.len(), ..ResolveStats::default() };
        let (job_tx, job_rx) = unbounded::<(String, PathBuf, BTreeMap<u64, u64>)>();
        let (result_tx, result_rx) = unbounded();

        for (dso_path, dso) in &self.dsos {
            stats.addresses += dso.requests.len();
            // Sends only fail without a receiver, and job_rx is alive here
            let _ = job_tx.send((dso_path.clone(), dso.real_path.clone(), dso.requests.clone()));
        }
        drop(job_tx);

        let workers = self.jobs.min(self.dsos.len()).max(1);
        let tool = &self.tool;
        thread::scope(|s| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                s.spawn(move || {
                    for (dso_path, real_path, requests) in job_rx {
                        let outcome = resolve_dso(tool, &real_path, &requests);
                        if result_tx.send((dso_path, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        for (dso_path, outcome) in result_rx {
            let Some(dso) = self.dsos.get_mut(&dso_path) else { continue };
            match outcome {
                Ok((step, raw)) => {
                    dso.addr_step = step;
                    for (addr, frames) in raw {
                        let lines: Vec<SourceLine> =
                            frames.into_iter().map(|(file, line)| (files.intern(&file), line)).collect();
                        dso.resolved.insert(addr, lines);
                    }
                    stats.resolved += dso.resolved.len();
                }
                Err(e) => {
                    warn!("Skipping {dso_path}: {e}");
                    stats.binaries_skipped += 1;
                }
            }
        }

        info!(
            "Resolved {} of {} addresses in {} binaries ({} skipped)",
            stats.resolved, stats.addresses, stats.binaries, stats.binaries_skipped
        );
        stats
    }

    /// Frames of a resolved address, innermost first
    #[must_use]
    pub fn sources(&self, dso_path: &str, addr: u64) -> Option<&[SourceLine]> {
        self.dsos.get(dso_path)?.resolved.get(&addr).map(Vec::as_slice)
    }

    #[must_use]
    pub fn dso(&self, dso_path: &str) -> Option<&Dso> {
        self.dsos.get(dso_path)
    }
}

/// Candidate addresses tried for `addr` in one pass, in order.
///
/// The full sequence over all passes is strictly decreasing and ends at the
/// function start, so passes never share a candidate.
#[must_use]
pub fn pass_candidates(addr: u64, func_addr: u64, step: u64, offsets: &RangeInclusive<u64>) -> Vec<u64> {
    let floor = func_addr.min(addr);
    let mut candidates = Vec::new();
    for offset in 0..=*offsets.end() {
        let candidate = addr.saturating_sub(offset.saturating_mul(step)).max(floor);
        if offset >= *offsets.start() {
            candidates.push(candidate);
        }
        if candidate == floor {
            break;
        }
    }
    candidates
}

/// Run all passes for one binary. Returns its address step and every
/// address that resolved.
fn resolve_dso(
    tool: &LineTableTool,
    binary: &Path,
    requests: &BTreeMap<u64, u64>,
) -> Result<(u64, HashMap<u64, RawFrames>), ResolveError> {
    let info = elf::inspect(binary)?;
    if !info.has_debug_line {
        return Err(ResolveError::NoDebugLine(binary.to_path_buf()));
    }
    let step = info.addr_step();

    let mut pending: Vec<(u64, u64)> = requests.iter().map(|(&a, &f)| (a, f)).collect();
    let mut answers: HashMap<u64, RawFrames> = HashMap::new();
    let mut resolved: HashMap<u64, RawFrames> = HashMap::new();

    for (pass, offsets) in PASSES.iter().enumerate() {
        if pending.is_empty() {
            break;
        }
        let candidates: Vec<(u64, Vec<u64>)> = pending
            .iter()
            .map(|&(addr, func_addr)| (addr, pass_candidates(addr, func_addr, step, offsets)))
            .collect();

        // Never ask twice for an address the tool already answered
        let batch: BTreeSet<u64> = candidates
            .iter()
            .flat_map(|(_, c)| c.iter().copied())
            .filter(|c| !answers.contains_key(c))
            .collect();
        let batch: Vec<u64> = batch.into_iter().collect();

        if !batch.is_empty() {
            match tool.query(binary, &batch) {
                Ok(results) => answers.extend(results),
                Err(e) => {
                    warn!("Abandoning {} after pass {}: {e}", binary.display(), pass + 1);
                    break;
                }
            }
        }

        pending.clear();
        for (addr, cands) in candidates {
            let hit = cands.iter().find_map(|c| answers.get(c).filter(|f| !f.is_empty()));
            match hit {
                Some(frames) => {
                    resolved.insert(addr, frames.clone());
                }
                None => pending.push((addr, requests[&addr])),
            }
        }
        debug!(
            "{} pass {}: {} resolved, {} pending",
            binary.display(),
            pass + 1,
            resolved.len(),
            pending.len()
        );
    }
    Ok((step, resolved))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_candidates_widen_by_step() {
        assert_eq!(pass_candidates(0x1000, 0x800, 4, &PASSES[0]), vec![0x1000]);
        assert_eq!(
            pass_candidates(0x1000, 0x800, 4, &PASSES[1]),
            vec![0xffc, 0xff8, 0xff4, 0xff0]
        );
        let third = pass_candidates(0x1000, 0x0, 4, &PASSES[2]);
        assert_eq!(third.len(), 124);
        assert_eq!(third[0], 0x1000 - 5 * 4);
        assert_eq!(third[123], 0x1000 - 128 * 4);
    }

    #[test]
    fn test_pass_candidates_clamp_to_function_start() {
        assert_eq!(pass_candidates(0x1006, 0x1000, 2, &PASSES[1]), vec![0x1004, 0x1002, 0x1000]);
        // Function start already reached in pass 2
        assert!(pass_candidates(0x1006, 0x1000, 2, &PASSES[2]).is_empty());
        // Address at the function start has nothing to retry
        assert!(pass_candidates(0x1000, 0x1000, 4, &PASSES[1]).is_empty());
    }

    #[test]
    fn test_passes_are_disjoint() {
        let (addr, func, step) = (0x2000, 0x1e00, 4);
        let all: Vec<u64> =
            PASSES.iter().flat_map(|p| pass_candidates(addr, func, step, p)).collect();
        let unique: BTreeSet<u64> = all.iter().copied().collect();
        assert_eq!(all.len(), unique.len());
        assert_eq!(all.last(), Some(&func));
    }

    #[test]
    fn test_requests_for_uncached_binaries_are_dropped() {
        let mut binaries = BinaryLocations::new();
        binaries.insert("/system/lib/libfoo.so".to_string(), PathBuf::from("/cache/libfoo.so"));
        let mut resolver = AddressResolver::new(&ResolverConfig::default(), binaries);

        resolver.add_addr("/system/lib/libfoo.so", 0x100, 0x104);
        resolver.add_addr("/system/lib/libfoo.so", 0x100, 0x104);
        resolver.add_addr("/system/lib/libbar.so", 0x100, 0x104);

        assert_eq!(resolver.dso("/system/lib/libfoo.so").unwrap().request_count(), 1);
        assert!(resolver.dso("/system/lib/libbar.so").is_none());
    }

    #[test]
    fn test_missing_binary_is_skipped() {
        let mut binaries = BinaryLocations::new();
        binaries.insert("/lib/gone.so".to_string(), PathBuf::from("/nonexistent/gone.so"));
        let mut resolver = AddressResolver::new(&ResolverConfig::default(), binaries);
        resolver.add_addr("/lib/gone.so", 0x10, 0x14);

        let stats = resolver.resolve_all(&mut SourceFileRegistry::new());
        assert_eq!(stats.binaries_skipped, 1);
        assert_eq!(stats.resolved, 0);
        assert!(resolver.sources("/lib/gone.so", 0x14).is_none());
    }
}
