//! Attaching source lines to functions and sampled addresses.
//!
//! Runs after pruning, in two halves around address resolution:
//!
//! ```text
//! request_addresses()          AddressResolver::resolve_all()     annotate()
//!   function start/end    ──►    batched addr2line passes    ──►   line ranges,
//!   every hit address                                              source hits
//! ```
//!
//! A function's line range comes from the outermost frame of its first and
//! last byte. Every hit address charges its `(self, subtree)` counts to each
//! `(file, line)` it resolves to, inlined frames included.

use std::collections::BTreeMap;

use callscope_common::is_placeholder_dso;
use log::info;

use crate::aggregation::{EventAggregator, Function, LibRegistry};
use crate::domain::{LineRange, Period, SourceFileId, SourceLine};
use crate::symbolization::{AddressResolver, SourceFileRegistry};

/// What [`annotate`] attached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationStats {
    pub functions_with_lines: usize,
    pub hit_addresses: usize,
    pub hit_lines: usize,
}

/// Queue every address source annotation needs.
pub fn request_addresses(aggregator: &EventAggregator, resolver: &mut AddressResolver) {
    let libs = aggregator.libs();
    let functions = aggregator.functions();

    for function in functions.iter() {
        let Some(dso) = binary_of(libs, function) else { continue };
        resolver.add_addr(dso, function.start_addr, function.start_addr);
        resolver.add_addr(dso, function.start_addr, last_byte(function));
    }

    for event in aggregator.events().values() {
        for usage in event.functions() {
            let Some(hits) = &usage.addr_hits else { continue };
            let Some(function) = functions.get(usage.function) else { continue };
            let Some(dso) = binary_of(libs, function) else { continue };
            for &addr in hits.keys() {
                resolver.add_addr(dso, function.start_addr, addr);
            }
        }
    }
}

/// Attach resolved lines to functions and usages, then merge every source
/// file's line ranges.
pub fn annotate(
    aggregator: &mut EventAggregator,
    resolver: &AddressResolver,
    files: &mut SourceFileRegistry,
) -> AnnotationStats {
    let mut stats = AnnotationStats::default();
    let (libs, functions, events) = aggregator.parts_mut();

    for function in functions.iter_mut() {
        let Some(dso) = binary_of(libs, function) else { continue };
        let start = resolver.sources(dso, function.start_addr).and_then(<[SourceLine]>::last);
        let end = resolver.sources(dso, last_byte(function)).and_then(<[SourceLine]>::last);
        let (Some(&(start_file, start_line)), Some(&(end_file, end_line))) = (start, end) else {
            continue;
        };
        if start_file != end_file || start_line > end_line {
            continue;
        }
        let range = LineRange::new(start_line, end_line);
        function.source_file = Some(start_file);
        function.line_range = Some(range);
        if let Some(file) = files.get_mut(start_file) {
            file.add_range(range);
        }
        stats.functions_with_lines += 1;
    }

    for event in events.values_mut() {
        for process in event.processes.values_mut() {
            for thread in process.threads.values_mut() {
                for lib in thread.libs.values_mut() {
                    for usage in lib.functions.values_mut() {
                        let Some(hits) = &usage.addr_hits else { continue };
                        let Some(dso) =
                            functions.get(usage.function).and_then(|f| binary_of(libs, f))
                        else {
                            continue;
                        };

                        let mut source_hits: BTreeMap<(SourceFileId, u32), Period> =
                            BTreeMap::new();
                        for (&addr, &period) in hits {
                            let Some(lines) = resolver.sources(dso, addr) else { continue };
                            stats.hit_addresses += 1;
                            for &(file_id, line) in lines {
                                *source_hits.entry((file_id, line)).or_default() += period;
                                if let Some(file) = files.get_mut(file_id) {
                                    file.add_context(line);
                                }
                            }
                        }
                        if !source_hits.is_empty() {
                            stats.hit_lines += source_hits.len();
                            usage.source_hits = Some(source_hits);
                        }
                    }
                }
            }
        }
    }

    files.merge_line_ranges();
    info!(
        "Annotated {} functions, {} hit addresses over {} source lines",
        stats.functions_with_lines, stats.hit_addresses, stats.hit_lines
    );
    stats
}

/// Device path of the binary holding `function`, unless it is a placeholder
pub(crate) fn binary_of<'a>(libs: &'a LibRegistry, function: &Function) -> Option<&'a str> {
    libs.name(function.lib_id).filter(|path| !is_placeholder_dso(path))
}

fn last_byte(function: &Function) -> u64 {
    function.start_addr.saturating_add(function.addr_len.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FunctionId, LibId};

    fn function(start_addr: u64, addr_len: u64) -> Function {
        Function {
            id: FunctionId(0),
            lib_id: LibId(0),
            name: "f".to_string(),
            start_addr,
            addr_len,
            source_file: None,
            line_range: None,
            disassembly: None,
        }
    }

    #[test]
    fn test_last_byte_of_function() {
        assert_eq!(last_byte(&function(0x1000, 0x40)), 0x103f);
        assert_eq!(last_byte(&function(0x1000, 0)), 0x1000);
    }

    #[test]
    fn test_last_byte_saturates_at_top_of_address_space() {
        assert_eq!(last_byte(&function(u64::MAX - 4, 0x40)), u64::MAX);
    }
}
