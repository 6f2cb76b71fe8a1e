//! Routing samples into the Event → Process → Thread → Library → Function
//! hierarchy.

use std::collections::BTreeMap;

use callscope_common::Sample;
use log::debug;

use super::call_graph::{CallFrame, CallGraphBuilder};
use super::registry::{FunctionRegistry, LibRegistry};
use super::scopes::EventScope;
use crate::domain::{AggregationError, Pid, Tid};

/// Owns the interning registries and every aggregation tree of a run
#[derive(Debug)]
pub struct EventAggregator {
    libs: LibRegistry,
    functions: FunctionRegistry,
    events: BTreeMap<String, EventScope>,
    builder: CallGraphBuilder,
    total_samples: u64,
}

impl EventAggregator {
    /// Create an empty aggregator. `build_addr_hit_map` is only needed when
    /// the report will be annotated with source lines.
    #[must_use]
    pub fn new(build_addr_hit_map: bool) -> Self {
        Self {
            libs: LibRegistry::new(),
            functions: FunctionRegistry::new(),
            events: BTreeMap::new(),
            builder: CallGraphBuilder::new(build_addr_hit_map),
            total_samples: 0,
        }
    }

    /// Fold one sample into the aggregation trees.
    ///
    /// The period is added to the event, process and thread totals, and to
    /// the library of the leaf frame.
    ///
    /// # Errors
    /// Returns [`AggregationError::RegistryFrozen`] if called after pruning.
    pub fn ingest(&mut self, sample: &Sample) -> Result<(), AggregationError> {
        // Rejected samples must not leave libraries behind
        if self.functions.is_frozen() {
            return Err(AggregationError::RegistryFrozen { name: sample.symbol.symbol_name.clone() });
        }
        let callstack = self.intern_callstack(sample)?;
        let leaf_lib = callstack[0].lib;
        let period = sample.period;

        let event = self
            .events
            .entry(sample.event_name.clone())
            .or_insert_with(|| EventScope::new(&sample.event_name));
        event.sample_count += 1;
        event.event_count += period;

        let process = event.process_mut(Pid(sample.pid));
        process.event_count += period;

        let thread = process.thread_mut(Tid(sample.tid), &sample.thread_comm);
        thread.event_count += period;
        thread.lib_mut(leaf_lib).event_count += period;

        self.builder.fold(thread, &callstack, period);
        self.total_samples += 1;
        Ok(())
    }

    fn intern_callstack(&mut self, sample: &Sample) -> Result<Vec<CallFrame>, AggregationError> {
        sample
            .frames()
            .map(|entry| {
                let lib = self.libs.intern(&entry.dso_path);
                let func = self.functions.intern(lib, entry)?;
                Ok(CallFrame { lib, func, addr: entry.vaddr_in_file })
            })
            .collect()
    }

    /// Compute subtree totals of every forward and reverse tree.
    pub fn compute_subtree_totals(&mut self) {
        let mut trees = 0usize;
        for event in self.events.values_mut() {
            for process in event.processes.values_mut() {
                for thread in process.threads.values_mut() {
                    for lib in thread.libs.values_mut() {
                        for usage in lib.functions.values_mut() {
                            usage.compute_subtree_totals();
                            trees += 2;
                        }
                    }
                }
            }
        }
        debug!("Computed subtree totals for {trees} call trees");
    }

    #[must_use]
    pub fn libs(&self) -> &LibRegistry {
        &self.libs
    }

    #[must_use]
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Events keyed by name
    #[must_use]
    pub fn events(&self) -> &BTreeMap<String, EventScope> {
        &self.events
    }

    #[must_use]
    pub fn event(&self, name: &str) -> Option<&EventScope> {
        self.events.get(name)
    }

    /// Samples ingested across all events
    #[must_use]
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Split borrow for passes that edit trees and the function table together
    pub fn parts_mut(
        &mut self,
    ) -> (&LibRegistry, &mut FunctionRegistry, &mut BTreeMap<String, EventScope>) {
        (&self.libs, &mut self.functions, &mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callscope_common::SymbolEntry;

    fn entry(lib: &str, name: &str) -> SymbolEntry {
        SymbolEntry {
            dso_path: lib.to_string(),
            symbol_name: name.to_string(),
            ..SymbolEntry::default()
        }
    }

    fn sample(event: &str, pid: u32, tid: u32, period: u64, leaf: SymbolEntry) -> Sample {
        Sample {
            pid,
            tid,
            thread_comm: format!("t{tid}"),
            event_name: event.to_string(),
            period,
            symbol: leaf,
            callchain: Vec::new(),
        }
    }

    #[test]
    fn test_totals_propagate_to_every_level() {
        let mut agg = EventAggregator::new(false);
        agg.ingest(&sample("cpu-cycles", 1, 1, 10, entry("/a.so", "f"))).unwrap();
        agg.ingest(&sample("cpu-cycles", 1, 2, 5, entry("/b.so", "g"))).unwrap();
        agg.ingest(&sample("page-faults", 2, 2, 1, entry("/a.so", "f"))).unwrap();

        assert_eq!(agg.total_samples(), 3);
        let cycles = agg.event("cpu-cycles").unwrap();
        assert_eq!(cycles.sample_count, 2);
        assert_eq!(cycles.event_count, 15);

        let process = &cycles.processes[&Pid(1)];
        assert_eq!(process.event_count, 15);
        assert_eq!(process.name, "t1");
        assert_eq!(process.threads[&Tid(2)].event_count, 5);

        let b = agg.libs().iter().find(|(_, name)| *name == "/b.so").unwrap().0;
        assert_eq!(process.threads[&Tid(2)].libs[&b].event_count, 5);
    }

    #[test]
    fn test_only_leaf_library_gets_event_count() {
        let mut agg = EventAggregator::new(false);
        let mut s = sample("cpu-cycles", 1, 1, 10, entry("/leaf.so", "leaf"));
        s.callchain.push(entry("/caller.so", "caller"));
        agg.ingest(&s).unwrap();

        let thread = &agg.event("cpu-cycles").unwrap().processes[&Pid(1)].threads[&Tid(1)];
        let counts: Vec<u64> = thread.libs.values().map(|l| l.event_count).collect();
        assert_eq!(counts, vec![10, 0]);
    }
}
