//! The Event → Process → Thread → Library → Function hierarchy.
//!
//! Every level keeps its own event total. Maps are `BTreeMap`s so reports
//! come out in a stable order regardless of sample arrival order.

use std::collections::BTreeMap;

use super::call_tree::CallTree;
use crate::domain::{FunctionId, LibId, Period, Pid, SourceFileId, Tid};

#[derive(Debug)]
pub struct EventScope {
    pub name: String,
    pub sample_count: u64,
    pub event_count: u64,
    pub processes: BTreeMap<Pid, ProcessScope>,
}

impl EventScope {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sample_count: 0,
            event_count: 0,
            processes: BTreeMap::new(),
        }
    }

    pub fn process_mut(&mut self, pid: Pid) -> &mut ProcessScope {
        self.processes.entry(pid).or_insert_with(|| ProcessScope::new(pid))
    }

    /// Every function usage of this event, across all scopes
    pub fn functions(&self) -> impl Iterator<Item = &FunctionUsage> {
        self.processes
            .values()
            .flat_map(|p| p.threads.values())
            .flat_map(|t| t.libs.values())
            .flat_map(|l| l.functions.values())
    }
}

#[derive(Debug)]
pub struct ProcessScope {
    pub pid: Pid,
    /// Name of the main thread (tid == pid)
    pub name: String,
    pub event_count: u64,
    pub threads: BTreeMap<Tid, ThreadScope>,
}

impl ProcessScope {
    #[must_use]
    pub fn new(pid: Pid) -> Self {
        Self { pid, name: String::new(), event_count: 0, threads: BTreeMap::new() }
    }

    /// Look up or create a thread, renaming it if `comm` is non-empty.
    ///
    /// Threads may rename themselves; the last non-empty name wins. The main
    /// thread's name doubles as the process name.
    pub fn thread_mut(&mut self, tid: Tid, comm: &str) -> &mut ThreadScope {
        if !comm.is_empty() && tid.0 == self.pid.0 {
            self.name = comm.to_string();
        }
        let thread = self.threads.entry(tid).or_insert_with(|| ThreadScope::new(tid));
        if !comm.is_empty() {
            thread.name = comm.to_string();
        }
        thread
    }
}

#[derive(Debug)]
pub struct ThreadScope {
    pub tid: Tid,
    pub name: String,
    pub event_count: u64,
    pub libs: BTreeMap<LibId, LibraryUsage>,
}

impl ThreadScope {
    #[must_use]
    pub fn new(tid: Tid) -> Self {
        Self { tid, name: String::new(), event_count: 0, libs: BTreeMap::new() }
    }

    pub fn lib_mut(&mut self, lib_id: LibId) -> &mut LibraryUsage {
        self.libs.entry(lib_id).or_insert_with(|| LibraryUsage::new(lib_id))
    }
}

#[derive(Debug)]
pub struct LibraryUsage {
    pub lib_id: LibId,
    /// Period of samples whose leaf is in this library
    pub event_count: u64,
    pub functions: BTreeMap<FunctionId, FunctionUsage>,
}

impl LibraryUsage {
    #[must_use]
    pub fn new(lib_id: LibId) -> Self {
        Self { lib_id, event_count: 0, functions: BTreeMap::new() }
    }

    pub fn function_mut(&mut self, function: FunctionId) -> &mut FunctionUsage {
        self.functions.entry(function).or_insert_with(|| FunctionUsage::new(function))
    }
}

/// Per-scope statistics of one function
#[derive(Debug)]
pub struct FunctionUsage {
    pub function: FunctionId,
    /// Number of samples with this function as the leaf
    pub sample_count: u64,
    /// Period of samples with this function as the leaf
    pub self_period: u64,
    /// Built from the leaf-to-root walk: children are callers
    pub forward: CallTree,
    /// Built from the root-to-leaf walk: children are callees
    pub reverse: CallTree,
    /// addr → (self, subtree) period; only built for source annotation
    pub addr_hits: Option<BTreeMap<u64, Period>>,
    /// (file, line) → (self, subtree) period; filled by source annotation
    pub source_hits: Option<BTreeMap<(SourceFileId, u32), Period>>,
}

impl FunctionUsage {
    #[must_use]
    pub fn new(function: FunctionId) -> Self {
        Self {
            function,
            sample_count: 0,
            self_period: 0,
            forward: CallTree::new(function),
            reverse: CallTree::new(function),
            addr_hits: None,
            source_hits: None,
        }
    }

    /// Inclusive period of the function in this scope
    #[must_use]
    pub fn subtree_count(&self) -> u64 {
        self.forward.root().subtree_count()
    }

    /// Recompute both trees' subtree totals, returning the larger root total.
    pub fn compute_subtree_totals(&mut self) -> u64 {
        let forward = self.forward.compute_subtree_totals();
        let reverse = self.reverse.compute_subtree_totals();
        forward.max(reverse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_rename_last_non_empty_wins() {
        let mut process = ProcessScope::new(Pid(100));
        process.thread_mut(Tid(101), "worker");
        process.thread_mut(Tid(101), "");
        assert_eq!(process.threads[&Tid(101)].name, "worker");

        process.thread_mut(Tid(101), "renamed");
        assert_eq!(process.threads[&Tid(101)].name, "renamed");
        // Non-main thread never names the process
        assert_eq!(process.name, "");
    }

    #[test]
    fn test_main_thread_names_process() {
        let mut process = ProcessScope::new(Pid(100));
        process.thread_mut(Tid(100), "surfaceflinger");
        assert_eq!(process.name, "surfaceflinger");
    }

    #[test]
    fn test_event_functions_iterates_all_scopes() {
        let mut event = EventScope::new("cpu-cycles");
        event
            .process_mut(Pid(1))
            .thread_mut(Tid(1), "a")
            .lib_mut(LibId(0))
            .function_mut(FunctionId(0));
        event
            .process_mut(Pid(2))
            .thread_mut(Tid(2), "b")
            .lib_mut(LibId(0))
            .function_mut(FunctionId(1));

        let ids: Vec<FunctionId> = event.functions().map(|f| f.function).collect();
        assert_eq!(ids, vec![FunctionId(0), FunctionId(1)]);
    }
}
