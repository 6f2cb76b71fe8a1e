//! Folding one callstack into per-function call trees.
//!
//! A callstack lists frames leaf first. Each function that appears in it
//! receives the sample's period exactly once per direction, however many
//! times it recurses:
//!
//! ```text
//! callstack:  [A, B, C]         (A is the leaf, C the outermost caller)
//!
//! forward:    A: A → B → C      children are callers
//!             B: B → C
//!             C: C
//!
//! reverse:    C: C → B → A      children are callees
//!             B: B → A
//!             A: A
//! ```
//!
//! Dedup is per callstack and per direction: the forward walk charges the
//! occurrence nearest the leaf, the reverse walk the one nearest the root.

use std::collections::{BTreeMap, HashSet};

use super::scopes::ThreadScope;
use crate::domain::{FunctionId, LibId, Period};

/// One frame of an interned callstack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    pub lib: LibId,
    pub func: FunctionId,
    /// Address of the frame in the binary's virtual address space
    pub addr: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CallGraphBuilder {
    build_addr_hit_map: bool,
}

impl CallGraphBuilder {
    /// `build_addr_hit_map` enables per-address hit counting, which is only
    /// needed for source annotation.
    #[must_use]
    pub fn new(build_addr_hit_map: bool) -> Self {
        Self { build_addr_hit_map }
    }

    /// Fold `callstack` into both trees of every function it contains.
    pub fn fold(&self, thread: &mut ThreadScope, callstack: &[CallFrame], period: u64) {
        self.fold_forward(thread, callstack, period);
        Self::fold_reverse(thread, callstack, period);
    }

    /// Walk leaf to root. For the first occurrence of each function, fold the
    /// caller-side suffix into its forward tree.
    ///
    /// The leaf function also gains one sample and the period as self cost.
    pub fn fold_forward(&self, thread: &mut ThreadScope, callstack: &[CallFrame], period: u64) {
        let mut visited = HashSet::with_capacity(callstack.len());
        for (i, frame) in callstack.iter().enumerate() {
            if !visited.insert(frame.func) {
                continue;
            }
            let usage = thread.lib_mut(frame.lib).function_mut(frame.func);
            let is_leaf = i == 0;
            if is_leaf {
                usage.sample_count += 1;
                usage.self_period += period;
            }
            if self.build_addr_hit_map {
                let self_count = if is_leaf { period } else { 0 };
                *usage
                    .addr_hits
                    .get_or_insert_with(BTreeMap::new)
                    .entry(frame.addr)
                    .or_default() += Period::new(self_count, period);
            }
            usage.forward.add_path(callstack[i + 1..].iter().map(|f| f.func), period);
        }
    }

    /// Walk root to leaf. For the first occurrence of each function, fold the
    /// callee-side prefix into its reverse tree.
    pub fn fold_reverse(thread: &mut ThreadScope, callstack: &[CallFrame], period: u64) {
        let mut visited = HashSet::with_capacity(callstack.len());
        for (i, frame) in callstack.iter().enumerate().rev() {
            if !visited.insert(frame.func) {
                continue;
            }
            thread
                .lib_mut(frame.lib)
                .function_mut(frame.func)
                .reverse
                .add_path(callstack[..i].iter().rev().map(|f| f.func), period);
        }
    }
}
