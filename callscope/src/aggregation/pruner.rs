//! Percentage-based pruning of the aggregated call trees.
//!
//! Two thresholds, both relative to the event total:
//!
//! 1. **Function level** - a function whose inclusive cost in a scope is
//!    below `min_func_percent` is removed from that scope.
//! 2. **Edge level** - in the trees of every surviving function, subtrees
//!    below `min_callchain_percent` are cut.
//!
//! Functions that no surviving tree still references are then retired from
//! the function registry, which freezes it.
//!
//! Subtree totals must have been computed before pruning, and are not
//! recomputed afterwards: running the pruner twice yields the same trees.

// Thresholds are percentages of u64 totals
#![allow(clippy::cast_precision_loss)]

use std::collections::HashSet;

use log::{debug, info};

use super::aggregator::EventAggregator;
use crate::domain::FunctionId;

#[derive(Debug, Clone, Copy)]
pub struct GraphPruner {
    pub min_func_percent: f64,
    pub min_callchain_percent: f64,
}

/// What a pruning pass removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    /// Function usages removed from their scope
    pub usages_removed: usize,
    /// Functions retired from the registry
    pub functions_retired: usize,
    /// Functions still referenced by some tree
    pub functions_kept: usize,
}

impl GraphPruner {
    #[must_use]
    pub fn new(min_func_percent: f64, min_callchain_percent: f64) -> Self {
        Self { min_func_percent, min_callchain_percent }
    }

    pub fn prune(&self, aggregator: &mut EventAggregator) -> PruneStats {
        let mut keep: HashSet<FunctionId> = HashSet::new();
        let mut usages_removed = 0;

        let (_, functions, events) = aggregator.parts_mut();
        for event in events.values_mut() {
            let total = event.event_count as f64;
            let func_limit = total * self.min_func_percent / 100.0;
            let edge_limit = total * self.min_callchain_percent / 100.0;
            debug!(
                "Pruning {}: function limit {func_limit:.2}, edge limit {edge_limit:.2}",
                event.name
            );

            for process in event.processes.values_mut() {
                for thread in process.threads.values_mut() {
                    for lib in thread.libs.values_mut() {
                        let before = lib.functions.len();
                        lib.functions
                            .retain(|_, usage| usage.subtree_count() as f64 >= func_limit);
                        usages_removed += before - lib.functions.len();

                        for usage in lib.functions.values_mut() {
                            usage.forward.cut_edges(edge_limit, &mut keep);
                            usage.reverse.cut_edges(edge_limit, &mut keep);
                        }
                    }
                }
            }
        }

        let functions_retired = functions.retain(&keep);
        let stats = PruneStats { usages_removed, functions_retired, functions_kept: keep.len() };
        info!(
            "Pruned {} function usages, retired {} functions, kept {}",
            stats.usages_removed, stats.functions_retired, stats.functions_kept
        );
        stats
    }
}
