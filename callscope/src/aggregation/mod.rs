//! # Sample Aggregation
//!
//! Turns a stream of [`Sample`](callscope_common::Sample)s into per-function
//! call trees with propagated subtree costs, then prunes them down to a
//! reportable size.
//!
//! ## Data Flow
//!
//! ```text
//! Sample ──► EventAggregator ──► CallGraphBuilder ──► GraphPruner
//!            (scope totals,      (forward/reverse     (subtree totals,
//!             interning)          tree folding)         threshold cut)
//! ```
//!
//! ## Module Structure
//!
//! - **`registry`**: library and function interning tables
//! - **`scopes`**: the Event → Process → Thread → Library → Function tree
//! - **`call_tree`**: arena-backed call tree with iterative traversals
//! - **`call_graph`**: folds one callstack into forward and reverse trees
//! - **`aggregator`**: routes samples through the scopes
//! - **`pruner`**: function-level and edge-level threshold cuts
//!
//! Everything here is single-threaded: one sample is folded completely
//! before the next is read.

pub mod aggregator;
pub mod call_graph;
pub mod call_tree;
pub mod pruner;
pub mod registry;
pub mod scopes;

pub use aggregator::EventAggregator;
pub use call_graph::{CallFrame, CallGraphBuilder};
pub use call_tree::{CallNode, CallTree, NodeId};
pub use pruner::{GraphPruner, PruneStats};
pub use registry::{Function, FunctionRegistry, LibRegistry};
pub use scopes::{EventScope, FunctionUsage, LibraryUsage, ProcessScope, ThreadScope};
