//! JSON export of the aggregated record tree.
//!
//! The layout is meant for a downstream renderer, so keys inside the large
//! repeated objects are kept short:
//!
//! ```text
//! {
//!   "recordTime": "...", "machineType": "arm64", "recordCmdline": "...",
//!   "totalSamples": 4210,
//!   "processNames": {"100": "surfaceflinger"},
//!   "threadNames":  {"100": "surfaceflinger", "101": "RenderThread"},
//!   "libList": ["/system/lib64/libc.so", ...],          ← index = lib id
//!   "functionMap": {"7": {"l": 0, "f": "memcpy", "s": 2, "r": [10, 42]}},
//!   "sampleInfo": [{"eventName": "cpu-cycles", "eventCount": 123, "processes": [
//!       {"pid": 100, "eventCount": 99, "threads": [
//!           {"tid": 100, "eventCount": 99, "libs": [
//!               {"libId": 0, "eventCount": 50, "functions": [
//!                   {"f": 7, "c": 12, "g": <tree>, "rg": <tree>, "sc": [...], "ad": {...}}
//!   ]}]}]}]}],
//!   "sourceFiles": [{"path": "/src/main.c", "code": {"10": "int main() {"}}]
//! }
//!
//! <tree> = {"e": self count, "s": subtree count, "f": function id, "c": [<tree>...]}
//! "sc"   = [{"f": file id, "l": line, "e": self count, "s": accumulated count}]
//! "ad"   = {"<addr>": {"e": self count, "s": accumulated count}}
//! "d"    = [["<disassembly line>", addr], ...]           ← functionMap, optional
//! ```

use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::aggregation::{CallTree, EventAggregator, FunctionUsage, NodeId};
use crate::domain::DisassemblyLine;
use crate::input::RecordMeta;
use crate::symbolization::{demangle_symbol, SourceFileRegistry};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordInfo {
    pub record_time: String,
    pub machine_type: String,
    pub record_cmdline: String,
    pub total_samples: u64,
    pub process_names: BTreeMap<u32, String>,
    pub thread_names: BTreeMap<u32, String>,
    pub lib_list: Vec<String>,
    pub function_map: BTreeMap<u32, FunctionInfo>,
    pub sample_info: Vec<EventInfo>,
    pub source_files: Vec<SourceFileInfo>,
}

#[derive(Debug, Serialize)]
pub struct FunctionInfo {
    /// Library id
    pub l: u32,
    /// Demangled name
    pub f: String,
    /// Source file id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u32>,
    /// First and last source line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r: Option<[u32; 2]>,
    /// Disassembly as `[line, address]` pairs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<Vec<DisassemblyLine>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfo {
    pub event_name: String,
    pub event_count: u64,
    pub processes: Vec<ProcessInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub pid: u32,
    pub event_count: u64,
    pub threads: Vec<ThreadInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadInfo {
    pub tid: u32,
    pub event_count: u64,
    pub libs: Vec<LibInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibInfo {
    pub lib_id: u32,
    pub event_count: u64,
    pub functions: Vec<FunctionUsageInfo>,
}

#[derive(Debug, Serialize)]
pub struct FunctionUsageInfo {
    /// Function id
    pub f: u32,
    /// Sample count
    pub c: u64,
    /// Forward (callers) tree
    pub g: CallNodeInfo,
    /// Reverse (callees) tree
    pub rg: CallNodeInfo,
    /// Source line hits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sc: Option<Vec<LineHitInfo>>,
    /// Address hits, keyed by address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad: Option<BTreeMap<u64, HitCountInfo>>,
}

#[derive(Debug, Serialize)]
pub struct CallNodeInfo {
    /// Self count
    pub e: u64,
    /// Subtree count
    pub s: u64,
    /// Function id
    pub f: u32,
    /// Children
    pub c: Vec<CallNodeInfo>,
}

#[derive(Debug, Serialize)]
pub struct LineHitInfo {
    /// Source file id
    pub f: u32,
    /// Line
    pub l: u32,
    pub e: u64,
    pub s: u64,
}

#[derive(Debug, Serialize)]
pub struct HitCountInfo {
    /// Samples landing here
    pub e: u64,
    /// Samples landing here or in a callee
    pub s: u64,
}

#[derive(Debug, Serialize)]
pub struct SourceFileInfo {
    pub path: String,
    pub code: BTreeMap<u32, String>,
}

impl RecordInfo {
    /// Snapshot the aggregation into its export form.
    ///
    /// `with_addr_hits` adds each usage's `ad` map; it is only useful next to
    /// disassembly.
    #[must_use]
    pub fn build(
        aggregator: &EventAggregator,
        meta: &RecordMeta,
        files: Option<&SourceFileRegistry>,
        with_addr_hits: bool,
    ) -> Self {
        let mut process_names = BTreeMap::new();
        let mut thread_names = BTreeMap::new();
        let mut sample_info = Vec::new();

        for event in aggregator.events().values() {
            let mut processes = Vec::new();
            for process in event.processes.values() {
                process_names.insert(process.pid.0, process.name.clone());
                let mut threads = Vec::new();
                for thread in process.threads.values() {
                    thread_names.insert(thread.tid.0, thread.name.clone());
                    let libs = thread
                        .libs
                        .values()
                        .map(|lib| LibInfo {
                            lib_id: lib.lib_id.0,
                            event_count: lib.event_count,
                            functions: lib
                                .functions
                                .values()
                                .map(|usage| usage_info(usage, with_addr_hits))
                                .collect(),
                        })
                        .collect();
                    threads.push(ThreadInfo {
                        tid: thread.tid.0,
                        event_count: thread.event_count,
                        libs,
                    });
                }
                processes.push(ProcessInfo {
                    pid: process.pid.0,
                    event_count: process.event_count,
                    threads,
                });
            }
            sample_info.push(EventInfo {
                event_name: event.name.clone(),
                event_count: event.event_count,
                processes,
            });
        }

        let function_map = aggregator
            .functions()
            .iter()
            .map(|function| {
                let info = FunctionInfo {
                    l: function.lib_id.0,
                    f: demangle_symbol(&function.name),
                    s: function.source_file.map(|id| id.0),
                    r: function.line_range.map(|r| [r.start, r.end]),
                    d: function.disassembly.clone(),
                };
                (function.id.0, info)
            })
            .collect();

        let source_files = files
            .map(|files| {
                files
                    .iter()
                    .map(|file| SourceFileInfo { path: file.path.clone(), code: file.code.clone() })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            record_time: meta.record_time.clone(),
            machine_type: meta.arch.clone(),
            record_cmdline: meta.cmdline.clone(),
            total_samples: aggregator.total_samples(),
            process_names,
            thread_names,
            lib_list: aggregator.libs().iter().map(|(_, name)| name.to_string()).collect(),
            function_map,
            sample_info,
            source_files,
        }
    }

    /// Write as JSON to any writer (file, stdout, buffer, etc.)
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn export<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, self).context("Failed to write report JSON")?;
        Ok(())
    }
}

fn usage_info(usage: &FunctionUsage, with_addr_hits: bool) -> FunctionUsageInfo {
    FunctionUsageInfo {
        f: usage.function.0,
        c: usage.sample_count,
        g: tree_info(&usage.forward),
        rg: tree_info(&usage.reverse),
        sc: usage.source_hits.as_ref().map(|hits| {
            hits.iter()
                .map(|(&(file, line), p)| LineHitInfo {
                    f: file.0,
                    l: line,
                    e: p.count,
                    s: p.accumulated,
                })
                .collect()
        }),
        ad: usage.addr_hits.as_ref().filter(|_| with_addr_hits).map(|hits| {
            hits.iter()
                .map(|(&addr, p)| (addr, HitCountInfo { e: p.count, s: p.accumulated }))
                .collect()
        }),
    }
}

/// Convert a call tree bottom-up, without recursion.
fn tree_info(tree: &CallTree) -> CallNodeInfo {
    let mut built: HashMap<NodeId, CallNodeInfo> = HashMap::new();
    for id in tree.preorder().into_iter().rev() {
        let node = tree.node(id);
        let children = node.child_ids().filter_map(|child| built.remove(&child)).collect();
        built.insert(
            id,
            CallNodeInfo {
                e: node.self_count(),
                s: node.subtree_count(),
                f: node.function.0,
                c: children,
            },
        );
    }
    built.remove(&NodeId::ROOT).unwrap_or_else(|| {
        let root = tree.root();
        CallNodeInfo {
            e: root.self_count(),
            s: root.subtree_count(),
            f: root.function.0,
            c: Vec::new(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FunctionId;

    #[test]
    fn test_tree_info_keeps_child_order() {
        let mut tree = CallTree::new(FunctionId(0));
        tree.add_path([FunctionId(3)], 1);
        tree.add_path([FunctionId(1), FunctionId(2)], 4);
        tree.compute_subtree_totals();

        let info = tree_info(&tree);
        assert_eq!(info.s, 5);
        assert_eq!(info.e, 0);
        assert_eq!(info.c.iter().map(|c| c.f).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(info.c[0].c[0].f, 2);
        assert_eq!(info.c[0].c[0].e, 4);
    }

    #[test]
    fn test_export_writes_short_keys() {
        let mut tree = CallTree::new(FunctionId(0));
        tree.add_path([], 2);
        tree.compute_subtree_totals();

        let json = serde_json::to_value(tree_info(&tree)).unwrap();
        assert_eq!(json, serde_json::json!({"e": 2, "s": 2, "f": 0, "c": []}));
    }
}
