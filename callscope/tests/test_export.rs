mod support;

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use callscope::aggregation::EventAggregator;
use callscope::config::{ReportConfig, ResolverConfig};
use callscope::export::RecordInfo;
use callscope::input::{JsonLinesSampleReader, RecordMeta};
use callscope::pipeline::ReportPipeline;
use serde_json::Value;
use support::{frame, sample, write_disassembler, write_elf, write_line_tool, EM_X86_64};

const LIBDEMO: &str = "/system/lib64/libdemo.so";
const BUILD_ID: [u8; 20] = [0x5a; 20];

fn recording() -> String {
    let hex: String = BUILD_ID.iter().map(|b| format!("{b:02x}")).collect();
    let frame = |name: &str, start: u64, addr: u64| {
        serde_json::json!({
            "dso_path": LIBDEMO,
            "symbol_name": name,
            "symbol_addr": start,
            "symbol_len": 0x40,
            "vaddr_in_file": addr,
        })
    };
    let sample = |period: u64| {
        serde_json::json!({
            "type": "sample",
            "pid": 100,
            "tid": 101,
            "thread_comm": "worker",
            "event_name": "cpu-cycles",
            "period": period,
            "symbol": frame("compute", 0x1000, 0x1010),
            "callchain": [frame("main", 0x2000, 0x2008)],
        })
        .to_string()
    };
    [
        serde_json::json!({"type": "meta", "arch": "x86_64", "cmdline": "record -g ./demo"})
            .to_string(),
        serde_json::json!({"type": "build_id", "path": LIBDEMO, "build_id": format!("0x{hex}")})
            .to_string(),
        sample(30),
        String::new(),
        sample(12),
    ]
    .join("\n")
}

fn export_json(pipeline: &ReportPipeline) -> Value {
    to_json(&pipeline.record_info())
}

fn to_json(info: &RecordInfo) -> Value {
    let mut buffer = Vec::new();
    info.export(&mut buffer).expect("Failed to export report");
    serde_json::from_slice(&buffer).expect("Invalid JSON")
}

fn function_id(report: &Value, function: &str) -> u64 {
    report["functionMap"]
        .as_object()
        .unwrap()
        .iter()
        .find(|(_, info)| info["f"] == function)
        .map(|(id, _)| id.parse::<u64>().unwrap())
        .unwrap()
}

/// (function id, e, s) of an exported tree node
fn node_counts(node: &Value) -> (u64, u64, u64) {
    (node["f"].as_u64().unwrap(), node["e"].as_u64().unwrap(), node["s"].as_u64().unwrap())
}

fn find_usage<'a>(report: &'a Value, function: &str) -> &'a Value {
    let id = function_id(report, function);
    report["sampleInfo"][0]["processes"][0]["threads"][0]["libs"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|lib| lib["functions"].as_array().unwrap())
        .find(|usage| usage["f"] == id)
        .unwrap()
}

#[test]
fn test_report_without_source() {
    let mut pipeline = ReportPipeline::new(ReportConfig::default());
    let mut reader = JsonLinesSampleReader::new(Cursor::new(recording()));
    assert_eq!(pipeline.load(&mut reader).unwrap(), 2);
    pipeline.prune();

    let report = export_json(&pipeline);
    assert_eq!(report["machineType"], "x86_64");
    assert_eq!(report["recordCmdline"], "record -g ./demo");
    assert_eq!(report["totalSamples"], 2);
    assert_eq!(report["processNames"]["100"], "");
    assert_eq!(report["threadNames"]["101"], "worker");
    assert_eq!(report["libList"], serde_json::json!([LIBDEMO]));
    assert_eq!(report["sourceFiles"], serde_json::json!([]));

    let event = &report["sampleInfo"][0];
    assert_eq!(event["eventName"], "cpu-cycles");
    assert_eq!(event["eventCount"], 42);

    let compute = find_usage(&report, "compute");
    assert_eq!(compute["c"], 2);
    assert!(compute.get("sc").is_none());
    assert!(compute.get("ad").is_none());
    // Forward tree: compute ← main
    assert_eq!(compute["g"]["e"], 0);
    assert_eq!(compute["g"]["s"], 42);
    assert_eq!(compute["g"]["c"][0]["e"], 42);
    // Reverse tree: compute calls nothing
    assert_eq!(compute["rg"]["e"], 42);
    assert_eq!(compute["rg"]["c"], serde_json::json!([]));

    let main = find_usage(&report, "main");
    assert_eq!(main["c"], 0);
    assert_eq!(main["rg"]["e"], 0);
    assert_eq!(main["rg"]["s"], 42);
    assert_eq!(main["rg"]["c"][0]["e"], 42);
}

#[test]
fn test_tree_nodes_export_self_as_e_and_subtree_as_s() {
    // A ← B ← C, sampled three times
    let mut agg = EventAggregator::new(false);
    for period in [10, 20, 5] {
        let chain = vec![frame(LIBDEMO, "B", 0x200), frame(LIBDEMO, "C", 0x300)];
        agg.ingest(&sample("cpu-cycles", period, frame(LIBDEMO, "A", 0x100), chain)).unwrap();
    }
    agg.compute_subtree_totals();
    let report = to_json(&RecordInfo::build(&agg, &RecordMeta::default(), None, false));
    let (a, b, c) =
        (function_id(&report, "A"), function_id(&report, "B"), function_id(&report, "C"));

    let a_usage = find_usage(&report, "A");
    assert_eq!(a_usage["c"], 3);
    let root = &a_usage["g"];
    assert_eq!(node_counts(root), (a, 0, 35));
    let caller = &root["c"][0];
    assert_eq!(node_counts(caller), (b, 0, 35));
    assert_eq!(node_counts(&caller["c"][0]), (c, 35, 35));
    // The leaf's own samples land on the root of its callee tree
    assert_eq!(a_usage["rg"]["e"], 35);

    let b_usage = find_usage(&report, "B");
    assert_eq!(b_usage["g"]["e"], 0);
    assert_eq!(b_usage["g"]["s"], 35);
    assert_eq!(b_usage["rg"]["s"], 35);
    assert_eq!(b_usage["rg"]["c"][0]["e"], 35);
}

#[test]
fn test_malformed_record_aborts_load() {
    let text = format!("{}\n{{\"type\": \"sample\", \"pid\": \n", recording());
    let mut pipeline = ReportPipeline::new(ReportConfig::default());
    let err = pipeline.load(&mut JsonLinesSampleReader::new(Cursor::new(text))).unwrap_err();
    assert!(format!("{err:#}").contains("line 6"), "unexpected error: {err:#}");
}

fn write_sources(dir: &Path) {
    let text: String = (1..=30).map(|n| format!("line {n}\n")).collect();
    fs::create_dir_all(dir.join("demo")).unwrap();
    fs::write(dir.join("demo/compute.c"), text).unwrap();
}

#[test]
fn test_report_with_source_annotation() {
    let dir = tempfile::tempdir().unwrap();
    let symfs = dir.path().join("symbols");
    write_elf(&symfs.join("system/lib64/libdemo.so"), EM_X86_64, &BUILD_ID, true);
    let sources = dir.path().join("src");
    write_sources(&sources);
    let (tool, log) = (dir.path().join("addr2line"), dir.path().join("calls.log"));
    write_line_tool(
        &tool,
        &log,
        &[
            ("1000", &["/build/demo/compute.c:10"]),
            ("1010", &["/build/demo/compute.c:15"]),
            ("103f", &["/build/demo/compute.c:20"]),
        ],
    );

    let config = ReportConfig {
        annotate_source: true,
        source_dirs: vec![sources],
        symfs_dirs: vec![symfs],
        binary_cache_dir: dir.path().join("binary_cache"),
        resolver: ResolverConfig {
            tool_path: tool,
            tool_timeout: Duration::from_secs(10),
            max_batch_addrs: ResolverConfig::DEFAULT_MAX_BATCH,
            jobs: 1,
        },
        ..ReportConfig::default()
    };
    let mut pipeline = ReportPipeline::new(config);
    pipeline.load(&mut JsonLinesSampleReader::new(Cursor::new(recording()))).unwrap();
    pipeline.prune();
    let stats = pipeline.add_source_code().unwrap();

    assert_eq!(stats.functions_with_lines, 1);
    assert!(dir.path().join("binary_cache/system/lib64/libdemo.so").is_file());

    let report = export_json(&pipeline);
    let compute_info = report["functionMap"]
        .as_object()
        .unwrap()
        .values()
        .find(|info| info["f"] == "compute")
        .unwrap();
    assert_eq!(compute_info["s"], 0);
    assert_eq!(compute_info["r"], serde_json::json!([10, 20]));

    let compute = find_usage(&report, "compute");
    assert_eq!(compute["sc"], serde_json::json!([{"f": 0, "l": 15, "e": 42, "s": 42}]));

    // Address hits are only exported with disassembly
    assert!(compute.get("ad").is_none());

    // main resolved nowhere: no line range, no source hits
    let main = find_usage(&report, "main");
    assert!(main.get("sc").is_none());

    let file = &report["sourceFiles"][0];
    assert_eq!(file["path"], "/build/demo/compute.c");
    let code = file["code"].as_object().unwrap();
    assert_eq!(code.len(), 11);
    assert_eq!(code["15"], "line 15");
    assert!(code.get("9").is_none());
}

#[test]
fn test_report_with_disassembly() {
    let dir = tempfile::tempdir().unwrap();
    let symfs = dir.path().join("symbols");
    write_elf(&symfs.join("system/lib64/libdemo.so"), EM_X86_64, &BUILD_ID, true);
    let (tool, log) = (dir.path().join("objdump"), dir.path().join("calls.log"));
    write_disassembler(&tool, &log);

    let config = ReportConfig {
        add_disassembly: true,
        objdump_path: tool,
        symfs_dirs: vec![symfs],
        binary_cache_dir: dir.path().join("binary_cache"),
        resolver: ResolverConfig { jobs: 2, ..ResolverConfig::default() },
        ..ReportConfig::default()
    };
    let mut pipeline = ReportPipeline::new(config);
    pipeline.load(&mut JsonLinesSampleReader::new(Cursor::new(recording()))).unwrap();
    pipeline.prune();
    let stats = pipeline.add_disassembly().unwrap();
    assert_eq!((stats.functions, stats.disassembled, stats.failed), (2, 2, 0));

    let calls = fs::read_to_string(&log).unwrap();
    let cached = dir.path().join("binary_cache/system/lib64/libdemo.so");
    assert!(calls.lines().any(|line| line
        == format!(
            "-dlC --no-show-raw-insn --start-address=0x1000 --stop-address=0x1040 {}",
            cached.display()
        )));

    let report = export_json(&pipeline);
    let compute_id = function_id(&report, "compute");
    let code = &report["functionMap"][compute_id.to_string()]["d"];
    assert_eq!(code[1], serde_json::json!(["0000000000001000 <compute>:", 0]));
    assert_eq!(code[4], serde_json::json!(["    1010:  ret", 0x1010]));

    // Address hits keyed by address: self count, then accumulated count
    let compute = find_usage(&report, "compute");
    assert_eq!(compute["ad"], serde_json::json!({"4112": {"e": 42, "s": 42}}));
    let main = find_usage(&report, "main");
    assert_eq!(main["ad"], serde_json::json!({"8200": {"e": 0, "s": 42}}));
}

#[test]
fn test_cli_writes_report_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("perf.jsonl");
    let output = dir.path().join("report.json");
    fs::write(&input, recording()).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_callscope"))
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("--quiet")
        .status()
        .expect("Failed to run callscope");
    assert!(status.success());

    let report: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(report["totalSamples"], 2);
}

#[test]
fn test_cli_rejects_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_callscope"))
        .arg("-i")
        .arg(dir.path().join("missing.jsonl"))
        .arg("-o")
        .arg(dir.path().join("report.json"))
        .output()
        .expect("Failed to run callscope");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Input not found"));
}
