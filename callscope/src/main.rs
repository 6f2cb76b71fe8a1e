//! # callscope - Main Entry Point
//!
//! Reads a sample recording, builds and prunes the call graphs, optionally
//! annotates them with source lines and disassembly, then writes the report
//! JSON and prints a short hotspot summary.

// Percentages are for display only
#![allow(clippy::cast_precision_loss)]

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use callscope::analysis::EventHotspots;
use callscope::cli::Args;
use callscope::input::JsonLinesSampleReader;
use callscope::pipeline::ReportPipeline;
use callscope::preflight::run_preflight_checks;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

const DEFAULT_OUTPUT: &str = "report.json";

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") {
        EXIT_NOPERM
    } else if msg.contains("invalid --") || msg.contains("must be an existing directory") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;
    let top = args.top;
    let input = args.input.clone();
    let output = args.output.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
    let config = args.into_config();

    run_preflight_checks(&input, &config)?;

    if !quiet {
        println!("callscope v{}", env!("CARGO_PKG_VERSION"));
        println!("input: {}", input.display());
    }

    let started = Instant::now();
    let mut reader = JsonLinesSampleReader::open(&input)
        .with_context(|| format!("Failed to open {}", input.display()))?;

    let annotate = config.annotate_source;
    let disassemble = config.add_disassembly;
    let mut pipeline = ReportPipeline::new(config);
    let samples = pipeline.load(&mut reader)?;
    let pruned = pipeline.prune();
    info!(
        "Pruned {} usages, retired {} functions",
        pruned.usages_removed, pruned.functions_retired
    );

    if annotate {
        let stats = pipeline.add_source_code()?;
        if !quiet {
            println!(
                "source: {} functions with line ranges, {} lines hit",
                stats.functions_with_lines, stats.hit_lines
            );
        }
    }

    if disassemble {
        let stats = pipeline.add_disassembly()?;
        if !quiet {
            println!(
                "disassembly: {} of {} functions ({} failed)",
                stats.disassembled, stats.functions, stats.failed
            );
        }
    }

    let file = File::create(&output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    pipeline.record_info().export(&mut writer)?;
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", output.display()))?;

    if !quiet {
        println!("samples: {samples}");
        print_hotspots(&pipeline.hotspots(), top);
        println!("saved: {} ({:.1}s)", output.display(), started.elapsed().as_secs_f64());
    }
    Ok(())
}

fn print_hotspots(events: &[EventHotspots], top: usize) {
    for event in events {
        println!();
        let title = format!(
            "{} ({} events, {} samples)",
            event.event, event.event_count, event.sample_count
        );
        println!("{title}");
        println!("{}", "─".repeat(title.chars().count()));
        println!("  inclusive    self   function");
        for hotspot in event.hotspots.iter().take(top) {
            println!(
                "  {:>8.2}% {:>7.2}%   {}  [{}]",
                hotspot.inclusive_percent, hotspot.self_percent, hotspot.name, hotspot.lib
            );
        }
    }
    println!();
}
