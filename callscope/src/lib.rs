//! # callscope - Offline Call-Graph Report Builder
//!
//! callscope turns a recording of sampled call stacks into a compact report:
//! per-event, per-process, per-thread call graphs for every sampled function,
//! optionally annotated with the source lines the samples landed on and the
//! disassembly of each sampled function.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Recorded samples (JSON lines)                  │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ SampleSource
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     callscope (This Crate)                      │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │ Aggregation  │──▶│   Pruning    │──▶│    Export    │         │
//! │  │ (call trees) │   │ (thresholds) │   │ (report.json)│         │
//! │  └──────────────┘   └──────┬───────┘   └──────────────┘         │
//! │                            │                   ▲                │
//! │                            ▼                   │                │
//! │                     ┌──────────────┐   ┌──────────────┐         │
//! │                     │ Symbolization│──▶│   Analysis   │         │
//! │                     │  (addr2line, │   │ (annotation, │         │
//! │                     │   objdump)   │   │ disassembly) │         │
//! │                     └──────────────┘   └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`input`]: decoding recorded samples, build-ids and record metadata
//! - [`aggregation`]: interning, scope tree, forward/reverse call trees, pruning
//! - [`symbolization`]: binary cache, ELF inspection, batched line-table
//!   resolution, per-function disassembly, source file discovery
//! - [`analysis`]: source annotation, disassembly and hotspot summaries
//! - [`export`]: the report JSON document
//! - [`pipeline`]: one report run, end to end
//! - [`cli`], [`config`], [`preflight`]: the command-line surface
//! - [`domain`]: ids, periods, build-ids and error types
//!
//! ## Typical Usage
//!
//! ```bash
//! callscope -i perf.jsonl -o report.json
//! callscope -i perf.jsonl --add-source-code --source-dirs ~/src --symfs ./symbols
//! ```

pub mod aggregation;
pub mod analysis;
pub mod cli;
pub mod config;
pub mod domain;
pub mod export;
pub mod input;
pub mod pipeline;
pub mod preflight;
pub mod symbolization;
