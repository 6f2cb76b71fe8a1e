//! Newline-delimited JSON recordings.
//!
//! One object per line, tagged by `"type"`:
//!
//! ```text
//! {"type":"meta","arch":"arm64","cmdline":"record -g -p 100"}
//! {"type":"build_id","path":"/system/lib64/libc.so","build_id":"0x1f2e..."}
//! {"type":"sample","pid":100,"tid":100,"thread_comm":"main","event_name":"cpu-cycles",
//!  "period":10,"symbol":{...},"callchain":[{...}]}
//! ```
//!
//! Blank lines are skipped. `meta` and `build_id` records may appear
//! anywhere; they are absorbed while reading samples.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use callscope_common::Sample;
use log::warn;
use serde::Deserialize;

use super::{RecordMeta, SampleSource};
use crate::domain::{BuildId, SampleError};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record {
    Meta(RecordMeta),
    BuildId { path: String, build_id: String },
    Sample(Sample),
}

pub struct JsonLinesSampleReader<R> {
    reader: R,
    line_no: usize,
    buf: String,
    meta: RecordMeta,
    build_ids: HashMap<String, BuildId>,
}

impl JsonLinesSampleReader<BufReader<File>> {
    /// Open a recording file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, SampleError> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> JsonLinesSampleReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: String::new(),
            meta: RecordMeta::default(),
            build_ids: HashMap::new(),
        }
    }
}

impl<R: BufRead> SampleSource for JsonLinesSampleReader<R> {
    fn next_sample(&mut self) -> Result<Option<Sample>, SampleError> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }

            let record: Record = serde_json::from_str(line)
                .map_err(|source| SampleError::Malformed { line: self.line_no, source })?;
            match record {
                Record::Sample(sample) => return Ok(Some(sample)),
                Record::Meta(meta) => self.meta = meta,
                Record::BuildId { path, build_id } => match BuildId::parse(&build_id) {
                    Some(id) => {
                        self.build_ids.insert(path, id);
                    }
                    None => warn!("Ignoring invalid build-id {build_id:?} for {path}"),
                },
            }
        }
    }

    fn build_id_for_path(&self, path: &str) -> Option<BuildId> {
        self.build_ids.get(path).cloned()
    }

    fn record_meta(&self) -> &RecordMeta {
        &self.meta
    }
}
