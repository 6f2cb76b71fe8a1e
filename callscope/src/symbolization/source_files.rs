//! Interned source files, their interesting line ranges, and loading their
//! text from local source trees.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::domain::{LineRange, SourceFileId};

/// Lines shown around every hit line
pub const CONTEXT_LINES: u32 = 5;

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: SourceFileId,
    /// Path as reported by the line-table tool
    pub path: String,
    line_ranges: Vec<LineRange>,
    /// Line number → text, only for lines inside `line_ranges`
    pub code: BTreeMap<u32, String>,
}

impl SourceFile {
    fn new(id: SourceFileId, path: &str) -> Self {
        Self { id, path: path.to_string(), line_ranges: Vec::new(), code: BTreeMap::new() }
    }

    pub fn add_range(&mut self, range: LineRange) {
        self.line_ranges.push(range);
    }

    /// Register `line` plus its surrounding context lines.
    pub fn add_context(&mut self, line: u32) {
        let start = line.saturating_sub(CONTEXT_LINES).max(1);
        self.add_range(LineRange::new(start, line.saturating_add(CONTEXT_LINES)));
    }

    /// Sort ranges and merge overlapping or adjacent ones.
    pub fn merge_ranges(&mut self) {
        self.line_ranges.sort_by_key(|r| (r.start, r.end));
        let mut merged: Vec<LineRange> = Vec::with_capacity(self.line_ranges.len());
        for range in self.line_ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if range.start <= last.end.saturating_add(1) => {
                    last.end = last.end.max(range.end);
                }
                _ => merged.push(range),
            }
        }
        self.line_ranges = merged;
    }

    #[must_use]
    pub fn line_ranges(&self) -> &[LineRange] {
        &self.line_ranges
    }
}

/// Source path → source file id
#[derive(Debug, Default)]
pub struct SourceFileRegistry {
    ids: HashMap<String, SourceFileId>,
    files: Vec<SourceFile>,
}

impl SourceFileRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn intern(&mut self, path: &str) -> SourceFileId {
        if let Some(&id) = self.ids.get(path) {
            return id;
        }
        let id = SourceFileId(self.files.len() as u32);
        self.ids.insert(path.to_string(), id);
        self.files.push(SourceFile::new(id, path));
        id
    }

    #[must_use]
    pub fn get(&self, id: SourceFileId) -> Option<&SourceFile> {
        self.files.get(id.index())
    }

    pub fn get_mut(&mut self, id: SourceFileId) -> Option<&mut SourceFile> {
        self.files.get_mut(id.index())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.iter()
    }

    pub fn merge_line_ranges(&mut self) {
        for file in &mut self.files {
            file.merge_ranges();
        }
    }
}

/// Finds and reads source files below a set of local source directories
#[derive(Debug, Default)]
pub struct SourceFileLoader {
    by_name: HashMap<String, Vec<PathBuf>>,
}

impl SourceFileLoader {
    /// Index every source file below `dirs` by base name.
    #[must_use]
    pub fn new(dirs: &[PathBuf]) -> Self {
        let mut by_name: HashMap<String, Vec<PathBuf>> = HashMap::new();
        let mut stack: Vec<PathBuf> = dirs.to_vec();
        while let Some(dir) = stack.pop() {
            let Ok(entries) = fs::read_dir(&dir) else {
                debug!("Skipping unreadable source dir {}", dir.display());
                continue;
            };
            for entry in entries.flatten() {
                let Ok(file_type) = entry.file_type() else { continue };
                let path = entry.path();
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file() && is_source_file(&path) {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    by_name.entry(name).or_default().push(path);
                }
            }
        }
        Self { by_name }
    }

    /// Local file that best matches `path`: same base name and the longest
    /// common trailing path.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<&Path> {
        let wanted = Path::new(path);
        let name = wanted.file_name()?.to_str()?;
        let mut best: Option<(&Path, usize)> = None;
        for candidate in self.by_name.get(name)? {
            let score = common_suffix_len(candidate, wanted);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate.as_path(), score));
            }
        }
        best.map(|(p, _)| p)
    }

    /// Fill `code` of every registered file with the lines in its ranges.
    ///
    /// Returns the number of files found locally.
    pub fn load(&self, files: &mut SourceFileRegistry) -> usize {
        let mut loaded = 0;
        for file in &mut files.files {
            let Some(local) = self.find(&file.path) else {
                debug!("Can't find source file {}", file.path);
                continue;
            };
            let bytes = match fs::read(local) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!("Failed to read {}: {e}", local.display());
                    continue;
                }
            };
            let text = String::from_utf8_lossy(&bytes);
            let lines: Vec<&str> = text.lines().collect();
            fill_code(file, &lines);
            loaded += 1;
        }
        info!("Loaded {loaded} of {} source files", files.len());
        loaded
    }
}

#[allow(clippy::cast_possible_truncation)]
fn fill_code(file: &mut SourceFile, lines: &[&str]) {
    let line_count = lines.len().min(u32::MAX as usize) as u32;
    for range in &file.line_ranges {
        let start = range.start.max(1);
        let end = range.end.min(line_count);
        for line in start..=end {
            file.code.insert(line, lines[(line - 1) as usize].to_string());
        }
    }
}

fn is_source_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else { return false };
    ext.contains('h') || ext.contains('c') || matches!(ext, "java" | "kt" | "rs")
}

fn common_suffix_len(a: &Path, b: &Path) -> usize {
    a.components().rev().zip(b.components().rev()).take_while(|(x, y)| x == y).count()
}
