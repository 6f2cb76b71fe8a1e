//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a library id where
//! a function id is expected, and make function signatures more expressive.

use std::fmt;
use std::ops::{Add, AddAssign};

/// Process ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

/// Thread ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tid(pub u32);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

/// Interned library id
///
/// Dense from 0 in first-seen order, stable for the lifetime of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LibId(pub u32);

impl LibId {
    /// Index into the registry's id table
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LibId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lib#{}", self.0)
    }
}

/// Interned function id
///
/// Dense from 0 in first-seen order. Ids are never reused, even after the
/// function is dropped by pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

impl FunctionId {
    /// Index into the registry's id table
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func#{}", self.0)
    }
}

/// Interned source file id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceFileId(pub u32);

impl SourceFileId {
    /// Index into the source file table
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One `(source file, line)` pair produced by the line-table tool
pub type SourceLine = (SourceFileId, u32);

/// One line of disassembler output and the address it starts with
pub type DisassemblyLine = (String, u64);

/// Event cost attributed to one node of a tree
///
/// `count` is the cost attributed exactly to this node; `accumulated` is the
/// cost of the node plus everything below it. Addition is component-wise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Period {
    pub count: u64,
    pub accumulated: u64,
}

impl Period {
    #[must_use]
    pub fn new(count: u64, accumulated: u64) -> Self {
        Self { count, accumulated }
    }
}

impl Add for Period {
    type Output = Period;

    fn add(self, rhs: Period) -> Period {
        Period { count: self.count + rhs.count, accumulated: self.accumulated + rhs.accumulated }
    }
}

impl AddAssign for Period {
    fn add_assign(&mut self, rhs: Period) {
        self.count += rhs.count;
        self.accumulated += rhs.accumulated;
    }
}

/// Inclusive range of source lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: u32,
    /// Inclusive
    pub end: u32,
}

impl LineRange {
    #[must_use]
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

/// A binary's build-id, normalized to at least 40 hex characters
///
/// Short ids (e.g. 8-byte ids from some linkers) are padded with trailing
/// zeros so ids from different sources compare equal. Comparison is exact and
/// case-sensitive after padding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildId(String);

impl BuildId {
    /// Width of a SHA-1 build-id in hex characters
    pub const HEX_LEN: usize = 40;

    /// Build from the raw descriptor bytes of an ELF note
    ///
    /// Returns `None` for an empty descriptor.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Some(Self::padded(hex))
    }

    /// Parse a textual id, with or without a `0x` prefix
    ///
    /// Returns `None` for an empty id or one containing non-hex characters.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let hex = text.trim();
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self::padded(hex.to_string()))
    }

    fn padded(mut hex: String) -> Self {
        while hex.len() < Self::HEX_LEN {
            hex.push('0');
        }
        Self(hex)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.0)
    }
}
