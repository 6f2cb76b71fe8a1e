//! Interning registries for libraries and functions.
//!
//! Both registries are append-only: ids are dense from 0 in first-seen order
//! and are never reused or renumbered. Every function id maps to exactly one
//! library id for its lifetime.
//!
//! Pruning retires functions from the by-id table and drops the by-name map
//! entirely, which freezes the function registry against further interning.

use std::collections::{HashMap, HashSet};

use callscope_common::SymbolEntry;

use crate::domain::{AggregationError, DisassemblyLine, FunctionId, LibId, LineRange, SourceFileId};

/// Library path → library id
#[derive(Debug, Default)]
pub struct LibRegistry {
    ids: HashMap<String, LibId>,
    names: Vec<String>,
}

impl LibRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for `path`, assigning the next id on first sight.
    #[allow(clippy::cast_possible_truncation)]
    pub fn intern(&mut self, path: &str) -> LibId {
        if let Some(&id) = self.ids.get(path) {
            return id;
        }
        let id = LibId(self.names.len() as u32);
        self.ids.insert(path.to_string(), id);
        self.names.push(path.to_string());
        id
    }

    #[must_use]
    pub fn name(&self, id: LibId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Library paths indexed by id
    pub fn iter(&self) -> impl Iterator<Item = (LibId, &str)> {
        self.names.iter().enumerate().map(|(i, name)| (lib_id_at(i), name.as_str()))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn lib_id_at(index: usize) -> LibId {
    LibId(index as u32)
}

/// A function known to the run
#[derive(Debug, Clone)]
pub struct Function {
    pub id: FunctionId,
    pub lib_id: LibId,
    pub name: String,
    /// Start address of the symbol, as first seen
    pub start_addr: u64,
    pub addr_len: u64,
    /// Set by source annotation when both ends resolve to one file
    pub source_file: Option<SourceFileId>,
    pub line_range: Option<LineRange>,
    /// Set by disassembly: `(line, address)`, address 0 for non-code lines
    pub disassembly: Option<Vec<DisassemblyLine>>,
}

/// (library id, symbol name) → function id
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    /// `None` once pruning has frozen the registry
    by_name: Option<HashMap<(LibId, String), FunctionId>>,
    /// Retired slots stay `None` so ids are never reused
    by_id: Vec<Option<Function>>,
}

impl FunctionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { by_name: Some(HashMap::new()), by_id: Vec::new() }
    }

    /// Return the id for `symbol` in `lib_id`, assigning the next id on first sight.
    ///
    /// Start address and length are recorded from the first occurrence.
    ///
    /// # Errors
    /// Returns [`AggregationError::RegistryFrozen`] after [`Self::retain`] has run.
    #[allow(clippy::cast_possible_truncation)]
    pub fn intern(
        &mut self,
        lib_id: LibId,
        symbol: &SymbolEntry,
    ) -> Result<FunctionId, AggregationError> {
        let by_name = self
            .by_name
            .as_mut()
            .ok_or_else(|| AggregationError::RegistryFrozen { name: symbol.symbol_name.clone() })?;

        let key = (lib_id, symbol.symbol_name.clone());
        if let Some(&id) = by_name.get(&key) {
            return Ok(id);
        }

        let id = FunctionId(self.by_id.len() as u32);
        by_name.insert(key, id);
        self.by_id.push(Some(Function {
            id,
            lib_id,
            name: symbol.symbol_name.clone(),
            start_addr: symbol.symbol_addr,
            addr_len: symbol.symbol_len,
            source_file: None,
            line_range: None,
            disassembly: None,
        }));
        Ok(id)
    }

    #[must_use]
    pub fn get(&self, id: FunctionId) -> Option<&Function> {
        self.by_id.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: FunctionId) -> Option<&mut Function> {
        self.by_id.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Look up a function by library and name. Always `None` once frozen.
    #[must_use]
    pub fn lookup(&self, lib_id: LibId, name: &str) -> Option<FunctionId> {
        self.by_name.as_ref()?.get(&(lib_id, name.to_string())).copied()
    }

    /// Retire every function not in `keep`, then freeze the registry.
    ///
    /// Returns the number of functions retired by this call.
    pub fn retain(&mut self, keep: &HashSet<FunctionId>) -> usize {
        let mut retired = 0;
        for slot in &mut self.by_id {
            if slot.as_ref().is_some_and(|f| !keep.contains(&f.id)) {
                *slot = None;
                retired += 1;
            }
        }
        self.by_name = None;
        retired
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.by_name.is_none()
    }

    /// Number of ids ever assigned, including retired ones
    #[must_use]
    pub fn id_count(&self) -> usize {
        self.by_id.len()
    }

    /// Live functions in id order
    pub fn iter(&self) -> impl Iterator<Item = &Function> {
        self.by_id.iter().filter_map(Option::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Function> {
        self.by_id.iter_mut().filter_map(Option::as_mut)
    }
}
