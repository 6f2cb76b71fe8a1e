//! ELF inspection: build-id, machine type and line-table presence.
//!
//! Only the section header table is consulted. The build-id is read from the
//! GNU build-id note found in any `SHT_NOTE` section.

use std::fs;
use std::path::Path;

use object::{Architecture, Object};

use crate::domain::{BuildId, ElfError};

/// What the resolver needs to know about a binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfInfo {
    pub architecture: Architecture,
    /// True if the binary carries a `.debug_line` section
    pub has_debug_line: bool,
    pub build_id: Option<BuildId>,
}

impl ElfInfo {
    /// Minimum instruction alignment, used as the resolver's retry stride
    #[must_use]
    pub fn addr_step(&self) -> u64 {
        addr_step(self.architecture)
    }
}

/// Read and parse `path`.
///
/// # Errors
/// Returns an error if the file cannot be read or is not an ELF file.
pub fn inspect(path: &Path) -> Result<ElfInfo, ElfError> {
    let data =
        fs::read(path).map_err(|source| ElfError::Read { path: path.to_path_buf(), source })?;
    let parse_err = |source| ElfError::Parse { path: path.to_path_buf(), source };
    let file = object::File::parse(&*data).map_err(parse_err)?;

    let build_id = file.build_id().map_err(parse_err)?.and_then(BuildId::from_bytes);
    Ok(ElfInfo {
        architecture: file.architecture(),
        has_debug_line: file.section_by_name(".debug_line").is_some(),
        build_id,
    })
}

/// Build-id of the ELF file at `path`, or `None` if it has none or cannot be
/// parsed.
#[must_use]
pub fn read_build_id(path: &Path) -> Option<BuildId> {
    match inspect(path) {
        Ok(info) => info.build_id,
        Err(e) => {
            log::debug!("No build-id for {}: {e}", path.display());
            None
        }
    }
}

/// Minimum instruction alignment of `arch`: 4 for 64-bit ARM, 2 for 32-bit
/// ARM (Thumb), 1 for everything else.
#[must_use]
pub fn addr_step(arch: Architecture) -> u64 {
    match arch {
        Architecture::Aarch64 => 4,
        Architecture::Arm => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addr_step_per_architecture() {
        assert_eq!(addr_step(Architecture::Aarch64), 4);
        assert_eq!(addr_step(Architecture::Arm), 2);
        assert_eq!(addr_step(Architecture::X86_64), 1);
        assert_eq!(addr_step(Architecture::I386), 1);
    }

    #[test]
    fn test_non_elf_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-elf");
        fs::write(&path, b"#!/bin/sh\necho hi\n").unwrap();

        assert!(matches!(inspect(&path), Err(ElfError::Parse { .. })));
        assert_eq!(read_build_id(&path), None);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = inspect(Path::new("/nonexistent/libfoo.so")).unwrap_err();
        assert!(matches!(err, ElfError::Read { .. }));
    }
}
