//! Build-id verified local cache of profiled binaries.
//!
//! ## Layout
//!
//! The cache mirrors the device's absolute paths below its root:
//!
//! ```text
//! /system/lib64/libc.so  →  <root>/system/lib64/libc.so
//! kernel symbol table     →  <root>/kallsyms
//! ```
//!
//! ## Lookup Order
//!
//! For each requested binary:
//!
//! 1. Placeholder paths (`//anon`, `[kernel.kallsyms]`, ...) are skipped.
//! 2. An existing cache entry is reused if no build-id is expected or its
//!    build-id matches the expected one.
//! 3. A symfs file with the same base name and the expected build-id is
//!    copied in, even if its directory differs from the recorded path.
//! 4. Otherwise the [`BinaryProvider`] is asked for a fresh copy, which
//!    overwrites the stale entry.
//!
//! A binary that cannot be located is logged and left out; its addresses
//! simply stay unresolved.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use callscope_common::is_placeholder_dso;
use log::{debug, info, warn};

use super::elf::read_build_id;
use crate::domain::{BuildId, CacheError};

/// Device path → local cached copy
pub type BinaryLocations = HashMap<String, PathBuf>;

/// One binary referenced by the recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRequest {
    /// Path on the profiled device
    pub path: String,
    /// Build-id recorded for the binary, if any
    pub build_id: Option<BuildId>,
}

/// Source of fresh binary copies (a device, a symbol directory, ...)
pub trait BinaryProvider {
    /// Copy the binary recorded at `device_path` to `dest`.
    ///
    /// Returns `Ok(false)` if the provider has no such binary.
    ///
    /// # Errors
    /// Returns an error if a copy was found but could not be written.
    fn fetch(&self, device_path: &str, dest: &Path) -> Result<bool, CacheError>;
}

/// Fetches binaries from host directories
///
/// Each symfs directory is tried as a root for the device path, then the
/// device path itself is tried on the host.
#[derive(Debug, Clone, Default)]
pub struct HostFileProvider {
    symfs_dirs: Vec<PathBuf>,
}

impl HostFileProvider {
    #[must_use]
    pub fn new(symfs_dirs: Vec<PathBuf>) -> Self {
        Self { symfs_dirs }
    }
}

impl BinaryProvider for HostFileProvider {
    fn fetch(&self, device_path: &str, dest: &Path) -> Result<bool, CacheError> {
        let relative = relative_device_path(device_path);
        let candidates = self
            .symfs_dirs
            .iter()
            .map(|dir| dir.join(&relative))
            .chain(std::iter::once(PathBuf::from(device_path)));

        for candidate in candidates {
            if candidate.is_file() {
                copy_file(&candidate, dest)?;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Files below the symfs directories, indexed by base name
#[derive(Debug, Default)]
pub struct SymfsIndex {
    by_name: HashMap<String, Vec<PathBuf>>,
}

impl SymfsIndex {
    /// Walk every directory in `dirs`. Unreadable entries are skipped.
    #[must_use]
    pub fn build(dirs: &[PathBuf]) -> Self {
        let mut by_name: HashMap<String, Vec<PathBuf>> = HashMap::new();
        let mut stack: Vec<PathBuf> = dirs.to_vec();
        while let Some(dir) = stack.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("Skipping {}: {e}", dir.display());
                    continue;
                }
            };
            for entry in entries.flatten() {
                let Ok(file_type) = entry.file_type() else { continue };
                let path = entry.path();
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file() {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    by_name.entry(name).or_default().push(path);
                }
            }
        }
        Self { by_name }
    }

    /// Files named `file_name`, in walk order
    #[must_use]
    pub fn candidates(&self, file_name: &str) -> &[PathBuf] {
        self.by_name.get(file_name).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// First file named like `device_path` whose build-id equals `expected`
    #[must_use]
    pub fn find_matching(&self, device_path: &str, expected: &BuildId) -> Option<&Path> {
        let file_name = Path::new(device_path).file_name()?.to_str()?;
        self.candidates(file_name)
            .iter()
            .find(|candidate| read_build_id(candidate).as_ref() == Some(expected))
            .map(PathBuf::as_path)
    }
}

/// Local binary cache rooted at one directory
#[derive(Debug, Clone)]
pub struct BinaryCache {
    root: PathBuf,
}

impl BinaryCache {
    /// Open (creating if needed) the cache at `root`.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cache location for `device_path`; `None` for placeholder paths.
    #[must_use]
    pub fn cache_path(&self, device_path: &str) -> Option<PathBuf> {
        if is_placeholder_dso(device_path) {
            return None;
        }
        let relative = relative_device_path(device_path);
        if relative.as_os_str().is_empty() {
            return None;
        }
        Some(self.root.join(relative))
    }

    /// Where an installed kernel symbol table lives
    #[must_use]
    pub fn kallsyms_path(&self) -> PathBuf {
        self.root.join("kallsyms")
    }

    /// Copy a host kernel symbol table into the cache, replacing any
    /// previous copy.
    ///
    /// # Errors
    /// Returns an error if the copy fails.
    pub fn install_kallsyms(&self, source: &Path) -> Result<PathBuf, CacheError> {
        let dest = self.kallsyms_path();
        copy_file(source, &dest)?;
        info!("Installed kernel symbols from {}", source.display());
        Ok(dest)
    }

    /// Locate or fetch a verified local copy of `device_path`.
    ///
    /// Returns `Ok(None)` for placeholder paths and binaries nobody can
    /// provide.
    ///
    /// # Errors
    /// Returns an error if a found copy cannot be written into the cache.
    pub fn resolve(
        &self,
        device_path: &str,
        expected: Option<&BuildId>,
        symfs: &SymfsIndex,
        provider: &dyn BinaryProvider,
    ) -> Result<Option<PathBuf>, CacheError> {
        let Some(target) = self.cache_path(device_path) else {
            return Ok(None);
        };

        if target.is_file() {
            match expected {
                None => return Ok(Some(target)),
                Some(id) if read_build_id(&target).as_ref() == Some(id) => {
                    debug!("Cache hit for {device_path}");
                    return Ok(Some(target));
                }
                Some(id) => {
                    debug!("Removing stale cache entry for {device_path}, expected {id}");
                    fs::remove_file(&target)?;
                }
            }
        }

        if let Some(id) = expected {
            if let Some(found) = symfs.find_matching(device_path, id) {
                debug!("Using {} for {device_path}", found.display());
                copy_file(found, &target)?;
                return Ok(Some(target));
            }
        }

        if provider.fetch(device_path, &target)? {
            if let Some(id) = expected {
                if read_build_id(&target).as_ref() != Some(id) {
                    warn!("Fetched {device_path} does not have build-id {id}");
                }
            }
            return Ok(Some(target));
        }

        warn!("Can't find binary {device_path}");
        Ok(None)
    }

    /// Resolve every request, skipping the ones that fail.
    pub fn build(
        &self,
        requests: &[BinaryRequest],
        symfs: &SymfsIndex,
        provider: &dyn BinaryProvider,
    ) -> BinaryLocations {
        let mut locations = BinaryLocations::new();
        for request in requests {
            match self.resolve(&request.path, request.build_id.as_ref(), symfs, provider) {
                Ok(Some(path)) => {
                    locations.insert(request.path.clone(), path);
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to cache {}: {e}", request.path),
            }
        }
        info!("Binary cache has {} of {} binaries", locations.len(), requests.len());
        locations
    }
}

/// Device path without its root, keeping only normal components
fn relative_device_path(device_path: &str) -> PathBuf {
    Path::new(device_path)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

fn copy_file(from: &Path, to: &Path) -> Result<(), CacheError> {
    let copy_failed =
        |source| CacheError::CopyFailed { from: from.to_path_buf(), to: to.to_path_buf(), source };
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(copy_failed)?;
    }
    fs::copy(from, to).map_err(copy_failed)?;
    Ok(())
}
