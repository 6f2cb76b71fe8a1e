//! Top-level orchestration of one report run.
//!
//! ```text
//! load()            SampleSource ──► EventAggregator, subtree totals
//! prune()           GraphPruner
//! add_source_code() BinaryCache ──► AddressResolver ──► annotate ──► load source text
//! add_disassembly() BinaryCache ──► Disassembler per function
//! record_info()     RecordInfo for export
//! ```
//!
//! The pipeline owns every registry, cache and configuration value of the
//! run; nothing is process-wide. The binary cache is populated once and
//! shared by both annotation stages.

use anyhow::{Context, Result};
use callscope_common::is_placeholder_dso;
use log::info;

use crate::aggregation::{EventAggregator, GraphPruner, PruneStats};
use crate::analysis::{
    analyze_hotspots, annotate, disassemble_functions, request_addresses, AnnotationStats,
    DisassemblyStats, EventHotspots,
};
use crate::config::ReportConfig;
use crate::export::RecordInfo;
use crate::input::{RecordMeta, SampleSource};
use crate::symbolization::{
    AddressResolver, BinaryCache, BinaryLocations, BinaryRequest, Disassembler, HostFileProvider,
    SourceFileLoader, SourceFileRegistry, SymfsIndex,
};

pub struct ReportPipeline {
    config: ReportConfig,
    aggregator: EventAggregator,
    meta: RecordMeta,
    binaries: Vec<BinaryRequest>,
    locations: Option<BinaryLocations>,
    files: Option<SourceFileRegistry>,
    disassembled: bool,
}

impl ReportPipeline {
    #[must_use]
    pub fn new(config: ReportConfig) -> Self {
        let aggregator = EventAggregator::new(config.needs_binaries());
        Self {
            config,
            aggregator,
            meta: RecordMeta::default(),
            binaries: Vec::new(),
            locations: None,
            files: None,
            disassembled: false,
        }
    }

    /// Read every sample from `source` and compute subtree totals.
    ///
    /// Returns the number of samples read.
    ///
    /// # Errors
    /// Any undecodable record aborts the run.
    pub fn load(&mut self, source: &mut dyn SampleSource) -> Result<u64> {
        for dir in &self.config.symfs_dirs {
            source.set_symfs(dir);
        }
        if let Some(kallsyms) = &self.config.kallsyms_path {
            source.set_kallsyms(kallsyms);
        }

        let mut count = 0u64;
        while let Some(sample) = source.next_sample().context("Failed to read samples")? {
            self.aggregator.ingest(&sample)?;
            count += 1;
        }
        self.meta = source.record_meta().clone();

        self.binaries = self
            .aggregator
            .libs()
            .iter()
            .filter(|(_, path)| !is_placeholder_dso(path))
            .map(|(_, path)| BinaryRequest {
                path: path.to_string(),
                build_id: source.build_id_for_path(path),
            })
            .collect();

        self.aggregator.compute_subtree_totals();
        info!(
            "Loaded {count} samples: {} events, {} libraries, {} functions",
            self.aggregator.events().len(),
            self.aggregator.libs().len(),
            self.aggregator.functions().id_count()
        );
        Ok(count)
    }

    pub fn prune(&mut self) -> PruneStats {
        GraphPruner::new(self.config.min_func_percent, self.config.min_callchain_percent)
            .prune(&mut self.aggregator)
    }

    /// Resolve sampled addresses to source lines and load the source text.
    ///
    /// Missing binaries, missing debug info and tool failures only reduce
    /// what gets annotated.
    ///
    /// # Errors
    /// Returns an error if the binary cache cannot be created or the kernel
    /// symbol table cannot be installed.
    pub fn add_source_code(&mut self) -> Result<AnnotationStats> {
        let locations = self.binary_locations()?;

        let mut resolver = AddressResolver::new(&self.config.resolver, locations);
        request_addresses(&self.aggregator, &mut resolver);

        let mut files = SourceFileRegistry::new();
        resolver.resolve_all(&mut files);
        let stats = annotate(&mut self.aggregator, &resolver, &mut files);
        SourceFileLoader::new(&self.config.source_dirs).load(&mut files);

        self.files = Some(files);
        Ok(stats)
    }

    /// Disassemble every kept function and export its address hits.
    ///
    /// Functions whose binary is missing or whose disassembly fails are left
    /// without code.
    ///
    /// # Errors
    /// Returns an error if the binary cache cannot be created or the kernel
    /// symbol table cannot be installed.
    pub fn add_disassembly(&mut self) -> Result<DisassemblyStats> {
        let locations = self.binary_locations()?;
        let disassembler =
            Disassembler::new(&self.config.objdump_path, self.config.resolver.tool_timeout);
        let stats = disassemble_functions(
            &mut self.aggregator,
            &locations,
            &disassembler,
            self.config.resolver.jobs,
        );
        self.disassembled = true;
        Ok(stats)
    }

    /// Local copies of the recorded binaries, populated on first use
    fn binary_locations(&mut self) -> Result<BinaryLocations> {
        if let Some(locations) = &self.locations {
            return Ok(locations.clone());
        }

        let cache = BinaryCache::new(&self.config.binary_cache_dir).with_context(|| {
            format!("Failed to create binary cache {}", self.config.binary_cache_dir.display())
        })?;
        if let Some(kallsyms) = &self.config.kallsyms_path {
            cache
                .install_kallsyms(kallsyms)
                .with_context(|| format!("Failed to install {}", kallsyms.display()))?;
        }

        let symfs = SymfsIndex::build(&self.config.symfs_dirs);
        let provider = HostFileProvider::new(self.config.symfs_dirs.clone());
        let locations = cache.build(&self.binaries, &symfs, &provider);
        self.locations = Some(locations.clone());
        Ok(locations)
    }

    /// Address hits are only exported alongside disassembly.
    #[must_use]
    pub fn record_info(&self) -> RecordInfo {
        RecordInfo::build(&self.aggregator, &self.meta, self.files.as_ref(), self.disassembled)
    }

    #[must_use]
    pub fn hotspots(&self) -> Vec<EventHotspots> {
        analyze_hotspots(&self.aggregator, self.files.as_ref())
    }

    #[must_use]
    pub fn aggregator(&self) -> &EventAggregator {
        &self.aggregator
    }

    #[must_use]
    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    #[must_use]
    pub fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    /// Binaries referenced by the recording, placeholders excluded
    #[must_use]
    pub fn binary_requests(&self) -> &[BinaryRequest] {
        &self.binaries
    }

    #[must_use]
    pub fn source_files(&self) -> Option<&SourceFileRegistry> {
        self.files.as_ref()
    }
}
