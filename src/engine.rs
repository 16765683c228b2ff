//! Dump orchestration.
//!
//! The `ReconstructionEngine` ties the pieces together:
//! 1. Architecture and ABI naming selection for the image.
//! 2. Symbol indexing and discovery of object start addresses.
//! 3. One-time reconstruction of the data regions, shared by every later walk.
//! 4. The vtable and type_info dumps, which collect per-record failures into counters.

use std::cell::OnceCell;

use serde::{Deserialize, Serialize};

use crate::abi::AbiConstants;
use crate::arch::{self, Architecture};
use crate::context::{KnownAddresses, ReadContext};
use crate::error::{DumpError, ReadError};
use crate::image::Image;
use crate::relocation::{ReconstructedBuffer, RelocationResolver, ZeroProbe};
use crate::rtti::{RttiReader, TypeInfo};
use crate::symbol::{ExternalAddressing, SymbolIndex};
use crate::view::DataView;
use crate::vtable::{VTable, VTableReader};

/// Knobs for the two address heuristics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub external_addressing: ExternalAddressing,
    pub zero_probe: ZeroProbe,
}

/// Records of one dump together with how many candidates were tried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dump<T> {
    pub total: usize,
    pub parsed: usize,
    pub records: Vec<T>,
}

impl<T> Dump<T> {
    fn new() -> Self {
        Self {
            total: 0,
            parsed: 0,
            records: Vec::new(),
        }
    }

    fn record(&mut self, address: u64, what: &str, result: Result<T, ReadError>) {
        self.total += 1;
        match result {
            Ok(record) => {
                self.parsed += 1;
                self.records.push(record);
            }
            Err(err) => tracing::warn!("Failed to read {} at {:#x}: {}", what, address, err),
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.parsed as f64 * 100.0 / self.total as f64
    }
}

pub struct ReconstructionEngine<'a> {
    image: &'a dyn Image,
    arch: Box<dyn Architecture>,
    abi: AbiConstants,
    index: SymbolIndex,
    known: KnownAddresses,
    options: EngineOptions,
    /// Indices of the data sections present in the image.
    data_sections: Vec<usize>,
    regions: OnceCell<Vec<ReconstructedBuffer>>,
}

impl<'a> ReconstructionEngine<'a> {
    pub fn new(image: &'a dyn Image, options: EngineOptions) -> Result<Self, DumpError> {
        let arch = arch::for_machine(image.machine())
            .ok_or_else(|| DumpError::UnsupportedArchitecture(format!("{:?}", image.machine())))?;
        tracing::debug!("{:<12}{}", "Arch:", arch.name());

        let abi = AbiConstants::for_format(image.format());
        let data_sections: Vec<usize> = abi
            .data_sections
            .iter()
            .filter_map(|wanted| image.find_section(wanted).map(|(index, _)| index))
            .collect();
        if data_sections.is_empty() {
            let names: Vec<String> = abi.data_sections.iter().map(ToString::to_string).collect();
            return Err(DumpError::MissingDataSection(names.join(", ")));
        }

        let index = SymbolIndex::build(image, options.external_addressing, arch.pointer_size());
        let known = KnownAddresses::collect(image, &abi, &index);

        Ok(Self {
            image,
            arch,
            abi,
            index,
            known,
            options,
            data_sections,
            regions: OnceCell::new(),
        })
    }

    /// Runtime bytes of every data region, built on first use.
    ///
    /// Regions that need reconstruction but cannot get it are left out.
    pub fn regions(&self) -> &[ReconstructedBuffer] {
        self.regions.get_or_init(|| {
            let resolver = RelocationResolver::new(
                self.image,
                self.arch.as_ref(),
                &self.index,
                self.options.zero_probe,
            );
            self.data_sections
                .iter()
                .filter_map(|&section| match resolver.resolve(section) {
                    Ok((buffer, _)) => Some(buffer),
                    Err(err) => {
                        tracing::warn!("{}, its tables are skipped.", err);
                        None
                    }
                })
                .collect()
        })
    }

    pub fn symbols(&self) -> &SymbolIndex {
        &self.index
    }

    pub fn known(&self) -> &KnownAddresses {
        &self.known
    }

    pub fn abi(&self) -> &AbiConstants {
        &self.abi
    }

    fn context(&self) -> ReadContext<'_> {
        let view = DataView::new(self.regions(), self.image, self.arch.endianness());
        ReadContext::new(view, &self.index, &self.abi, &self.known)
    }

    pub fn read_type_info(&self, address: u64) -> Result<TypeInfo, ReadError> {
        let ctx = self.context();
        RttiReader::new(&ctx).read_type_info(address)
    }

    pub fn read_vtable(&self, address: u64) -> Result<VTable, ReadError> {
        let ctx = self.context();
        VTableReader::new(&ctx).read_vtable(address).map(|(table, _)| table)
    }

    /// Reads every discovered type_info, in address order.
    pub fn dump_type_info(&self) -> Result<Dump<TypeInfo>, DumpError> {
        if !self.index.has_any_table() && self.known.bindings.is_empty() {
            return Err(DumpError::MissingSymbolTable);
        }
        let ctx = self.context();
        let reader = RttiReader::new(&ctx);
        let mut dump = Dump::new();
        for &address in &self.known.type_info_starts {
            dump.record(address, "type_info", reader.read_type_info(address));
        }
        Ok(dump)
    }

    /// Reads every vtable, from symbols when there are any and by scanning otherwise.
    pub fn dump_vtables(&self) -> Dump<VTable> {
        let ctx = self.context();
        let reader = VTableReader::new(&ctx);
        let mut dump = Dump::new();

        if !self.known.vtable_starts.is_empty() {
            for &address in &self.known.vtable_starts {
                let result = reader.read_vtable(address).map(|(table, _)| table);
                dump.record(address, "vtable", result);
            }
            return dump;
        }

        if self.index.has_static_table() {
            tracing::info!("No vtable symbols found, scanning data regions instead.");
        } else {
            tracing::info!("Image is stripped, scanning data regions for vtables.");
        }
        for region in ctx.view.regions() {
            for (address, result) in reader.scan(region) {
                dump.record(address, "vtable", result);
            }
        }
        dump
    }
}
