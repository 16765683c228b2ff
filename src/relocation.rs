//! Relocation replay.
//!
//! A position-independent binary ships its `.data.rel.ro` as zero-filled placeholders that
//! the dynamic linker patches at load time. This module applies the relevant dynamic
//! relocations to a private copy of such a region to regenerate the bytes a loaded image
//! would hold.
//!
//! References:
//! <https://github.com/ARM-software/abi-aa/releases/download/2023Q1/aaelf64.pdf>
//! <https://refspecs.linuxfoundation.org/elf/elf.pdf>

use object::{Endian, Endianness};

use crate::arch::{Architecture, RelocationClass};
use crate::error::ResolveError;
use crate::image::{Image, RelocationEntry, SectionInfo};
use crate::symbol::SymbolIndex;
use crate::utils::is_zero_window;

/// Heuristic deciding whether a region still awaits relocation.
///
/// A loaded region starts with valid type_info or vtable pointers, so an all-zero prefix
/// means the on-disk bytes are placeholders. The width of the window is not derived from
/// anything and is kept as found. Regions with absolute relocations against imports are
/// rebuilt regardless, see [`RelocationResolver::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroProbe {
    pub window: usize,
}

impl ZeroProbe {
    pub const DEFAULT_WINDOW: usize = 0xF;

    pub fn needs_reconstruction(&self, data: &[u8]) -> bool {
        is_zero_window(data, self.window)
    }
}

impl Default for ZeroProbe {
    fn default() -> Self {
        Self {
            window: Self::DEFAULT_WINDOW,
        }
    }
}

/// Private copy of one data region with the virtual address it is loaded at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconstructedBuffer {
    name: String,
    base: u64,
    bytes: Vec<u8>,
    endianness: Endianness,
    reconstructed: bool,
}

impl ReconstructedBuffer {
    pub fn new(name: &str, base: u64, bytes: Vec<u8>, endianness: Endianness) -> Self {
        Self {
            name: name.to_string(),
            base,
            bytes,
            endianness,
            reconstructed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.bytes.len() as u64)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether relocations were replayed, as opposed to a verbatim copy.
    pub fn is_reconstructed(&self) -> bool {
        self.reconstructed
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end()
    }

    fn slice(&self, address: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(address.checked_sub(self.base)?).ok()?;
        self.bytes.get(start..start.checked_add(len)?)
    }

    pub fn read_u64(&self, address: u64) -> Option<u64> {
        let bytes = self.slice(address, 8)?.try_into().ok()?;
        Some(self.endianness.read_u64_bytes(bytes))
    }

    pub fn read_u32(&self, address: u64) -> Option<u32> {
        let bytes = self.slice(address, 4)?.try_into().ok()?;
        Some(self.endianness.read_u32_bytes(bytes))
    }
}

/// Counters of one resolution pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolveStats {
    pub internal: usize,
    /// Absolute relocations against externals, written with a synthetic address.
    pub external: usize,
    pub relative: usize,
    pub skipped: usize,
}

pub struct RelocationResolver<'a> {
    image: &'a dyn Image,
    arch: &'a dyn Architecture,
    index: &'a SymbolIndex,
    probe: ZeroProbe,
}

impl<'a> RelocationResolver<'a> {
    pub fn new(
        image: &'a dyn Image,
        arch: &'a dyn Architecture,
        index: &'a SymbolIndex,
        probe: ZeroProbe,
    ) -> Self {
        Self {
            image,
            arch,
            index,
            probe,
        }
    }

    /// Produces the runtime bytes of the section at `section_index`.
    ///
    /// The region is rebuilt when its prefix is still zero, or when imports are bound into it.
    /// The on-disk bytes of an import slot never hold the target, even in images whose
    /// internal pointers are already in place (non-PIE executables, hidden-visibility
    /// libraries).
    pub fn resolve(
        &self,
        section_index: usize,
    ) -> Result<(ReconstructedBuffer, ResolveStats), ResolveError> {
        let section = &self.image.sections()[section_index];
        let data = self.image.section_data(section_index).unwrap_or(&[]);
        let mut buffer = ReconstructedBuffer::new(
            &section.name,
            section.address,
            data.to_vec(),
            self.arch.endianness(),
        );

        let binds_imports = self
            .image
            .dynamic_relocations()
            .unwrap_or_default()
            .iter()
            .any(|reloc| section.contains(reloc.offset) && self.is_import(reloc));
        if !self.probe.needs_reconstruction(&buffer.bytes) && !binds_imports {
            tracing::debug!("Region '{}' is already relocated.", section.name);
            return Ok((buffer, ResolveStats::default()));
        }

        tracing::info!("Target image needs to rebuild '{}', please wait...", section.name);
        let relocations = self
            .image
            .dynamic_relocations()
            .ok_or_else(|| ResolveError::RelocationTableMissing {
                region: section.name.clone(),
            })?;

        let mut stats = ResolveStats::default();
        for reloc in relocations.iter().filter(|reloc| section.contains(reloc.offset)) {
            let Some(value) = self.relocated_value(reloc, &mut stats) else {
                stats.skipped += 1;
                continue;
            };
            let offset = (reloc.offset - section.address) as usize;
            if let Err(err) = self.arch.write_pointer(&mut buffer.bytes, offset, value) {
                tracing::warn!("{} in '{}'.", err, section.name);
                stats.skipped += 1;
            }
        }
        buffer.reconstructed = true;

        log_stats(section, &stats);
        Ok((buffer, stats))
    }

    /// An absolute relocation against a symbol the image does not define.
    fn is_import(&self, reloc: &RelocationEntry) -> bool {
        if self.arch.classify_relocation(reloc.r_type) != RelocationClass::Absolute {
            return false;
        }
        let Some(index) = reloc.symbol.filter(|&index| index != 0) else {
            return false;
        };
        self.index
            .dynamic_symbol(index)
            .map_or(true, |sym| sym.value == 0)
    }

    fn relocated_value(&self, reloc: &RelocationEntry, stats: &mut ResolveStats) -> Option<u64> {
        let RelocationEntry {
            r_type,
            symbol,
            addend,
            ..
        } = *reloc;
        let symbol = symbol.filter(|&index| index != 0);
        match self.arch.classify_relocation(r_type) {
            RelocationClass::Absolute => {
                let Some(index) = symbol else {
                    tracing::error!("Get dynamic symbol failed!");
                    return None;
                };
                match self.index.dynamic_symbol(index) {
                    Some(sym) if sym.value != 0 => {
                        stats.internal += 1;
                        Some(sym.value.wrapping_add_signed(addend))
                    }
                    _ => {
                        // Deviations may occur, the slot is only a stand-in for the real import.
                        stats.external += 1;
                        Some(self.index.synthetic_address(index).wrapping_add_signed(addend))
                    }
                }
            }
            RelocationClass::Relative => {
                if symbol.is_some() {
                    tracing::warn!("Unhandled type of RELATIVE detected.");
                    return None;
                }
                if addend == 0 {
                    tracing::warn!("Unknown type of ADDEND detected.");
                }
                stats.relative += 1;
                Some(addend as u64)
            }
            RelocationClass::Other => {
                tracing::warn!("Unhandled relocation type: {:#x}.", r_type);
                None
            }
        }
    }
}

fn log_stats(section: &SectionInfo, stats: &ResolveStats) {
    tracing::info!(
        "Rebuilt '{}': {} internal, {} external, {} relative, {} skipped.",
        section.name,
        stats.internal,
        stats.external,
        stats.relative,
        stats.skipped
    );
}
