//! Image capability surface.
//!
//! The reconstruction core never touches a container parser directly. It consumes the
//! [`Image`] trait: sections with their file bytes, the static and dynamic symbol tables,
//! dynamic relocations and, for Mach-O, external bindings. [`ObjectImage`] implements it on
//! top of the `object` crate and [`MemoryImage`] builds one from plain values.

use object::SymbolKind;

mod binary;
mod memory;

pub use binary::ObjectImage;
pub use memory::MemoryImage;

/// Container flavour, which selects the ABI naming constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Elf,
    MachO,
}

/// A section as loaded at its virtual address.
#[derive(Debug, Clone)]
pub struct SectionInfo {
    pub name: String,
    /// Owning segment, only known for Mach-O (`__TEXT`, `__DATA_CONST`, ...).
    pub segment: Option<String>,
    pub address: u64,
    pub size: u64,
    pub executable: bool,
}

impl SectionInfo {
    pub fn contains(&self, address: u64) -> bool {
        address >= self.address && address - self.address < self.size
    }

    pub fn end(&self) -> u64 {
        self.address.saturating_add(self.size)
    }
}

/// One entry of a symbol table, as stored in the file.
#[derive(Debug, Clone)]
pub struct RawSymbol {
    /// Raw index in its table. Dynamic relocations refer to symbols by this index.
    pub index: usize,
    pub name: String,
    /// Load value. Zero for symbols bound by the dynamic linker.
    pub address: u64,
    pub size: u64,
    pub kind: SymbolKind,
    pub defined: bool,
}

/// A dynamic relocation entry, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationEntry {
    /// Virtual address patched by the loader.
    pub offset: u64,
    /// Referenced dynamic symbol index, `None` for symbol-less entries such as RELATIVE.
    pub symbol: Option<usize>,
    pub r_type: u32,
    pub addend: i64,
}

/// A pointer slot the dynamic loader binds to an external symbol (Mach-O bind opcodes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalBinding {
    pub address: u64,
    pub symbol: String,
}

/// Names a section, optionally qualified by its segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionRef {
    pub segment: Option<&'static str>,
    pub name: &'static str,
}

impl SectionRef {
    pub const fn named(name: &'static str) -> Self {
        Self { segment: None, name }
    }

    pub const fn in_segment(segment: &'static str, name: &'static str) -> Self {
        Self {
            segment: Some(segment),
            name,
        }
    }

    pub fn matches(&self, section: &SectionInfo) -> bool {
        section.name == self.name
            && self
                .segment
                .map_or(true, |seg| section.segment.as_deref() == Some(seg))
    }
}

impl std::fmt::Display for SectionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.segment {
            Some(segment) => write!(f, "{},{}", segment, self.name),
            None => f.write_str(self.name),
        }
    }
}

/// Read-only addressable view of a loaded binary.
pub trait Image {
    fn format(&self) -> ImageFormat;

    fn machine(&self) -> object::Architecture;

    fn sections(&self) -> &[SectionInfo];

    /// File bytes of the section at `index` in [`Image::sections`].
    fn section_data(&self, index: usize) -> Option<&[u8]>;

    /// The static symbol table, `None` when the image is stripped.
    fn symbol_table(&self) -> Option<&[RawSymbol]>;

    fn dynamic_symbol_table(&self) -> Option<&[RawSymbol]>;

    /// Dynamic relocations, `None` when the image has no relocation table.
    fn dynamic_relocations(&self) -> Option<&[RelocationEntry]>;

    fn external_bindings(&self) -> &[ExternalBinding];

    fn find_section(&self, wanted: &SectionRef) -> Option<(usize, &SectionInfo)> {
        self.sections()
            .iter()
            .enumerate()
            .find(|(_, section)| wanted.matches(section))
    }

    /// Highest end address over all sections.
    fn end_of_sections(&self) -> u64 {
        self.sections().iter().map(SectionInfo::end).max().unwrap_or(0)
    }

    /// File bytes from `address` to the end of the section holding it.
    fn bytes_at(&self, address: u64) -> Option<&[u8]> {
        self.sections()
            .iter()
            .enumerate()
            .filter(|(_, section)| section.contains(address))
            .find_map(|(index, section)| {
                let data = self.section_data(index)?;
                let offset = usize::try_from(address - section.address).ok()?;
                data.get(offset..).filter(|rest| !rest.is_empty())
            })
    }
}
