//! In-memory image.
//!
//! Builds an [`Image`] from plain values. Useful when the caller already holds the bytes of
//! a binary's sections, and it is what the test-suite lays out its fixtures with.

use object::SymbolKind;

use super::{ExternalBinding, Image, ImageFormat, RawSymbol, RelocationEntry, SectionInfo};

pub struct MemoryImage {
    format: ImageFormat,
    machine: object::Architecture,
    sections: Vec<SectionInfo>,
    data: Vec<Vec<u8>>,
    symbols: Option<Vec<RawSymbol>>,
    dynamic_symbols: Option<Vec<RawSymbol>>,
    relocations: Option<Vec<RelocationEntry>>,
    bindings: Vec<ExternalBinding>,
}

impl MemoryImage {
    pub fn new(format: ImageFormat, machine: object::Architecture) -> Self {
        Self {
            format,
            machine,
            sections: Vec::new(),
            data: Vec::new(),
            symbols: None,
            dynamic_symbols: None,
            relocations: None,
            bindings: Vec::new(),
        }
    }

    /// Adds a section whose size is the length of `data`.
    pub fn section(self, name: &str, address: u64, data: Vec<u8>) -> Self {
        self.add_section(name, None, address, data, false)
    }

    /// Adds an executable section of `size` zero bytes.
    pub fn code_section(self, name: &str, address: u64, size: u64) -> Self {
        self.add_section(name, None, address, vec![0; size as usize], true)
    }

    /// Adds a section owned by a Mach-O segment.
    pub fn segment_section(
        self,
        segment: &str,
        name: &str,
        address: u64,
        data: Vec<u8>,
        executable: bool,
    ) -> Self {
        self.add_section(name, Some(segment), address, data, executable)
    }

    fn add_section(
        mut self,
        name: &str,
        segment: Option<&str>,
        address: u64,
        data: Vec<u8>,
        executable: bool,
    ) -> Self {
        self.sections.push(SectionInfo {
            name: name.to_string(),
            segment: segment.map(str::to_string),
            address,
            size: data.len() as u64,
            executable,
        });
        self.data.push(data);
        self
    }

    /// Adds a defined static symbol. Indices follow insertion order, starting at 1.
    pub fn symbol(mut self, name: &str, address: u64, kind: SymbolKind) -> Self {
        let table = self.symbols.get_or_insert_with(Vec::new);
        let index = table.len() + 1;
        table.push(RawSymbol {
            index,
            name: name.to_string(),
            address,
            size: 0,
            kind,
            defined: true,
        });
        self
    }

    /// Adds a dynamic symbol and returns the image. Its index is its 1-based insertion order,
    /// index 0 being the reserved null symbol. An `address` of zero makes it undefined.
    pub fn dynamic_symbol(mut self, name: &str, address: u64, kind: SymbolKind) -> Self {
        let table = self.dynamic_symbols.get_or_insert_with(Vec::new);
        let index = table.len() + 1;
        table.push(RawSymbol {
            index,
            name: name.to_string(),
            address,
            size: 0,
            kind,
            defined: address != 0,
        });
        self
    }

    pub fn relocation(
        mut self,
        offset: u64,
        symbol: Option<usize>,
        r_type: u32,
        addend: i64,
    ) -> Self {
        self.relocations.get_or_insert_with(Vec::new).push(RelocationEntry {
            offset,
            symbol,
            r_type,
            addend,
        });
        self
    }

    /// Declares an empty relocation table.
    pub fn relocation_table(mut self) -> Self {
        self.relocations.get_or_insert_with(Vec::new);
        self
    }

    pub fn binding(mut self, address: u64, symbol: &str) -> Self {
        self.bindings.push(ExternalBinding {
            address,
            symbol: symbol.to_string(),
        });
        self
    }
}

impl Image for MemoryImage {
    fn format(&self) -> ImageFormat {
        self.format
    }

    fn machine(&self) -> object::Architecture {
        self.machine
    }

    fn sections(&self) -> &[SectionInfo] {
        &self.sections
    }

    fn section_data(&self, index: usize) -> Option<&[u8]> {
        self.data.get(index).map(Vec::as_slice)
    }

    fn symbol_table(&self) -> Option<&[RawSymbol]> {
        self.symbols.as_deref()
    }

    fn dynamic_symbol_table(&self) -> Option<&[RawSymbol]> {
        self.dynamic_symbols.as_deref()
    }

    fn dynamic_relocations(&self) -> Option<&[RelocationEntry]> {
        self.relocations.as_deref()
    }

    fn external_bindings(&self) -> &[ExternalBinding] {
        &self.bindings
    }
}
