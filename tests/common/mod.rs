//! In-memory x86_64 ELF fixture.
//!
//! `.data.rel.ro` starts out zero-filled, its contents come from dynamic relocations the way
//! a position-independent build ships it. The class hierarchy is
//!
//! ```text
//! 0x3000 _ZTI4Base      __class_type_info
//! 0x3010 _ZTI7Derived   __si_class_type_info  : Base
//! 0x3028 _ZTI5Multi     __vmi_class_type_info : Base (+0), Derived (+8)
//! 0x3060 _ZTV4Base      foo, pure virtual
//! 0x3080 _ZTV7Derived   foo
//! 0x3098 _ZTV5Multi     foo | -8: thunk
//! ```

#![allow(dead_code)]

pub mod elf;

use itanium_dump::image::{ImageFormat, MemoryImage};
use object::elf::{R_X86_64_64, R_X86_64_RELATIVE};
use object::SymbolKind;

pub const TEXT: u64 = 0x1000;
pub const RODATA: u64 = 0x2000;
pub const RELRO: u64 = 0x3000;
pub const RELRO_SIZE: u64 = 0x100;
/// End of all sections, where synthetic external addresses start.
pub const EOS: u64 = RELRO + RELRO_SIZE;

pub const CLASS_TYPE_INFO: usize = 1;
pub const SI_CLASS_TYPE_INFO: usize = 2;
pub const VMI_CLASS_TYPE_INFO: usize = 3;
pub const PURE_VIRTUAL: usize = 4;

pub const BASE_TI: u64 = 0x3000;
pub const DERIVED_TI: u64 = 0x3010;
pub const MULTI_TI: u64 = 0x3028;
pub const BASE_VT: u64 = 0x3060;
pub const DERIVED_VT: u64 = 0x3080;
pub const MULTI_VT: u64 = 0x3098;
/// First word after the last vtable.
pub const FREE: u64 = 0x30c8;

pub const BASE_FOO: u64 = 0x1010;
pub const DERIVED_FOO: u64 = 0x1020;
pub const MULTI_FOO: u64 = 0x1030;
pub const MULTI_THUNK: u64 = 0x1038;

pub struct Layout {
    rodata: Vec<u8>,
    relro: Vec<u8>,
    relocations: Vec<(u64, Option<usize>, u32, i64)>,
    symbols: Vec<(String, u64, SymbolKind)>,
    exports: Vec<(String, u64, SymbolKind)>,
    stripped: bool,
}

impl Layout {
    pub fn empty() -> Self {
        Self {
            rodata: Vec::new(),
            relro: vec![0; RELRO_SIZE as usize],
            relocations: Vec::new(),
            symbols: Vec::new(),
            exports: Vec::new(),
            stripped: false,
        }
    }

    pub fn string(&mut self, value: &str) -> u64 {
        let address = RODATA + self.rodata.len() as u64;
        self.rodata.extend_from_slice(value.as_bytes());
        self.rodata.push(0);
        address
    }

    /// Bytes already present on disk.
    pub fn raw(&mut self, at: u64, value: u64) -> &mut Self {
        let offset = (at - RELRO) as usize;
        self.relro[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        self
    }

    pub fn raw_word(&mut self, at: u64, value: u32) -> &mut Self {
        let offset = (at - RELRO) as usize;
        self.relro[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        self
    }

    pub fn relative(&mut self, at: u64, target: u64) -> &mut Self {
        self.relocations.push((at, None, R_X86_64_RELATIVE, target as i64));
        self
    }

    pub fn absolute(&mut self, at: u64, symbol: usize, addend: i64) -> &mut Self {
        self.relocations.push((at, Some(symbol), R_X86_64_64, addend));
        self
    }

    pub fn symbol(&mut self, name: &str, address: u64, kind: SymbolKind) -> &mut Self {
        self.symbols.push((name.to_string(), address, kind));
        self
    }

    /// A defined dynamic symbol, numbered after [`PURE_VIRTUAL`]. Survives [`Layout::strip`].
    pub fn export(&mut self, name: &str, address: u64, kind: SymbolKind) -> &mut Self {
        self.exports.push((name.to_string(), address, kind));
        self
    }

    /// Drops the static symbol table.
    pub fn strip(&mut self) -> &mut Self {
        self.stripped = true;
        self
    }

    pub fn image(&self) -> MemoryImage {
        let mut image = MemoryImage::new(ImageFormat::Elf, object::Architecture::X86_64)
            .code_section(".text", TEXT, 0x100)
            .section(".rodata", RODATA, self.rodata.clone())
            .section(".data.rel.ro", RELRO, self.relro.clone())
            .dynamic_symbol("_ZTVN10__cxxabiv117__class_type_infoE", 0, SymbolKind::Data)
            .dynamic_symbol("_ZTVN10__cxxabiv120__si_class_type_infoE", 0, SymbolKind::Data)
            .dynamic_symbol("_ZTVN10__cxxabiv121__vmi_class_type_infoE", 0, SymbolKind::Data)
            .dynamic_symbol("__cxa_pure_virtual", 0, SymbolKind::Text)
            .relocation_table();
        for (name, address, kind) in &self.exports {
            image = image.dynamic_symbol(name, *address, *kind);
        }
        if !self.stripped {
            for (name, address, kind) in &self.symbols {
                image = image.symbol(name, *address, *kind);
            }
        }
        for &(offset, symbol, r_type, addend) in &self.relocations {
            image = image.relocation(offset, symbol, r_type, addend);
        }
        image
    }

    /// The hierarchy from the module docs.
    pub fn hierarchy() -> Self {
        let mut layout = Self::empty();
        let base = layout.string("4Base");
        let derived = layout.string("7Derived");
        let multi = layout.string("5Multi");

        layout
            .absolute(BASE_TI, CLASS_TYPE_INFO, 16)
            .relative(BASE_TI + 8, base)
            .absolute(DERIVED_TI, SI_CLASS_TYPE_INFO, 16)
            .relative(DERIVED_TI + 8, derived)
            .relative(DERIVED_TI + 16, BASE_TI)
            .absolute(MULTI_TI, VMI_CLASS_TYPE_INFO, 16)
            .relative(MULTI_TI + 8, multi)
            .raw_word(MULTI_TI + 16, 0)
            .raw_word(MULTI_TI + 20, 2)
            .relative(MULTI_TI + 24, BASE_TI)
            .raw(MULTI_TI + 32, 0x002)
            .relative(MULTI_TI + 40, DERIVED_TI)
            .raw(MULTI_TI + 48, 0x802);

        layout
            .relative(BASE_VT + 8, BASE_TI)
            .relative(BASE_VT + 16, BASE_FOO)
            .absolute(BASE_VT + 24, PURE_VIRTUAL, 0)
            .relative(DERIVED_VT + 8, DERIVED_TI)
            .relative(DERIVED_VT + 16, DERIVED_FOO)
            .relative(MULTI_VT + 8, MULTI_TI)
            .relative(MULTI_VT + 16, MULTI_FOO)
            .raw(MULTI_VT + 24, (-8i64) as u64)
            .relative(MULTI_VT + 32, MULTI_TI)
            .relative(MULTI_VT + 40, MULTI_THUNK);

        layout
            .symbol("_ZTI4Base", BASE_TI, SymbolKind::Data)
            .symbol("_ZTI7Derived", DERIVED_TI, SymbolKind::Data)
            .symbol("_ZTI5Multi", MULTI_TI, SymbolKind::Data)
            .symbol("_ZTV4Base", BASE_VT, SymbolKind::Data)
            .symbol("_ZTV7Derived", DERIVED_VT, SymbolKind::Data)
            .symbol("_ZTV5Multi", MULTI_VT, SymbolKind::Data)
            .symbol("_ZN4Base3fooEv", BASE_FOO, SymbolKind::Text)
            .symbol("_ZN7Derived3fooEv", DERIVED_FOO, SymbolKind::Text)
            .symbol("_ZN5Multi3fooEv", MULTI_FOO, SymbolKind::Text)
            .symbol("_ZThn8_N5Multi3fooEv", MULTI_THUNK, SymbolKind::Text);
        layout
    }
}
