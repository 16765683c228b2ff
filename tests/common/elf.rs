//! Minimal ELF64 little-endian file writer for x86_64 fixtures.
//!
//! Only section headers are emitted, which is all the reader needs. Section data is laid out
//! after the file header in insertion order, 8-byte aligned, followed by `.shstrtab` and the
//! section header table.

use object::elf::{
    FileHeader64, Ident, Rela64, SectionHeader64, Sym64, ELFCLASS64, ELFDATA2LSB, ELFMAG,
    ELFOSABI_SYSV, EM_X86_64, ET_DYN, EV_CURRENT, SHT_NULL, SHT_STRTAB,
};
use object::endian::{I64, U16, U32, U64};
use object::pod::bytes_of;
use object::Endianness;

fn u16(v: u16) -> U16<Endianness> {
    U16::new(Endianness::Little, v)
}
fn u32(v: u32) -> U32<Endianness> {
    U32::new(Endianness::Little, v)
}
fn u64(v: u64) -> U64<Endianness> {
    U64::new(Endianness::Little, v)
}

pub struct Section {
    pub name: &'static str,
    pub sh_type: u32,
    pub flags: u64,
    pub address: u64,
    pub data: Vec<u8>,
    pub link: u32,
    pub info: u32,
    pub entsize: u64,
}

impl Section {
    pub fn new(name: &'static str, sh_type: u32, flags: u64, address: u64, data: Vec<u8>) -> Self {
        Self {
            name,
            sh_type,
            flags,
            address,
            data,
            link: 0,
            info: 0,
            entsize: 0,
        }
    }

    /// A table of `entsize`-byte entries linked to section `link`.
    pub fn table(mut self, link: u32, info: u32, entsize: u64) -> Self {
        self.link = link;
        self.info = info;
        self.entsize = entsize;
        self
    }
}

/// A string table under construction, starting with the mandatory empty string.
#[derive(Default)]
pub struct Strings(Vec<u8>);

impl Strings {
    pub fn add(&mut self, value: &str) -> u32 {
        if self.0.is_empty() {
            self.0.push(0);
        }
        let offset = self.0.len() as u32;
        self.0.extend_from_slice(value.as_bytes());
        self.0.push(0);
        offset
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        if self.0.is_empty() {
            self.0.push(0);
        }
        self.0
    }
}

/// Builds a symbol table whose first entry is the null symbol.
pub struct Symbols {
    entries: Vec<u8>,
    pub strings: Strings,
}

impl Symbols {
    pub fn new() -> Self {
        let mut symbols = Self {
            entries: Vec::new(),
            strings: Strings::default(),
        };
        symbols.push("", 0, 0, 0, 0);
        symbols
    }

    /// `info` is `st_info` as built by `(bind << 4) | type`. `shndx` 0 is undefined.
    pub fn push(&mut self, name: &str, info: u8, shndx: u16, value: u64, size: u64) -> &mut Self {
        let st_name = if name.is_empty() {
            0
        } else {
            self.strings.add(name)
        };
        let sym = Sym64::<Endianness> {
            st_name: u32(st_name),
            st_info: info,
            st_other: 0,
            st_shndx: u16(shndx),
            st_value: u64(value),
            st_size: u64(size),
        };
        self.entries.extend_from_slice(bytes_of(&sym));
        self
    }

    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        (self.entries, self.strings.into_bytes())
    }
}

pub fn rela(offset: u64, symbol: u32, r_type: u32, addend: i64) -> Vec<u8> {
    let entry = Rela64::<Endianness> {
        r_offset: u64(offset),
        r_info: u64((u64::from(symbol) << 32) | u64::from(r_type)),
        r_addend: I64::new(Endianness::Little, addend),
    };
    bytes_of(&entry).to_vec()
}

fn align(buffer: &mut Vec<u8>) {
    buffer.resize(buffer.len().next_multiple_of(8), 0);
}

/// Writes a shared object holding `sections`, which get ELF indices starting at 1.
pub fn write(sections: &[Section]) -> Vec<u8> {
    let header_size = std::mem::size_of::<FileHeader64<Endianness>>();
    let mut buffer = vec![0u8; header_size];

    let mut names = Strings::default();
    let mut offsets = Vec::with_capacity(sections.len());
    for section in sections {
        align(&mut buffer);
        offsets.push(buffer.len() as u64);
        buffer.extend_from_slice(&section.data);
    }

    let name_offsets: Vec<u32> = sections.iter().map(|s| names.add(s.name)).collect();
    let shstrtab_name = names.add(".shstrtab");
    let shstrtab = names.into_bytes();
    align(&mut buffer);
    let shstrtab_offset = buffer.len() as u64;
    buffer.extend_from_slice(&shstrtab);

    align(&mut buffer);
    let shoff = buffer.len() as u64;
    let null_sec = SectionHeader64::<Endianness> {
        sh_name: u32(0),
        sh_type: u32(SHT_NULL),
        sh_flags: u64(0),
        sh_addr: u64(0),
        sh_offset: u64(0),
        sh_size: u64(0),
        sh_link: u32(0),
        sh_info: u32(0),
        sh_addralign: u64(0),
        sh_entsize: u64(0),
    };
    buffer.extend_from_slice(bytes_of(&null_sec));

    for ((section, &offset), &name) in sections.iter().zip(&offsets).zip(&name_offsets) {
        let sec_header = SectionHeader64::<Endianness> {
            sh_name: u32(name),
            sh_type: u32(section.sh_type),
            sh_flags: u64(section.flags),
            sh_addr: u64(section.address),
            sh_offset: u64(offset),
            sh_size: u64(section.data.len() as u64),
            sh_link: u32(section.link),
            sh_info: u32(section.info),
            sh_addralign: u64(8),
            sh_entsize: u64(section.entsize),
        };
        buffer.extend_from_slice(bytes_of(&sec_header));
    }

    let shstrtab_header = SectionHeader64::<Endianness> {
        sh_name: u32(shstrtab_name),
        sh_type: u32(SHT_STRTAB),
        sh_flags: u64(0),
        sh_addr: u64(0),
        sh_offset: u64(shstrtab_offset),
        sh_size: u64(shstrtab.len() as u64),
        sh_link: u32(0),
        sh_info: u32(0),
        sh_addralign: u64(1),
        sh_entsize: u64(0),
    };
    buffer.extend_from_slice(bytes_of(&shstrtab_header));

    let file_header = FileHeader64::<Endianness> {
        e_ident: Ident {
            magic: ELFMAG,
            class: ELFCLASS64,
            data: ELFDATA2LSB,
            version: EV_CURRENT,
            os_abi: ELFOSABI_SYSV,
            abi_version: 0,
            padding: [0; 7],
        },
        e_type: u16(ET_DYN),
        e_machine: u16(EM_X86_64),
        e_version: u32(EV_CURRENT as u32),
        e_entry: u64(0),
        e_phoff: u64(0),
        e_shoff: u64(shoff),
        e_flags: u32(0),
        e_ehsize: u16(header_size as u16),
        e_phentsize: u16(0),
        e_phnum: u16(0),
        e_shentsize: u16(std::mem::size_of::<SectionHeader64<Endianness>>() as u16),
        e_shnum: u16(sections.len() as u16 + 2),
        e_shstrndx: u16(sections.len() as u16 + 1),
    };
    buffer[..header_size].copy_from_slice(bytes_of(&file_header));
    buffer
}
