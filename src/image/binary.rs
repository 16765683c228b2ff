//! `object`-backed image.
//!
//! Parses ELF and Mach-O files once and keeps the pieces the reconstruction core asks for.
//! Section bytes are borrowed from the (memory-mapped) input, everything else is copied out.

use anyhow::{bail, Context, Result};
use object::macho::{
    BIND_IMMEDIATE_MASK, BIND_OPCODE_ADD_ADDR_ULEB, BIND_OPCODE_DONE, BIND_OPCODE_DO_BIND,
    BIND_OPCODE_DO_BIND_ADD_ADDR_IMM_SCALED, BIND_OPCODE_DO_BIND_ADD_ADDR_ULEB,
    BIND_OPCODE_DO_BIND_ULEB_TIMES_SKIPPING_ULEB, BIND_OPCODE_MASK, BIND_OPCODE_SET_ADDEND_SLEB,
    BIND_OPCODE_SET_DYLIB_ORDINAL_IMM, BIND_OPCODE_SET_DYLIB_ORDINAL_ULEB,
    BIND_OPCODE_SET_DYLIB_SPECIAL_IMM, BIND_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB,
    BIND_OPCODE_SET_SYMBOL_TRAILING_FLAGS_IMM, BIND_OPCODE_SET_TYPE_IMM,
};
use object::read::macho::{LoadCommandVariant, MachHeader};
use object::read::{Object, ObjectSection, ObjectSegment, ObjectSymbol, RelocationTarget};
use object::{BinaryFormat, RelocationFlags, SectionKind};

use super::{ExternalBinding, Image, ImageFormat, RawSymbol, RelocationEntry, SectionInfo};
use crate::error::DumpError;
use crate::utils::{read_sleb128, read_uleb128};

/// Upper bound on the repeat count of a single bind opcode.
const MAX_BIND_REPEAT: u64 = 1 << 20;

pub struct ObjectImage<'data> {
    format: ImageFormat,
    machine: object::Architecture,
    sections: Vec<SectionInfo>,
    data: Vec<&'data [u8]>,
    symbols: Option<Vec<RawSymbol>>,
    dynamic_symbols: Option<Vec<RawSymbol>>,
    relocations: Option<Vec<RelocationEntry>>,
    bindings: Vec<ExternalBinding>,
}

impl<'data> ObjectImage<'data> {
    pub fn parse(data: &'data [u8]) -> Result<Self, DumpError> {
        Self::open(data).map_err(|err| DumpError::Parse(format!("{:#}", err)))
    }

    fn open(data: &'data [u8]) -> Result<Self> {
        let file = object::File::parse(data).context("failed to parse image")?;
        let format = match file.format() {
            BinaryFormat::Elf => ImageFormat::Elf,
            BinaryFormat::MachO => ImageFormat::MachO,
            other => bail!("unsupported container format: {:?}", other),
        };
        if !file.is_64() {
            bail!("only 64-bit images are supported");
        }

        let mut sections = Vec::new();
        let mut section_data = Vec::new();
        for section in file.sections() {
            sections.push(SectionInfo {
                name: section.name().unwrap_or_default().to_string(),
                segment: section.segment_name().ok().flatten().map(str::to_string),
                address: section.address(),
                size: section.size(),
                executable: section.kind() == SectionKind::Text,
            });
            section_data.push(section.data().unwrap_or(&[]));
        }

        let symbols = file
            .symbol_table()
            .map(|_| file.symbols().map(|sym| raw_symbol(&sym)).collect());
        let dynamic_symbols = file
            .dynamic_symbol_table()
            .map(|_| file.dynamic_symbols().map(|sym| raw_symbol(&sym)).collect());

        let relocations = match format {
            ImageFormat::Elf => elf_relocations(&file, &sections),
            ImageFormat::MachO => None,
        };
        let bindings = match format {
            ImageFormat::MachO => macho_bindings(&file, data)?,
            ImageFormat::Elf => Vec::new(),
        };

        tracing::info!(
            "{:<12}{:?} for {:?}",
            "Format:",
            format,
            file.architecture()
        );

        Ok(Self {
            format,
            machine: file.architecture(),
            sections,
            data: section_data,
            symbols,
            dynamic_symbols,
            relocations,
            bindings,
        })
    }
}

fn raw_symbol<'data, S: ObjectSymbol<'data>>(sym: &S) -> RawSymbol {
    RawSymbol {
        index: sym.index().0,
        name: sym.name().unwrap_or_default().to_string(),
        address: sym.address(),
        size: sym.size(),
        kind: sym.kind(),
        defined: !sym.is_undefined(),
    }
}

fn elf_relocations(
    file: &object::File<'_>,
    sections: &[SectionInfo],
) -> Option<Vec<RelocationEntry>> {
    let has_table = sections
        .iter()
        .any(|section| section.name.starts_with(".rela") || section.name.starts_with(".rel."));
    let mut entries = Vec::new();
    for (offset, reloc) in file.dynamic_relocations()? {
        let RelocationFlags::Elf { r_type } = reloc.flags() else {
            continue;
        };
        let symbol = match reloc.target() {
            RelocationTarget::Symbol(index) => Some(index.0),
            _ => None,
        };
        entries.push(RelocationEntry {
            offset,
            symbol,
            r_type,
            addend: reloc.addend(),
        });
    }
    // SHT_RELR entries keep their addend in place, so the copied section bytes already hold it.
    if entries.is_empty() && !has_table {
        return None;
    }
    Some(entries)
}

fn macho_bindings(file: &object::File<'_>, data: &[u8]) -> Result<Vec<ExternalBinding>> {
    let object::File::MachO64(macho) = file else {
        return Ok(Vec::new());
    };
    let endian = macho.macho_header().endian()?;
    let segments: Vec<u64> = macho.segments().map(|segment| segment.address()).collect();
    let mut commands = macho.macho_load_commands()?;
    while let Some(command) = commands.next()? {
        if let LoadCommandVariant::DyldInfo(info) = command.variant()? {
            let offset = info.bind_off.get(endian) as usize;
            let size = info.bind_size.get(endian) as usize;
            let opcodes = offset.checked_add(size).and_then(|end| data.get(offset..end));
            let Some(opcodes) = opcodes else {
                tracing::warn!("Bind opcodes at {:#x} are out of file bounds.", offset);
                return Ok(Vec::new());
            };
            return Ok(decode_bind_opcodes(opcodes, &segments, 8));
        }
    }
    tracing::warn!("LC_DYLD_INFO not found, external bindings are unavailable.");
    Ok(Vec::new())
}

/// Decodes a dyld non-lazy bind opcode stream into `(address, symbol)` pairs.
fn decode_bind_opcodes(
    opcodes: &[u8],
    segments: &[u64],
    pointer_size: u64,
) -> Vec<ExternalBinding> {
    let mut bindings = Vec::new();
    let mut symbol = String::new();
    let mut address = 0u64;
    let mut pos = 0;

    let uleb = |pos: &mut usize| -> Option<u64> {
        let (value, len) = read_uleb128(opcodes.get(*pos..)?)?;
        *pos += len;
        Some(value)
    };

    while let Some(&byte) = opcodes.get(pos) {
        pos += 1;
        let immediate = byte & BIND_IMMEDIATE_MASK;
        let step = match byte & BIND_OPCODE_MASK {
            BIND_OPCODE_DONE => break,
            BIND_OPCODE_SET_DYLIB_ORDINAL_IMM
            | BIND_OPCODE_SET_DYLIB_SPECIAL_IMM
            | BIND_OPCODE_SET_TYPE_IMM => Some(()),
            BIND_OPCODE_SET_DYLIB_ORDINAL_ULEB => uleb(&mut pos).map(drop),
            BIND_OPCODE_SET_SYMBOL_TRAILING_FLAGS_IMM => {
                let rest = &opcodes[pos..];
                rest.iter().position(|&b| b == 0).map(|end| {
                    symbol = String::from_utf8_lossy(&rest[..end]).into_owned();
                    pos += end + 1;
                })
            }
            BIND_OPCODE_SET_ADDEND_SLEB => opcodes
                .get(pos..)
                .and_then(read_sleb128)
                .map(|(_, len)| pos += len),
            BIND_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB => uleb(&mut pos).and_then(|offset| {
                let base = segments.get(usize::from(immediate))?;
                address = base.wrapping_add(offset);
                Some(())
            }),
            BIND_OPCODE_ADD_ADDR_ULEB => {
                uleb(&mut pos).map(|delta| address = address.wrapping_add(delta))
            }
            BIND_OPCODE_DO_BIND => {
                bindings.push(ExternalBinding { address, symbol: symbol.clone() });
                address = address.wrapping_add(pointer_size);
                Some(())
            }
            BIND_OPCODE_DO_BIND_ADD_ADDR_ULEB => uleb(&mut pos).map(|delta| {
                bindings.push(ExternalBinding { address, symbol: symbol.clone() });
                address = address.wrapping_add(delta).wrapping_add(pointer_size);
            }),
            BIND_OPCODE_DO_BIND_ADD_ADDR_IMM_SCALED => {
                bindings.push(ExternalBinding { address, symbol: symbol.clone() });
                address = address.wrapping_add(u64::from(immediate) * pointer_size + pointer_size);
                Some(())
            }
            BIND_OPCODE_DO_BIND_ULEB_TIMES_SKIPPING_ULEB => {
                uleb(&mut pos).zip(uleb(&mut pos)).map(|(count, skip)| {
                    for _ in 0..count.min(MAX_BIND_REPEAT) {
                        bindings.push(ExternalBinding { address, symbol: symbol.clone() });
                        address = address.wrapping_add(skip).wrapping_add(pointer_size);
                    }
                })
            }
            other => {
                tracing::warn!("Unhandled bind opcode: {:#x}.", other);
                None
            }
        };
        if step.is_none() {
            break;
        }
    }
    bindings
}

impl Image for ObjectImage<'_> {
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
        self.data.get(index).copied()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bind_stream() {
        let mut stream = vec![BIND_OPCODE_SET_DYLIB_ORDINAL_IMM | 1];
        stream.push(BIND_OPCODE_SET_SYMBOL_TRAILING_FLAGS_IMM);
        stream.extend_from_slice(b"___cxa_pure_virtual\0");
        stream.push(BIND_OPCODE_SET_TYPE_IMM | 1);
        stream.extend_from_slice(&[BIND_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB | 1, 0x10]);
        stream.push(BIND_OPCODE_DO_BIND);
        stream.push(BIND_OPCODE_DO_BIND_ADD_ADDR_IMM_SCALED | 1);
        stream.extend_from_slice(&[BIND_OPCODE_DO_BIND_ULEB_TIMES_SKIPPING_ULEB, 2, 8]);
        stream.push(BIND_OPCODE_DONE);

        let bindings = decode_bind_opcodes(&stream, &[0, 0x4000], 8);
        let addrs: Vec<u64> = bindings.iter().map(|b| b.address).collect();
        assert_eq!(addrs, vec![0x4010, 0x4018, 0x4028, 0x4038]);
        assert!(bindings.iter().all(|b| b.symbol == "___cxa_pure_virtual"));
    }

    #[test]
    fn bad_segment_stops_decoding() {
        let stream = [BIND_OPCODE_SET_SEGMENT_AND_OFFSET_ULEB | 5, 0, BIND_OPCODE_DO_BIND];
        assert!(decode_bind_opcodes(&stream, &[0], 8).is_empty());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = ObjectImage::parse(b"definitely not an object file").err().unwrap();
        assert!(matches!(err, DumpError::Parse(_)));
    }
}
