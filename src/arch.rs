//! Architecture abstraction.
//!
//! This module defines the `Architecture` trait, which encapsulates the architecture-specific
//! parts of replaying dynamic relocations: which raw relocation types mean "absolute address
//! of a symbol" and which mean "image-relative rebase", plus the width and byte order of the
//! pointers being patched.

use anyhow::{anyhow, Result};
use object::{Endian, Endianness};

pub mod aarch64;
pub mod x86_64;

/// How the resolver treats a raw relocation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationClass {
    /// `S + A`: the address of the referenced symbol plus the addend.
    Absolute,
    /// `B + A` with a zero load base: the addend alone.
    Relative,
    /// Anything else. Left untouched.
    Other,
}

/// A trait representing a target architecture (e.g., x86_64, AArch64).
pub trait Architecture {
    /// Human readable name, used in logs.
    fn name(&self) -> &'static str;

    /// The object crate's endianness for this architecture.
    fn endianness(&self) -> Endianness;

    /// Width of a data pointer in bytes.
    fn pointer_size(&self) -> usize {
        8
    }

    /// Maps a raw ELF `r_type` onto the relocation classes the resolver understands.
    fn classify_relocation(&self, r_type: u32) -> RelocationClass;

    /// Writes a pointer-sized value into `data` at `offset`.
    fn write_pointer(&self, data: &mut [u8], offset: usize, value: u64) -> Result<()> {
        let size = self.pointer_size();
        let slot = offset
            .checked_add(size)
            .and_then(|end| data.get_mut(offset..end))
            .ok_or_else(|| anyhow!("Relocation offset out of bounds at 0x{:x}", offset))?;
        match size {
            8 => slot.copy_from_slice(&self.endianness().write_u64_bytes(value)),
            4 => slot.copy_from_slice(&self.endianness().write_u32_bytes(value as u32)),
            _ => return Err(anyhow!("Unsupported pointer size: {}", size)),
        }
        Ok(())
    }
}

/// Picks the backend for an image's machine type.
pub fn for_machine(machine: object::Architecture) -> Option<Box<dyn Architecture>> {
    match machine {
        object::Architecture::X86_64 => Some(Box::new(x86_64::X86_64)),
        object::Architecture::Aarch64 => Some(Box::new(aarch64::AArch64)),
        _ => None,
    }
}
