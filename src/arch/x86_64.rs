//! x86_64 Architecture backend.

use super::{Architecture, RelocationClass};
use object::elf::{R_X86_64_64, R_X86_64_RELATIVE};
use object::Endianness;

/// The x86_64 architecture backend.
pub struct X86_64;

impl Architecture for X86_64 {
    fn name(&self) -> &'static str {
        "X86_64"
    }

    fn endianness(&self) -> Endianness {
        Endianness::Little
    }

    fn classify_relocation(&self, r_type: u32) -> RelocationClass {
        match r_type {
            // R_X86_64_64: S + A
            R_X86_64_64 => RelocationClass::Absolute,
            // R_X86_64_RELATIVE: B + A
            R_X86_64_RELATIVE => RelocationClass::Relative,
            _ => RelocationClass::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_data_relocations() {
        assert_eq!(X86_64.classify_relocation(R_X86_64_64), RelocationClass::Absolute);
        assert_eq!(X86_64.classify_relocation(R_X86_64_RELATIVE), RelocationClass::Relative);
        assert_eq!(
            X86_64.classify_relocation(object::elf::R_X86_64_GLOB_DAT),
            RelocationClass::Other
        );
    }
}
