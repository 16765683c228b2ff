//! AArch64 Architecture backend.

use super::{Architecture, RelocationClass};
use object::elf::{R_AARCH64_ABS64, R_AARCH64_RELATIVE};
use object::Endianness;

/// The 64-bit Arm backend (little-endian only).
pub struct AArch64;

impl Architecture for AArch64 {
    fn name(&self) -> &'static str {
        "AArch64"
    }

    fn endianness(&self) -> Endianness {
        Endianness::Little
    }

    fn classify_relocation(&self, r_type: u32) -> RelocationClass {
        match r_type {
            R_AARCH64_ABS64 => RelocationClass::Absolute,
            R_AARCH64_RELATIVE => RelocationClass::Relative,
            // GLOB_DAT, JUMP_SLOT, COPY, TLS and IRELATIVE never target vtable data.
            _ => RelocationClass::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::elf::{R_AARCH64_COPY, R_AARCH64_GLOB_DAT, R_AARCH64_JUMP_SLOT};

    #[test]
    fn data_relocations_are_classified() {
        let arch = AArch64;
        assert_eq!(arch.classify_relocation(R_AARCH64_ABS64), RelocationClass::Absolute);
        assert_eq!(arch.classify_relocation(R_AARCH64_RELATIVE), RelocationClass::Relative);
        for r_type in [R_AARCH64_GLOB_DAT, R_AARCH64_JUMP_SLOT, R_AARCH64_COPY] {
            assert_eq!(arch.classify_relocation(r_type), RelocationClass::Other);
        }
    }

    #[test]
    fn pointers_are_written_little_endian() {
        let arch = AArch64;
        assert_eq!(arch.pointer_size(), 8);
        let mut data = vec![0xffu8; 12];
        arch.write_pointer(&mut data, 4, 0x0000_7f00_0000_1234).unwrap();
        assert_eq!(&data[..4], &[0xff; 4]);
        assert_eq!(&data[4..], &[0x34, 0x12, 0, 0, 0, 0x7f, 0, 0]);
        assert!(arch.write_pointer(&mut data, 5, 0).is_err());
    }
}
