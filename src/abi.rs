//! Itanium C++ ABI naming constants.
//!
//! Reference: <https://itanium-cxx-abi.github.io/cxx-abi/abi.html#rtti-layout>
//!
//! Mach-O prepends an underscore to every C-level symbol, so the same ABI names appear with
//! one more leading `_` there. Dumped records always carry the plain ABI name.

use crate::image::{ImageFormat, SectionRef};

/// The `type_info` kind an ABI class-info vtable stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InheritKind {
    /// `__class_type_info`
    None,
    /// `__si_class_type_info`
    Single,
    /// `__vmi_class_type_info`
    Multiple,
}

#[derive(Debug, Clone)]
pub struct AbiConstants {
    /// Candidate relocatable read-only data regions, every present one is processed.
    pub data_sections: &'static [SectionRef],
    /// Where the `_ZTS` name strings live.
    pub string_section: SectionRef,
    /// Prepended to ABI names by the object format's C symbol mangling.
    pub symbol_prefix: &'static str,
    pub vtable_prefix: &'static str,
    pub typeinfo_prefix: &'static str,
    class_type_info: &'static str,
    si_class_type_info: &'static str,
    vmi_class_type_info: &'static str,
    /// Symbol name of the pure virtual placeholder.
    pub pure_virtual: &'static str,
    /// Name prefixes of data objects that may directly follow a vtable.
    pub boundary_prefixes: &'static [&'static str],
}

const ELF_DATA: &[SectionRef] = &[SectionRef::named(".data.rel.ro")];
const MACHO_DATA: &[SectionRef] = &[
    SectionRef::in_segment("__DATA_CONST", "__const"),
    SectionRef::in_segment("__DATA", "__const"),
];

impl AbiConstants {
    pub fn for_format(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Elf => Self {
                data_sections: ELF_DATA,
                string_section: SectionRef::named(".rodata"),
                symbol_prefix: "",
                vtable_prefix: "_ZTV",
                typeinfo_prefix: "_ZTI",
                class_type_info: "_ZTVN10__cxxabiv117__class_type_infoE",
                si_class_type_info: "_ZTVN10__cxxabiv120__si_class_type_infoE",
                vmi_class_type_info: "_ZTVN10__cxxabiv121__vmi_class_type_infoE",
                pure_virtual: "__cxa_pure_virtual",
                boundary_prefixes: &["_ZZ", "_ZTT", "_ZTC"],
            },
            ImageFormat::MachO => Self {
                data_sections: MACHO_DATA,
                string_section: SectionRef::in_segment("__TEXT", "__const"),
                symbol_prefix: "_",
                vtable_prefix: "_ZTV",
                typeinfo_prefix: "_ZTI",
                class_type_info: "__ZTVN10__cxxabiv117__class_type_infoE",
                si_class_type_info: "__ZTVN10__cxxabiv120__si_class_type_infoE",
                vmi_class_type_info: "__ZTVN10__cxxabiv121__vmi_class_type_infoE",
                pure_virtual: "___cxa_pure_virtual",
                boundary_prefixes: &["_ZZ", "_ZTT", "_ZTC"],
            },
        }
    }

    /// Exact match of a symbol name against the three class-info vtable symbols.
    pub fn inherit_kind(&self, symbol: &str) -> Option<InheritKind> {
        if symbol == self.class_type_info {
            Some(InheritKind::None)
        } else if symbol == self.si_class_type_info {
            Some(InheritKind::Single)
        } else if symbol == self.vmi_class_type_info {
            Some(InheritKind::Multiple)
        } else {
            None
        }
    }

    /// The ABI name behind a symbol: `__ZTI4Base` on Mach-O reads as `_ZTI4Base`.
    pub fn record_name<'n>(&self, symbol: &'n str) -> &'n str {
        symbol.strip_prefix(self.symbol_prefix).unwrap_or(symbol)
    }

    pub fn is_vtable_name(&self, symbol: &str) -> bool {
        self.record_name(symbol).starts_with(self.vtable_prefix)
    }

    pub fn is_typeinfo_name(&self, symbol: &str) -> bool {
        self.record_name(symbol).starts_with(self.typeinfo_prefix)
    }

    pub fn is_boundary_name(&self, symbol: &str) -> bool {
        let name = self.record_name(symbol);
        self.boundary_prefixes.iter().any(|prefix| name.starts_with(prefix))
    }

    /// Whether an already unprefixed name denotes a type_info object.
    pub fn is_type_name(&self, name: &str) -> bool {
        name.starts_with(self.typeinfo_prefix)
    }

    /// `_ZTI4Base` -> `_ZTV4Base`.
    pub fn vtable_name_for(&self, type_name: &str) -> String {
        let bare = type_name.strip_prefix(self.typeinfo_prefix).unwrap_or(type_name);
        format!("{}{}", self.vtable_prefix, bare)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_info_names_match_exactly() {
        let abi = AbiConstants::for_format(ImageFormat::Elf);
        assert_eq!(
            abi.inherit_kind("_ZTVN10__cxxabiv120__si_class_type_infoE"),
            Some(InheritKind::Single)
        );
        assert_eq!(abi.inherit_kind("_ZTVN10__cxxabiv120__si_class_type_infoEx"), None);
        assert_eq!(abi.inherit_kind("__ZTVN10__cxxabiv121__vmi_class_type_infoE"), None);

        let macho = AbiConstants::for_format(ImageFormat::MachO);
        assert_eq!(
            macho.inherit_kind("__ZTVN10__cxxabiv121__vmi_class_type_infoE"),
            Some(InheritKind::Multiple)
        );
        assert_eq!(
            macho.inherit_kind("__ZTVN10__cxxabiv117__class_type_infoE"),
            Some(InheritKind::None)
        );
        assert_eq!(macho.inherit_kind("_ZTVN10__cxxabiv117__class_type_infoE"), None);
    }

    #[test]
    fn vtable_name_from_type_name() {
        let abi = AbiConstants::for_format(ImageFormat::Elf);
        assert_eq!(abi.vtable_name_for("_ZTI4Base"), "_ZTV4Base");
        assert!(abi.is_vtable_name("_ZTV4Base"));
        assert!(abi.is_boundary_name("_ZZN4Base3fooEvE1x"));
        assert!(!abi.is_boundary_name("_ZTV4Base"));
    }

    #[test]
    fn macho_symbols_lose_their_c_underscore() {
        let abi = AbiConstants::for_format(ImageFormat::MachO);
        assert_eq!(abi.record_name("__ZTI4Base"), "_ZTI4Base");
        assert_eq!(abi.record_name("___cxa_pure_virtual"), "__cxa_pure_virtual");
        assert!(abi.is_typeinfo_name("__ZTI4Base"));
        assert!(abi.is_vtable_name("__ZTV4Base"));
        assert!(abi.is_boundary_name("__ZTT7Derived"));
        assert!(abi.is_type_name("_ZTI4Base"));
        assert_eq!(abi.vtable_name_for("_ZTI4Base"), "_ZTV4Base");

        let elf = AbiConstants::for_format(ImageFormat::Elf);
        assert_eq!(elf.record_name("_ZTI4Base"), "_ZTI4Base");
    }
}
