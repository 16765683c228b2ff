//! Shared state of the RTTI and vtable walkers.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::abi::AbiConstants;
use crate::image::{Image, SectionInfo};
use crate::symbol::{SymbolIndex, SymbolTable};
use crate::view::{Cursor, DataView, POINTER_SIZE};

/// Object start addresses collected before any walk begins.
#[derive(Debug, Default, Clone)]
pub struct KnownAddresses {
    pub vtable_starts: BTreeSet<u64>,
    pub type_info_starts: BTreeSet<u64>,
    /// Data objects (local statics, lambdas, VTTs) that may follow a vtable.
    pub boundary_starts: HashSet<u64>,
    /// Pointer slots bound to an external symbol by the loader.
    pub bindings: HashMap<u64, String>,
}

impl KnownAddresses {
    pub fn collect(image: &dyn Image, abi: &AbiConstants, index: &SymbolIndex) -> Self {
        let mut known = Self::default();
        let data: Vec<&SectionInfo> = abi
            .data_sections
            .iter()
            .filter_map(|wanted| image.find_section(wanted).map(|(_, section)| section))
            .collect();

        // Vtable starts come from the static table only: a stripped image is scanned even when
        // it exports some of its vtables. Class-info vtables belong to the C++ runtime, also
        // when a copy relocation gives them a local address.
        let defined = index.iter().filter(|sym| sym.defined && !sym.synthetic && sym.value != 0);
        for symbol in defined {
            let in_data = data.iter().any(|s| s.contains(symbol.value));
            if abi.is_vtable_name(&symbol.name) {
                if symbol.table == SymbolTable::Static && abi.inherit_kind(&symbol.name).is_none() {
                    known.vtable_starts.insert(symbol.value);
                }
            } else if abi.is_typeinfo_name(&symbol.name) {
                known.type_info_starts.insert(symbol.value);
            } else if abi.is_boundary_name(&symbol.name) && in_data {
                known.boundary_starts.insert(symbol.value);
            }
        }

        // type_info objects of stripped images are found through their vtable pointer relocation.
        for reloc in image.dynamic_relocations().unwrap_or_default() {
            let Some(symbol) = reloc.symbol.and_then(|idx| index.dynamic_symbol(idx)) else {
                continue;
            };
            if abi.inherit_kind(&symbol.name).is_some() {
                known.type_info_starts.insert(reloc.offset);
            }
        }

        for binding in image.external_bindings() {
            if abi.inherit_kind(&binding.symbol).is_some() {
                known.type_info_starts.insert(binding.address);
            }
            known
                .bindings
                .entry(binding.address)
                .or_insert_with(|| binding.symbol.clone());
        }

        tracing::debug!(
            "Found {} vtable and {} type_info start(s).",
            known.vtable_starts.len(),
            known.type_info_starts.len()
        );
        known
    }

    /// Where a walk has to stop because another object begins.
    pub fn is_object_start(&self, address: u64) -> bool {
        self.type_info_starts.contains(&address)
            || self.vtable_starts.contains(&address)
            || self.boundary_starts.contains(&address)
    }
}

pub struct ReadContext<'a> {
    pub view: DataView<'a>,
    pub index: &'a SymbolIndex,
    pub abi: &'a AbiConstants,
    pub known: &'a KnownAddresses,
    /// Executable sections, `.text` as well as `.plt` and other stubs.
    code: Vec<&'a SectionInfo>,
    strings: Option<&'a SectionInfo>,
}

impl<'a> ReadContext<'a> {
    pub fn new(
        view: DataView<'a>,
        index: &'a SymbolIndex,
        abi: &'a AbiConstants,
        known: &'a KnownAddresses,
    ) -> Self {
        let image = view.image();
        Self {
            view,
            index,
            abi,
            known,
            code: image.sections().iter().filter(|s| s.executable).collect(),
            strings: image.find_section(&abi.string_section).map(|(_, s)| s),
        }
    }

    pub fn is_code(&self, address: u64) -> bool {
        self.code.iter().any(|section| section.contains(address))
    }

    /// A vtable slot holding a virtual function, including slots of pure virtuals that only
    /// point at the external `__cxa_pure_virtual`.
    pub fn is_function_slot(&self, slot: u64, value: u64) -> bool {
        if self.is_code(value) {
            return true;
        }
        if self.known.bindings.get(&slot).is_some_and(|name| name == self.abi.pure_virtual) {
            return true;
        }
        self.index
            .lookup_by_address(value)
            .is_some_and(|sym| sym.synthetic && sym.name == self.abi.pure_virtual)
    }

    /// Reads a `__type_name` pointer and returns `<typeinfo prefix><string>`.
    pub fn own_name(&self, cursor: Cursor) -> (Option<String>, Cursor) {
        let next = cursor.advance(POINTER_SIZE);
        let Some((value, _)) = self.view.read_ptr(cursor) else {
            return (None, next);
        };
        if !self.strings.is_some_and(|strings| strings.contains(value)) {
            return (None, next);
        }
        let name = self
            .view
            .c_string(value)
            .map(|s| format!("{}{}", self.abi.typeinfo_prefix, s));
        (name, next)
    }

    /// Reads a pointer to some type_info and returns that type's name.
    ///
    /// A pointer into a data region is followed to the referenced type_info's own name,
    /// anything else has to be a known symbol.
    pub fn referenced_type_name(&self, cursor: Cursor) -> (Option<String>, Cursor) {
        let next = cursor.advance(POINTER_SIZE);
        if let Some(bound) = self.known.bindings.get(&cursor.position()) {
            return (Some(self.abi.record_name(bound).to_string()), next);
        }
        let Some((value, _)) = self.view.read_ptr(cursor) else {
            return (None, next);
        };
        if value == 0 {
            return (None, next);
        }
        if self.view.in_region(value) {
            let (name, _) = self.own_name(Cursor::at(value).advance(POINTER_SIZE));
            return (name, next);
        }
        let symbol = self.index.lookup_by_address(value);
        (symbol.map(|sym| self.abi.record_name(&sym.name).to_string()), next)
    }
}
