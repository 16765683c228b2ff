//! Symbol table management.
//!
//! Builds bidirectional address/name lookups over the static and dynamic symbol tables.
//! External dynamic symbols (load value zero) are given synthetic addresses past the end of
//! all sections so that relocated pointers to them can still be looked up by address.

use std::collections::HashMap;

use object::SymbolKind;

use crate::image::{Image, RawSymbol};

/// Policy for inventing addresses of unresolved external symbols.
///
/// Both variants place symbol `index` in a pointer-sized slot after the end of the last
/// section, mimicking a loader-synthesized table. Neither is exact; they only need to agree
/// between the resolver and the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExternalAddressing {
    /// `end_of_sections + index * pointer_size`
    #[default]
    Slot,
    /// `end_of_sections + (index - 1) * pointer_size`, skipping the null symbol.
    SlotSkipNull,
}

impl ExternalAddressing {
    pub fn address(self, end_of_sections: u64, index: usize, pointer_size: usize) -> u64 {
        let slot = match self {
            Self::Slot => index,
            Self::SlotSkipNull => index.saturating_sub(1),
        };
        end_of_sections.wrapping_add((slot as u64).wrapping_mul(pointer_size as u64))
    }
}

/// Which table a symbol came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolTable {
    Static,
    Dynamic,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    /// Address the symbol is keyed by: its load value, or a synthetic one for externals.
    pub address: u64,
    /// Raw load value from the table.
    pub value: u64,
    pub size: u64,
    pub kind: SymbolKind,
    pub table: SymbolTable,
    pub index: usize,
    pub defined: bool,
    pub synthetic: bool,
}

#[derive(Default)]
struct Lookup {
    by_value: HashMap<u64, usize>,
    by_name: HashMap<String, usize>,
}

impl Lookup {
    fn insert(&mut self, address: Option<u64>, name: &str, slot: usize) {
        if let Some(address) = address {
            self.by_value.entry(address).or_insert(slot);
        }
        self.by_name.entry(name.to_string()).or_insert(slot);
    }
}

/// Immutable symbol oracle, built once per image.
pub struct SymbolIndex {
    symbols: Vec<Symbol>,
    statics: Lookup,
    dynamics: Lookup,
    dynamic_by_index: HashMap<usize, usize>,
    has_static: bool,
    has_dynamic: bool,
    end_of_sections: u64,
    pointer_size: usize,
    addressing: ExternalAddressing,
}

impl SymbolIndex {
    pub fn build(image: &dyn Image, addressing: ExternalAddressing, pointer_size: usize) -> Self {
        let mut index = Self {
            symbols: Vec::new(),
            statics: Lookup::default(),
            dynamics: Lookup::default(),
            dynamic_by_index: HashMap::new(),
            has_static: false,
            has_dynamic: false,
            end_of_sections: image.end_of_sections(),
            pointer_size,
            addressing,
        };

        match image.symbol_table() {
            Some(table) => {
                index.has_static = true;
                for raw in table.iter() {
                    let name = unversioned(&raw.name);
                    if name.is_empty() {
                        continue;
                    }
                    let slot = index.push(raw, name, SymbolTable::Static, raw.address, false);
                    let address = (raw.address != 0).then_some(raw.address);
                    index.statics.insert(address, name, slot);
                }
            }
            None => tracing::warn!("Static symbol table not found in this image!"),
        }

        match image.dynamic_symbol_table() {
            Some(table) => {
                index.has_dynamic = true;
                for raw in table.iter().filter(|raw| !raw.name.is_empty()) {
                    let synthetic = raw.address == 0;
                    let address = if synthetic {
                        index.synthetic_address(raw.index)
                    } else {
                        raw.address
                    };
                    let slot = index.push(raw, &raw.name, SymbolTable::Dynamic, address, synthetic);
                    index.dynamics.insert(Some(address), &raw.name, slot);
                    index.dynamic_by_index.entry(raw.index).or_insert(slot);
                }
            }
            None => tracing::warn!("Dynamic symbol table not found in this image!"),
        }

        tracing::debug!(
            "Indexed {} symbols (static: {}, dynamic: {}).",
            index.symbols.len(),
            index.has_static,
            index.has_dynamic
        );
        index
    }

    fn push(
        &mut self,
        raw: &RawSymbol,
        name: &str,
        table: SymbolTable,
        address: u64,
        synthetic: bool,
    ) -> usize {
        self.symbols.push(Symbol {
            name: name.to_string(),
            address,
            value: raw.address,
            size: raw.size,
            kind: raw.kind,
            table,
            index: raw.index,
            defined: raw.defined,
            synthetic,
        });
        self.symbols.len() - 1
    }

    /// Static entries win over dynamic ones at the same address.
    pub fn lookup_by_address(&self, address: u64) -> Option<&Symbol> {
        self.statics
            .by_value
            .get(&address)
            .or_else(|| self.dynamics.by_value.get(&address))
            .map(|&slot| &self.symbols[slot])
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&Symbol> {
        self.statics
            .by_name
            .get(name)
            .or_else(|| self.dynamics.by_name.get(name))
            .map(|&slot| &self.symbols[slot])
    }

    /// The dynamic symbol with raw table index `index`, as referenced by relocations.
    pub fn dynamic_symbol(&self, index: usize) -> Option<&Symbol> {
        self.dynamic_by_index.get(&index).map(|&slot| &self.symbols[slot])
    }

    pub fn synthetic_address(&self, index: usize) -> u64 {
        self.addressing
            .address(self.end_of_sections, index, self.pointer_size)
    }

    pub fn has_static_table(&self) -> bool {
        self.has_static
    }

    pub fn has_any_table(&self) -> bool {
        self.has_static || self.has_dynamic
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }
}

/// Drops an ELF symbol version: `foo@VER` and `foo@@VER` both become `foo`.
fn unversioned(name: &str) -> &str {
    name.split_once('@').map_or(name, |(base, _)| base)
}
