//! Virtual table recovery.
//!
//! A vtable group is a primary table followed by zero or more secondary tables, one per
//! base subobject at a non-zero offset:
//!
//! ```text
//! offset-to-top (0) | type_info* | fn* ...
//! offset-to-top (<0) | type_info* | fn* ...
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::ReadContext;
use crate::error::ReadError;
use crate::relocation::ReconstructedBuffer;
use crate::view::{Cursor, POINTER_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VTableColumn {
    pub symbol: Option<String>,
    /// Function address, 0 when the slot is bound to an import.
    pub rva: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTable {
    pub offset: i64,
    pub entries: Vec<VTableColumn>,
}

/// Function slots keyed by offset-to-top.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<SubTable>", into = "Vec<SubTable>")]
pub struct SubTables(BTreeMap<i64, Vec<VTableColumn>>);

impl SubTables {
    fn open(&mut self, offset: i64) {
        self.0.entry(offset).or_default();
    }

    fn push(&mut self, offset: i64, column: VTableColumn) {
        self.0.entry(offset).or_default().push(column);
    }

    pub fn get(&self, offset: i64) -> Option<&[VTableColumn]> {
        self.0.get(&offset).map(Vec::as_slice)
    }

    pub fn primary(&self) -> Option<&[VTableColumn]> {
        self.get(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Primary table first, then secondaries in layout order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &[VTableColumn])> {
        self.0.iter().rev().map(|(&offset, entries)| (offset, entries.as_slice()))
    }
}

impl From<Vec<SubTable>> for SubTables {
    fn from(tables: Vec<SubTable>) -> Self {
        let mut sub_tables = Self::default();
        for table in tables {
            sub_tables.open(table.offset);
            for column in table.entries {
                sub_tables.push(table.offset, column);
            }
        }
        sub_tables
    }
}

impl From<SubTables> for Vec<SubTable> {
    fn from(tables: SubTables) -> Self {
        tables
            .0
            .into_iter()
            .rev()
            .map(|(offset, entries)| SubTable { offset, entries })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VTable {
    pub name: String,
    pub type_name: Option<String>,
    pub sub_tables: SubTables,
}

pub struct VTableReader<'a> {
    ctx: &'a ReadContext<'a>,
}

impl<'a> VTableReader<'a> {
    pub fn new(ctx: &'a ReadContext<'a>) -> Self {
        Self { ctx }
    }

    /// Reads the vtable group at `address`.
    ///
    /// Also returns the cursor at the first word that no longer belongs to the group.
    pub fn read_vtable(&self, address: u64) -> Result<(VTable, Cursor), ReadError> {
        let ctx = self.ctx;
        let mut name = match ctx.index.lookup_by_address(address) {
            Some(sym) if !ctx.abi.is_vtable_name(&sym.name) => {
                return Err(ReadError::CurrentIsNotVTable {
                    address,
                    symbol: sym.name.clone(),
                })
            }
            Some(sym) => Some(ctx.abi.record_name(&sym.name).to_string()),
            None => None,
        };

        let mut cursor = Cursor::at(address);
        let mut primary_seen = false;
        let mut offset = 0i64;
        let mut type_name: Option<String> = None;
        let mut sub_tables = SubTables::default();

        loop {
            if cursor.position() != address && ctx.known.is_object_start(cursor.position()) {
                break;
            }
            let slot = cursor.position();
            let Some((value, next)) = ctx.view.read_ptr(cursor) else {
                break;
            };

            if ctx.is_function_slot(slot, value) {
                if !primary_seen {
                    return Err(ReadError::AbnormalThisOffset {
                        address: slot,
                        value: value as i64,
                    });
                }
                sub_tables.push(offset, self.column(slot, value));
                cursor = next;
                continue;
            }

            let header = value as i64;
            if header > 0 {
                break;
            }

            if !primary_seen {
                if header != 0 {
                    return Err(ReadError::AbnormalThisOffset { address: slot, value: header });
                }
                primary_seen = true;
                sub_tables.open(0);
                let (resolved, after) = self.type_info_ptr(next)?;
                if let Some(type_info) = &resolved {
                    name.get_or_insert_with(|| ctx.abi.vtable_name_for(type_info));
                }
                type_name = resolved;
                cursor = after;
                continue;
            }

            // A zero after the primary table starts the next group.
            if header == 0 {
                break;
            }
            let (resolved, after) = ctx.referenced_type_name(next);
            if resolved != type_name {
                return Err(ReadError::TypeInfoMismatch {
                    address: next.position(),
                });
            }
            offset = header;
            sub_tables.open(offset);
            cursor = after;
        }

        let name = name.ok_or(ReadError::NameNotFound { address })?;
        Ok((
            VTable {
                name,
                type_name,
                sub_tables,
            },
            cursor,
        ))
    }

    /// The primary table's type_info pointer. Zero means the type was compiled without RTTI.
    fn type_info_ptr(&self, slot: Cursor) -> Result<(Option<String>, Cursor), ReadError> {
        let ctx = self.ctx;
        let abnormal = ReadError::AbnormalTypeInfoPtr {
            address: slot.position(),
        };
        let (value, after) = ctx.view.read_ptr(slot).ok_or_else(|| abnormal.clone())?;
        if value == 0 && !ctx.known.bindings.contains_key(&slot.position()) {
            return Ok((None, after));
        }
        match ctx.referenced_type_name(slot) {
            (Some(type_name), after) if ctx.abi.is_type_name(&type_name) => {
                Ok((Some(type_name), after))
            }
            _ => Err(abnormal),
        }
    }

    fn column(&self, slot: u64, value: u64) -> VTableColumn {
        let ctx = self.ctx;
        if let Some(bound) = ctx.known.bindings.get(&slot) {
            return VTableColumn {
                symbol: Some(ctx.abi.record_name(bound).to_string()),
                rva: 0,
            };
        }
        let symbol = ctx.index.lookup_by_address(value);
        VTableColumn {
            symbol: symbol.map(|sym| ctx.abi.record_name(&sym.name).to_string()),
            rva: value,
        }
    }

    /// Whether the three words at `cursor` look like the start of a primary vtable.
    pub fn is_candidate(&self, cursor: Cursor) -> bool {
        let view = &self.ctx.view;
        let word = |index: u64| {
            let slot = cursor.position().checked_add(index * POINTER_SIZE)?;
            view.read_u64(slot).map(|value| (slot, value))
        };
        let (Some((_, top)), Some((_, type_info)), Some((slot, first))) =
            (word(0), word(1), word(2))
        else {
            return false;
        };
        top == 0
            && (type_info == 0 || self.ctx.known.type_info_starts.contains(&type_info))
            && self.ctx.is_function_slot(slot, first)
    }

    /// Walks `region` word by word and reads every candidate vtable.
    ///
    /// Yields one result per accepted candidate, with the candidate's address.
    pub fn scan(&self, region: &ReconstructedBuffer) -> Vec<(u64, Result<VTable, ReadError>)> {
        let mut results = Vec::new();
        let mut cursor = Cursor::at(region.base());
        let fits = |cursor: Cursor| {
            cursor
                .position()
                .checked_add(POINTER_SIZE)
                .is_some_and(|next| next <= region.end())
        };
        while fits(cursor) {
            if !self.is_candidate(cursor) {
                cursor = cursor.advance(POINTER_SIZE);
                continue;
            }
            match self.read_vtable(cursor.position()) {
                Ok((table, end)) => {
                    results.push((cursor.position(), Ok(table)));
                    cursor = end.max(cursor.advance(POINTER_SIZE));
                }
                Err(err) => {
                    results.push((cursor.position(), Err(err)));
                    cursor = cursor.advance(POINTER_SIZE);
                }
            }
        }
        results
    }
}
