//! `std::type_info` recovery.
//!
//! Layout of the three class-info kinds on a 64-bit target:
//!
//! ```text
//! __class_type_info      vptr | __type_name
//! __si_class_type_info   vptr | __type_name | __base_type
//! __vmi_class_type_info  vptr | __type_name | __flags: u32 | __base_count: u32
//!                        | { __base_type, __offset_flags: i64 } * __base_count
//! ```
//!
//! `vptr` points two words into the vtable of the class-info kind, which is how the kind is
//! told apart.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::abi::InheritKind;
use crate::context::ReadContext;
use crate::error::ReadError;
use crate::view::{Cursor, POINTER_SIZE};

/// Distance from a class-info vtable's start to the address stored in a type_info.
const CLASS_INFO_VPTR_OFFSET: u64 = 2 * POINTER_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseClassInfo {
    pub name: String,
    /// Offset of the base subobject, `(flags >> 8) & 0xff`.
    pub offset: i64,
    /// Virtual and public bits, `flags & 0xff`.
    pub mask: u32,
}

/// Bases of a multiple-inheritance type keyed by offset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<BaseClassInfo>", into = "Vec<BaseClassInfo>")]
pub struct BaseClasses(BTreeMap<i64, BaseClassInfo>);

impl BaseClasses {
    /// Returns `false` and keeps the existing entry when `base.offset` is already taken.
    pub fn insert(&mut self, base: BaseClassInfo) -> bool {
        if self.0.contains_key(&base.offset) {
            return false;
        }
        self.0.insert(base.offset, base);
        true
    }

    pub fn get(&self, offset: i64) -> Option<&BaseClassInfo> {
        self.0.get(&offset)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Bases in ascending offset order.
    pub fn iter(&self) -> impl Iterator<Item = &BaseClassInfo> {
        self.0.values()
    }
}

impl From<Vec<BaseClassInfo>> for BaseClasses {
    fn from(bases: Vec<BaseClassInfo>) -> Self {
        let mut classes = Self::default();
        for base in bases {
            classes.insert(base);
        }
        classes
    }
}

impl From<BaseClasses> for Vec<BaseClassInfo> {
    fn from(classes: BaseClasses) -> Self {
        classes.0.into_values().collect()
    }
}

/// One recovered type_info object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "inherit_type")]
pub enum TypeInfo {
    None {
        name: String,
    },
    Single {
        name: String,
        parent_type: String,
        offset: i64,
    },
    Multiple {
        name: String,
        attribute: u32,
        base_classes: BaseClasses,
        /// Set when the base list could only be read partially.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        incomplete: bool,
    },
}

impl TypeInfo {
    pub fn name(&self) -> &str {
        match self {
            Self::None { name } | Self::Single { name, .. } | Self::Multiple { name, .. } => name,
        }
    }

    pub fn kind(&self) -> InheritKind {
        match self {
            Self::None { .. } => InheritKind::None,
            Self::Single { .. } => InheritKind::Single,
            Self::Multiple { .. } => InheritKind::Multiple,
        }
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Multiple { incomplete: true, .. })
    }
}

pub struct RttiReader<'a> {
    ctx: &'a ReadContext<'a>,
}

impl<'a> RttiReader<'a> {
    pub fn new(ctx: &'a ReadContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn read_type_info(&self, address: u64) -> Result<TypeInfo, ReadError> {
        let start = Cursor::at(address);
        let kind = self.inherit_kind(start)?;

        let name_slot = start.advance(POINTER_SIZE);
        let (name, cursor) = self.ctx.own_name(name_slot);
        let name = name.ok_or(ReadError::AbnormalSymbolValue {
            address: name_slot.position(),
        })?;

        match kind {
            InheritKind::None => Ok(TypeInfo::None { name }),
            InheritKind::Single => {
                let (parent, _) = self.ctx.referenced_type_name(cursor);
                let parent_type = parent.ok_or(ReadError::AbnormalSymbolValue {
                    address: cursor.position(),
                })?;
                Ok(TypeInfo::Single {
                    name,
                    parent_type,
                    offset: 0,
                })
            }
            InheritKind::Multiple => self.read_multiple(name, cursor),
        }
    }

    fn inherit_kind(&self, start: Cursor) -> Result<InheritKind, ReadError> {
        let not_type_info = ReadError::NotTypeInfo {
            address: start.position(),
        };
        let ctx = self.ctx;
        if let Some(bound) = ctx.known.bindings.get(&start.position()) {
            return ctx.abi.inherit_kind(bound).ok_or(not_type_info);
        }
        let (vptr, _) = ctx.view.read_ptr(start).ok_or_else(|| not_type_info.clone())?;
        ctx.index
            .lookup_by_address(vptr.wrapping_sub(CLASS_INFO_VPTR_OFFSET))
            .and_then(|sym| ctx.abi.inherit_kind(&sym.name))
            .ok_or(not_type_info)
    }

    fn read_multiple(&self, name: String, cursor: Cursor) -> Result<TypeInfo, ReadError> {
        let view = &self.ctx.view;
        let abnormal = ReadError::AbnormalSymbolValue {
            address: cursor.position(),
        };
        let (attribute, cursor) = view.read_word(cursor).ok_or_else(|| abnormal.clone())?;
        let (count, mut cursor) = view.read_word(cursor).ok_or(abnormal)?;

        let mut base_classes = BaseClasses::default();
        let mut incomplete = false;
        for _ in 0..count {
            let (base, flags_slot) = self.ctx.referenced_type_name(cursor);
            let Some(base) = base else {
                tracing::warn!("Unresolvable base class of {} at {:#x}.", name, cursor.position());
                incomplete = true;
                break;
            };
            let Some((flags, next)) = view.read_ptr(flags_slot) else {
                incomplete = true;
                break;
            };
            cursor = next;

            let flags = flags as i64;
            let info = BaseClassInfo {
                name: base,
                offset: (flags >> 8) & 0xff,
                mask: (flags & 0xff) as u32,
            };
            if !base_classes.insert(info) {
                tracing::warn!(
                    "Duplicate base offset in {} at {:#x}.",
                    name,
                    flags_slot.position()
                );
                incomplete = true;
            }
        }

        Ok(TypeInfo::Multiple {
            name,
            attribute,
            base_classes,
            incomplete,
        })
    }
}
