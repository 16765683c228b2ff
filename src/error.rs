//! Error taxonomy.
//!
//! Three tiers: [`DumpError`] aborts a whole dump, [`ResolveError`] skips one data region,
//! and [`ReadError`] drops a single record while the dump carries on.

use thiserror::Error;

/// Fatal errors. Any of these ends the dump.
#[derive(Error, Debug)]
pub enum DumpError {
    /// The container could not be parsed at all.
    #[error("failed to parse image: {0}")]
    Parse(String),

    #[error("unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    /// None of the relocatable read-only data sections exist in the image.
    #[error("could not find necessary data section ({0})")]
    MissingDataSection(String),

    /// Neither a static nor a dynamic symbol table is present.
    #[error("image has neither a static nor a dynamic symbol table")]
    MissingSymbolTable,
}

/// Failure to reconstruct one data region.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("region {region} needs reconstruction but the image has no dynamic relocation table")]
    RelocationTableMissing { region: String },
}

/// Per-record failures from the RTTI and vtable readers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// The inheritance indicator does not resolve to one of the ABI class-info vtables.
    #[error("{address:#x} is not a type_info [CURRENT_IS_NOT_TYPEINFO]")]
    NotTypeInfo { address: u64 },

    /// An own-name or base-name string is empty or unreadable.
    #[error("abnormal symbol value at {address:#x} [ABNORMAL_SYMBOL_VALUE]")]
    AbnormalSymbolValue { address: u64 },

    /// A symbol exists at the start address but it does not name a vtable.
    #[error("{address:#x} is not a vtable ({symbol}) [CURRENT_IS_NOT_VTABLE]")]
    CurrentIsNotVTable { address: u64, symbol: String },

    /// The primary table's offset-to-top is not zero.
    #[error("abnormal offset-to-top {value:#x} at {address:#x} [ABNORMAL_THIS_OFFSET]")]
    AbnormalThisOffset { address: u64, value: i64 },

    #[error("abnormal type_info pointer at {address:#x} [ABNORMAL_TYPEINFO_PTR]")]
    AbnormalTypeInfoPtr { address: u64 },

    /// A virtual-base sub-table refers to a different type_info than the primary table.
    #[error("type_info mismatch at {address:#x} [TYPEINFO_MISMATCH]")]
    TypeInfoMismatch { address: u64 },

    #[error("no name could be found for the vtable at {address:#x} [NAME_NOT_FOUND]")]
    NameNotFound { address: u64 },
}
