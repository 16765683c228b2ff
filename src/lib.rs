//! Itanium C++ ABI recovery library.
//!
//! Rebuilds the vtables and `std::type_info` objects of a compiled C++ binary without
//! running it. It is organized into several modules:
//! - `image`: Container access (ELF and Mach-O through `object`, or in memory).
//! - `arch`: Architecture-specific relocation handling.
//! - `symbol`: Symbol table management.
//! - `relocation`: Reconstruction of relocated read-only data.
//! - `rtti` and `vtable`: The ABI walkers.
//! - `engine`: Dump orchestration.
//! - `export`: JSON output.
//! - `config`: CLI configuration.

pub mod abi;
pub mod arch;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod export;
pub mod image;
pub mod relocation;
pub mod rtti;
pub mod symbol;
pub mod utils;
pub mod view;
pub mod vtable;
