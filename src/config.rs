//! Configuration module.
//!
//! Command-line interface of the dumper, parsed with `clap`.

use clap::Parser;
use std::path::PathBuf;

use crate::engine::EngineOptions;
use crate::relocation::ZeroProbe;
use crate::symbol::ExternalAddressing;

/// Recover Itanium C++ vtables and RTTI from ELF and Mach-O binaries.
///
/// Relocatable read-only data is rebuilt from the dynamic relocations when the image on disk
/// only holds placeholders.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Binary to analyze
    pub target: PathBuf,

    /// Output base path, `.vftable.json` and `.typeinfo.json` are appended
    #[arg(short, long)]
    pub output: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", help = "Set the logging level")]
    pub log_level: String,

    /// Addresses given to unresolved external symbols
    #[arg(long, value_enum, default_value_t = ExternalAddressing::Slot)]
    pub external_addressing: ExternalAddressing,

    /// Leading bytes that must all be zero for a region to be rebuilt
    #[arg(long, default_value_t = ZeroProbe::DEFAULT_WINDOW)]
    pub zero_probe: usize,

    /// Also save the raw bytes of every data region under this base path
    #[arg(long)]
    pub dump_region: Option<PathBuf>,

    #[arg(long, help = "Do not dump vtables")]
    pub skip_vtables: bool,

    #[arg(long, help = "Do not dump type_info objects")]
    pub skip_typeinfo: bool,
}

impl Config {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            external_addressing: self.external_addressing,
            zero_probe: ZeroProbe {
                window: self.zero_probe,
            },
        }
    }
}
