//! Entry point for itanium-dump.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap` and set up logging.
//! 2. Map the target binary into memory and open it as an image.
//! 3. Run the vtable and type_info dumps and report how much was recovered.
//! 4. Save the results as JSON.
//!
//! Error handling is done via `anyhow`.

use anyhow::{Context, Result};
use clap::Parser;
use memmap2::Mmap;
use std::fs::File;
use tracing_subscriber::EnvFilter;

use itanium_dump::config::Config;
use itanium_dump::engine::{Dump, ReconstructionEngine};
use itanium_dump::export::{self, OutputPaths};
use itanium_dump::image::ObjectImage;

fn main() -> Result<()> {
    let config = Config::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let file = File::open(&config.target)
        .with_context(|| format!("failed to open {}", config.target.display()))?;
    let mmap = unsafe { Mmap::map(&file)? };
    let image = ObjectImage::parse(&mmap)
        .with_context(|| format!("failed to parse {}", config.target.display()))?;

    let engine = ReconstructionEngine::new(&image, config.engine_options())?;
    if let Some(base) = &config.dump_region {
        export::write_regions(base, engine.regions())?;
    }

    let paths = OutputPaths::new(&config.output);
    if !config.skip_vtables {
        let dump = engine.dump_vtables();
        report("vftable(s)", &dump);
        export::write_dump(&paths.vtables, &dump)?;
    }
    if !config.skip_typeinfo {
        let dump = engine.dump_type_info()?;
        report("typeinfo(s)", &dump);
        export::write_dump(&paths.type_info, &dump)?;
    }
    Ok(())
}

fn report<T>(what: &str, dump: &Dump<T>) {
    tracing::info!(
        "Parsed {}: {}/{} ({:.2}%)",
        what,
        dump.parsed,
        dump.total,
        dump.percentage()
    );
}
