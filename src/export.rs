//! JSON output.
//!
//! A dump `<base>` produces `<base>.vftable.json` and `<base>.typeinfo.json`, each holding a
//! [`Dump`] document. Empty dumps write nothing.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::engine::Dump;
use crate::relocation::ReconstructedBuffer;

/// Output file paths derived from one base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub vtables: PathBuf,
    pub type_info: PathBuf,
}

impl OutputPaths {
    /// A trailing `.json` on `base` is dropped first.
    pub fn new(base: &Path) -> Self {
        let base = base.to_string_lossy();
        let base = base.strip_suffix(".json").unwrap_or(&base);
        Self {
            vtables: PathBuf::from(format!("{}.vftable.json", base)),
            type_info: PathBuf::from(format!("{}.typeinfo.json", base)),
        }
    }
}

/// Writes `dump` as pretty JSON. Returns `false` without touching the file system when it
/// has no records.
pub fn write_dump<T: Serialize>(path: &Path, dump: &Dump<T>) -> Result<bool> {
    if dump.records.is_empty() {
        tracing::info!("Nothing to write to {}.", path.display());
        return Ok(false);
    }
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, dump)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    writer.flush()?;
    tracing::info!("Saved {} record(s) to {}.", dump.records.len(), path.display());
    Ok(true)
}

/// Saves the raw bytes of every region next to `base`, one file per region.
pub fn write_regions(base: &Path, regions: &[ReconstructedBuffer]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(regions.len());
    for region in regions {
        let suffix: String = region
            .name()
            .trim_start_matches(['.', '_'])
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let path = PathBuf::from(format!("{}.{}", base.display(), suffix));
        fs::write(&path, region.bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(
            "Dumped region '{}' ({:#x} bytes) to {}.",
            region.name(),
            region.bytes().len(),
            path.display()
        );
        written.push(path);
    }
    Ok(written)
}
