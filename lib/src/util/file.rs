use std::{fs::File, path::Path};

use anyhow::{Context, Result};
use memmap2::{Mmap, MmapOptions};

/// Memory-maps a file read-only.
pub fn map_file<P: AsRef<Path>>(path: P) -> Result<Mmap> {
    let file = File::open(&path)
        .with_context(|| format!("failed to open '{}'", path.as_ref().display()))?;
    let map = unsafe { MmapOptions::new().map(&file) }
        .with_context(|| format!("failed to memory-map '{}'", path.as_ref().display()))?;
    Ok(map)
}
