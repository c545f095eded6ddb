//! Shared "maybe gzipped" text reader used by every small TSV parser in
//! this adapter. Mirrors the teacher's `input::cache::open_maybe_gz`
//! helper but decodes through `flate2` instead of shelling out to the
//! `gzip` binary, and mmaps the plain-text path instead of buffering it.

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;

use flate2::read::GzDecoder;
use memmap2::Mmap;

use crate::error::{CoreError, Result};

pub fn open_maybe_gz(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        let decoder = GzDecoder::new(file);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        // SAFETY: the file is not mutated concurrently by this process;
        // adapter instances own their input directory for the run.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| CoreError::InvalidInput { message: e.to_string() })?;
        Ok(Box::new(BufReader::new(Cursor::new(mmap))))
    }
}
