//! Tar-gzip side channel for bulky weight blobs
//!
//! Compression swaps the raw file for a `.tar.gz` holding it as the only
//! member; extraction is the symmetric inverse. Callers own the lifecycle
//! of the extracted file.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};

use crate::error::{ForecastError, Result};

/// Pack `file` into `<stem>.tar.gz` next to it, then delete the original.
pub fn compress(file: &Path) -> Result<PathBuf> {
    let member_name = file.file_name().ok_or_else(|| {
        ForecastError::Persistence(format!("'{}' has no file name to archive", file.display()))
    })?;
    let archive_path = file.with_extension("tar.gz");

    let gz = GzEncoder::new(File::create(&archive_path)?, Compression::default());
    let mut builder = Builder::new(gz);
    builder.append_path_with_name(file, member_name)?;
    builder.into_inner()?.finish()?;

    fs::remove_file(file)?;
    Ok(archive_path)
}

/// Unpack every member of `archive` into `directory`.
pub fn extract(archive: &Path, directory: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| {
        ForecastError::Persistence(format!(
            "cannot open weight archive '{}': {e}",
            archive.display()
        ))
    })?;
    let mut tar = Archive::new(GzDecoder::new(BufReader::new(file)));
    tar.unpack(directory)?;
    Ok(())
}
