/**
 * Capture date resolution
 *
 * Lookup order:
 * 1. EXIF DateTimeOriginal (images only)
 * 2. EXIF DateTime (images only)
 * 3. File modification time
 */

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use exif::{In, Reader as ExifReader, Tag, Value};
use log::debug;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::naming::MediaKind;

/// Timestamp layout used by EXIF ASCII date fields
pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Capture-time tags, most specific first
const CAPTURE_TAGS: [Tag; 2] = [Tag::DateTimeOriginal, Tag::DateTime];

/// Source of capture timestamps for files that carry no date in their name
pub trait ResolveDate {
    fn resolve(&self, file_path: &Path, kind: MediaKind) -> Option<NaiveDateTime>;
}

pub struct DateResolver;

impl ResolveDate for DateResolver {
    /// Best-effort capture timestamp for a file, `None` when undated
    ///
    /// Metadata problems are never errors here: a missing or corrupt EXIF
    /// block simply falls through to the file modification time.
    fn resolve(&self, file_path: &Path, kind: MediaKind) -> Option<NaiveDateTime> {
        if kind == MediaKind::Image {
            match self.read_capture_time(file_path) {
                Ok(dt) => return Some(dt),
                Err(e) => {
                    debug!("No EXIF date for {}: {:#}", file_path.display(), e);
                }
            }
        }

        match self.read_file_mtime(file_path) {
            Ok(dt) => Some(dt),
            Err(e) => {
                debug!("No modification time for {}: {:#}", file_path.display(), e);
                None
            }
        }
    }
}

impl DateResolver {
    pub fn new() -> Self {
        Self
    }

    /// Read the capture timestamp from embedded EXIF metadata
    pub fn read_capture_time(&self, file_path: &Path) -> Result<NaiveDateTime> {
        let file = File::open(file_path).context("Failed to open file for EXIF")?;
        let mut bufreader = BufReader::new(&file);

        let exif = ExifReader::new()
            .read_from_container(&mut bufreader)
            .context("Failed to read EXIF data")?;

        for tag in CAPTURE_TAGS {
            let Some(field) = exif.get_field(tag, In::PRIMARY) else {
                continue;
            };
            let Value::Ascii(ref values) = field.value else {
                continue;
            };
            // The first tag present decides; a malformed value is not retried
            // against the next tag.
            let raw = values.first().context("Empty EXIF date field")?;
            return parse_exif_datetime(&String::from_utf8_lossy(raw));
        }

        anyhow::bail!("No capture date tag in EXIF data");
    }

    fn read_file_mtime(&self, file_path: &Path) -> Result<NaiveDateTime> {
        let metadata = std::fs::metadata(file_path).context("Failed to read file metadata")?;
        let mtime = metadata
            .modified()
            .context("Failed to get file modification time")?;
        Ok(DateTime::<Local>::from(mtime).naive_local())
    }
}

impl Default for DateResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `YYYY:MM:DD HH:MM:SS`, tolerating surrounding whitespace and NULs
pub fn parse_exif_datetime(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    NaiveDateTime::parse_from_str(value, EXIF_DATETIME_FORMAT)
        .with_context(|| format!("Failed to parse EXIF timestamp '{}'", value))
}
