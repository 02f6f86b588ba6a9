/**
 * EXIF Writer module - stamps a capture time into JPEG files
 *
 * The TIFF/EXIF payload is built with kamadak-exif's writer and spliced into
 * the JPEG as an APP1 "Exif" segment directly after SOI. Any Exif APP1
 * segment already present is dropped; all other segments are kept byte for
 * byte.
 */

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use exif::experimental::Writer;
use exif::{Field, In, Tag, Value};
use log::debug;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::exif::EXIF_DATETIME_FORMAT;

const MARKER_PREFIX: u8 = 0xFF;
const SOI: u8 = 0xD8;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;
const APP1: u8 = 0xE1;
const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Write `DateTimeOriginal` and `DateTime` into a JPEG file
///
/// With `backup`, the untouched original is kept next to it as `<name>.bak`.
pub fn write_capture_time(file_path: &Path, timestamp: &NaiveDateTime, backup: bool) -> Result<()> {
    debug!("Writing capture time {} to {}", timestamp, file_path.display());

    let jpeg = fs::read(file_path)
        .with_context(|| format!("Failed to read {}", file_path.display()))?;
    let tiff = build_tiff_payload(timestamp)?;
    let stamped = splice_exif_segment(&jpeg, &tiff)?;

    if backup {
        let backup_path = backup_path(file_path);
        fs::copy(file_path, &backup_path)
            .with_context(|| format!("Failed to create backup {}", backup_path.display()))?;
        debug!("Backup written to {}", backup_path.display());
    }

    fs::write(file_path, stamped)
        .with_context(|| format!("Failed to write {}", file_path.display()))?;
    Ok(())
}

fn backup_path(file_path: &Path) -> PathBuf {
    let mut name = file_path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Serialize the date fields as a little-endian TIFF structure
fn build_tiff_payload(timestamp: &NaiveDateTime) -> Result<Vec<u8>> {
    let formatted = timestamp.format(EXIF_DATETIME_FORMAT).to_string();
    let ascii = || Value::Ascii(vec![formatted.as_bytes().to_vec()]);

    let original = Field {
        tag: Tag::DateTimeOriginal,
        ifd_num: In::PRIMARY,
        value: ascii(),
    };
    let modified = Field {
        tag: Tag::DateTime,
        ifd_num: In::PRIMARY,
        value: ascii(),
    };

    let mut writer = Writer::new();
    writer.push_field(&modified);
    writer.push_field(&original);

    let mut buf = Cursor::new(Vec::new());
    writer
        .write(&mut buf, true)
        .context("Failed to serialize EXIF data")?;
    Ok(buf.into_inner())
}

/// Rebuild a JPEG with `tiff` as its only Exif APP1 segment
fn splice_exif_segment(jpeg: &[u8], tiff: &[u8]) -> Result<Vec<u8>> {
    if jpeg.len() < 2 || jpeg[0] != MARKER_PREFIX || jpeg[1] != SOI {
        anyhow::bail!("Not a JPEG file (missing SOI marker)");
    }

    let segment_len = EXIF_HEADER.len() + tiff.len() + 2;
    let segment_len = u16::try_from(segment_len).context("EXIF payload too large for APP1")?;

    let mut out = Vec::with_capacity(jpeg.len() + segment_len as usize + 2);
    out.extend_from_slice(&[MARKER_PREFIX, SOI, MARKER_PREFIX, APP1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(EXIF_HEADER);
    out.extend_from_slice(tiff);

    let mut pos = 2;
    while pos + 4 <= jpeg.len() {
        if jpeg[pos] != MARKER_PREFIX {
            anyhow::bail!("Corrupt JPEG: expected marker at offset {}", pos);
        }
        let marker = jpeg[pos + 1];
        if marker == SOS || marker == EOI {
            break;
        }
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let end = pos + 2 + len;
        if len < 2 || end > jpeg.len() {
            anyhow::bail!("Corrupt JPEG: segment at offset {} overruns file", pos);
        }
        let payload = &jpeg[pos + 4..end];
        if !(marker == APP1 && payload.starts_with(EXIF_HEADER)) {
            out.extend_from_slice(&jpeg[pos..end]);
        }
        pos = end;
    }

    // Entropy-coded data and everything after it is copied as is
    out.extend_from_slice(&jpeg[pos.min(jpeg.len())..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::DateResolver;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample_jpeg(path: &Path) {
        let img = image::RgbImage::from_fn(8, 8, |x, y| {
            image::Rgb([(x * 30) as u8, (y * 30) as u8, 0])
        });
        img.save(path).unwrap();
    }

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, s).unwrap()
    }

    #[test]
    fn test_stamp_then_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("undated.jpg");
        sample_jpeg(&path);

        write_capture_time(&path, &ts(2021, 6, 7, 8, 9, 10), false).unwrap();

        let read = DateResolver::new().read_capture_time(&path).unwrap();
        assert_eq!(read, ts(2021, 6, 7, 8, 9, 10));
        // Still decodes as an image
        image::open(&path).unwrap();
    }

    #[test]
    fn test_restamp_replaces_previous_segment() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo.jpg");
        sample_jpeg(&path);

        write_capture_time(&path, &ts(2020, 1, 1, 0, 0, 0), false).unwrap();
        let first_len = fs::metadata(&path).unwrap().len();
        write_capture_time(&path, &ts(2022, 2, 2, 2, 2, 2), false).unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), first_len);
        let read = DateResolver::new().read_capture_time(&path).unwrap();
        assert_eq!(read, ts(2022, 2, 2, 2, 2, 2));
    }

    #[test]
    fn test_backup_keeps_original_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo.jpg");
        sample_jpeg(&path);
        let original = fs::read(&path).unwrap();

        write_capture_time(&path, &ts(2020, 1, 1, 0, 0, 0), true).unwrap();

        let backup = temp_dir.path().join("photo.jpg.bak");
        assert_eq!(fs::read(backup).unwrap(), original);
        assert_ne!(fs::read(&path).unwrap(), original);
    }

    #[test]
    fn test_rejects_non_jpeg() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fake.jpg");
        fs::write(&path, b"GIF89a....").unwrap();

        assert!(write_capture_time(&path, &ts(2020, 1, 1, 0, 0, 0), false).is_err());
        assert_eq!(fs::read(&path).unwrap(), b"GIF89a....");
    }
}
