/**
 * File naming module: filename normalization and the canonical name grammar
 *
 * Canonical form: {IMG|VID}YYYYMMDDHHMMSS[_NN].{jpg|mp4}
 */

use chrono::NaiveDateTime;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static FOURTEEN_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{14}").expect("valid regex"));

static DATE_HOUR_MINUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})-(\d{2})-(\d{2})_(\d{2})-(\d{2})").expect("valid regex")
});

static DATE_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("valid regex"));

static PHOTO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^IMG(\d{4})\d{10}(?:_\d{2})?\.jpg$").expect("valid regex")
});

static VIDEO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^VID(\d{4})\d{10}(?:_\d{2})?\.mp4$").expect("valid regex")
});

/// The two media kinds the sorter handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Kind from a file extension, case-insensitive; `None` for unsupported
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_lowercase().as_str() {
            "jpg" => Some(MediaKind::Image),
            "mp4" => Some(MediaKind::Video),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            MediaKind::Image => "IMG",
            MediaKind::Video => "VID",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
        }
    }
}

/// A file name already in canonical form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalName {
    pub kind: MediaKind,
    pub year: String,
}

impl CanonicalName {
    /// Recognize `IMG{14 digits}[_NN].jpg` or `VID{14 digits}[_NN].mp4`
    pub fn parse(file_name: &str) -> Option<Self> {
        if let Some(caps) = PHOTO_PATTERN.captures(file_name) {
            return Some(Self {
                kind: MediaKind::Image,
                year: caps[1].to_string(),
            });
        }
        VIDEO_PATTERN.captures(file_name).map(|caps| Self {
            kind: MediaKind::Video,
            year: caps[1].to_string(),
        })
    }
}

/// Build `{PREFIX}{YYYYMMDDHHMMSS}.{ext}` from a resolved timestamp
pub fn canonical_name(kind: MediaKind, timestamp: &NaiveDateTime) -> String {
    format!(
        "{}{}.{}",
        kind.prefix(),
        timestamp.format("%Y%m%d%H%M%S"),
        kind.extension()
    )
}

fn split_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => (&file_name[..idx], &file_name[idx + 1..]),
        _ => (file_name, ""),
    }
}

pub struct FilenameNormalizer;

impl FilenameNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Rewrite a file name into canonical form when it carries a date token
    ///
    /// `siblings` are the names currently present in the directory being
    /// normalized; they feed the `_N0001` counter of date-only names.
    /// Names without a date token, and files of unsupported kinds, come back
    /// unchanged.
    pub fn normalize(&self, file_name: &str, siblings: &[String]) -> String {
        let (base, extension) = split_name(file_name);
        let Some(kind) = MediaKind::from_extension(extension) else {
            return file_name.to_string();
        };
        let prefix = kind.prefix();
        let ext = extension.to_lowercase();

        if let Some(digits) = FOURTEEN_DIGITS.find(base) {
            return format!("{}{}.{}", prefix, digits.as_str(), ext);
        }

        if let Some(caps) = DATE_HOUR_MINUTE.captures(base) {
            return format!(
                "{}{}{}{}{}{}00.{}",
                prefix, &caps[1], &caps[2], &caps[3], &caps[4], &caps[5], ext
            );
        }

        if let Some(caps) = DATE_ONLY.captures(base) {
            let date_key = format!("{}{}{}{}", prefix, &caps[1], &caps[2], &caps[3]);
            let counter_prefix = format!("{}_N", date_key);
            let suffix = format!(".{}", ext);
            let existing = siblings
                .iter()
                .filter(|name| name.starts_with(&counter_prefix) && name.ends_with(&suffix))
                .count();
            return format!("{}_N{:04}.{}", date_key, existing + 1, ext);
        }

        file_name.to_string()
    }
}

impl Default for FilenameNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn normalize(name: &str) -> String {
        FilenameNormalizer::new().normalize(name, &[])
    }

    #[test]
    fn test_fourteen_digit_run_is_rebuilt() {
        assert_eq!(normalize("20240913_235959.jpg"), "20240913_235959.jpg");
        assert_eq!(normalize("PXL_20240913235959123.jpg"), "IMG20240913235959.jpg");
        assert_eq!(normalize("IMG20240913235959_01.jpg"), "IMG20240913235959.jpg");
        assert_eq!(normalize("Screenrecorder-20230102030405.MP4"), "VID20230102030405.mp4");
    }

    #[test]
    fn test_fourteen_digit_run_is_idempotent() {
        for name in [
            "IMG20240913235959 (2).jpg",
            "VID_20230102030405_copy.mp4",
            "signal-202401020304050607.jpg",
        ] {
            let once = normalize(name);
            assert_eq!(normalize(&once), once, "not idempotent for {}", name);
        }
    }

    #[test]
    fn test_date_hour_minute_defaults_seconds() {
        assert_eq!(normalize("photo 2024-01-02_10-11.jpg"), "IMG20240102101100.jpg");
        assert_eq!(normalize("2019-12-31_23-59 clip.mp4"), "VID20191231235900.mp4");
    }

    #[test]
    fn test_date_only_uses_sibling_counter() {
        let normalizer = FilenameNormalizer::new();
        assert_eq!(
            normalizer.normalize("holiday 2024-07-14.jpg", &[]),
            "IMG20240714_N0001.jpg"
        );

        let siblings = vec![
            "IMG20240714_N0001.jpg".to_string(),
            "IMG20240714_N0002.jpg".to_string(),
            "VID20240714_N0001.mp4".to_string(),
            "IMG20240715_N0001.jpg".to_string(),
        ];
        assert_eq!(
            normalizer.normalize("beach 2024-07-14.jpg", &siblings),
            "IMG20240714_N0003.jpg"
        );
        assert_eq!(
            normalizer.normalize("beach 2024-07-14.mp4", &siblings),
            "VID20240714_N0002.mp4"
        );
    }

    #[test]
    fn test_names_without_date_token_are_unchanged() {
        assert_eq!(normalize("photo.jpg"), "photo.jpg");
        assert_eq!(normalize("IMG_1234.JPG"), "IMG_1234.JPG");
        assert_eq!(normalize("noextension"), "noextension");
    }

    #[test]
    fn test_unsupported_extensions_are_unchanged() {
        assert_eq!(normalize("clip20240913235959.avi"), "clip20240913235959.avi");
        assert_eq!(normalize("scan 2024-01-02.png"), "scan 2024-01-02.png");
    }

    #[test]
    fn test_canonical_name_parse() {
        let photo = CanonicalName::parse("IMG20240913235959.jpg").unwrap();
        assert_eq!(photo.kind, MediaKind::Image);
        assert_eq!(photo.year, "2024");

        let burst = CanonicalName::parse("img20230102030405_07.JPG").unwrap();
        assert_eq!(burst.kind, MediaKind::Image);
        assert_eq!(burst.year, "2023");

        let video = CanonicalName::parse("VID20220101000000.mp4").unwrap();
        assert_eq!(video.kind, MediaKind::Video);
        assert_eq!(video.year, "2022");

        assert!(CanonicalName::parse("IMG20240714_N0001.jpg").is_none());
        assert!(CanonicalName::parse("IMG2024091323595.jpg").is_none());
        assert!(CanonicalName::parse("VID20240913235959.jpg").is_none());
        assert!(CanonicalName::parse("IMG20240913235959.mp4").is_none());
    }

    #[test]
    fn test_canonical_name_from_timestamp() {
        let ts = NaiveDate::from_ymd_opt(2023, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(canonical_name(MediaKind::Image, &ts), "IMG20230102030405.jpg");
        assert_eq!(canonical_name(MediaKind::Video, &ts), "VID20230102030405.mp4");
    }

    #[test]
    fn test_media_kind_from_path() {
        assert_eq!(MediaKind::from_path(Path::new("a/b.JPG")), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_path(Path::new("b.mp4")), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path(Path::new("b.jpeg")), None);
        assert_eq!(MediaKind::from_path(Path::new("b")), None);
    }
}
