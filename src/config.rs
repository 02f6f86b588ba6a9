/**
 * Run configuration
 *
 * Everything the driver needs is passed in explicitly; there is no
 * process-wide state.
 */

use std::path::{Path, PathBuf};

use crate::dedup::DEFAULT_SIMILARITY_THRESHOLD;

/// Name of the quarantine subdirectory created inside the staging directory
pub const QUARANTINE_DIR_NAME: &str = "Erreur_tri";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortConfig {
    pub staging_dir: PathBuf,
    pub photos_root: PathBuf,
    pub videos_root: PathBuf,
    /// Maximum Hamming distance between two image fingerprints to call them duplicates
    pub similarity_threshold: u32,
    pub quarantine_dir_name: String,
}

impl SortConfig {
    pub fn new(
        staging_dir: impl Into<PathBuf>,
        photos_root: impl Into<PathBuf>,
        videos_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            photos_root: photos_root.into(),
            videos_root: videos_root.into(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            quarantine_dir_name: QUARANTINE_DIR_NAME.to_string(),
        }
    }

    pub fn with_similarity_threshold(mut self, threshold: u32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.staging_dir.join(&self.quarantine_dir_name)
    }
}

/// Default library locations under the user's picture and video folders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultPaths {
    pub staging_dir: PathBuf,
    pub photos_root: PathBuf,
    pub videos_root: PathBuf,
}

impl DefaultPaths {
    /// Resolve from the platform's Pictures/Videos folders, or `None` when
    /// the home directory is unknown
    pub fn resolve() -> Option<Self> {
        let home = dirs::home_dir()?;
        let pictures = dirs::picture_dir().unwrap_or_else(|| home.join("Pictures"));
        let videos = dirs::video_dir().unwrap_or_else(|| home.join("Videos"));
        Some(Self::under(&pictures, &videos))
    }

    pub fn under(pictures: &Path, videos: &Path) -> Self {
        Self {
            staging_dir: pictures.join("Memorease_Downloads"),
            photos_root: pictures.join("Photos"),
            videos_root: videos.join("Mes videos"),
        }
    }
}
