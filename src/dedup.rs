/**
 * Duplicate detection over a flat directory
 *
 * Images are compared by perceptual fingerprint (rotation invariant, Hamming
 * distance threshold), videos by exact content digest. Of each duplicate
 * pair the lexicographically greater name is deleted.
 */

use anyhow::{Context, Result};
use image_hasher::ImageHash;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::SortError;
use crate::file_ops::list_files;
use crate::hashing::{
    load_image, rotation_fingerprints, ContentDigest, ContentHasher, DctFingerprinter,
    ImageFingerprinter,
};
use crate::naming::MediaKind;
use crate::progress::{percent, CancelFlag, LogCode, Reporter};

/// Default maximum Hamming distance for two 64-bit fingerprints to match
pub const DEFAULT_SIMILARITY_THRESHOLD: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupReport {
    pub scanned: usize,
    pub removed: Vec<String>,
    pub errors: usize,
    pub cancelled: bool,
}

impl DedupReport {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}

/// Outcome of comparing one candidate against the retained set
enum Verdict {
    Unique,
    DuplicateOf(String),
}

pub struct DuplicateDetector {
    threshold: u32,
    fingerprinter: Box<dyn ImageFingerprinter>,
    content_hasher: ContentHasher,
}

impl DuplicateDetector {
    pub fn new(threshold: u32) -> Self {
        Self::with_fingerprinter(threshold, Box::new(DctFingerprinter::new()))
    }

    pub fn with_fingerprinter(threshold: u32, fingerprinter: Box<dyn ImageFingerprinter>) -> Self {
        Self {
            threshold,
            fingerprinter,
            content_hasher: ContentHasher::new(),
        }
    }

    /// Delete near-duplicate images and identical videos from `directory`
    ///
    /// Files are visited in name order. Deletions are applied as they are
    /// found and stay applied if the run is cancelled.
    pub fn remove_duplicates(
        &self,
        directory: &Path,
        reporter: &Reporter,
        cancel: &CancelFlag,
    ) -> Result<DedupReport, SortError> {
        let files = list_files(directory)?;
        let total = files.len();
        info!("Searching duplicates among {} files in {}", total, directory.display());

        // Insertion-ordered so the first matching entry wins
        let mut images: Vec<(String, ImageHash)> = Vec::new();
        let mut videos: HashMap<ContentDigest, String> = HashMap::new();
        let mut report = DedupReport::default();

        for (index, name) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let path = directory.join(name);
            match MediaKind::from_path(&path) {
                Some(MediaKind::Image) => {
                    log_search(reporter, name);
                    let result =
                        self.process_image(directory, name, &mut images, reporter, &mut report);
                    if let Err(e) = result {
                        warn!("Image dedup failed for {}: {:#}", name, e);
                        log_unreadable(reporter, name, &e);
                        report.errors += 1;
                    }
                }
                Some(MediaKind::Video) => {
                    log_search(reporter, name);
                    let result =
                        self.process_video(directory, name, &mut videos, reporter, &mut report);
                    if let Err(e) = result {
                        warn!("Video dedup failed for {}: {:#}", name, e);
                        log_unreadable(reporter, name, &e);
                        report.errors += 1;
                    }
                }
                None => debug!("Skipping unsupported file {}", name),
            }

            report.scanned += 1;
            reporter.progress(percent(index + 1, total));
        }

        info!(
            "Duplicate search finished: {} scanned, {} removed",
            report.scanned,
            report.removed_count()
        );
        Ok(report)
    }

    fn process_image(
        &self,
        directory: &Path,
        name: &str,
        seen: &mut Vec<(String, ImageHash)>,
        reporter: &Reporter,
        report: &mut DedupReport,
    ) -> Result<()> {
        let image = load_image(&directory.join(name))?;
        let candidates = rotation_fingerprints(self.fingerprinter.as_ref(), &image);

        let verdict = seen
            .iter()
            .find(|(_, prior)| {
                candidates
                    .iter()
                    .any(|hash| self.fingerprinter.distance(hash, prior) <= self.threshold)
            })
            .map_or(Verdict::Unique, |(prior_name, _)| Verdict::DuplicateOf(prior_name.clone()));

        let [upright, ..] = candidates;
        match verdict {
            Verdict::Unique => seen.push((name.to_string(), upright)),
            Verdict::DuplicateOf(prior) => {
                let loser = delete_greater(directory, name, &prior, "similar to", reporter)?;
                if loser == prior {
                    seen.retain(|(n, _)| n != &prior);
                    seen.push((name.to_string(), upright));
                }
                report.removed.push(loser);
            }
        }
        Ok(())
    }

    fn process_video(
        &self,
        directory: &Path,
        name: &str,
        seen: &mut HashMap<ContentDigest, String>,
        reporter: &Reporter,
        report: &mut DedupReport,
    ) -> Result<()> {
        let digest = self.content_hasher.calculate_file_hash(&directory.join(name))?;

        match seen.get(&digest).cloned() {
            None => {
                seen.insert(digest, name.to_string());
            }
            Some(prior) => {
                let loser = delete_greater(directory, name, &prior, "identical to", reporter)?;
                if loser == prior {
                    seen.insert(digest, name.to_string());
                }
                report.removed.push(loser);
            }
        }
        Ok(())
    }
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

fn log_search(reporter: &Reporter, name: &str) {
    reporter.log(LogCode::Search, &format!("searching duplicates of {}", name), None);
}

fn log_unreadable(reporter: &Reporter, name: &str, err: &anyhow::Error) {
    reporter.log(
        LogCode::Error,
        &format!("Unable to analyse {}", name),
        Some(&format!("{:#}", err)),
    );
}

/// Hard-delete the greater of the two names and return it
fn delete_greater(
    directory: &Path,
    candidate: &str,
    prior: &str,
    relation: &str,
    reporter: &Reporter,
) -> Result<String> {
    let (loser, keeper) = if candidate > prior {
        (candidate, prior)
    } else {
        (prior, candidate)
    };

    let loser_path = directory.join(loser);
    fs::remove_file(&loser_path)
        .with_context(|| format!("Failed to delete {}", loser_path.display()))?;
    debug!("Deleted duplicate {} (kept {})", loser, keeper);

    reporter.log(
        LogCode::Duplicate,
        &format!("{} deleted", loser),
        Some(&format!("{} {}", relation, keeper)),
    );
    Ok(loser.to_string())
}
