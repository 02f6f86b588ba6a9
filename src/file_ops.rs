/**
 * File operations module: the three-phase sort of a staging directory
 *
 * 1. rename: normalize every file name in place
 * 2. dedup: delete near-duplicate images and identical videos
 * 3. classify: move each file to {library}/{year}/{canonical name}, or to
 *    the quarantine subdirectory when it cannot be dated or moved
 */

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::SortConfig;
use crate::dedup::DuplicateDetector;
use crate::error::SortError;
use crate::exif::{DateResolver, ResolveDate};
use crate::naming::{canonical_name, CanonicalName, FilenameNormalizer, MediaKind};
use crate::progress::{percent, CancelFlag, LogCode, Reporter};

/// Names of the regular files directly inside `directory`, sorted
pub fn list_files(directory: &Path) -> Result<Vec<String>, SortError> {
    let mut names = Vec::new();

    for entry in WalkDir::new(directory).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(SortError::ReadDir {
                    path: directory.to_path_buf(),
                    source: e.into(),
                });
            }
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", directory.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.file_name().to_str() {
            Some(name) => names.push(name.to_string()),
            None => warn!("Skipping non UTF-8 file name: {}", entry.path().display()),
        }
    }

    names.sort();
    Ok(names)
}

/// Move a file, creating the destination directory and never overwriting
///
/// Falls back to copy + delete when source and destination are on different
/// devices.
pub fn move_file(source_path: &Path, target_path: &Path) -> Result<()> {
    debug!("Moving '{}' -> '{}'", source_path.display(), target_path.display());

    if !source_path.exists() {
        anyhow::bail!("Source file does not exist: {}", source_path.display());
    }
    if target_path.exists() {
        anyhow::bail!("Destination already exists: {}", target_path.display());
    }

    if let Some(parent) = target_path.parent() {
        if !parent.exists() {
            debug!("Creating target directory: {}", parent.display());
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create target directory: {}", parent.display())
            })?;
        }
    }

    match fs::rename(source_path, target_path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            debug!("Cross-device move detected, using copy+delete strategy");
            copy_then_remove(source_path, target_path, |path| fs::remove_file(path))
        }
        Err(e) => Err(e).with_context(|| {
            format!(
                "Failed to move file from '{}' to '{}'",
                source_path.display(),
                target_path.display()
            )
        }),
    }
}

/// Copy, then remove the source with `remove_source`
///
/// On any failure the copy is deleted again so the file only ever exists at
/// the source.
fn copy_then_remove<F>(source_path: &Path, target_path: &Path, remove_source: F) -> Result<()>
where
    F: FnOnce(&Path) -> std::io::Result<()>,
{
    let result = fs::copy(source_path, target_path)
        .with_context(|| {
            format!(
                "Failed to copy file from '{}' to '{}'",
                source_path.display(),
                target_path.display()
            )
        })
        .and_then(|_| {
            remove_source(source_path).with_context(|| {
                format!("Failed to remove original file: {}", source_path.display())
            })
        });

    if result.is_err() && target_path.exists() {
        if let Err(e) = fs::remove_file(target_path) {
            warn!("Could not remove partial copy {}: {}", target_path.display(), e);
        }
    }
    result
}

/// Rename inside one directory; an existing target is a collision error
fn rename_in_place(directory: &Path, from: &str, to: &str) -> Result<()> {
    let target = directory.join(to);
    if target.exists() {
        anyhow::bail!("{} already exists", to);
    }
    fs::rename(directory.join(from), &target)
        .with_context(|| format!("Failed to rename {} to {}", from, to))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunStatus {
    #[default]
    Completed,
    Interrupted,
    Aborted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortOutcome {
    pub status: RunStatus,
    pub renamed: usize,
    pub duplicates_removed: usize,
    pub moved: usize,
    pub quarantined: usize,
    pub ignored: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameReport {
    pub renamed: Vec<(String, String)>,
    pub unchanged: usize,
    pub errors: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifyReport {
    pub moved: Vec<PathBuf>,
    pub in_place: usize,
    pub quarantined: Vec<String>,
    pub ignored: Vec<String>,
    pub errors: usize,
    pub cancelled: bool,
}

/// Where a staging file belongs
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Library { target: PathBuf },
    Undated,
    Unsupported,
}

pub struct SortDriver {
    config: SortConfig,
    normalizer: FilenameNormalizer,
    resolver: Box<dyn ResolveDate>,
    detector: DuplicateDetector,
}

impl SortDriver {
    pub fn new(config: SortConfig) -> Self {
        let detector = DuplicateDetector::new(config.similarity_threshold);
        Self::with_detector(config, detector)
    }

    pub fn with_detector(config: SortConfig, detector: DuplicateDetector) -> Self {
        Self {
            config,
            normalizer: FilenameNormalizer::new(),
            resolver: Box::new(DateResolver::new()),
            detector,
        }
    }

    /// Replace the EXIF/mtime date lookup used for undated names
    pub fn with_resolver(mut self, resolver: Box<dyn ResolveDate>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Run rename, dedup and classify over the staging directory
    ///
    /// Nothing is raised to the caller: every condition, including a missing
    /// staging directory, is reported through `reporter`. The returned
    /// outcome mirrors what was logged.
    pub fn sort_and_save(&self, reporter: &Reporter, cancel: &CancelFlag) -> SortOutcome {
        let mut outcome = SortOutcome::default();
        let staging = &self.config.staging_dir;

        if !staging.is_dir() {
            let err = SortError::StagingMissing(staging.clone());
            warn!("{}", err);
            reporter.log(
                LogCode::Error,
                "Staging directory not found",
                Some(&staging.display().to_string()),
            );
            outcome.status = RunStatus::Aborted;
            return outcome;
        }

        info!("Sorting {}", staging.display());

        reporter.log(LogCode::Info, "Step 1: renaming files...", None);
        let renames = match self.rename_phase(reporter, cancel) {
            Ok(report) => report,
            Err(e) => return self.abort(reporter, outcome, &e),
        };
        outcome.renamed = renames.renamed.len();
        outcome.errors += renames.errors;
        if renames.cancelled {
            return self.interrupt(reporter, outcome);
        }

        reporter.log(LogCode::Info, "Step 2: searching duplicates...", None);
        reporter.progress(0);
        let dedup = match self.detector.remove_duplicates(staging, reporter, cancel) {
            Ok(report) => report,
            Err(e) => return self.abort(reporter, outcome, &e),
        };
        outcome.duplicates_removed = dedup.removed_count();
        outcome.errors += dedup.errors;
        if dedup.cancelled {
            return self.interrupt(reporter, outcome);
        }

        reporter.log(LogCode::Info, "Step 3: sorting files...", None);
        let classified = match self.classify_phase(reporter, cancel) {
            Ok(report) => report,
            Err(e) => return self.abort(reporter, outcome, &e),
        };
        outcome.moved = classified.moved.len();
        outcome.quarantined = classified.quarantined.len();
        outcome.ignored = classified.ignored.len();
        outcome.errors += classified.errors;
        if classified.cancelled {
            return self.interrupt(reporter, outcome);
        }

        reporter.progress(100);
        reporter.log(
            LogCode::Done,
            "Processing finished",
            Some(&format!(
                "{} moved, {} duplicates removed, {} quarantined, {} ignored",
                outcome.moved, outcome.duplicates_removed, outcome.quarantined, outcome.ignored
            )),
        );
        info!("Sort finished: {:?}", outcome);
        outcome
    }

    fn interrupt(&self, reporter: &Reporter, mut outcome: SortOutcome) -> SortOutcome {
        info!("Sort interrupted by user");
        reporter.log(LogCode::Stop, "Operation interrupted by user", None);
        outcome.status = RunStatus::Interrupted;
        outcome
    }

    fn abort(&self, reporter: &Reporter, mut outcome: SortOutcome, err: &SortError) -> SortOutcome {
        warn!("Sort aborted: {}", err);
        reporter.log(LogCode::Error, "Processing aborted", Some(&err.to_string()));
        outcome.status = RunStatus::Aborted;
        outcome
    }

    /// Phase 1: normalize file names in place
    pub fn rename_phase(
        &self,
        reporter: &Reporter,
        cancel: &CancelFlag,
    ) -> Result<RenameReport, SortError> {
        let staging = &self.config.staging_dir;
        let files = list_files(staging)?;
        let total = files.len();
        // Names currently on disk, kept in step with each rename
        let mut present = files.clone();
        let mut report = RenameReport::default();

        reporter.progress(0);
        for (index, name) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let new_name = self.normalizer.normalize(name, &present);
            if &new_name == name {
                reporter.log(LogCode::Ok, name, None);
                report.unchanged += 1;
            } else {
                match rename_in_place(staging, name, &new_name) {
                    Ok(()) => {
                        reporter.log(LogCode::Renamed, name, Some(&new_name));
                        if let Some(slot) = present.iter_mut().find(|n| *n == name) {
                            *slot = new_name.clone();
                        }
                        report.renamed.push((name.clone(), new_name));
                    }
                    Err(e) => {
                        warn!("Rename failed for {}: {:#}", name, e);
                        reporter.log(
                            LogCode::Error,
                            &format!("Unable to rename {}", name),
                            Some(&format!("{:#}", e)),
                        );
                        report.errors += 1;
                    }
                }
            }

            reporter.progress(percent(index + 1, total));
        }

        Ok(report)
    }

    /// Phase 3: move every remaining file to its library or to quarantine
    pub fn classify_phase(
        &self,
        reporter: &Reporter,
        cancel: &CancelFlag,
    ) -> Result<ClassifyReport, SortError> {
        let staging = &self.config.staging_dir;
        let files = list_files(staging)?;
        let total = files.len();
        let mut report = ClassifyReport::default();

        reporter.progress(0);
        for (index, name) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let path = staging.join(name);
            match self.route(name, &path) {
                Route::Library { target } if target == path => {
                    reporter.log(LogCode::Ok, &format!("{} already in place", name), None);
                    report.in_place += 1;
                }
                Route::Library { target } => match move_file(&path, &target) {
                    Ok(()) => {
                        reporter.log(
                            LogCode::Move,
                            &format!("{} moved", name),
                            Some(&target.display().to_string()),
                        );
                        report.moved.push(target);
                    }
                    Err(e) => {
                        warn!("Move failed for {}: {:#}", name, e);
                        report.errors += 1;
                        self.quarantine(name, &path, &format!("{:#}", e), reporter, &mut report);
                    }
                },
                Route::Undated => {
                    self.quarantine(name, &path, "no date", reporter, &mut report);
                }
                Route::Unsupported => {
                    reporter.log(LogCode::Ignored, name, Some("unsupported extension"));
                    report.ignored.push(name.clone());
                }
            }

            reporter.progress(percent(index + 1, total));
        }

        self.cleanup_quarantine(!report.quarantined.is_empty());
        Ok(report)
    }

    fn route(&self, name: &str, path: &Path) -> Route {
        if let Some(canonical) = CanonicalName::parse(name) {
            let target = self.library_root(canonical.kind).join(&canonical.year).join(name);
            return Route::Library { target };
        }

        let Some(kind) = MediaKind::from_path(path) else {
            return Route::Unsupported;
        };

        match self.resolver.resolve(path, kind) {
            Some(timestamp) => {
                let year = timestamp.format("%Y").to_string();
                let target = self
                    .library_root(kind)
                    .join(year)
                    .join(canonical_name(kind, &timestamp));
                Route::Library { target }
            }
            None => Route::Undated,
        }
    }

    fn library_root(&self, kind: MediaKind) -> &Path {
        match kind {
            MediaKind::Image => &self.config.photos_root,
            MediaKind::Video => &self.config.videos_root,
        }
    }

    /// Move a file under its current name into the quarantine directory
    fn quarantine(
        &self,
        name: &str,
        path: &Path,
        reason: &str,
        reporter: &Reporter,
        report: &mut ClassifyReport,
    ) {
        let target = self.config.quarantine_dir().join(name);
        report.quarantined.push(name.to_string());

        match move_file(path, &target) {
            Ok(()) => {
                reporter.log(
                    LogCode::Error,
                    &format!("{} moved to {}", name, self.config.quarantine_dir_name),
                    Some(reason),
                );
            }
            Err(e) => {
                warn!("Quarantine failed for {}: {:#}", name, e);
                reporter.log(
                    LogCode::Error,
                    &format!("Failed to move {}", name),
                    Some(&format!("{:#}", e)),
                );
                report.errors += 1;
            }
        }
    }

    /// Drop the quarantine directory when this run put nothing in it
    fn cleanup_quarantine(&self, used: bool) {
        if used {
            return;
        }
        let dir = self.config.quarantine_dir();
        let is_empty = fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            if let Err(e) = fs::remove_dir(&dir) {
                debug!("Could not remove empty quarantine {}: {}", dir.display(), e);
            }
        }
    }
}

/// Sort `config.staging_dir` with the default detector
pub fn sort_and_save(config: SortConfig, reporter: &Reporter, cancel: &CancelFlag) -> SortOutcome {
    SortDriver::new(config).sort_and_save(reporter, cancel)
}
