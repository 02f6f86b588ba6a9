use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::{Path, PathBuf};

use memorease::config::{DefaultPaths, SortConfig};
use memorease::dedup::{DuplicateDetector, DEFAULT_SIMILARITY_THRESHOLD};
use memorease::exif::EXIF_DATETIME_FORMAT;
use memorease::exif_writer::write_capture_time;
use memorease::file_ops::{RunStatus, SortDriver, SortOutcome};
use memorease::progress::{CancelFlag, Reporter};

#[derive(Parser)]
#[command(name = "memorease")]
#[command(version)]
#[command(about = "Sort downloaded phone photos and videos into yearly libraries")]
#[command(long_about = "Sorts a flat staging folder of photos (.jpg) and videos (.mp4) in three steps:

1. rename: file names carrying a date are rewritten as IMG/VID + YYYYMMDDHHMMSS
2. dedup: near-duplicate images (any rotation) and identical videos are deleted
3. sort: files are moved to <photos>/<year>/ or <videos>/<year>/

Files without a usable date are moved to <staging>/Erreur_tri.
Press Ctrl-C to stop after the current file.")]
struct Cli {
    /// Increase verbosity (-v=INFO, -vv=DEBUG, -vvv=TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rename, deduplicate and sort the staging directory
    Sort {
        /// Staging directory (default: ~/Pictures/Memorease_Downloads)
        #[arg(short, long)]
        staging: Option<PathBuf>,
        /// Photo library root (default: ~/Pictures/Photos)
        #[arg(short, long)]
        photos: Option<PathBuf>,
        /// Video library root (default: ~/Videos/Mes videos)
        #[arg(long)]
        videos: Option<PathBuf>,
        /// Max Hamming distance between image fingerprints to treat them as duplicates
        #[arg(short, long, default_value_t = DEFAULT_SIMILARITY_THRESHOLD)]
        threshold: u32,
    },
    /// Only normalize file names in a directory
    Rename {
        /// Directory to process
        directory: PathBuf,
    },
    /// Only delete duplicates in a directory
    Dedup {
        /// Directory to process
        directory: PathBuf,
        /// Max Hamming distance between image fingerprints to treat them as duplicates
        #[arg(short, long, default_value_t = DEFAULT_SIMILARITY_THRESHOLD)]
        threshold: u32,
    },
    /// Write a capture date into JPEG files
    Stamp {
        /// Files to stamp
        files: Vec<PathBuf>,
        /// Capture time (format: "YYYY-MM-DD HH:MM:SS" or "YYYY:MM:DD HH:MM:SS")
        #[arg(short, long)]
        timestamp: String,
        /// Keep a .bak copy of each file before writing
        #[arg(long)]
        backup: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose)?;

    info!("Starting memorease");

    match cli.command {
        Commands::Sort {
            staging,
            photos,
            videos,
            threshold,
        } => run_sort(staging, photos, videos, threshold),
        Commands::Rename { directory } => run_rename(directory),
        Commands::Dedup { directory, threshold } => run_dedup(directory, threshold),
        Commands::Stamp { files, timestamp, backup } => run_stamp(files, &timestamp, backup),
    }
}

fn setup_logging(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    Ok(())
}

/// Progress bar driven by the core's callbacks; log lines print above it
fn progress_reporter() -> Result<(Reporter, ProgressBar)> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}%")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let log_pb = pb.clone();
    let progress_pb = pb.clone();
    let reporter = Reporter::new(
        move |line| log_pb.println(line),
        move |percent| progress_pb.set_position(u64::from(percent)),
    );
    Ok((reporter, pb))
}

/// Cancel flag tripped by Ctrl-C
fn install_cancel_handler() -> Result<CancelFlag> {
    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || handler_flag.cancel()).context("Failed to install Ctrl-C handler")?;
    Ok(cancel)
}

fn run_sort(
    staging: Option<PathBuf>,
    photos: Option<PathBuf>,
    videos: Option<PathBuf>,
    threshold: u32,
) -> Result<()> {
    let defaults = DefaultPaths::resolve();
    let pick = |given: Option<PathBuf>, default: Option<&PathBuf>, flag: &str| {
        given
            .or_else(|| default.cloned())
            .with_context(|| format!("No default location available, pass --{}", flag))
    };
    let staging = pick(staging, defaults.as_ref().map(|d| &d.staging_dir), "staging")?;
    let photos = pick(photos, defaults.as_ref().map(|d| &d.photos_root), "photos")?;
    let videos = pick(videos, defaults.as_ref().map(|d| &d.videos_root), "videos")?;

    info!(
        "Staging: {}, photos: {}, videos: {}",
        staging.display(),
        photos.display(),
        videos.display()
    );

    let config = SortConfig::new(staging, photos, videos).with_similarity_threshold(threshold);
    let cancel = install_cancel_handler()?;
    let (reporter, pb) = progress_reporter()?;

    let outcome = SortDriver::new(config).sort_and_save(&reporter, &cancel);
    pb.finish_and_clear();

    print_summary(&outcome);
    if outcome.status == RunStatus::Aborted {
        anyhow::bail!("Sort aborted");
    }
    Ok(())
}

fn run_rename(directory: PathBuf) -> Result<()> {
    let config = SortConfig::new(&directory, &directory, &directory);
    let cancel = install_cancel_handler()?;
    let (reporter, pb) = progress_reporter()?;

    let report = SortDriver::new(config).rename_phase(&reporter, &cancel)?;
    pb.finish_and_clear();

    println!("\nRename complete!");
    println!("Files renamed: {}", report.renamed.len());
    println!("Files unchanged: {}", report.unchanged);
    println!("Errors: {}", report.errors);
    if report.cancelled {
        println!("Interrupted by user");
    }
    Ok(())
}

fn run_dedup(directory: PathBuf, threshold: u32) -> Result<()> {
    let cancel = install_cancel_handler()?;
    let (reporter, pb) = progress_reporter()?;

    let report =
        DuplicateDetector::new(threshold).remove_duplicates(&directory, &reporter, &cancel)?;
    pb.finish_and_clear();

    println!("\nDuplicate search complete!");
    println!("Files scanned: {}", report.scanned);
    println!("Duplicates deleted: {}", report.removed_count());
    println!("Errors: {}", report.errors);
    if report.cancelled {
        println!("Interrupted by user");
    }
    Ok(())
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, EXIF_DATETIME_FORMAT))
        .with_context(|| format!("Invalid timestamp '{}'. Use YYYY-MM-DD HH:MM:SS", value))
}

fn run_stamp(files: Vec<PathBuf>, timestamp: &str, backup: bool) -> Result<()> {
    if files.is_empty() {
        anyhow::bail!("No files specified");
    }
    let timestamp = parse_timestamp(timestamp)?;

    let mut processed = 0;
    let mut errors = 0;

    for file_path in &files {
        match stamp_one(file_path, &timestamp, backup) {
            Ok(()) => {
                println!("Stamped {}", file_path.display());
                processed += 1;
            }
            Err(e) => {
                println!("Failed to stamp {}: {:#}", file_path.display(), e);
                errors += 1;
            }
        }
    }

    println!("\nStamp Summary:");
    println!("Files processed: {}", processed);
    println!("Errors: {}", errors);
    Ok(())
}

fn stamp_one(file_path: &Path, timestamp: &NaiveDateTime, backup: bool) -> Result<()> {
    let is_jpeg = file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg"));
    if !is_jpeg {
        anyhow::bail!("Only JPEG files can be stamped");
    }
    write_capture_time(file_path, timestamp, backup)
}

fn print_summary(outcome: &SortOutcome) {
    let status = match outcome.status {
        RunStatus::Completed => "Processing complete!",
        RunStatus::Interrupted => "Processing interrupted",
        RunStatus::Aborted => "Processing aborted",
    };

    println!("\n{}", status);
    println!("Files renamed: {}", outcome.renamed);
    println!("Duplicates deleted: {}", outcome.duplicates_removed);
    println!("Files moved: {}", outcome.moved);
    println!("Files quarantined: {}", outcome.quarantined);
    println!("Files ignored: {}", outcome.ignored);
    println!("Errors: {}", outcome.errors);
}
