pub mod config;
pub mod dedup;
pub mod error;
pub mod exif;
pub mod exif_writer;
pub mod file_ops;
pub mod hashing;
pub mod naming;
pub mod progress;

pub use config::SortConfig;
pub use error::SortError;
pub use file_ops::{sort_and_save, RunStatus, SortDriver, SortOutcome};
pub use progress::{CancelFlag, Reporter};
