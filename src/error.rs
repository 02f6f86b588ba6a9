/**
 * Error types for conditions that stop a whole phase
 */

use std::path::PathBuf;
use thiserror::Error;

/// Hard-stop errors. Per-file failures never become one of these; they are
/// reported through the log callback and the run carries on.
#[derive(Debug, Error)]
pub enum SortError {
    #[error("staging directory not found: {}", .0.display())]
    StagingMissing(PathBuf),

    #[error("failed to list directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
