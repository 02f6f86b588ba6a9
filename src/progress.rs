/**
 * Progress reporting and cooperative cancellation
 *
 * The core never prints: every user-facing line goes through the log
 * callback and every percentage through the progress callback supplied by
 * the host.
 */

use log::debug;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Width of the `[CODE]` column in log lines
const CODE_COLUMN_WIDTH: usize = 10;

/// Status code at the start of each log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCode {
    Info,
    Ok,
    Renamed,
    Search,
    Duplicate,
    Move,
    Ignored,
    Error,
    Stop,
    Done,
}

impl LogCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCode::Info => "INFO",
            LogCode::Ok => "OK",
            LogCode::Renamed => "RENAMED",
            LogCode::Search => "SEARCH",
            LogCode::Duplicate => "DUPLICATE",
            LogCode::Move => "MOVE",
            LogCode::Ignored => "IGNORED",
            LogCode::Error => "ERROR",
            LogCode::Stop => "STOP",
            LogCode::Done => "DONE",
        }
    }
}

impl fmt::Display for LogCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format a log line: fixed-width `[CODE]` column, action, optional target
///
/// Example: `[RENAMED] 2024-01-02_10-11.jpg\t-> IMG20240102101100.jpg`
pub fn format_log(code: LogCode, action: &str, target: Option<&str>) -> String {
    let code_col = format!("{:<width$}", format!("[{}]", code), width = CODE_COLUMN_WIDTH);
    match target {
        Some(target) if !target.is_empty() => format!("{}{}\t-> {}", code_col, action, target),
        _ => format!("{}{}", code_col, action),
    }
}

/// Percentage of `done` over `total`, rounded; an empty set counts as complete
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

type LogFn = Box<dyn Fn(&str) + Send + Sync>;
type ProgressFn = Box<dyn Fn(u8) + Send + Sync>;

/// Log and progress callbacks supplied by the host
pub struct Reporter {
    on_log: LogFn,
    on_progress: ProgressFn,
}

impl Reporter {
    pub fn new<L, P>(on_log: L, on_progress: P) -> Self
    where
        L: Fn(&str) + Send + Sync + 'static,
        P: Fn(u8) + Send + Sync + 'static,
    {
        Self {
            on_log: Box::new(on_log),
            on_progress: Box::new(on_progress),
        }
    }

    /// Reporter that drops everything
    pub fn silent() -> Self {
        Self::new(|_| {}, |_| {})
    }

    pub fn log(&self, code: LogCode, action: &str, target: Option<&str>) {
        let line = format_log(code, action, target);
        debug!("{}", line);
        (self.on_log)(&line);
    }

    pub fn progress(&self, percent: u8) {
        (self.on_progress)(percent.min(100));
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::silent()
    }
}

/// Shared cancellation flag, set by the host and polled by the core between
/// files
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
