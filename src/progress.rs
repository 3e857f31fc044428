//! Stage-level progress reporting for backup and recovery runs.
//!
//! The pipeline calls a [`ProgressReporter`] when each stage starts and
//! finishes, and for non-fatal warnings. Every method has a no-op default.
//!
//! # Example
//!
//! ```rust,no_run
//! use backpipe::progress::StageLog;
//! use backpipe::{BackupConfig, FixedDecisions, Pipeline};
//!
//! let mut log = StageLog::new();
//! let config = BackupConfig::new("docs", "backups").compress("Huffman");
//! Pipeline::new().backup_with_progress(&config, &mut FixedDecisions::default(), &mut log)?;
//! for event in log.events() {
//!     println!("{} -> {}", event.stage, event.output.display());
//! }
//! # Ok::<(), backpipe::Error>(())
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::Stage;

const BYTES_KB: f64 = 1024.0;
const BYTES_MB: f64 = BYTES_KB * 1024.0;
const BYTES_GB: f64 = BYTES_MB * 1024.0;

/// Receives stage notifications from the pipeline.
pub trait ProgressReporter: Send {
    /// Called before a stage opens its input.
    fn on_stage_start(&mut self, stage: Stage, input: &Path) {
        let _ = (stage, input);
    }

    /// Called after a stage produced `output`.
    fn on_stage_complete(&mut self, stage: Stage, output: &Path, elapsed: Duration) {
        let _ = (stage, output, elapsed);
    }

    /// Called on any non-fatal condition worth telling the user about.
    fn on_warning(&mut self, message: &str) {
        let _ = message;
    }
}

/// A progress reporter that does nothing (null object pattern).
#[derive(Debug, Default, Clone)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// One completed stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEvent {
    /// The stage that ran.
    pub stage: Stage,
    /// What it produced.
    pub output: PathBuf,
    /// How long it took.
    pub elapsed: Duration,
}

/// A reporter that keeps every completed stage and warning.
#[derive(Debug, Default, Clone)]
pub struct StageLog {
    events: Vec<StageEvent>,
    started: Vec<Stage>,
    warnings: Vec<String>,
}

impl StageLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns completed stages in order.
    pub fn events(&self) -> &[StageEvent] {
        &self.events
    }

    /// Returns every stage that was started, including ones that failed.
    pub fn started(&self) -> &[Stage] {
        &self.started
    }

    /// Returns the collected warnings.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

impl ProgressReporter for StageLog {
    fn on_stage_start(&mut self, stage: Stage, _input: &Path) {
        self.started.push(stage);
    }

    fn on_stage_complete(&mut self, stage: Stage, output: &Path, elapsed: Duration) {
        self.events.push(StageEvent {
            stage,
            output: output.to_path_buf(),
            elapsed,
        });
    }

    fn on_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }
}

impl<P: ProgressReporter + ?Sized> ProgressReporter for &mut P {
    fn on_stage_start(&mut self, stage: Stage, input: &Path) {
        (**self).on_stage_start(stage, input);
    }

    fn on_stage_complete(&mut self, stage: Stage, output: &Path, elapsed: Duration) {
        (**self).on_stage_complete(stage, output, elapsed);
    }

    fn on_warning(&mut self, message: &str) {
        (**self).on_warning(message);
    }
}

/// Formats a duration as a short human-readable string.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Formats bytes using IEC units (KiB, MiB, GiB).
///
/// # Example
///
/// ```rust
/// use backpipe::progress::format_bytes_iec;
///
/// assert_eq!(format_bytes_iec(512), "512 B");
/// assert_eq!(format_bytes_iec(1536), "1.5 KiB");
/// ```
pub fn format_bytes_iec(bytes: u64) -> String {
    let value = bytes as f64;
    if value < BYTES_KB {
        format!("{} B", bytes)
    } else if value < BYTES_MB {
        format!("{:.1} KiB", value / BYTES_KB)
    } else if value < BYTES_GB {
        format!("{:.1} MiB", value / BYTES_MB)
    } else {
        format!("{:.1} GiB", value / BYTES_GB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_progress() {
        let mut progress = NoProgress;
        progress.on_stage_start(Stage::Pack, Path::new("src"));
        progress.on_warning("ignored");
    }

    #[test]
    fn test_stage_log_records_order() {
        let mut log = StageLog::new();
        log.on_stage_start(Stage::Pack, Path::new("src"));
        log.on_stage_complete(Stage::Pack, Path::new("out.Basic"), Duration::from_millis(3));
        log.on_stage_start(Stage::Compress, Path::new("out.Basic"));
        log.on_warning("slow disk");
        assert_eq!(log.started(), &[Stage::Pack, Stage::Compress]);
        assert_eq!(log.events().len(), 1);
        assert_eq!(log.events()[0].output, PathBuf::from("out.Basic"));
        assert_eq!(log.warnings(), &["slow disk".to_string()]);
    }

    #[test]
    fn test_reporter_through_mut_ref() {
        fn drive(mut p: impl ProgressReporter) {
            p.on_warning("w");
        }
        let mut log = StageLog::new();
        drive(&mut log);
        assert_eq!(log.warnings().len(), 1);
    }

    #[test]
    fn test_format_bytes_iec() {
        assert_eq!(format_bytes_iec(0), "0 B");
        assert_eq!(format_bytes_iec(1024), "1.0 KiB");
        assert_eq!(format_bytes_iec(1024 * 1024 * 3), "3.0 MiB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(75)), "1m 15s");
        assert_eq!(format_duration(Duration::from_secs(7300)), "2h 1m");
    }
}
