//! Progress display for CLI operations.

use std::path::Path;
use std::time::Duration;

use backpipe::progress::format_duration;
use backpipe::{ProgressReporter, Stage};
use indicatif::{ProgressBar, ProgressStyle};

/// One spinner per stage; finished stages stay on screen as a summary line.
pub struct CliProgress {
    current: Option<ProgressBar>,
    completed: usize,
    quiet: bool,
}

impl CliProgress {
    /// Creates a new progress display
    pub fn new(quiet: bool) -> Self {
        Self {
            current: None,
            completed: 0,
            quiet,
        }
    }

    /// Returns how many stages finished.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Marks the running stage as failed.
    pub fn fail(&mut self) {
        if let Some(pb) = self.current.take() {
            pb.abandon_with_message(format!("{} failed", pb.message()));
        }
    }

    fn spinner(&self, message: String) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

impl ProgressReporter for CliProgress {
    fn on_stage_start(&mut self, stage: Stage, input: &Path) {
        let pb = self.spinner(format!("{} {}", stage, display_name(input)));
        self.current = Some(pb);
    }

    fn on_stage_complete(&mut self, stage: Stage, output: &Path, elapsed: Duration) {
        if let Some(pb) = self.current.take() {
            pb.finish_with_message(format!(
                "{} -> {} ({})",
                stage,
                display_name(output),
                format_duration(elapsed)
            ));
        }
        self.completed += 1;
    }

    fn on_warning(&mut self, message: &str) {
        match &self.current {
            Some(pb) if !self.quiet => pb.println(format!("Warning: {}", message)),
            _ => eprintln!("Warning: {}", message),
        }
    }
}

/// Shortens a path to at most 40 characters for the spinner line.
fn display_name(path: &Path) -> String {
    let name = path.display().to_string();
    let chars: Vec<char> = name.chars().collect();
    if chars.len() > 40 {
        let tail: String = chars[chars.len() - 37..].iter().collect();
        format!("...{}", tail)
    } else {
        name
    }
}
