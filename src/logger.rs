//! Load notifications.
//!
//! The core never prints; everything an embedder might want to show goes
//! through this trait. Callbacks are synchronous and must not call back
//! into the data they observe.

use std::time::{Duration, Instant};

/// Receiver for loading progress and per-line problems.
pub trait Logger {
    fn load_start(&mut self, _filename: &str) {}
    /// Percentage in 0..=100, emitted when it changes.
    fn load_progress(&mut self, _percent: u32) {}
    fn load_warning(&mut self, _line: u64, _msg: &str) {}
    fn load_error(&mut self, _line: u64, _msg: &str) {}
    /// `error` is set when the whole file failed.
    fn load_finished(&mut self, _error: Option<&str>) {}
}

/// Default logger: prints to stderr, with progress throttled to once a
/// second.
pub struct StderrLogger {
    filename: String,
    last_progress: Option<Instant>,
}

impl StderrLogger {
    pub fn new() -> StderrLogger {
        StderrLogger {
            filename: String::new(),
            last_progress: None,
        }
    }
}

impl Default for StderrLogger {
    fn default() -> Self {
        StderrLogger::new()
    }
}

impl Logger for StderrLogger {
    fn load_start(&mut self, filename: &str) {
        self.filename = filename.to_string();
        self.last_progress = Some(Instant::now());
        eprintln!("Loading {filename}");
    }

    fn load_progress(&mut self, percent: u32) {
        let throttled = matches!(self.last_progress,
            Some(t) if t.elapsed() < Duration::from_secs(1));
        if throttled {
            return;
        }
        self.last_progress = Some(Instant::now());
        eprintln!("Loading {} ({percent}%)", self.filename);
    }

    fn load_warning(&mut self, line: u64, msg: &str) {
        eprintln!("Warning in {}, line {line}: {msg}", self.filename);
    }

    fn load_error(&mut self, line: u64, msg: &str) {
        eprintln!("Error in {}, line {line}: {msg}", self.filename);
    }

    fn load_finished(&mut self, error: Option<&str>) {
        match error {
            None => eprintln!("File {} loaded.", self.filename),
            Some(msg) => eprintln!("Error loading file {}: {msg}", self.filename),
        }
    }
}

/// Logger that keeps everything, for front-end rendering and tests.
#[derive(Default)]
pub struct CollectingLogger {
    pub filename: String,
    pub warnings: Vec<(u64, String)>,
    pub errors: Vec<(u64, String)>,
    pub finished_error: Option<String>,
    pub last_percent: Option<u32>,
}

impl Logger for CollectingLogger {
    fn load_start(&mut self, filename: &str) {
        self.filename = filename.to_string();
    }

    fn load_progress(&mut self, percent: u32) {
        self.last_percent = Some(percent);
    }

    fn load_warning(&mut self, line: u64, msg: &str) {
        self.warnings.push((line, msg.to_string()));
    }

    fn load_error(&mut self, line: u64, msg: &str) {
        self.errors.push((line, msg.to_string()));
    }

    fn load_finished(&mut self, error: Option<&str>) {
        self.finished_error = error.map(str::to_string);
    }
}
