//! A diagnostics sink that accumulates lines in memory for test assertions.
//!
//! Shared by unit and integration tests so each test module does not need its
//! own copy of the same boilerplate.

use std::sync::Arc;

use log::Level;
use parking_lot::Mutex;

use crate::diagnostics::Diagnostics;

/// Sink that stores every line it receives for later inspection.
#[derive(Clone, Debug, Default)]
pub struct CollectingDiagnostics {
    lines: Arc<Mutex<Vec<(Level, String)>>>,
}

impl CollectingDiagnostics {
    /// Create a new empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a snapshot of all lines received so far.
    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().clone()
    }

    /// True if a line at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.lines
            .lock()
            .iter()
            .any(|(l, line)| *l == level && line.contains(needle))
    }
}

impl Diagnostics for CollectingDiagnostics {
    fn write_line(&self, level: Level, line: &str) {
        self.lines.lock().push((level, line.to_owned()));
    }
}
