// src/report.rs
use std::collections::VecDeque;
use std::fmt;
use log::Level;
use parking_lot::Mutex;

/// Diagnostic sink handed to every component at construction. `target`
/// names the reporting component, e.g. `serverscout::prober`.
pub trait Reporter: Send + Sync {
    fn report(&self, target: &'static str, level: Level, args: fmt::Arguments<'_>);
}

/// Forwards diagnostics to the `log` facade under the component's target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, target: &'static str, level: Level, args: fmt::Arguments<'_>) {
        log::log!(target: target, level, "{}", args);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub target: &'static str,
    pub level: Level,
    pub message: String,
}

/// Keeps the most recent diagnostics so a front end can show them.
pub struct MemoryReporter {
    capacity: usize,
    entries: Mutex<VecDeque<Diagnostic>>,
}

impl MemoryReporter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.entries.lock().iter().any(|d| d.level == level && d.message.contains(needle))
    }

    /// True when `target` reported anything at `level`.
    pub fn reported_by(&self, target: &str, level: Level) -> bool {
        self.entries.lock().iter().any(|d| d.target == target && d.level == level)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, target: &'static str, level: Level, args: fmt::Arguments<'_>) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(Diagnostic { target, level, message: args.to_string() });
    }
}
