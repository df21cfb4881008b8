//! Progress reporting for long-running commands.
//!
//! A reporter is created per command invocation and passed down explicitly;
//! nothing is registered globally.

/// Receives progress updates from a running command.
pub trait ProgressReporter {
    /// `done` out of `total` units of `stage` are complete.
    fn update(&self, stage: &str, done: u64, total: u64);

    /// `stage` has finished.
    fn finish(&self, stage: &str) {
        let _ = stage;
    }
}

/// Discards all updates.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn update(&self, _stage: &str, _done: u64, _total: u64) {}
}

/// Emits updates as `tracing` events, at most once per `every` units.
#[derive(Clone, Debug)]
pub struct LogProgress {
    command: String,
    every: u64,
}

impl LogProgress {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            every: 100,
        }
    }

    pub fn every(mut self, every: u64) -> Self {
        self.every = every.max(1);
        self
    }
}

impl ProgressReporter for LogProgress {
    fn update(&self, stage: &str, done: u64, total: u64) {
        if done == total || done % self.every == 0 {
            tracing::info!(command = %self.command, stage, done, total, "progress");
        }
    }

    fn finish(&self, stage: &str) {
        tracing::info!(command = %self.command, stage, "done");
    }
}
