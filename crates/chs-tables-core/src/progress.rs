//! Structured conversion-progress reporting.
//!
//! The original converter interleaved `LENGTH: <total>` / `STATUS: <i>`
//! text lines with its result on a process output stream. Here progress
//! is a callback channel decoupled from the structured result: a case
//! announces its total step count once, then reports monotonically
//! increasing completed steps. [`LinePrinter`] reproduces the legacy
//! textual protocol for an external progress bar; [`NullSink`] discards
//! everything.

use std::io::Write;

/// Receiver for deterministic conversion progress markers.
pub trait ProgressSink {
    /// Announce the total number of steps for the current conversion.
    /// Called exactly once, before any [`step`](ProgressSink::step).
    fn begin(&mut self, total: usize);

    /// Report a completed step index, strictly increasing from 1 up to
    /// the announced total.
    fn step(&mut self, completed: usize);
}

/// A sink that discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn begin(&mut self, _total: usize) {}
    fn step(&mut self, _completed: usize) {}
}

/// Adapter emitting the legacy `LENGTH:` / `STATUS:` line protocol.
///
/// Consumers compute `percent = 100 * completed / total` per file. Write
/// errors are swallowed: progress output must never fail a conversion.
#[derive(Debug)]
pub struct LinePrinter<W: Write> {
    out: W,
}

impl<W: Write> LinePrinter<W> {
    /// Wrap a writer (for example, stdout or a pipe to the controller).
    pub fn new(out: W) -> Self {
        LinePrinter { out }
    }

    /// Recover the wrapped writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ProgressSink for LinePrinter<W> {
    fn begin(&mut self, total: usize) {
        let _ = writeln!(self.out, "LENGTH: {total}");
    }

    fn step(&mut self, completed: usize) {
        let _ = writeln!(self.out, "STATUS: {completed}");
    }
}

/// A sink recording every callback, used to assert progress contracts.
#[derive(Debug, Default)]
pub struct RecordingSink {
    /// Announced totals, in order of arrival.
    pub totals: Vec<usize>,
    /// Completed step indices, in order of arrival.
    pub steps: Vec<usize>,
}

impl RecordingSink {
    /// True when exactly one total was announced and steps rose
    /// strictly from 1 to that total.
    pub fn is_complete(&self) -> bool {
        if self.totals.len() != 1 {
            return false;
        }
        let total = self.totals[0];
        self.steps.len() == total
            && self
                .steps
                .iter()
                .enumerate()
                .all(|(i, &s)| s == i + 1)
    }
}

impl ProgressSink for RecordingSink {
    fn begin(&mut self, total: usize) {
        self.totals.push(total);
    }

    fn step(&mut self, completed: usize) {
        self.steps.push(completed);
    }
}
