//! Batch progress output.
//!
//! A tree transfer over a slow serial link routinely takes tens of
//! seconds to minutes; a silent long-running operation is
//! indistinguishable from a hang.

use std::io::Write;

/// Prints `<label>: <percent>% (<done>/<total>)` after each completed
/// item, rewriting the same line in place.
pub struct ProgressReporter<W: Write> {
    label: String,
    total: usize,
    done: usize,
    out: W,
}

impl<W: Write> ProgressReporter<W> {
    /// Reporter writing to an arbitrary sink. Renders the initial
    /// `0% (0/total)` line immediately.
    pub fn with_writer(label: &str, total: usize, out: W) -> Self {
        let mut reporter = Self {
            label: label.to_string(),
            total,
            done: 0,
            out,
        };
        reporter.render();
        reporter
    }

    /// Records one more completed item and re-renders the line.
    pub fn advance(&mut self) {
        self.done += 1;
        self.render();
    }

    /// Ends the progress line.
    pub fn finish(&mut self) {
        let _ = writeln!(self.out);
        let _ = self.out.flush();
    }

    fn percent(&self) -> usize {
        if self.total == 0 {
            0
        } else {
            self.done * 100 / self.total
        }
    }

    fn render(&mut self) {
        // Progress output must never fail the run.
        let _ = write!(
            self.out,
            "\r{}: {}% ({}/{})",
            self.label,
            self.percent(),
            self.done,
            self.total
        );
        let _ = self.out.flush();
    }
}
