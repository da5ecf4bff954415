//! Transfer driver.
//!
//! Orchestrates enumerator → directory builder → change detector →
//! put for one run, then soft-resets the device. Strictly sequential:
//! the transport is an exclusive half-duplex channel and exactly one
//! request/response pair is in flight at a time.

use std::io::Write;
use std::path::{Path, PathBuf};

use mpsync_transport::{Transport, TransportError};
use tracing::{debug, info, warn};

use crate::change::{self, Decision};
use crate::error::SyncError;
use crate::progress::ProgressReporter;
use crate::remote_dir::{RemoteDirCache, ensure_dir};
use crate::walker::{self, LocalEntry};

/// Driver configuration, threaded explicitly through the run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Label for the progress line.
    pub label: String,
    /// Skip files whose remote size and digest both match the local
    /// file. Off means every enumerated file is uploaded.
    pub only_different: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            label: "Uploading files".into(),
            only_different: false,
        }
    }
}

/// One file that failed without aborting the batch.
#[derive(Debug)]
pub struct FileFailure {
    pub rel_path: String,
    pub error: String,
}

/// Outcome of a completed run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub uploaded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<FileFailure>,
    /// Number of files enumerated for the run.
    pub total: usize,
}

impl RunReport {
    /// Whether every file was uploaded or skipped.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Outcome {
    Uploaded,
    Skipped,
}

/// Orchestrates one upload run over an exclusive transport.
pub struct SyncDriver<'t> {
    transport: &'t mut dyn Transport,
    config: SyncConfig,
}

impl<'t> SyncDriver<'t> {
    pub fn new(transport: &'t mut dyn Transport, config: SyncConfig) -> Self {
        Self { transport, config }
    }

    /// Mirrors `root` onto the device, then soft-resets it.
    ///
    /// Per-file transport errors are recorded in the report and the
    /// run advances to the next file — one bad file must not forfeit
    /// the rest of the tree. Only a lost connection aborts the batch.
    /// The reset is issued exactly once, strictly after the last
    /// file's put has been acknowledged, and never after a connection
    /// loss.
    pub fn run(&mut self, root: &Path, excluded: &[PathBuf]) -> Result<RunReport, SyncError> {
        self.run_with_output(root, excluded, std::io::stderr())
    }

    /// Same as [`run`](Self::run) with progress going to `out`.
    pub fn run_with_output<W: Write>(
        &mut self,
        root: &Path,
        excluded: &[PathBuf],
        out: W,
    ) -> Result<RunReport, SyncError> {
        let entries = walker::enumerate(root, excluded)?;
        info!(files = entries.len(), root = %root.display(), "starting upload run");

        let mut progress = ProgressReporter::with_writer(&self.config.label, entries.len(), out);
        let mut cache = RemoteDirCache::new();
        let mut report = RunReport {
            total: entries.len(),
            ..Default::default()
        };

        for (index, entry) in entries.iter().enumerate() {
            match self.transfer_one(entry, &mut cache) {
                Ok(Outcome::Uploaded) => report.uploaded.push(entry.rel_path().to_string()),
                Ok(Outcome::Skipped) => report.skipped.push(entry.rel_path().to_string()),
                Err(e) if e.is_fatal() => {
                    progress.finish();
                    return Err(SyncError::ConnectionLost {
                        attempted: index + 1,
                        total: entries.len(),
                        not_attempted: entries[index + 1..]
                            .iter()
                            .map(|e| e.rel_path().to_string())
                            .collect(),
                    });
                }
                Err(e) => {
                    warn!(path = entry.rel_path(), error = %e, "file failed, continuing");
                    report.failed.push(FileFailure {
                        rel_path: entry.rel_path().to_string(),
                        error: e.to_string(),
                    });
                }
            }
            progress.advance();
        }
        progress.finish();

        // Restart the resident program with the new files in place.
        self.transport.reset()?;

        info!(
            uploaded = report.uploaded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "run complete"
        );
        Ok(report)
    }

    fn transfer_one(
        &mut self,
        entry: &LocalEntry,
        cache: &mut RemoteDirCache,
    ) -> Result<Outcome, TransportError> {
        debug!(local = %entry.source().display(), remote = entry.rel_path(), "processing");

        if let Some(dir) = entry.parent_dir() {
            ensure_dir(self.transport, dir, cache)?;
        }

        let data = entry.read()?;

        if self.config.only_different {
            match change::needs_upload(self.transport, entry, &data)? {
                Decision::Skip => return Ok(Outcome::Skipped),
                Decision::Upload(reason) => {
                    debug!(path = entry.rel_path(), ?reason, "uploading");
                }
            }
        }

        self.transport.put(entry.rel_path(), &data)?;
        Ok(Outcome::Uploaded)
    }
}
