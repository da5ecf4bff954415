//! Device file-synchronization engine.
//!
//! Mirrors a local directory tree onto a resource-constrained device
//! reachable through a slow, half-duplex [`Transport`], minimizing
//! redundant transfers: a size probe first, a SHA-1 digest comparison
//! only when the sizes match. Re-runs are idempotent — unchanged files
//! upload zero bytes, pre-existing directories are absorbed silently.
//!
//! [`Transport`]: mpsync_transport::Transport

mod change;
mod driver;
mod error;
mod progress;
mod remote_dir;
mod walker;

#[cfg(test)]
mod testutil;

pub use change::{Decision, UploadReason, hash_bytes, needs_upload};
pub use driver::{FileFailure, RunReport, SyncConfig, SyncDriver};
pub use error::SyncError;
pub use progress::ProgressReporter;
pub use remote_dir::{RemoteDirCache, ensure_dir};
pub use walker::{LocalEntry, enumerate};
