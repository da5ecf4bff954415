//! Remote directory creation with per-run memoization.

use std::collections::HashSet;

use mpsync_transport::{Transport, TransportError};
use tracing::debug;

/// Relative directory paths already confirmed to exist on the device.
///
/// Owned by the driver and scoped to one run — it is not a source of
/// truth about device state beyond the current session, only a way to
/// avoid one redundant round trip per ancestor per run.
#[derive(Debug, Default)]
pub struct RemoteDirCache(HashSet<String>);

impl RemoteDirCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains(path)
    }

    fn insert(&mut self, path: &str) {
        self.0.insert(path.to_string());
    }
}

/// Ensures `path` and all its ancestors exist on the device.
///
/// Ancestors are created shallow-to-deep, short-circuiting on cache
/// hits. A directory the device already has is recorded as present
/// rather than reported as an error, so re-running an upload after a
/// partial failure proceeds cleanly. Any other transport failure
/// propagates to the caller.
pub fn ensure_dir(
    transport: &mut dyn Transport,
    path: &str,
    cache: &mut RemoteDirCache,
) -> Result<(), TransportError> {
    if path.is_empty() || path == "." || cache.contains(path) {
        return Ok(());
    }

    if let Some((parent, _)) = path.rsplit_once('/') {
        ensure_dir(transport, parent, cache)?;
    }

    match transport.mkdir(path) {
        Ok(()) => debug!(dir = path, "created remote directory"),
        Err(TransportError::AlreadyExists(_)) => {}
        Err(e) => return Err(e),
    }
    cache.insert(path);
    Ok(())
}
