//! Change detection: size probe first, digest only when sizes match.

use mpsync_transport::{Transport, TransportError};
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::walker::LocalEntry;

/// Why a file is being uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadReason {
    /// The device does not have the file.
    RemoteMissing,
    /// Remote and local byte lengths differ.
    SizeMismatch,
    /// Same length, different content digest.
    DigestMismatch,
}

/// Transfer decision for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Upload(UploadReason),
    Skip,
}

/// Computes the hex SHA-1 digest of `data`.
///
/// SHA-1 because the device side hashes with `uhashlib.sha1`; the two
/// digests are compared byte-for-byte.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Decides whether `entry` must be transferred, given its local bytes.
///
/// A size query costs one round trip; hashing a whole file through a
/// slow serial link costs many. A size mismatch is conclusive, so the
/// digest is only requested when the sizes agree. A file the device
/// does not have forces an upload — absence is not an error here.
pub fn needs_upload(
    transport: &mut dyn Transport,
    entry: &LocalEntry,
    data: &[u8],
) -> Result<Decision, TransportError> {
    let remote_size = match transport.stat_size(entry.rel_path()) {
        Ok(size) => size,
        Err(TransportError::NotFound(_)) => {
            return Ok(Decision::Upload(UploadReason::RemoteMissing));
        }
        Err(e) => return Err(e),
    };

    if remote_size != entry.size() {
        return Ok(Decision::Upload(UploadReason::SizeMismatch));
    }

    let local_digest = hash_bytes(data);
    let remote_digest = match transport.hash(entry.rel_path()) {
        Ok(digest) => digest,
        Err(TransportError::NotFound(_)) => {
            return Ok(Decision::Upload(UploadReason::RemoteMissing));
        }
        Err(e) => return Err(e),
    };

    if remote_digest == local_digest {
        debug!(path = entry.rel_path(), "unchanged, skipping");
        Ok(Decision::Skip)
    } else {
        Ok(Decision::Upload(UploadReason::DigestMismatch))
    }
}
