use crate::TransportError;

/// Validates a remote path before it is sent to the device.
///
/// Remote paths are root-relative keys into the device filesystem,
/// forward-slash separated regardless of host platform. The device
/// side interpolates them into Python literals, so anything that could
/// climb out of the upload root is refused here: empty paths, absolute
/// paths, `..` segments, and empty segments (`a//b`, trailing `/`).
pub fn validate_remote_path(path: &str) -> Result<(), TransportError> {
    if path.is_empty() {
        return Err(TransportError::InvalidPath("empty path".into()));
    }
    if path.starts_with('/') {
        return Err(TransportError::InvalidPath(format!(
            "absolute path not allowed: {path}"
        )));
    }
    for segment in path.split('/') {
        if segment.is_empty() {
            return Err(TransportError::InvalidPath(format!(
                "empty path segment: {path}"
            )));
        }
        if segment == ".." {
            return Err(TransportError::InvalidPath(format!(
                "parent directory traversal not allowed: {path}"
            )));
        }
    }
    Ok(())
}
