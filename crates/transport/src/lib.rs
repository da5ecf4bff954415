//! Device transport capability.
//!
//! Defines the abstract channel to a MicroPython-class board — put,
//! mkdir, stat-size, hash, soft reset — plus the serial implementation
//! that drives the board's raw-REPL command exchange.

mod serial;
mod validation;

pub use serial::SerialTransport;
pub use validation::validate_remote_path;

use std::time::Duration;

/// Default serial baud rate for MicroPython boards.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default settle delay after opening the port.
///
/// Some boards (ESP8266 in particular) emit boot chatter for a short
/// while after the port opens; commands sent during that window are
/// lost.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Default timeout for a single blocking read on the port.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Default read size for the on-device hash loop.
pub const DEFAULT_HASH_CHUNK_SIZE: usize = 256;

/// Errors produced by a device transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("device busy: {0}")]
    DeviceBusy(String),

    #[error("device absent: {0}")]
    DeviceAbsent(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// mkdir on a directory the device already has. Callers that only
    /// need the directory to exist treat this as success.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// stat/hash on a file the device does not have.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid remote path: {0}")]
    InvalidPath(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("connection lost")]
    ConnectionLost,
}

impl TransportError {
    /// Whether the channel itself is gone and no further operation can
    /// succeed this run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectionLost)
    }
}

/// Connection settings for a serial transport.
#[derive(Debug, Clone)]
pub struct SerialSettings {
    /// Baud rate for the port.
    pub baud_rate: u32,
    /// Timeout for a single blocking read on the port.
    pub read_timeout: Duration,
    /// Delay after opening the port before the first command is sent.
    pub settle_delay: Duration,
    /// Read size for the on-device hash loop.
    pub hash_chunk_size: usize,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            hash_chunk_size: DEFAULT_HASH_CHUNK_SIZE,
        }
    }
}

/// The abstract channel to the remote device.
///
/// The channel is half-duplex and exclusive: exactly one
/// request/response pair may be in flight at a time, which the
/// `&mut self` receivers make unrepresentable to violate.
pub trait Transport {
    /// Writes `data` to `path` on the device, replacing any existing
    /// file.
    fn put(&mut self, path: &str, data: &[u8]) -> Result<(), TransportError>;

    /// Creates a directory on the device.
    ///
    /// Returns [`TransportError::AlreadyExists`] if the directory is
    /// already present.
    fn mkdir(&mut self, path: &str) -> Result<(), TransportError>;

    /// Returns the byte length of a remote file.
    ///
    /// Returns [`TransportError::NotFound`] if the file is absent.
    fn stat_size(&mut self, path: &str) -> Result<u64, TransportError>;

    /// Returns the hex SHA-1 digest of a remote file, computed
    /// on-device by reading the file in fixed-size chunks.
    ///
    /// Returns [`TransportError::NotFound`] if the file is absent.
    fn hash(&mut self, path: &str) -> Result<String, TransportError>;

    /// Soft-resets the device, restarting its resident program.
    ///
    /// Fire-and-forget: no acknowledgement is read back.
    fn reset(&mut self) -> Result<(), TransportError>;
}
