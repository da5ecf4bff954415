//! Scripted in-memory transport for engine tests.

use std::collections::{HashMap, HashSet};

use mpsync_transport::{Transport, TransportError};

use crate::change::hash_bytes;

/// Every wire operation the fake device observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Put(String),
    Mkdir(String),
    StatSize(String),
    Hash(String),
    Reset,
}

/// In-memory device that records every transport call.
#[derive(Default)]
pub struct FakeDevice {
    pub files: HashMap<String, Vec<u8>>,
    pub dirs: HashSet<String>,
    pub calls: Vec<Call>,
    failing_puts: HashSet<String>,
    drop_after: Option<usize>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, data: &[u8]) -> Self {
        self.files.insert(path.to_string(), data.to_vec());
        self
    }

    pub fn with_dir(mut self, path: &str) -> Self {
        self.dirs.insert(path.to_string());
        self
    }

    /// Makes `put(path)` fail with a channel error.
    pub fn fail_put(mut self, path: &str) -> Self {
        self.failing_puts.insert(path.to_string());
        self
    }

    /// Drops the connection once `ops` operations have completed.
    pub fn drop_connection_after(mut self, ops: usize) -> Self {
        self.drop_after = Some(ops);
        self
    }

    pub fn mkdir_calls(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Mkdir(p) => Some(p.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn put_calls(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Put(p) => Some(p.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn stat_calls(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::StatSize(p) => Some(p.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn hash_calls(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Hash(p) => Some(p.as_str()),
                _ => None,
            })
            .collect()
    }

    fn record(&mut self, call: Call) -> Result<(), TransportError> {
        if let Some(budget) = self.drop_after {
            if self.calls.len() >= budget {
                return Err(TransportError::ConnectionLost);
            }
        }
        self.calls.push(call);
        Ok(())
    }
}

impl Transport for FakeDevice {
    fn put(&mut self, path: &str, data: &[u8]) -> Result<(), TransportError> {
        self.record(Call::Put(path.to_string()))?;
        if self.failing_puts.contains(path) {
            return Err(TransportError::Channel(format!("put refused: {path}")));
        }
        self.files.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn mkdir(&mut self, path: &str) -> Result<(), TransportError> {
        self.record(Call::Mkdir(path.to_string()))?;
        if !self.dirs.insert(path.to_string()) {
            return Err(TransportError::AlreadyExists(path.to_string()));
        }
        Ok(())
    }

    fn stat_size(&mut self, path: &str) -> Result<u64, TransportError> {
        self.record(Call::StatSize(path.to_string()))?;
        self.files
            .get(path)
            .map(|data| data.len() as u64)
            .ok_or_else(|| TransportError::NotFound(path.to_string()))
    }

    fn hash(&mut self, path: &str) -> Result<String, TransportError> {
        self.record(Call::Hash(path.to_string()))?;
        self.files
            .get(path)
            .map(|data| hash_bytes(data))
            .ok_or_else(|| TransportError::NotFound(path.to_string()))
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.record(Call::Reset)
    }
}
