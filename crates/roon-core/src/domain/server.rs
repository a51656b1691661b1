//! The normalised record describing one discovered Roon Core.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a [`ServerDescriptor`] cannot be used as a connection target.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("server unique id is empty")]
    EmptyUniqueId,
    #[error("server host is empty")]
    EmptyHost,
    #[error("server port must be in 1-65535")]
    InvalidPort,
}

/// A server found by discovery (or restored from the saved-server record).
///
/// `unique_id` is the identity of the server: two descriptors with the same
/// id describe the same logical server even if their other fields differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub unique_id: String,
    pub display_name: String,
    /// IP literal as advertised, or a host name from a saved record.
    pub host: String,
    pub port: u16,
    /// Empty when the server did not advertise one.
    #[serde(default)]
    pub version: String,
}

impl ServerDescriptor {
    /// Checks that the descriptor names a reachable endpoint.
    ///
    /// # Errors
    ///
    /// Returns the first [`DescriptorError`] found, checking id, host, then port.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.unique_id.is_empty() {
            return Err(DescriptorError::EmptyUniqueId);
        }
        if self.host.trim().is_empty() {
            return Err(DescriptorError::EmptyHost);
        }
        if self.port == 0 {
            return Err(DescriptorError::InvalidPort);
        }
        Ok(())
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn endpoint(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.display_name.is_empty() {
            self.unique_id.as_str()
        } else {
            self.display_name.as_str()
        };
        write!(f, "{name} ({})", self.endpoint())
    }
}
