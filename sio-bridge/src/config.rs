//! Engine configuration.

use crate::protocol::{DEFAULT_HOSTNAME, DEFAULT_PORT};
use crate::transport::TcpConnector;

/// Where the link peer listens.
///
/// Both channels connect to the same address; DATA first, then ACK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub hostname: String,
    pub port: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl EngineConfig {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// `hostname:port`, for logs.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    pub fn connector(&self) -> TcpConnector {
        TcpConnector::new(self.hostname.clone(), self.port)
    }
}
