//! Error types for the bridge.
//!
//! Only connection establishment is fatal.  Errors that happen after both
//! channels are up are reported as [`TransportError`] on the diagnostics
//! channel and in the log; they never reach the send path.

use std::io;

use thiserror::Error;

use crate::protocol::Channel;

/// Establishing the DATA/ACK pair failed.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The named channel could not be opened.
    #[error("{channel} connection to {addr} failed: {source}")]
    Channel {
        channel: Channel,
        addr: String,
        #[source]
        source: io::Error,
    },
    /// `connect()` called on an engine that is not idle.
    #[error("cannot connect while engine is {0}")]
    BadState(crate::state::EngineState),
}

impl ConnectError {
    /// The channel that failed, if the failure came from the transport.
    pub fn channel(&self) -> Option<Channel> {
        match self {
            Self::Channel { channel, .. } => Some(*channel),
            Self::BadState(_) => None,
        }
    }
}

/// Which side of a channel an I/O error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Runtime I/O failure on an established channel.
///
/// `Clone` so it can be fanned out to every diagnostics subscriber; the
/// original `io::Error` is reduced to its kind and message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{channel} {direction:?} error ({kind:?}): {message}")]
pub struct TransportError {
    pub channel: Channel,
    pub direction: Direction,
    pub kind: io::ErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(channel: Channel, direction: Direction, err: &io::Error) -> Self {
        Self {
            channel,
            direction,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// A line of hex input could not be turned into bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid hex byte {0:?}")]
    InvalidByte(String),
}
