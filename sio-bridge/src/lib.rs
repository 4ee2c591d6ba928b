//! `sio-bridge` — relays MIDI bytes to an emulated serial-IO link peer.
//!
//! # Architecture
//!
//! ```text
//!  MIDI messages ──▶ MidiFilter ──▶ Engine::enqueue
//!                                        │
//!                                   ┌────▼─────┐
//!                                   │ ByteQueue│
//!                                   └────┬─────┘
//!                                        │ one byte at a time
//!                                   ┌────▼──────────────────────┐
//!                                   │ drain task + handshake     │
//!                                   └────┬──────────────┬───────┘
//!                                   DATA │              │ ACK
//!                                   ┌────▼────┐    ┌────▼────┐
//!                                   │  pump   │    │  pump   │
//!                                   └────┬────┘    └────┬────┘
//!                                        └──── peer ────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`protocol`]  — control bytes, frames, channel names
//! - [`queue`]     — FIFO of bytes awaiting transmission
//! - [`engine`]    — connection setup, single-flight drain, per-byte handshake
//! - [`transport`] — connector trait, TCP connector, per-channel pump tasks
//! - [`state`]     — engine and channel state machines
//! - [`config`]    — peer address
//! - [`error`]     — error types
//! - [`midi`]      — status-byte filtering of incoming messages
//! - [`hex`]       — hex formatting and parsing helpers

pub mod config;
pub mod engine;
pub mod error;
pub mod hex;
pub mod midi;
pub mod protocol;
pub mod queue;
pub mod state;
pub mod transport;

pub use config::EngineConfig;
pub use engine::{Engine, EngineStats};
pub use error::{ConnectError, TransportError};
pub use protocol::{Channel, ACK_BYTE, XFER_START};
