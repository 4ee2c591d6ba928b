//! Wire-level constants of the serial-IO link protocol.
//!
//! The remote peer emulates a link-cable serial port.  Every payload byte
//! travels on the DATA channel together with a copy of the serial control
//! register the peer should apply; the ACK channel carries only zero bytes
//! that confirm each leg of the exchange.
//!
//! # Per-byte exchange
//!
//! ```text
//!   bridge                                  peer
//!     │ ── DATA: [byte, XFER_START] ──────▶ │   1. send byte
//!     │ ── ACK:  [0x00] ──────────────────▶ │   2. local ack
//!     │ ◀───────────────────── ACK: [..] ── │   3. peer ack
//!     │ ◀──────────────────── DATA: [..] ── │   4. peer response
//!     │ ── ACK:  [0x00] ──────────────────▶ │   5. ack of response
//! ```
//!
//! Steps 3 and 4 may arrive in either order.  No I/O happens here.

use std::fmt;

/// Bit-flag constants for the serial control register (`SC`).
pub mod flags {
    /// Start a transfer.  The peer clears it once the transfer ends.
    pub const SIOF_XFER_START: u8 = 0b1000_0000;
    /// Drive the transfer from the internal clock.
    pub const SIOF_CLOCK_INT: u8 = 0b0000_0001;
}

/// Control byte sent after every payload byte: start a transfer using the
/// peer's internal clock.
pub const XFER_START: u8 = flags::SIOF_XFER_START | flags::SIOF_CLOCK_INT;

/// The only byte ever written to the ACK channel.
pub const ACK_BYTE: u8 = 0x00;

/// Frame written to the ACK channel (steps 2 and 5).
pub const ACK_FRAME: [u8; 1] = [ACK_BYTE];

/// Default peer hostname.
pub const DEFAULT_HOSTNAME: &str = "127.0.0.1";

/// Default peer port.  Both channels connect to the same port; the peer tells
/// them apart by connection order.
pub const DEFAULT_PORT: u16 = 5887;

/// Build the DATA frame for one payload byte (step 1).
#[inline]
pub fn data_frame(byte: u8) -> [u8; 2] {
    [byte, XFER_START]
}

/// The two connections that make up one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Payload bytes plus control flags out; peer response bytes in.
    Data,
    /// Zero-byte acknowledgements in both directions.
    Ack,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => f.write_str("DATA"),
            Self::Ack => f.write_str("ACK"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xfer_start_combines_both_flags() {
        assert_eq!(XFER_START, 0b1000_0001);
        assert_eq!(XFER_START, 0x81);
        assert_ne!(XFER_START & flags::SIOF_XFER_START, 0);
        assert_ne!(XFER_START & flags::SIOF_CLOCK_INT, 0);
    }

    #[test]
    fn data_frame_appends_control_byte() {
        assert_eq!(data_frame(0x90), [0x90, 0x81]);
        assert_eq!(data_frame(0x00), [0x00, 0x81]);
        assert_eq!(data_frame(0xff), [0xff, 0x81]);
    }

    #[test]
    fn ack_frame_is_single_zero() {
        assert_eq!(ACK_FRAME, [0x00]);
    }

    #[test]
    fn channel_display_names() {
        assert_eq!(Channel::Data.to_string(), "DATA");
        assert_eq!(Channel::Ack.to_string(), "ACK");
    }
}
