//! Status-byte filtering of incoming MIDI messages.
//!
//! The bridge forwards raw MIDI bytes unchanged.  Polyphonic aftertouch is
//! the exception: controllers emit it per key at a high rate, and every byte
//! costs a full link handshake, so those messages are dropped before they
//! reach the queue.

/// Note Off (channel voice, low nibble = channel).
pub const STATUS_NOTE_OFF: u8 = 0x80;
/// Note On.
pub const STATUS_NOTE_ON: u8 = 0x90;
/// Polyphonic Key Pressure.
pub const STATUS_POLY_AFTERTOUCH: u8 = 0xa0;
/// Control Change.
pub const STATUS_CC: u8 = 0xb0;

/// Decides which MIDI messages are forwarded to the link.
#[derive(Debug, Clone, Copy)]
pub struct MidiFilter {
    drop_poly_aftertouch: bool,
}

impl Default for MidiFilter {
    fn default() -> Self {
        Self {
            drop_poly_aftertouch: true,
        }
    }
}

impl MidiFilter {
    /// A filter that forwards every non-empty message.
    pub fn pass_all() -> Self {
        Self {
            drop_poly_aftertouch: false,
        }
    }

    /// `true` when `message` should be forwarded.
    pub fn accepts(&self, message: &[u8]) -> bool {
        let Some(&status) = message.first() else {
            return false;
        };
        if self.drop_poly_aftertouch && is_poly_aftertouch(status) {
            return false;
        }
        true
    }
}

/// `true` for any status byte in `0xA0..=0xAF`.
#[inline]
pub fn is_poly_aftertouch(status: u8) -> bool {
    (STATUS_POLY_AFTERTOUCH..STATUS_CC).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poly_aftertouch_range() {
        assert!(!is_poly_aftertouch(0x9f));
        assert!(is_poly_aftertouch(0xa0));
        assert!(is_poly_aftertouch(0xaf));
        assert!(!is_poly_aftertouch(0xb0));
    }

    #[test]
    fn default_filter_drops_poly_aftertouch_on_every_channel() {
        let f = MidiFilter::default();
        for ch in 0..16u8 {
            assert!(!f.accepts(&[STATUS_POLY_AFTERTOUCH | ch, 0x40, 0x10]));
        }
    }

    #[test]
    fn default_filter_passes_voice_messages() {
        let f = MidiFilter::default();
        assert!(f.accepts(&[STATUS_NOTE_ON, 0x40, 0x7f]));
        assert!(f.accepts(&[STATUS_NOTE_OFF | 3, 0x40, 0x00]));
        assert!(f.accepts(&[STATUS_CC, 0x07, 0x64]));
        assert!(f.accepts(&[0xf8]));
    }

    #[test]
    fn empty_message_is_dropped() {
        assert!(!MidiFilter::default().accepts(&[]));
        assert!(!MidiFilter::pass_all().accepts(&[]));
    }

    #[test]
    fn pass_all_keeps_aftertouch() {
        assert!(MidiFilter::pass_all().accepts(&[0xa2, 0x40, 0x10]));
    }
}
