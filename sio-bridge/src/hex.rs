//! Hex helpers for log output and for the line-based byte source.

use std::fmt;

use crate::error::ParseError;

/// Format one byte as `0x90`.
pub fn to_hex(byte: u8) -> String {
    format!("{byte:#04x}")
}

/// Display wrapper that renders a byte slice as `[0x90, 0x40, 0x7f]`.
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{b:#04x}")?;
        }
        f.write_str("]")
    }
}

/// Parse whitespace- or comma-separated hex bytes, e.g. `90 40 7f` or
/// `0x90,0x40,0x7F`.
///
/// An empty or blank line yields an empty vector.
pub fn parse_line(line: &str) -> Result<Vec<u8>, ParseError> {
    line.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|tok| !tok.is_empty())
        .map(|tok| {
            let digits = tok
                .strip_prefix("0x")
                .or_else(|| tok.strip_prefix("0X"))
                .unwrap_or(tok);
            if digits.is_empty() || digits.len() > 2 {
                return Err(ParseError::InvalidByte(tok.to_string()));
            }
            u8::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidByte(tok.to_string()))
        })
        .collect()
}
