//! Pure parsers: the recording-duration grammar and the per-role byte
//! decoders for characteristic notification payloads.
//!
//! Everything in this module is free of I/O and safe to call from any async
//! or sync context.

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, InvalidFormat};
use crate::types::Role;

// ── Duration grammar ──────────────────────────────────────────────────────────

/// Parse a human-entered recording duration into seconds.
///
/// Accepted grammar: one or more ASCII digits followed by a single unit
/// letter, `s` (seconds) or `m` (minutes). No decimals, no whitespace, no
/// other suffix.
///
/// ```
/// # use igeb_rs::parse::parse_duration;
/// assert_eq!(parse_duration("30s").unwrap(), 30);
/// assert_eq!(parse_duration("2m").unwrap(), 120);
/// assert!(parse_duration("30").is_err());
/// ```
pub fn parse_duration(text: &str) -> Result<u64, InvalidFormat> {
    let invalid = || InvalidFormat(text.to_owned());

    if !text.is_ascii() {
        return Err(invalid());
    }
    let (digits, unit) = text.split_at(text.len().saturating_sub(1));
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let value: u64 = digits.parse().map_err(|_| invalid())?;
    match unit {
        "s" => Ok(value),
        "m" => value.checked_mul(60).ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

// ── Sample decoding ───────────────────────────────────────────────────────────

/// Integer width of a characteristic value on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleWidth {
    /// A single unsigned byte.
    U8,
    /// An unsigned 16-bit little-endian value.
    U16Le,
}

impl SampleWidth {
    /// Number of payload bytes the width consumes.
    pub fn len(self) -> usize {
        match self {
            SampleWidth::U8 => 1,
            SampleWidth::U16Le => 2,
        }
    }
}

/// Declared wire format for one characteristic role.
///
/// Fixed per role at configuration time; the decoder never auto-detects.
/// Defaults for IGEB firmware live in [`crate::protocol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeScheme {
    pub width: SampleWidth,
    /// Byte offset of the value within the notification payload.
    pub offset: usize,
}

impl DecodeScheme {
    /// Decode one notification payload into a numeric reading.
    ///
    /// Fails with [`DecodeError`] when `raw` is shorter than
    /// `offset + width`; the caller drops the sample and keeps the
    /// subscription alive.
    pub fn decode(&self, role: Role, raw: &[u8]) -> Result<f64, DecodeError> {
        let need = self.offset + self.width.len();
        if raw.len() < need {
            return Err(DecodeError {
                role,
                got: raw.len(),
                need,
            });
        }
        let value = match self.width {
            SampleWidth::U8 => raw[self.offset] as f64,
            SampleWidth::U16Le => {
                u16::from_le_bytes([raw[self.offset], raw[self.offset + 1]]) as f64
            }
        };
        Ok(value)
    }
}
