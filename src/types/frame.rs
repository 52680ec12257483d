//! Frame types flowing from the reassembler to the decoder

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::protocol_codes::marker;

/// Envelope variant, selected by the start marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Envelope {
    /// `0x78 0x78`, one-byte length field
    Standard,
    /// `0x79 0x79`, two-byte big-endian length field
    Extended,
}

impl Envelope {
    pub const ALL: [Envelope; 2] = [Envelope::Standard, Envelope::Extended];

    pub const fn start_marker(self) -> [u8; 2] {
        match self {
            Envelope::Standard => marker::STANDARD_START,
            Envelope::Extended => marker::EXTENDED_START,
        }
    }

    /// Width of the length field in bytes.
    pub const fn length_width(self) -> usize {
        match self {
            Envelope::Standard => 1,
            Envelope::Extended => 2,
        }
    }

    /// Offset of the first byte covered by the length field (the message type).
    pub const fn header_len(self) -> usize {
        marker::LEN + self.length_width()
    }

    /// Envelope whose start marker matches the two given bytes.
    pub fn from_marker(first: u8, second: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|env| env.start_marker() == [first, second])
    }

    /// Read the length field from a buffer that begins with this envelope's marker.
    pub fn read_length(self, buf: &[u8]) -> Option<usize> {
        match self {
            Envelope::Standard => buf.get(marker::LEN).map(|b| *b as usize),
            Envelope::Extended => buf
                .get(marker::LEN..marker::LEN + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]) as usize),
        }
    }
}

/// A length-delimited span cut from the byte stream. Not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub envelope: Envelope,
    /// The complete span, markers included.
    pub bytes: Bytes,
}

impl RawFrame {
    pub fn new(envelope: Envelope, bytes: Bytes) -> Self {
        Self { envelope, bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A frame whose end marker and checksum have been verified.
///
/// Only [`FrameValidator`](crate::protocol::FrameValidator) constructs these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub envelope: Envelope,
    pub message_type: u8,
    /// Bytes between the message type and the sequence number (zero-copy view).
    pub body: Bytes,
    pub sequence: u16,
    /// The complete validated span.
    pub raw: Bytes,
}

impl Frame {
    pub(crate) fn new(
        envelope: Envelope,
        message_type: u8,
        body: Bytes,
        sequence: u16,
        raw: Bytes,
    ) -> Self {
        Self { envelope, message_type, body, sequence, raw }
    }
}
