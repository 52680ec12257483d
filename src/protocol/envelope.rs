//! Frame layout shared by the reassembler, validator and encoder
//!
//! ```text
//! start(2) | length(1|2) | type(1) | body(n) | sequence(2) | checksum(1|2) | end(2)
//! ```
//!
//! The checksum covers `length ..= sequence`.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::checksum::ChecksumStrategy;
use crate::types::Envelope;
use crate::types::protocol_codes::marker;

/// Message type byte plus sequence number: the smallest payload a frame can carry.
pub const MIN_PAYLOAD: usize = 3;

/// Deployment-wide framing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameFormat {
    pub checksum: ChecksumStrategy,
    /// Count the checksum bytes inside the length field.
    pub length_includes_checksum: bool,
}

impl FrameFormat {
    pub const fn new(checksum: ChecksumStrategy) -> Self {
        Self { checksum, length_includes_checksum: false }
    }

    pub const fn with_length_including_checksum(mut self, enabled: bool) -> Self {
        self.length_includes_checksum = enabled;
        self
    }

    /// Total span of a frame whose length field reads `declared`.
    pub fn frame_len(&self, envelope: Envelope, declared: usize) -> usize {
        let trailer = if self.length_includes_checksum { 0 } else { self.checksum.width() };
        envelope.header_len() + declared + trailer + marker::LEN
    }

    /// Bytes of type + body + sequence described by a length field value.
    ///
    /// `None` when the value cannot even hold the checksum it claims to include.
    pub fn payload_len(&self, declared: usize) -> Option<usize> {
        if self.length_includes_checksum {
            declared.checked_sub(self.checksum.width())
        } else {
            Some(declared)
        }
    }

    /// Length field value for a payload of `payload` bytes.
    pub fn length_value(&self, payload: usize) -> usize {
        if self.length_includes_checksum { payload + self.checksum.width() } else { payload }
    }

    /// Largest payload the envelope's length field can describe.
    pub fn max_payload(&self, envelope: Envelope) -> usize {
        let max_field = match envelope {
            Envelope::Standard => u8::MAX as usize,
            Envelope::Extended => u16::MAX as usize,
        };
        self.payload_len(max_field).unwrap_or(0)
    }

    /// Write a complete frame. The caller guarantees the payload fits the envelope.
    pub(crate) fn assemble(
        &self,
        envelope: Envelope,
        message_type: u8,
        body: &[u8],
        sequence: u16,
    ) -> Bytes {
        let payload = 1 + body.len() + 2;
        let declared = self.length_value(payload);
        let mut out = BytesMut::with_capacity(self.frame_len(envelope, declared));

        out.put_slice(&envelope.start_marker());
        match envelope {
            Envelope::Standard => out.put_u8(declared as u8),
            Envelope::Extended => out.put_u16(declared as u16),
        }
        out.put_u8(message_type);
        out.put_slice(body);
        out.put_u16(sequence);

        let checksum = self.checksum.compute(&out[marker::LEN..]);
        self.checksum.put(checksum, &mut out);
        out.put_slice(&marker::END);
        out.freeze()
    }
}

impl From<ChecksumStrategy> for FrameFormat {
    fn from(checksum: ChecksumStrategy) -> Self {
        Self::new(checksum)
    }
}
