//! Frame integrity checks
//!
//! Validation never fails loudly: a candidate either becomes a [`Frame`] or
//! comes back as a [`Rejection`] that the connection logs and drops.

use bytes::Bytes;
use thiserror::Error;

use super::envelope::{FrameFormat, MIN_PAYLOAD};
use crate::types::protocol_codes::marker;
use crate::types::{Frame, RawFrame};

/// Why a candidate frame was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("end marker mismatch: found {found:02X?}")]
    BadEndMarker { found: [u8; 2] },

    #[error("declared length {declared} cannot hold a message type and sequence")]
    LengthTooShort { declared: usize },

    #[error("frame is {actual} bytes but its length field describes {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("checksum mismatch: expected {expected:#06x}, found {found:#06x}")]
    ChecksumMismatch { expected: u16, found: u16 },
}

impl Rejection {
    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::BadEndMarker { .. } => "end_marker",
            Rejection::LengthTooShort { .. } => "length",
            Rejection::SizeMismatch { .. } => "size",
            Rejection::ChecksumMismatch { .. } => "checksum",
        }
    }
}

/// Checks end marker, structure and checksum of reassembled candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameValidator {
    format: FrameFormat,
}

impl FrameValidator {
    pub fn new(format: FrameFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Validate a candidate and split it into its fields.
    pub fn validate(&self, candidate: &RawFrame) -> Result<Frame, Rejection> {
        let raw = &candidate.bytes;
        let envelope = candidate.envelope;

        let end = raw.len().saturating_sub(marker::LEN);
        let found = match raw.get(end..) {
            Some([a, b]) => [*a, *b],
            _ => [0, 0],
        };
        if raw.len() < marker::LEN || found != marker::END {
            return Err(Rejection::BadEndMarker { found });
        }

        let declared = envelope.read_length(raw).unwrap_or(0);
        let payload = match self.format.payload_len(declared) {
            Some(payload) if payload >= MIN_PAYLOAD => payload,
            _ => return Err(Rejection::LengthTooShort { declared }),
        };

        let expected = self.format.frame_len(envelope, declared);
        if raw.len() != expected {
            return Err(Rejection::SizeMismatch { expected, actual: raw.len() });
        }

        // Covered span: length field through sequence
        let header = envelope.header_len();
        let checksum_at = header + payload;
        let width = self.format.checksum.width();
        let computed = self.format.checksum.compute(&raw[marker::LEN..checksum_at]);
        let found = self.format.checksum.read(&raw[checksum_at..checksum_at + width]).unwrap_or(0);
        if computed != found {
            return Err(Rejection::ChecksumMismatch { expected: computed, found });
        }

        let message_type = raw[header];
        let sequence = u16::from_be_bytes([raw[checksum_at - 2], raw[checksum_at - 1]]);
        let body: Bytes = raw.slice(header + 1..checksum_at - 2);

        Ok(Frame::new(envelope, message_type, body, sequence, raw.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::checksum::ChecksumStrategy;
    use crate::test_utils::{heartbeat_frame, login_frame};
    use crate::types::Envelope;

    use proptest::prelude::*;

    const IMEI: &str = "123456789012345";

    fn candidate(bytes: &[u8]) -> RawFrame {
        let envelope = Envelope::from_marker(bytes[0], bytes[1]).unwrap_or(Envelope::Standard);
        RawFrame::new(envelope, Bytes::copy_from_slice(bytes))
    }

    #[test]
    fn accepts_well_formed_frame() {
        let bytes = heartbeat_frame(FrameFormat::default(), 0x0102);
        let frame = FrameValidator::default().validate(&candidate(&bytes)).unwrap();

        assert_eq!(frame.message_type, 0x13);
        assert_eq!(frame.sequence, 0x0102);
        assert_eq!(frame.raw, bytes);
    }

    #[test]
    fn body_is_between_type_and_sequence() {
        let bytes = login_frame(FrameFormat::default(), IMEI, 1);
        let frame = FrameValidator::default().validate(&candidate(&bytes)).unwrap();
        assert_eq!(&frame.body[..], &[0x01, 0x23, 0x45, 0x67, 0x89, 0x01, 0x23, 0x45]);
    }

    #[test]
    fn rejects_bad_end_marker() {
        let mut bytes = heartbeat_frame(FrameFormat::default(), 1).to_vec();
        let last = bytes.len() - 1;
        bytes[last] = 0x0B;

        let err = FrameValidator::default().validate(&candidate(&bytes)).unwrap_err();
        assert_eq!(err, Rejection::BadEndMarker { found: [0x0D, 0x0B] });
        assert_eq!(err.kind(), "end_marker");
    }

    #[test]
    fn rejects_length_below_minimum() {
        // 78 78 02 | 13 00 | cs | 0D 0A
        let bytes = [0x78, 0x78, 0x02, 0x13, 0x00, 0x15, 0x0D, 0x0A];
        let err = FrameValidator::default().validate(&candidate(&bytes)).unwrap_err();
        assert_eq!(err, Rejection::LengthTooShort { declared: 2 });
    }

    #[test]
    fn rejects_size_mismatch() {
        let mut bytes = heartbeat_frame(FrameFormat::default(), 1).to_vec();
        bytes.insert(4, 0x00);
        let err = FrameValidator::default().validate(&candidate(&bytes)).unwrap_err();
        assert!(matches!(err, Rejection::SizeMismatch { .. }));
    }

    #[test]
    fn strategy_mismatch_is_rejected() {
        let bytes = login_frame(FrameFormat::default(), IMEI, 1);
        let crc = FrameValidator::new(FrameFormat::new(ChecksumStrategy::Crc16));
        assert!(crc.validate(&candidate(&bytes)).is_err());
    }

    #[test]
    fn accepts_published_crc_login() {
        let bytes = [
            0x78, 0x78, 0x0D, 0x01, 0x01, 0x23, 0x45, 0x67, 0x89, 0x01, 0x23, 0x45, 0x00, 0x01,
            0x8C, 0xDD, 0x0D, 0x0A,
        ];
        let format = FrameFormat::new(ChecksumStrategy::Crc16).with_length_including_checksum(true);
        let frame = FrameValidator::new(format).validate(&candidate(&bytes)).unwrap();

        assert_eq!(frame.message_type, 0x01);
        assert_eq!(frame.sequence, 1);
        assert_eq!(frame.body.len(), 8);
    }

    proptest! {
        #[test]
        fn prop_single_byte_flip_is_rejected(
            index in 0usize..64,
            mask in 1u8..=255,
            seq in any::<u16>(),
            crc in any::<bool>()
        ) {
            let strategy = if crc { ChecksumStrategy::Crc16 } else { ChecksumStrategy::Sum8 };
            let format = FrameFormat::new(strategy);
            let bytes = login_frame(format, IMEI, seq);

            // Covered span without the length field: a changed length is a size error instead
            let covered = 3..bytes.len() - strategy.width() - marker::LEN;
            let position = covered.start + index % covered.len();

            let mut mutated = bytes.to_vec();
            mutated[position] ^= mask;

            let result = FrameValidator::new(format).validate(&candidate(&mutated));
            let is_checksum_mismatch = matches!(result, Err(Rejection::ChecksumMismatch { .. }));
            prop_assert!(is_checksum_mismatch);
        }

        #[test]
        fn prop_length_flip_never_passes(mask in 1u8..=255, seq in any::<u16>()) {
            let format = FrameFormat::default();
            let mut mutated = login_frame(format, IMEI, seq).to_vec();
            mutated[2] ^= mask;
            prop_assert!(FrameValidator::new(format).validate(&candidate(&mutated)).is_err());
        }
    }
}
