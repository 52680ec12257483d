//! Acknowledgment frames sent back to devices
//!
//! Devices stop transmitting (or start buffering) when logins and heartbeats
//! go unanswered, so every ack must pass the device's own checksum check:
//! the encoder always uses the deployment's [`FrameFormat`].

use bytes::Bytes;
use thiserror::Error;

use super::envelope::FrameFormat;
use crate::types::protocol_codes::message_type;
use crate::types::{DecodedMessage, Envelope};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("body of {size} bytes does not fit a {envelope:?} envelope (max {max})")]
    PayloadTooLarge { envelope: Envelope, size: usize, max: usize },
}

/// Build an arbitrary frame, checking that the body fits the envelope's length field.
pub fn encode_frame(
    format: FrameFormat,
    envelope: Envelope,
    message_type: u8,
    body: &[u8],
    sequence: u16,
) -> Result<Bytes, EncodeError> {
    let max = format.max_payload(envelope).saturating_sub(3);
    if body.len() > max {
        return Err(EncodeError::PayloadTooLarge { envelope, size: body.len(), max });
    }
    Ok(format.assemble(envelope, message_type, body, sequence))
}

/// Produces the reply, if any, for a decoded message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseEncoder {
    format: FrameFormat,
    ack_positions: bool,
}

impl ResponseEncoder {
    pub fn new(format: FrameFormat) -> Self {
        Self { format, ack_positions: false }
    }

    /// Also acknowledge location and alarm packets, echoing their own type code.
    pub fn with_position_acks(mut self, enabled: bool) -> Self {
        self.ack_positions = enabled;
        self
    }

    pub fn respond(&self, message: &DecodedMessage) -> Option<Bytes> {
        match message {
            DecodedMessage::Login(login) => Some(self.login_ack(login.sequence)),
            DecodedMessage::Heartbeat(heartbeat) => Some(self.heartbeat_ack(heartbeat.sequence)),
            DecodedMessage::Location(location) if self.ack_positions => {
                Some(self.ack(location.message_type, location.sequence))
            }
            DecodedMessage::Alarm(alarm) if self.ack_positions => {
                Some(self.ack(message_type::ALARM, alarm.sequence))
            }
            _ => None,
        }
    }

    pub fn login_ack(&self, sequence: u16) -> Bytes {
        self.ack(message_type::LOGIN_ACK, sequence)
    }

    pub fn heartbeat_ack(&self, sequence: u16) -> Bytes {
        self.ack(message_type::HEARTBEAT_ACK, sequence)
    }

    // Acks carry no body: length covers type + sequence only
    fn ack(&self, code: u8, sequence: u16) -> Bytes {
        self.format.assemble(Envelope::Standard, code, &[], sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::checksum::ChecksumStrategy;
    use crate::protocol::{FrameValidator, MessageDecoder};
    use crate::test_utils::{PositionFixture, TEST_IMEI, alarm_frame, location_frame, login_frame};
    use crate::types::RawFrame;

    fn decoded(format: FrameFormat, bytes: Bytes) -> DecodedMessage {
        let frame = FrameValidator::new(format)
            .validate(&RawFrame::new(Envelope::Standard, bytes))
            .unwrap();
        MessageDecoder::default().decode(&frame).unwrap()
    }

    #[test]
    fn login_ack_echoes_sequence_and_revalidates() {
        for format in [
            FrameFormat::default(),
            FrameFormat::new(ChecksumStrategy::Crc16),
            FrameFormat::new(ChecksumStrategy::Crc16).with_length_including_checksum(true),
        ] {
            let encoder = ResponseEncoder::new(format);
            let login = decoded(format, login_frame(format, TEST_IMEI, 0x0001));

            let ack = encoder.respond(&login).expect("login must be acknowledged");
            let frame = FrameValidator::new(format)
                .validate(&RawFrame::new(Envelope::Standard, ack))
                .unwrap();

            assert_eq!(frame.message_type, message_type::LOGIN_ACK);
            assert_eq!(frame.sequence, 0x0001);
            assert!(frame.body.is_empty());
        }
    }

    #[test]
    fn sum8_login_ack_bytes() {
        let ack = ResponseEncoder::default().login_ack(1);
        assert_eq!(&ack[..], &[0x78, 0x78, 0x03, 0x01, 0x00, 0x01, 0x05, 0x0D, 0x0A]);
    }

    #[test]
    fn heartbeat_ack_type() {
        let ack = ResponseEncoder::default().heartbeat_ack(0x1234);
        assert_eq!(ack[3], 0x13);
        assert_eq!(&ack[4..6], &[0x12, 0x34]);
    }

    #[test]
    fn positions_are_not_acknowledged_by_default() {
        let format = FrameFormat::default();
        let location = decoded(format, location_frame(format, &PositionFixture::default(), 3));
        let alarm = decoded(format, alarm_frame(format, &PositionFixture::default(), 1, 4));

        assert_eq!(ResponseEncoder::new(format).respond(&location), None);
        assert_eq!(ResponseEncoder::new(format).respond(&alarm), None);
    }

    #[test]
    fn position_acks_echo_their_own_type() {
        let format = FrameFormat::default();
        let encoder = ResponseEncoder::new(format).with_position_acks(true);
        let location = decoded(format, location_frame(format, &PositionFixture::default(), 3));
        let alarm = decoded(format, alarm_frame(format, &PositionFixture::default(), 1, 4));

        let location_ack = encoder.respond(&location).unwrap();
        let alarm_ack = encoder.respond(&alarm).unwrap();
        assert_eq!(location_ack[3], 0x12);
        assert_eq!(alarm_ack[3], 0x16);
        assert_ne!(location_ack[3], message_type::LOGIN_ACK);
        assert_ne!(alarm_ack[3], message_type::HEARTBEAT_ACK);
    }

    #[test]
    fn encode_frame_limits_body_size() {
        let format = FrameFormat::default();
        assert!(encode_frame(format, Envelope::Standard, 0x15, &[0; 252], 1).is_ok());

        let err = encode_frame(format, Envelope::Standard, 0x15, &[0; 253], 1).unwrap_err();
        assert_eq!(
            err,
            EncodeError::PayloadTooLarge { envelope: Envelope::Standard, size: 253, max: 252 }
        );

        assert!(encode_frame(format, Envelope::Extended, 0x15, &[0; 253], 1).is_ok());
    }
}
