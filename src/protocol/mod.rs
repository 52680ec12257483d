//! Device protocol: framing, validation, decoding and acknowledgments
//!
//! Bytes flow through three stages per connection:
//! - [`FrameReassembler`] cuts length-delimited candidates out of the stream
//! - [`FrameValidator`] checks end marker, structure and checksum
//! - [`MessageDecoder`] maps a validated [`Frame`](crate::types::Frame) to a
//!   [`DecodedMessage`](crate::types::DecodedMessage)
//!
//! [`ResponseEncoder`] builds the replies using the same [`FrameFormat`].
//!
//! ```rust
//! use fleetwire::protocol::{FrameFormat, FrameReassembler, FrameValidator, MessageDecoder};
//! use fleetwire::types::DecodedMessage;
//!
//! // Login from IMEI 123456789012345, sequence 1, modulo-256 checksum
//! let bytes = [
//!     0x78, 0x78, 0x0B, 0x01, 0x01, 0x23, 0x45, 0x67, 0x89, 0x01, 0x23, 0x45,
//!     0x00, 0x01, 0xCF, 0x0D, 0x0A,
//! ];
//!
//! let format = FrameFormat::default();
//! let mut reassembler = FrameReassembler::new(format);
//! let candidates = reassembler.push(&bytes);
//! let frame = FrameValidator::new(format).validate(&candidates[0]).unwrap();
//! let message = MessageDecoder::default().decode(&frame).unwrap();
//!
//! assert!(matches!(message, DecodedMessage::Login(ref login) if login.imei.as_str() == "123456789012345"));
//! ```

pub mod checksum;
pub mod decoder;
pub mod encoder;
pub mod envelope;
pub mod reassembler;
pub mod validator;

pub use checksum::{ChecksumStrategy, crc16_x25, sum8};
pub use decoder::{DateEncoding, DecodeError, ImeiEncoding, MessageDecoder};
pub use encoder::{EncodeError, ResponseEncoder, encode_frame};
pub use envelope::FrameFormat;
pub use reassembler::{FrameReassembler, ReassemblerStats};
pub use validator::{FrameValidator, Rejection};
