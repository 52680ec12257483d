//! Frame fixtures for tests and benchmarks
//!
//! Builders for well-formed device frames so tests can describe a scenario
//! ("login, then a location in the southern hemisphere") instead of
//! hand-writing hex dumps.

use bytes::Bytes;

use crate::protocol::FrameFormat;
use crate::types::protocol_codes::message_type;
use crate::types::{CellTower, Envelope};

/// Default fixture IMEI.
pub const TEST_IMEI: &str = "123456789012345";

/// Build any frame in the standard envelope.
pub fn frame(format: FrameFormat, message_type: u8, body: &[u8], sequence: u16) -> Bytes {
    format.assemble(Envelope::Standard, message_type, body, sequence)
}

/// Pack an IMEI into eight BCD bytes with a leading zero nibble.
pub fn imei_bcd(imei: &str) -> Vec<u8> {
    let padded = format!("{imei:0>16}");
    padded
        .as_bytes()
        .chunks(2)
        .map(|pair| ((pair[0] - b'0') << 4) | (pair[1] - b'0'))
        .collect()
}

pub fn login_frame(format: FrameFormat, imei: &str, sequence: u16) -> Bytes {
    frame(format, message_type::LOGIN, &imei_bcd(imei), sequence)
}

pub fn ascii_login_frame(format: FrameFormat, imei: &str, sequence: u16) -> Bytes {
    frame(format, message_type::LOGIN, imei.as_bytes(), sequence)
}

/// Heartbeat with terminal info, voltage, GSM strength and a language word.
pub fn heartbeat_frame(format: FrameFormat, sequence: u16) -> Bytes {
    frame(format, message_type::HEARTBEAT, &[0x44, 0x04, 0x03, 0x00, 0x02], sequence)
}

/// Raw fields of an 18-byte position block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionFixture {
    /// Year offset, month, day, hour, minute, second as raw bytes.
    pub datetime: [u8; 6],
    /// High nibble: satellites in use.
    pub satellites: u8,
    pub latitude: u32,
    pub longitude: u32,
    pub speed: u8,
    pub course_word: u16,
}

impl Default for PositionFixture {
    /// 2010-03-23 15:33:40, 12 satellites, 22.5461 N 118.8894 E, 60 km/h,
    /// course 340, fix valid.
    fn default() -> Self {
        Self {
            datetime: [0x0A, 0x03, 0x17, 0x0F, 0x21, 0x28],
            satellites: 0xC5,
            latitude: 0x026B_3F3E,
            longitude: 0x0CC1_6559,
            speed: 60,
            course_word: 0x1554,
        }
    }
}

impl PositionFixture {
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(18);
        out.extend_from_slice(&self.datetime);
        out.push(self.satellites);
        out.extend_from_slice(&self.latitude.to_be_bytes());
        out.extend_from_slice(&self.longitude.to_be_bytes());
        out.push(self.speed);
        out.extend_from_slice(&self.course_word.to_be_bytes());
        out
    }
}

pub fn cell_bytes(cell: &CellTower) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&cell.mcc.to_be_bytes());
    out.push(cell.mnc);
    out.extend_from_slice(&cell.lac.to_be_bytes());
    out.extend_from_slice(&cell.cell_id.to_be_bytes()[1..]);
    out
}

pub fn test_cell() -> CellTower {
    CellTower { mcc: 460, mnc: 0, lac: 0x2866, cell_id: 0x00_7DCE }
}

pub fn location_body(position: &PositionFixture, cell: Option<&CellTower>) -> Vec<u8> {
    let mut body = position.bytes();
    if let Some(cell) = cell {
        body.extend_from_slice(&cell_bytes(cell));
    }
    body
}

pub fn location_frame(format: FrameFormat, position: &PositionFixture, sequence: u16) -> Bytes {
    frame(format, message_type::LOCATION, &location_body(position, Some(&test_cell())), sequence)
}

/// 32-byte alarm body: position, LBS, status bytes, alarm code and language.
pub fn alarm_body(position: &PositionFixture, alarm_code: u8) -> Vec<u8> {
    let mut body = position.bytes();
    body.push(0x08);
    body.extend_from_slice(&cell_bytes(&test_cell()));
    body.extend_from_slice(&[0x46, 0x05, 0x04]);
    body.push(alarm_code);
    body.push(0x02);
    body
}

pub fn alarm_frame(
    format: FrameFormat,
    position: &PositionFixture,
    alarm_code: u8,
    sequence: u16,
) -> Bytes {
    frame(format, message_type::ALARM, &alarm_body(position, alarm_code), sequence)
}
