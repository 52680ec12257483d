//! Typed decoding of validated frames
//!
//! Decoding is a pure function of the frame and the deployment's field
//! encodings. Every read is bounds-checked up front against the minimum body
//! size of the message type, so short bodies surface as
//! [`DecodeError::Truncated`] rather than panics.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::protocol_codes::{COORDINATE_SCALE, YEAR_BASE, course_flags, message_type};
use crate::types::{
    Alarm, CellTower, CourseStatus, DecodedMessage, DeviceTimestamp, Frame, Heartbeat, Imei,
    Location, Login, Position, TerminalInfo, TerminalStatus, Unknown,
};

/// Date/time, satellites, latitude, longitude, speed, course word.
pub const POSITION_LEN: usize = 18;
/// MCC, MNC, LAC, Cell ID.
pub const CELL_LEN: usize = 8;
/// Position, LBS length, LBS, terminal info, voltage, GSM, alarm, language.
pub const ALARM_BODY_LEN: usize = 32;

/// How the login packet carries the IMEI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImeiEncoding {
    /// Eight bytes of packed BCD, first nibble zero.
    #[default]
    Bcd,
    /// Fifteen ASCII digits.
    Ascii,
}

impl ImeiEncoding {
    pub const fn width(self) -> usize {
        match self {
            ImeiEncoding::Bcd => 8,
            ImeiEncoding::Ascii => Imei::DIGITS,
        }
    }
}

impl FromStr for ImeiEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bcd" | "binary" | "packed" => Ok(ImeiEncoding::Bcd),
            "ascii" | "text" => Ok(ImeiEncoding::Ascii),
            other => Err(format!("unknown IMEI encoding '{other}' (expected bcd or ascii)")),
        }
    }
}

/// How the six date/time bytes are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateEncoding {
    /// Each byte is the raw value (`0x0A` = 10).
    #[default]
    Binary,
    /// Each byte is two packed decimal digits (`0x10` = 10).
    Bcd,
}

impl FromStr for DateEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" | "raw" => Ok(DateEncoding::Binary),
            "bcd" | "packed" => Ok(DateEncoding::Bcd),
            other => Err(format!("unknown date encoding '{other}' (expected binary or bcd)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("message type {message_type:#04x}: body is {actual} bytes, needs at least {expected}")]
    Truncated { message_type: u8, expected: usize, actual: usize },

    #[error("IMEI field {field} is not 15 decimal digits")]
    InvalidImei { field: String },

    #[error("invalid device timestamp {raw:02X?}")]
    InvalidTimestamp { raw: [u8; 6] },

    #[error("course {degrees} is outside 0-359 degrees")]
    InvalidCourse { degrees: u16 },
}

/// Stateless decoder configured with the deployment's field encodings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageDecoder {
    imei: ImeiEncoding,
    date: DateEncoding,
}

impl MessageDecoder {
    pub fn new(imei: ImeiEncoding, date: DateEncoding) -> Self {
        Self { imei, date }
    }

    /// Decode a validated frame into a typed message.
    pub fn decode(&self, frame: &Frame) -> Result<DecodedMessage, DecodeError> {
        let body = &frame.body[..];
        let sequence = frame.sequence;

        match frame.message_type {
            message_type::LOGIN => self.decode_login(body, sequence).map(DecodedMessage::Login),
            message_type::LOCATION | message_type::LOCATION_4G => self
                .decode_location(frame.message_type, body, sequence)
                .map(DecodedMessage::Location),
            message_type::HEARTBEAT => {
                Ok(DecodedMessage::Heartbeat(decode_heartbeat(body, sequence)))
            }
            message_type::ALARM => self.decode_alarm(body, sequence).map(DecodedMessage::Alarm),
            // String info, address query, server command and anything unrecognized
            other => Ok(DecodedMessage::Unknown(Unknown {
                message_type: other,
                raw: frame.raw.clone(),
                sequence,
            })),
        }
    }

    fn decode_login(&self, body: &[u8], sequence: u16) -> Result<Login, DecodeError> {
        let width = self.imei.width();
        require(message_type::LOGIN, body, width)?;

        let field = &body[..width];
        let digits = match self.imei {
            ImeiEncoding::Bcd => bcd_digits(field),
            ImeiEncoding::Ascii => std::str::from_utf8(field).ok().map(str::to_string),
        };
        let imei = digits
            .as_deref()
            .and_then(Imei::parse)
            .ok_or_else(|| DecodeError::InvalidImei { field: hex(field) })?;

        // Extended login: type identification code, then the time zone word
        let tail = &body[width..];
        let type_code = tail.get(0..2).map(|b| u16::from_be_bytes([b[0], b[1]]));
        let timezone_minutes =
            tail.get(2..4).map(|b| timezone_minutes(u16::from_be_bytes([b[0], b[1]])));

        Ok(Login { imei, type_code, timezone_minutes, sequence })
    }

    fn decode_location(
        &self,
        message_type: u8,
        body: &[u8],
        sequence: u16,
    ) -> Result<Location, DecodeError> {
        require(message_type, body, POSITION_LEN)?;
        let position = self.decode_position(&body[..POSITION_LEN])?;
        let cell = body.get(POSITION_LEN..POSITION_LEN + CELL_LEN).map(decode_cell);
        Ok(Location { message_type, position, cell, sequence })
    }

    fn decode_alarm(&self, body: &[u8], sequence: u16) -> Result<Alarm, DecodeError> {
        require(message_type::ALARM, body, ALARM_BODY_LEN)?;
        let position = self.decode_position(&body[..POSITION_LEN])?;

        // A zero LBS length means the device had no cell fix
        let lbs_len = body[POSITION_LEN];
        let lbs_start = POSITION_LEN + 1;
        let cell = (lbs_len != 0).then(|| decode_cell(&body[lbs_start..lbs_start + CELL_LEN]));

        let status_at = lbs_start + CELL_LEN;
        let status = TerminalStatus {
            info: TerminalInfo(body[status_at]),
            voltage_level: Some(body[status_at + 1]),
            gsm_signal: Some(body[status_at + 2]),
        };
        let alarm_code = body[status_at + 3];
        let language = Some(body[status_at + 4]);

        Ok(Alarm { position, cell, status, alarm_code, language, sequence })
    }

    /// Decode the 18-byte position block. `block` must be exactly [`POSITION_LEN`] bytes.
    fn decode_position(&self, block: &[u8]) -> Result<Position, DecodeError> {
        let mut raw_time = [0u8; 6];
        raw_time.copy_from_slice(&block[..6]);
        let timestamp = self.decode_timestamp(raw_time)?;

        let satellite_count = block[6] >> 4;
        let lat_raw = u32::from_be_bytes([block[7], block[8], block[9], block[10]]);
        let lon_raw = u32::from_be_bytes([block[11], block[12], block[13], block[14]]);
        let speed_kmh = block[15];
        let status = CourseStatus::new(u16::from_be_bytes([block[16], block[17]]));
        let course_degrees = status.course_degrees();
        if course_degrees > course_flags::MAX_COURSE {
            return Err(DecodeError::InvalidCourse { degrees: course_degrees });
        }

        let hemisphere = status.hemisphere();
        let (latitude, longitude) =
            hemisphere.apply(lat_raw as f64 / COORDINATE_SCALE, lon_raw as f64 / COORDINATE_SCALE);

        Ok(Position {
            timestamp,
            latitude,
            longitude,
            speed_kmh,
            course_degrees,
            satellite_count,
            fix_valid: status.fix_valid(),
            real_time: status.real_time(),
            hemisphere,
        })
    }

    fn decode_timestamp(&self, raw: [u8; 6]) -> Result<DeviceTimestamp, DecodeError> {
        self.calendar(raw).ok_or(DecodeError::InvalidTimestamp { raw })
    }

    fn calendar(&self, raw: [u8; 6]) -> Option<DeviceTimestamp> {
        let field = |b: u8| match self.date {
            DateEncoding::Binary => Some(b),
            DateEncoding::Bcd => bcd_byte(b),
        };
        let [year, month, day, hour, minute, second] = raw;

        DeviceTimestamp::new(
            YEAR_BASE + field(year)? as u16,
            field(month)?,
            field(day)?,
            field(hour)?,
            field(minute)?,
            field(second)?,
        )
    }
}

fn decode_heartbeat(body: &[u8], sequence: u16) -> Heartbeat {
    let status = body.first().map(|info| TerminalStatus {
        info: TerminalInfo(*info),
        voltage_level: body.get(1).copied(),
        gsm_signal: body.get(2).copied(),
    });
    Heartbeat { status, sequence }
}

/// Decode an 8-byte LBS block.
fn decode_cell(b: &[u8]) -> CellTower {
    CellTower {
        mcc: u16::from_be_bytes([b[0], b[1]]),
        mnc: b[2],
        lac: u16::from_be_bytes([b[3], b[4]]),
        cell_id: u32::from_be_bytes([0, b[5], b[6], b[7]]),
    }
}

fn require(message_type: u8, body: &[u8], expected: usize) -> Result<(), DecodeError> {
    if body.len() < expected {
        return Err(DecodeError::Truncated { message_type, expected, actual: body.len() });
    }
    Ok(())
}

/// Signed minutes east of UTC from the login time zone word.
///
/// Bits 15-4 hold `hours * 100 + minutes`, bit 3 set means west of UTC.
fn timezone_minutes(word: u16) -> i16 {
    let value = (word >> 4) as i16;
    let minutes = (value / 100) * 60 + value % 100;
    if word & 0x0008 != 0 { -minutes } else { minutes }
}

fn bcd_byte(b: u8) -> Option<u8> {
    let (hi, lo) = (b >> 4, b & 0x0F);
    (hi <= 9 && lo <= 9).then_some(hi * 10 + lo)
}

fn bcd_digits(field: &[u8]) -> Option<String> {
    let mut digits = String::with_capacity(field.len() * 2);
    for b in field {
        for nibble in [b >> 4, b & 0x0F] {
            if nibble > 9 {
                return None;
            }
            digits.push(char::from(b'0' + nibble));
        }
    }
    Some(digits)
}

fn hex(field: &[u8]) -> String {
    field.iter().map(|b| format!("{b:02X}")).collect()
}
