//! Decoded message model

use bytes::Bytes;
use serde::Serialize;

use super::alarm::{AlarmKind, decode_alarm};
use super::bitfield::{Hemisphere, TerminalStatus};
use super::imei::Imei;
use super::protocol_codes::message_type;
use super::timestamp::DeviceTimestamp;

/// Typed view of one validated frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DecodedMessage {
    Login(Login),
    Location(Location),
    Heartbeat(Heartbeat),
    Alarm(Alarm),
    Unknown(Unknown),
}

impl DecodedMessage {
    pub fn sequence(&self) -> u16 {
        match self {
            DecodedMessage::Login(m) => m.sequence,
            DecodedMessage::Location(m) => m.sequence,
            DecodedMessage::Heartbeat(m) => m.sequence,
            DecodedMessage::Alarm(m) => m.sequence,
            DecodedMessage::Unknown(m) => m.sequence,
        }
    }

    /// Protocol number of the frame this message came from.
    pub fn message_type(&self) -> u8 {
        match self {
            DecodedMessage::Login(_) => message_type::LOGIN,
            DecodedMessage::Location(m) => m.message_type,
            DecodedMessage::Heartbeat(_) => message_type::HEARTBEAT,
            DecodedMessage::Alarm(_) => message_type::ALARM,
            DecodedMessage::Unknown(m) => m.message_type,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            DecodedMessage::Login(_) => "login",
            DecodedMessage::Location(_) => "location",
            DecodedMessage::Heartbeat(_) => "heartbeat",
            DecodedMessage::Alarm(_) => "alarm",
            DecodedMessage::Unknown(_) => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Login {
    pub imei: Imei,
    /// Terminal type identification code (extended login body).
    pub type_code: Option<u16>,
    /// Device time zone as signed minutes east of UTC (extended login body).
    pub timezone_minutes: Option<i16>,
    pub sequence: u16,
}

/// Position block shared by location and alarm packets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub timestamp: DeviceTimestamp,
    /// Signed decimal degrees, negative south of the equator.
    pub latitude: f64,
    /// Signed decimal degrees, negative west of Greenwich.
    pub longitude: f64,
    pub speed_kmh: u8,
    pub course_degrees: u16,
    pub satellite_count: u8,
    pub fix_valid: bool,
    pub real_time: bool,
    pub hemisphere: Hemisphere,
}

/// Serving cell identifiers (LBS block).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellTower {
    pub mcc: u16,
    pub mnc: u8,
    pub lac: u16,
    pub cell_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    /// `0x12` or `0x22` depending on firmware generation.
    pub message_type: u8,
    pub position: Position,
    pub cell: Option<CellTower>,
    pub sequence: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heartbeat {
    pub status: Option<TerminalStatus>,
    pub sequence: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alarm {
    pub position: Position,
    pub cell: Option<CellTower>,
    pub status: TerminalStatus,
    pub alarm_code: u8,
    pub language: Option<u8>,
    pub sequence: u16,
}

impl Alarm {
    pub fn kind(&self) -> AlarmKind {
        decode_alarm(self.alarm_code)
    }
}

/// Recognized-but-undecoded or unrecognized message type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unknown {
    pub message_type: u8,
    #[serde(serialize_with = "serialize_bytes")]
    pub raw: Bytes,
    pub sequence: u16,
}

fn serialize_bytes<S: serde::Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_bytes(bytes)
}
