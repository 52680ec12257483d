//! Constants for interpreting GT06 frames
//!
//! Message type codes, envelope markers and the bit positions used inside the
//! course/status word and the terminal information byte.

// Envelope markers
pub mod marker {
    pub const STANDARD_START: [u8; 2] = [0x78, 0x78]; // 1-byte length field
    pub const EXTENDED_START: [u8; 2] = [0x79, 0x79]; // 2-byte length field
    pub const END: [u8; 2] = [0x0D, 0x0A];
    pub const LEN: usize = 2;
}

// Message type codes (protocol number byte)
pub mod message_type {
    pub const LOGIN: u8 = 0x01;
    pub const LOCATION: u8 = 0x12;
    pub const HEARTBEAT: u8 = 0x13;
    pub const STRING_INFO: u8 = 0x15; // pass-through
    pub const ALARM: u8 = 0x16;
    pub const ADDRESS_QUERY: u8 = 0x1A; // pass-through
    pub const LOCATION_4G: u8 = 0x22; // newer firmware generation
    pub const SERVER_COMMAND: u8 = 0x80; // pass-through

    // Ack codes echo the request type
    pub const LOGIN_ACK: u8 = LOGIN;
    pub const HEARTBEAT_ACK: u8 = HEARTBEAT;
}

// Course/status word (2 bytes, big-endian)
pub mod course_flags {
    pub const COURSE_MASK: u16 = 0x03FF; // bits 0-9
    pub const MAX_COURSE: u16 = 359;
    pub const NORTH_LATITUDE: u16 = 0x0400; // bit 10: 1 = north, 0 = south
    pub const WEST_LONGITUDE: u16 = 0x0800; // bit 11: 1 = west, 0 = east
    pub const GPS_POSITIONED: u16 = 0x1000; // bit 12
    pub const REAL_TIME_GPS: u16 = 0x2000; // bit 13: 0 = differential/replayed
}

// Terminal information byte (heartbeat and alarm packets)
pub mod terminal_info {
    pub const DEFENSE_ACTIVATED: u8 = 0x01;
    pub const ACC_HIGH: u8 = 0x02;
    pub const CHARGING: u8 = 0x04;
    pub const ALARM_MASK: u8 = 0x38; // bits 3-5
    pub const ALARM_SHIFT: u8 = 3;
    pub const GPS_TRACKING: u8 = 0x40;
    pub const OIL_ELECTRICITY_DISCONNECTED: u8 = 0x80;
}

// Alarm codes carried in the alarm/language word
pub mod alarm {
    pub const NORMAL: u8 = 0x00;
    pub const SOS: u8 = 0x01;
    pub const POWER_CUT: u8 = 0x02;
    pub const SHOCK: u8 = 0x03;
    pub const FENCE_IN: u8 = 0x04;
    pub const FENCE_OUT: u8 = 0x05;
}

/// Raw coordinate units per decimal degree (minutes scaled by 30000).
pub const COORDINATE_SCALE: f64 = 1_800_000.0;

/// Offset added to the one-byte year field.
pub const YEAR_BASE: u16 = 2000;
