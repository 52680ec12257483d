//! Bit-packed status words carried by location, heartbeat and alarm packets

use serde::{Deserialize, Serialize};

use super::protocol_codes::{course_flags, terminal_info};

/// Course/status word trailing every position block.
///
/// Low 10 bits carry the course over ground; bits 10-13 carry the hemisphere
/// and fix-quality flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseStatus(pub u16);

impl CourseStatus {
    /// Create a new CourseStatus from the raw big-endian word.
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Check if a specific flag is set using a bitmask.
    pub fn has_flag(&self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    /// Course over ground in degrees.
    pub fn course_degrees(&self) -> u16 {
        self.0 & course_flags::COURSE_MASK
    }

    pub fn fix_valid(&self) -> bool {
        self.has_flag(course_flags::GPS_POSITIONED)
    }

    pub fn real_time(&self) -> bool {
        self.has_flag(course_flags::REAL_TIME_GPS)
    }

    pub fn hemisphere(&self) -> Hemisphere {
        Hemisphere {
            north: self.has_flag(course_flags::NORTH_LATITUDE),
            east: !self.has_flag(course_flags::WEST_LONGITUDE),
        }
    }

    /// Get the raw u16 value.
    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Hemisphere the reported coordinates belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hemisphere {
    pub north: bool,
    pub east: bool,
}

impl Hemisphere {
    /// Apply the hemisphere sign to unsigned decimal degrees.
    pub fn apply(&self, latitude: f64, longitude: f64) -> (f64, f64) {
        let lat = if self.north { latitude } else { -latitude };
        let lon = if self.east { longitude } else { -longitude };
        (lat, lon)
    }
}

/// Terminal information byte reported by heartbeat and alarm packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalInfo(pub u8);

impl TerminalInfo {
    pub fn has_flag(&self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    pub fn defense_activated(&self) -> bool {
        self.has_flag(terminal_info::DEFENSE_ACTIVATED)
    }

    pub fn acc_high(&self) -> bool {
        self.has_flag(terminal_info::ACC_HIGH)
    }

    pub fn charging(&self) -> bool {
        self.has_flag(terminal_info::CHARGING)
    }

    pub fn gps_tracking(&self) -> bool {
        self.has_flag(terminal_info::GPS_TRACKING)
    }

    pub fn oil_electricity_disconnected(&self) -> bool {
        self.has_flag(terminal_info::OIL_ELECTRICITY_DISCONNECTED)
    }

    /// Three-bit alarm field (bits 3-5): 0 normal, 1 shock, 2 power cut,
    /// 3 low battery, 4 SOS.
    pub fn alarm_bits(&self) -> u8 {
        (self.0 & terminal_info::ALARM_MASK) >> terminal_info::ALARM_SHIFT
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Terminal status block: information byte plus optional power/radio levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalStatus {
    pub info: TerminalInfo,
    /// Battery level on the device's 0-6 scale.
    pub voltage_level: Option<u8>,
    /// GSM signal strength on the device's 0-4 scale.
    pub gsm_signal: Option<u8>,
}

/// Compare 16-bit sequence numbers with wraparound using the half-range rule.
/// Returns true if `a` is considered newer than `b`.
pub fn sequence_after(a: u16, b: u16) -> bool {
    if a == b {
        return false;
    }
    a.wrapping_sub(b) < 0x8000
}
