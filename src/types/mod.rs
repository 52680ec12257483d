//! Core types for device protocol data representation.
//!
//! This module provides the data structures shared by every stage of the
//! ingestion pipeline:
//! - [`RawFrame`] and [`Frame`] carry byte spans from the reassembler to the decoder
//! - [`DecodedMessage`] is the typed result of decoding one frame
//! - [`CourseStatus`] and [`TerminalInfo`] expose bit-packed status words
//! - [`Imei`] and [`DeviceTimestamp`] are validated value types
//! - [`TelemetryRecord`] is the shape handed to the telemetry sink
//!
//! ## Usage Example
//!
//! ```rust
//! use fleetwire::types::{CourseStatus, Hemisphere};
//!
//! // Course 90 degrees, fix valid, southern hemisphere, west longitude
//! let status = CourseStatus::new(0x1800 | 90);
//! assert_eq!(status.course_degrees(), 90);
//! assert!(status.fix_valid());
//! assert_eq!(status.hemisphere(), Hemisphere { north: false, east: false });
//! ```

mod alarm;
mod bitfield;
mod frame;
mod imei;
mod message;
pub mod protocol_codes;
mod record;
mod timestamp;

pub use alarm::{AlarmKind, decode_alarm};
pub use bitfield::{CourseStatus, Hemisphere, TerminalInfo, TerminalStatus, sequence_after};
pub use frame::{Envelope, Frame, RawFrame};
pub use imei::Imei;
pub use message::{
    Alarm, CellTower, DecodedMessage, Heartbeat, Location, Login, Position, Unknown,
};
pub use record::{CellRecord, TelemetryRecord};
pub use timestamp::DeviceTimestamp;

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_course_word_fields_are_independent(course in 0u16..360, flags in 0u16..16) {
            let word = (flags << 10) | course;
            let status = CourseStatus::new(word);

            prop_assert_eq!(status.course_degrees(), course);
            prop_assert_eq!(status.hemisphere().north, flags & 0b0001 != 0);
            prop_assert_eq!(status.hemisphere().east, flags & 0b0010 == 0);
            prop_assert_eq!(status.fix_valid(), flags & 0b0100 != 0);
            prop_assert_eq!(status.real_time(), flags & 0b1000 != 0);
        }

        #[test]
        fn prop_hemisphere_only_changes_sign(
            lat in 0.0f64..90.0,
            lon in 0.0f64..180.0,
            north in any::<bool>(),
            east in any::<bool>()
        ) {
            let (signed_lat, signed_lon) = Hemisphere { north, east }.apply(lat, lon);
            prop_assert_eq!(signed_lat.abs(), lat);
            prop_assert_eq!(signed_lon.abs(), lon);
            prop_assert_eq!(signed_lat < 0.0, !north && lat > 0.0);
            prop_assert_eq!(signed_lon < 0.0, !east && lon > 0.0);
        }

        #[test]
        fn prop_timestamps_order_like_unix_seconds(
            a in (2000u16..2099, 1u8..=12, 1u8..=28, 0u8..24, 0u8..60, 0u8..60),
            b in (2000u16..2099, 1u8..=12, 1u8..=28, 0u8..24, 0u8..60, 0u8..60)
        ) {
            let ta = DeviceTimestamp::new(a.0, a.1, a.2, a.3, a.4, a.5).unwrap();
            let tb = DeviceTimestamp::new(b.0, b.1, b.2, b.3, b.4, b.5).unwrap();
            prop_assert_eq!(ta.cmp(&tb), ta.unix_seconds().cmp(&tb.unix_seconds()));
        }
    }
}
