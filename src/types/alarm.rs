//! Alarm classification

use serde::{Deserialize, Serialize};

use super::protocol_codes::alarm;

/// Alarm reported in the alarm/language word of an alarm packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmKind {
    Normal,
    Sos,
    PowerCut,
    Shock,
    FenceIn,
    FenceOut,
    Unknown(u8),
}

/// Decode the raw alarm code byte.
pub fn decode_alarm(code: u8) -> AlarmKind {
    match code {
        alarm::NORMAL => AlarmKind::Normal,
        alarm::SOS => AlarmKind::Sos,
        alarm::POWER_CUT => AlarmKind::PowerCut,
        alarm::SHOCK => AlarmKind::Shock,
        alarm::FENCE_IN => AlarmKind::FenceIn,
        alarm::FENCE_OUT => AlarmKind::FenceOut,
        other => AlarmKind::Unknown(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_codes() {
        assert_eq!(decode_alarm(0x01), AlarmKind::Sos);
        assert_eq!(decode_alarm(0x05), AlarmKind::FenceOut);
        assert_eq!(decode_alarm(0x42), AlarmKind::Unknown(0x42));
    }
}
