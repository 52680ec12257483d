//! Telemetry record handed to the sink

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::SystemTime;

use super::imei::Imei;
use super::message::{Alarm, CellTower, Location, Position};
use super::timestamp::DeviceTimestamp;

/// Latest-known state for one device, as upserted into the telemetry store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub imei: Imei,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: u16,
    pub course_degrees: u16,
    pub timestamp: DeviceTimestamp,
    pub received_at: SystemTime,
    pub satellites: Option<u8>,
    pub fix_valid: bool,
    pub real_time: bool,
    pub alarm_code: Option<u8>,
    pub cell: Option<CellRecord>,
    /// Socket address the report arrived from.
    pub peer_addr: Option<SocketAddr>,
}

/// Cell tower identifiers in the store's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRecord {
    pub mcc: u16,
    pub mnc: u8,
    pub lac: u16,
    pub cell_id: u32,
}

impl From<CellTower> for CellRecord {
    fn from(cell: CellTower) -> Self {
        Self { mcc: cell.mcc, mnc: cell.mnc, lac: cell.lac, cell_id: cell.cell_id }
    }
}

impl TelemetryRecord {
    fn from_position(
        imei: Imei,
        position: &Position,
        cell: Option<CellTower>,
        received_at: SystemTime,
    ) -> Self {
        Self {
            imei,
            latitude: position.latitude,
            longitude: position.longitude,
            speed_kmh: position.speed_kmh as u16,
            course_degrees: position.course_degrees,
            timestamp: position.timestamp,
            received_at,
            satellites: Some(position.satellite_count),
            fix_valid: position.fix_valid,
            real_time: position.real_time,
            alarm_code: None,
            cell: cell.map(CellRecord::from),
            peer_addr: None,
        }
    }

    pub fn from_location(imei: Imei, location: &Location, received_at: SystemTime) -> Self {
        Self::from_position(imei, &location.position, location.cell, received_at)
    }

    pub fn from_alarm(imei: Imei, alarm: &Alarm, received_at: SystemTime) -> Self {
        let mut record = Self::from_position(imei, &alarm.position, alarm.cell, received_at);
        record.alarm_code = Some(alarm.alarm_code);
        record
    }

    pub fn with_peer_addr(mut self, peer_addr: SocketAddr) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }
}
