//! Telemetry sink boundary
//!
//! The sink is the external store that keeps the latest known position of
//! each device. This crate only depends on the [`TelemetrySink`] trait; the
//! [`MemorySink`] implementation backs the binary and the tests.
//!
//! Connection tasks never await the sink directly. Records go through the
//! bounded [`SinkDispatcher`] queue so a slow store cannot stall a socket.

mod dispatcher;

pub use dispatcher::{DispatchStats, SinkDispatcher};

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::Result;
use crate::types::{Imei, TelemetryRecord};

/// Durable upsert-by-device store.
///
/// Implementations must be idempotent: writing the same record twice leaves
/// the store as if it had been written once.
#[async_trait::async_trait]
pub trait TelemetrySink: Send + Sync + 'static {
    /// Replace the stored state for `imei` with `record`.
    async fn upsert(&self, imei: &Imei, record: &TelemetryRecord) -> Result<()>;
}

/// In-memory latest-wins store.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: RwLock<HashMap<Imei, TelemetryRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, imei: &Imei) -> Option<TelemetryRecord> {
        self.records.read().await.get(imei).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<TelemetryRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl TelemetrySink for MemorySink {
    async fn upsert(&self, imei: &Imei, record: &TelemetryRecord) -> Result<()> {
        self.records.write().await.insert(imei.clone(), record.clone());
        Ok(())
    }
}
