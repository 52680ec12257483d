//! Background delivery of telemetry records to the sink

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::TelemetrySink;
use crate::types::TelemetryRecord;
use crate::{GatewayError, Result};

/// Counters for records passing through a dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub queued: u64,
    pub written: u64,
    /// Rejected because the queue was full.
    pub dropped: u64,
    /// Sink returned an error. Not retried.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    written: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Cheap, cloneable handle for enqueueing records.
///
/// `submit` never waits: when the queue is full the record is dropped and
/// the caller keeps reading its socket.
#[derive(Debug, Clone)]
pub struct SinkDispatcher {
    tx: mpsc::Sender<TelemetryRecord>,
    capacity: usize,
    counters: Arc<Counters>,
}

impl SinkDispatcher {
    /// Spawn the single worker task draining the queue into `sink`.
    ///
    /// The worker stops when `cancel` fires, after writing whatever is
    /// already queued.
    pub fn spawn(
        sink: Arc<dyn TelemetrySink>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let counters = Arc::new(Counters::default());

        let worker_counters = Arc::clone(&counters);
        let join = tokio::spawn(async move {
            Self::worker(sink, rx, worker_counters, cancel).await;
        });

        (Self { tx, capacity, counters }, join)
    }

    /// Enqueue a record without waiting.
    pub fn submit(&self, record: TelemetryRecord) -> Result<()> {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Err(GatewayError::QueueFull { capacity: self.capacity })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Err(GatewayError::DispatcherClosed)
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    async fn worker(
        sink: Arc<dyn TelemetrySink>,
        mut rx: mpsc::Receiver<TelemetryRecord>,
        counters: Arc<Counters>,
        cancel: CancellationToken,
    ) {
        info!("Sink dispatcher started");

        loop {
            let record = tokio::select! {
                biased;
                record = rx.recv() => match record {
                    Some(record) => record,
                    None => break,
                },
                _ = cancel.cancelled() => {
                    debug!("Sink dispatcher cancelled, draining queue");
                    break;
                }
            };
            Self::deliver(sink.as_ref(), &record, &counters).await;
        }

        // Stop accepting, then flush what was already queued
        rx.close();
        while let Some(record) = rx.recv().await {
            Self::deliver(sink.as_ref(), &record, &counters).await;
        }

        info!(
            "Sink dispatcher stopped: {} written, {} failed, {} dropped",
            counters.written.load(Ordering::Relaxed),
            counters.failed.load(Ordering::Relaxed),
            counters.dropped.load(Ordering::Relaxed)
        );
    }

    async fn deliver(sink: &dyn TelemetrySink, record: &TelemetryRecord, counters: &Counters) {
        match sink.upsert(&record.imei, record).await {
            Ok(()) => {
                counters.written.fetch_add(1, Ordering::Relaxed);
                trace!("Stored record for {}", record.imei);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(imei = %record.imei, "Sink write failed, record discarded: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::types::{DeviceTimestamp, Imei};
    use std::time::{Duration, SystemTime};
    use tokio::sync::Semaphore;

    fn record(digits: &str, latitude: f64) -> TelemetryRecord {
        TelemetryRecord {
            imei: Imei::parse(digits).unwrap(),
            latitude,
            longitude: -3.7,
            speed_kmh: 10,
            course_degrees: 45,
            timestamp: DeviceTimestamp::new(2024, 1, 2, 3, 4, 5).unwrap(),
            received_at: SystemTime::UNIX_EPOCH,
            satellites: None,
            fix_valid: false,
            real_time: false,
            alarm_code: None,
            cell: None,
            peer_addr: None,
        }
    }

    struct FailingSink;

    #[async_trait::async_trait]
    impl TelemetrySink for FailingSink {
        async fn upsert(&self, _imei: &Imei, _record: &TelemetryRecord) -> Result<()> {
            Err(GatewayError::sink_failed("database unavailable"))
        }
    }

    /// Blocks every write until a permit is added.
    struct GatedSink {
        gate: Semaphore,
        inner: MemorySink,
    }

    #[async_trait::async_trait]
    impl TelemetrySink for GatedSink {
        async fn upsert(&self, imei: &Imei, record: &TelemetryRecord) -> Result<()> {
            let permit =
                self.gate.acquire().await.map_err(|_| GatewayError::sink_failed("gate closed"))?;
            permit.forget();
            self.inner.upsert(imei, record).await
        }
    }

    #[tokio::test]
    async fn delivers_and_drains_on_shutdown() {
        let sink = Arc::new(MemorySink::new());
        let cancel = CancellationToken::new();
        let (dispatcher, join) = SinkDispatcher::spawn(sink.clone(), 16, cancel.clone());

        dispatcher.submit(record("123456789012345", 1.0)).unwrap();
        dispatcher.submit(record("123456789012345", 2.0)).unwrap();
        dispatcher.submit(record("999999999999999", 3.0)).unwrap();

        cancel.cancel();
        join.await.unwrap();

        assert_eq!(sink.len().await, 2);
        let imei = Imei::parse("123456789012345").unwrap();
        assert_eq!(sink.get(&imei).await.map(|r| r.latitude), Some(2.0));
        assert_eq!(dispatcher.stats().written, 3);
    }

    #[tokio::test]
    async fn sink_failures_are_counted_not_retried() {
        let cancel = CancellationToken::new();
        let (dispatcher, join) = SinkDispatcher::spawn(Arc::new(FailingSink), 4, cancel.clone());

        dispatcher.submit(record("123456789012345", 1.0)).unwrap();
        cancel.cancel();
        join.await.unwrap();

        let stats = dispatcher.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.written, 0);
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let sink = Arc::new(GatedSink { gate: Semaphore::new(0), inner: MemorySink::new() });
        let cancel = CancellationToken::new();
        let (dispatcher, join) = SinkDispatcher::spawn(sink.clone(), 2, cancel.clone());

        // Worker takes one record and blocks on the gate; two more fill the queue
        let mut results = Vec::new();
        for n in 0..10 {
            results.push(dispatcher.submit(record("123456789012345", n as f64)));
            tokio::task::yield_now().await;
        }

        let full = results
            .iter()
            .filter(|r| matches!(r, Err(GatewayError::QueueFull { capacity: 2 })))
            .count();
        assert!(full >= 7, "expected most submissions to be dropped, got {full}");
        assert_eq!(dispatcher.stats().dropped, full as u64);

        // Let the stalled writes through and shut down
        sink.gate.add_permits(10);
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), join).await.unwrap().unwrap();
        assert_eq!(dispatcher.stats().written, 10 - full as u64);
    }

    #[tokio::test]
    async fn submit_after_shutdown_reports_closed() {
        let cancel = CancellationToken::new();
        let sink = Arc::new(MemorySink::new());
        let (dispatcher, join) = SinkDispatcher::spawn(sink, 4, cancel.clone());
        cancel.cancel();
        join.await.unwrap();

        let err = dispatcher.submit(record("123456789012345", 1.0)).unwrap_err();
        assert!(matches!(err, GatewayError::DispatcherClosed));
    }
}
