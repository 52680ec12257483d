//! TCP listener and per-connection transport loop

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use crate::config::GatewayConfig;
use crate::connection::{ConnectionHandler, DeviceHandlerFactory, HandlerFactory};
use crate::session::{ConnectionId, IdGenerator, SessionRegistry};
use crate::sink::{SinkDispatcher, TelemetrySink};
use crate::{GatewayError, Result};

/// Pause after a failed `accept` so fd exhaustion does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Socket-level settings copied into every connection task.
#[derive(Debug, Clone, Copy)]
struct TransportSettings {
    read_buffer_size: usize,
    idle_timeout: Option<Duration>,
}

/// Releases a connection slot when dropped.
struct SlotGuard {
    active: Arc<AtomicUsize>,
}

impl SlotGuard {
    fn acquire(active: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .ok()
            .map(|_| Self { active: Arc::clone(active) })
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// TCP gateway accepting device connections.
///
/// Each accepted socket gets its own task and its own handler from the
/// factory. Shutdown order: stop accepting, close every connection, then stop
/// background workers so queued telemetry is flushed last.
pub struct Gateway<F: HandlerFactory> {
    config: GatewayConfig,
    factory: Arc<F>,
    id_gen: IdGenerator,
    active: Arc<AtomicUsize>,
    cancel: CancellationToken,
    connections: TaskTracker,
    worker_cancel: CancellationToken,
    workers: TaskTracker,
}

impl<F: HandlerFactory> Gateway<F> {
    pub fn new(config: GatewayConfig, factory: F) -> Self {
        Self {
            config,
            factory: Arc::new(factory),
            id_gen: IdGenerator::new(),
            active: Arc::new(AtomicUsize::new(0)),
            cancel: CancellationToken::new(),
            connections: TaskTracker::new(),
            worker_cancel: CancellationToken::new(),
            workers: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Number of connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Token handed to background workers; fired after connections drain.
    pub fn worker_token(&self) -> CancellationToken {
        self.worker_cancel.clone()
    }

    /// Stop accepting and close every connection.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for `join` during shutdown, after the connections are gone.
    pub fn track_worker(&self, name: &'static str, join: JoinHandle<()>) {
        self.workers.spawn(async move {
            if let Err(e) = join.await {
                error!("Worker {} failed: {}", name, e);
            }
        });
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;
        info!("Listening for devices on {}", addr);
        self.run_with_listener(listener).await
    }

    /// Serve on a pre-bound listener (useful for tests).
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<()> {
        let settings = TransportSettings {
            read_buffer_size: self.config.read_buffer_size.max(1),
            idle_timeout: self.config.idle_timeout(),
        };

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Gateway shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => self.admit(stream, peer_addr, settings),
                    Err(e) => {
                        error!("Accept failed: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
        drop(listener);

        self.connections.close();
        self.connections.wait().await;
        debug!("All connections closed");

        self.worker_cancel.cancel();
        self.workers.close();
        self.workers.wait().await;
        info!("Gateway stopped");
        Ok(())
    }

    fn admit(&self, stream: TcpStream, peer_addr: SocketAddr, settings: TransportSettings) {
        let limit = self.config.max_connections;
        let Some(slot) = SlotGuard::acquire(&self.active, limit) else {
            warn!(peer = %peer_addr, "Rejecting connection: {}", GatewayError::ConnectionLimit { limit });
            return;
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer_addr, "Could not set TCP_NODELAY: {}", e);
        }

        let conn = self.id_gen.next_id();
        let handler = self.factory.create(conn, peer_addr);
        let cancel = self.cancel.child_token();
        info!(%conn, peer = %peer_addr, "Accepted connection");

        self.connections.spawn(async move {
            let _slot = slot;
            match serve_connection(conn, stream, handler, settings, cancel).await {
                Ok(()) => info!(%conn, "Connection closed"),
                Err(e @ GatewayError::Timeout { .. }) => info!(%conn, "Connection idle: {}", e),
                Err(e) => warn!(%conn, "Connection failed: {}", e),
            }
        });
    }
}

impl Gateway<DeviceHandlerFactory> {
    /// Gateway for GT06 devices writing telemetry into `sink`.
    ///
    /// Spawns the sink dispatcher, so this must be called inside a runtime.
    pub fn for_devices(config: GatewayConfig, sink: Arc<dyn TelemetrySink>) -> Self {
        let worker_cancel = CancellationToken::new();
        let (dispatcher, join) =
            SinkDispatcher::spawn(sink, config.sink_queue_capacity, worker_cancel.clone());
        let factory = DeviceHandlerFactory::new(&config, Arc::new(SessionRegistry::new()), dispatcher);

        let gateway = Self { worker_cancel, ..Self::new(config, factory) };
        gateway.track_worker("sink dispatcher", join);
        gateway
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.factory.registry()
    }

    pub fn dispatcher(&self) -> &SinkDispatcher {
        self.factory.dispatcher()
    }
}

/// Read loop for one socket. `on_close` runs however the loop ends.
async fn serve_connection<H: ConnectionHandler>(
    conn: ConnectionId,
    mut stream: TcpStream,
    mut handler: H,
    settings: TransportSettings,
    cancel: CancellationToken,
) -> Result<()> {
    let mut buf = vec![0u8; settings.read_buffer_size];

    let result = loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(()),
            read = read_chunk(&mut stream, &mut buf, settings.idle_timeout) => read,
        };

        let n = match read {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => break Err(e),
        };
        trace!(%conn, "Read {} bytes", n);

        let replies = handler.on_bytes(&buf[..n]).await;
        if let Err(e) = write_replies(&mut stream, &replies).await {
            break Err(e);
        }
    };

    handler.on_close().await;
    if let Err(e) = stream.shutdown().await {
        trace!(%conn, "Socket shutdown: {}", e);
    }
    result
}

async fn read_chunk(
    stream: &mut TcpStream,
    buf: &mut [u8],
    idle_timeout: Option<Duration>,
) -> Result<usize> {
    let read = stream.read(buf);
    let outcome = match idle_timeout {
        Some(duration) => tokio::time::timeout(duration, read)
            .await
            .map_err(|_| GatewayError::Timeout { duration })?,
        None => read.await,
    };
    outcome.map_err(|e| GatewayError::io("read", e))
}

async fn write_replies(stream: &mut TcpStream, replies: &[Bytes]) -> Result<()> {
    for reply in replies {
        stream.write_all(reply).await.map_err(|e| GatewayError::io("write", e))?;
    }
    Ok(())
}
