//! Connection handling
//!
//! The transport loop in [`server`](crate::server) owns the socket and knows
//! nothing about the device protocol. It hands every received chunk to a
//! [`ConnectionHandler`] created by a [`HandlerFactory`] and writes back
//! whatever frames the handler returns. [`DeviceConnection`] is the handler
//! that runs the reassemble, validate, decode and respond pipeline.

mod device;

pub use device::{ConnectionStats, DeviceConnection, DeviceHandlerFactory};

use std::net::SocketAddr;

use bytes::Bytes;

use crate::session::ConnectionId;

/// Per-connection protocol logic driven by the transport loop.
///
/// Calls for one connection are strictly sequential and in arrival order.
#[async_trait::async_trait]
pub trait ConnectionHandler: Send + 'static {
    /// Process one received chunk, returning the frames to send back in order.
    async fn on_bytes(&mut self, chunk: &[u8]) -> Vec<Bytes>;

    /// The connection ended (peer close, error, timeout or shutdown).
    ///
    /// Called exactly once; no further `on_bytes` calls follow.
    async fn on_close(&mut self);
}

/// Builds one handler per accepted connection.
pub trait HandlerFactory: Send + Sync + 'static {
    type Handler: ConnectionHandler;

    fn create(&self, id: ConnectionId, peer_addr: SocketAddr) -> Self::Handler;
}
