//! TCP ingestion gateway for GT06-family GPS trackers.
//!
//! Fleetwire accepts long-lived device connections, reassembles protocol
//! frames from the byte stream, validates and decodes them, tracks which
//! device speaks on which socket, acknowledges logins and heartbeats, and
//! hands position data to a telemetry sink.
//!
//! # Features
//!
//! - **Stream framing**: frames survive arbitrary TCP chunking and line noise
//! - **Configurable envelope**: modulo-256 or CRC-16/X.25 checksums, BCD or
//!   ASCII IMEIs, binary or BCD dates
//! - **Session registry**: one live connection per IMEI, reconnects supersede
//! - **Non-blocking sink**: a bounded queue keeps slow stores away from sockets
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fleetwire::{Gateway, GatewayConfig, MemorySink};
//!
//! #[tokio::main]
//! async fn main() -> fleetwire::Result<()> {
//!     let config = GatewayConfig::from_env()?;
//!     let gateway = Gateway::for_devices(config, Arc::new(MemorySink::new()));
//!     gateway.run().await
//! }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire protocol
pub mod protocol;

// Runtime
pub mod config;
pub mod connection;
pub mod logging;
pub mod server;
pub mod session;
pub mod sink;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use config::GatewayConfig;
pub use connection::{ConnectionHandler, DeviceConnection, DeviceHandlerFactory, HandlerFactory};
pub use protocol::{FrameFormat, FrameReassembler, FrameValidator, MessageDecoder, ResponseEncoder};
pub use server::Gateway;
pub use session::{ConnectionId, SessionEvent, SessionRegistry};
pub use sink::{MemorySink, SinkDispatcher, TelemetrySink};
