//! Gateway configuration
//!
//! Values come from three layers, later ones winning:
//! 1. [`GatewayConfig::default`]
//! 2. an optional YAML file named by `FLEETWIRE_CONFIG`
//! 3. individual `FLEETWIRE_*` environment variables
//!
//! ```rust
//! use fleetwire::config::GatewayConfig;
//!
//! let config = GatewayConfig::from_lookup(|key| match key {
//!     "FLEETWIRE_PORT" => Some("6001".to_string()),
//!     "FLEETWIRE_CHECKSUM" => Some("crc16".to_string()),
//!     _ => None,
//! })
//! .unwrap();
//!
//! assert_eq!(config.bind_addr.port(), 6001);
//! ```

use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::protocol::{
    ChecksumStrategy, DateEncoding, FrameFormat, ImeiEncoding, MessageDecoder, ResponseEncoder,
};
use crate::{GatewayError, Result};

pub const DEFAULT_PORT: u16 = 5000;

pub const ENV_CONFIG_FILE: &str = "FLEETWIRE_CONFIG";
pub const ENV_PORT: &str = "FLEETWIRE_PORT";
pub const ENV_BIND: &str = "FLEETWIRE_BIND";
pub const ENV_MAX_CONNECTIONS: &str = "FLEETWIRE_MAX_CONNECTIONS";
pub const ENV_IDLE_TIMEOUT: &str = "FLEETWIRE_IDLE_TIMEOUT_SECS";
pub const ENV_SINK_QUEUE: &str = "FLEETWIRE_SINK_QUEUE";
pub const ENV_CHECKSUM: &str = "FLEETWIRE_CHECKSUM";
pub const ENV_LENGTH_INCLUDES_CHECKSUM: &str = "FLEETWIRE_LENGTH_INCLUDES_CHECKSUM";
pub const ENV_IMEI_ENCODING: &str = "FLEETWIRE_IMEI_ENCODING";
pub const ENV_DATE_ENCODING: &str = "FLEETWIRE_DATE_ENCODING";
pub const ENV_ACK_POSITIONS: &str = "FLEETWIRE_ACK_POSITIONS";
pub const ENV_LOG: &str = "FLEETWIRE_LOG";

/// Runtime settings for the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub max_connections: usize,
    /// Seconds without inbound bytes before a connection is dropped. 0 disables.
    pub idle_timeout_secs: u64,
    pub read_buffer_size: usize,
    pub sink_queue_capacity: usize,
    pub checksum: ChecksumStrategy,
    pub length_includes_checksum: bool,
    pub imei_encoding: ImeiEncoding,
    pub date_encoding: DateEncoding,
    pub ack_positions: bool,
    pub log_filter: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 10_000,
            idle_timeout_secs: 0,
            read_buffer_size: 4096,
            sink_queue_capacity: 1024,
            checksum: ChecksumStrategy::default(),
            length_includes_checksum: false,
            imei_encoding: ImeiEncoding::default(),
            date_encoding: DateEncoding::default(),
            ack_positions: false,
            log_filter: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = match lookup(ENV_CONFIG_FILE) {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        let config = base.overlay(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml_ng::from_str(yaml).map_err(|e| GatewayError::config(ENV_CONFIG_FILE, e.to_string()))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::io(format!("reading {}", path.display()), e))?;
        Self::from_yaml_str(&text)
    }

    fn overlay<F>(mut self, lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_BIND) {
            self.bind_addr = parse_bind(&value, self.bind_addr.port())?;
        }
        // FLEETWIRE_PORT wins over the generic PORT
        if let Some((key, value)) = [ENV_PORT, "PORT"]
            .into_iter()
            .find_map(|key| lookup(key).map(|value| (key, value)))
        {
            self.bind_addr.set_port(parse(key, &value)?);
        }
        if let Some(value) = lookup(ENV_MAX_CONNECTIONS) {
            self.max_connections = parse(ENV_MAX_CONNECTIONS, &value)?;
        }
        if let Some(value) = lookup(ENV_IDLE_TIMEOUT) {
            self.idle_timeout_secs = parse(ENV_IDLE_TIMEOUT, &value)?;
        }
        if let Some(value) = lookup(ENV_SINK_QUEUE) {
            self.sink_queue_capacity = parse(ENV_SINK_QUEUE, &value)?;
        }
        if let Some(value) = lookup(ENV_CHECKSUM) {
            self.checksum = parse(ENV_CHECKSUM, &value)?;
        }
        if let Some(value) = lookup(ENV_LENGTH_INCLUDES_CHECKSUM) {
            self.length_includes_checksum = parse_flag(ENV_LENGTH_INCLUDES_CHECKSUM, &value)?;
        }
        if let Some(value) = lookup(ENV_IMEI_ENCODING) {
            self.imei_encoding = parse(ENV_IMEI_ENCODING, &value)?;
        }
        if let Some(value) = lookup(ENV_DATE_ENCODING) {
            self.date_encoding = parse(ENV_DATE_ENCODING, &value)?;
        }
        if let Some(value) = lookup(ENV_ACK_POSITIONS) {
            self.ack_positions = parse_flag(ENV_ACK_POSITIONS, &value)?;
        }
        if let Some(value) = lookup(ENV_LOG) {
            self.log_filter = value;
        }
        Ok(self)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(GatewayError::config("max_connections", "must be at least 1"));
        }
        if self.read_buffer_size == 0 {
            return Err(GatewayError::config("read_buffer_size", "must be at least 1"));
        }
        if self.sink_queue_capacity == 0 {
            return Err(GatewayError::config("sink_queue_capacity", "must be at least 1"));
        }
        Ok(())
    }

    pub fn frame_format(&self) -> FrameFormat {
        FrameFormat::new(self.checksum).with_length_including_checksum(self.length_includes_checksum)
    }

    pub fn decoder(&self) -> MessageDecoder {
        MessageDecoder::new(self.imei_encoding, self.date_encoding)
    }

    pub fn encoder(&self) -> ResponseEncoder {
        ResponseEncoder::new(self.frame_format()).with_position_acks(self.ack_positions)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| GatewayError::config(key, format!("invalid value {value:?}: {e}")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(GatewayError::config(key, format!("expected a boolean, got {other:?}"))),
    }
}

/// Accepts either a bare IP (keeping `port`) or a full socket address.
fn parse_bind(value: &str, port: u16) -> Result<SocketAddr> {
    let value = value.trim();
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Ok(addr);
    }
    value
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, port))
        .map_err(|_| GatewayError::config(ENV_BIND, format!("not an address: {value:?}")))
}
