//! Device protocol handler

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use super::{ConnectionHandler, HandlerFactory};
use crate::config::GatewayConfig;
use crate::protocol::{FrameFormat, FrameReassembler, FrameValidator, MessageDecoder, ResponseEncoder};
use crate::session::{ConnectionId, LoginOutcome, Session, SessionRegistry};
use crate::sink::SinkDispatcher;
use crate::types::{DecodedMessage, Imei, Login, TelemetryRecord};

/// Counters for one connection's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub bytes_received: u64,
    /// Noise skipped while searching for a start marker.
    pub bytes_discarded: u64,
    pub frames_accepted: u64,
    pub frames_rejected: u64,
    pub decode_errors: u64,
    pub retransmits: u64,
    pub records_submitted: u64,
    pub records_dropped: u64,
    pub replies_sent: u64,
}

/// Shared pieces every [`DeviceConnection`] is built from.
#[derive(Debug, Clone)]
pub struct DeviceHandlerFactory {
    format: FrameFormat,
    decoder: MessageDecoder,
    encoder: ResponseEncoder,
    registry: Arc<SessionRegistry>,
    dispatcher: SinkDispatcher,
}

impl DeviceHandlerFactory {
    pub fn new(
        config: &GatewayConfig,
        registry: Arc<SessionRegistry>,
        dispatcher: SinkDispatcher,
    ) -> Self {
        Self {
            format: config.frame_format(),
            decoder: config.decoder(),
            encoder: config.encoder(),
            registry,
            dispatcher,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &SinkDispatcher {
        &self.dispatcher
    }
}

impl HandlerFactory for DeviceHandlerFactory {
    type Handler = DeviceConnection;

    fn create(&self, id: ConnectionId, peer_addr: SocketAddr) -> DeviceConnection {
        DeviceConnection {
            session: Session::new(id, peer_addr),
            reassembler: FrameReassembler::new(self.format),
            validator: FrameValidator::new(self.format),
            decoder: self.decoder,
            encoder: self.encoder,
            registry: Arc::clone(&self.registry),
            dispatcher: self.dispatcher.clone(),
            stats: ConnectionStats::default(),
        }
    }
}

/// Protocol state for one device socket.
#[derive(Debug)]
pub struct DeviceConnection {
    session: Session,
    reassembler: FrameReassembler,
    validator: FrameValidator,
    decoder: MessageDecoder,
    encoder: ResponseEncoder,
    registry: Arc<SessionRegistry>,
    dispatcher: SinkDispatcher,
    stats: ConnectionStats,
}

impl DeviceConnection {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats { bytes_discarded: self.reassembler.stats().discarded_bytes, ..self.stats }
    }

    /// Apply one decoded message to the session, returning the reply if any.
    async fn handle(&mut self, message: DecodedMessage) -> Option<Bytes> {
        let conn = self.session.id();

        match &message {
            DecodedMessage::Login(login) => {
                if !self.login(login).await {
                    return None;
                }
            }
            DecodedMessage::Location(location) => {
                let Some(imei) = self.identity("location") else {
                    return None;
                };
                debug!(
                    %conn, %imei,
                    "Location {:.6},{:.6} at {}",
                    location.position.latitude, location.position.longitude,
                    location.position.timestamp
                );
                let record = TelemetryRecord::from_location(imei, location, SystemTime::now());
                self.submit(record.with_peer_addr(self.session.peer_addr()));
            }
            DecodedMessage::Alarm(alarm) => {
                let Some(imei) = self.identity("alarm") else {
                    return None;
                };
                info!(%conn, %imei, "Alarm {:?} (code 0x{:02X})", alarm.kind(), alarm.alarm_code);
                let record = TelemetryRecord::from_alarm(imei, alarm, SystemTime::now());
                self.submit(record.with_peer_addr(self.session.peer_addr()));
            }
            DecodedMessage::Heartbeat(heartbeat) => {
                debug!(%conn, "Heartbeat seq {}", heartbeat.sequence);
            }
            DecodedMessage::Unknown(unknown) => {
                debug!(
                    %conn,
                    "Ignoring message type 0x{:02X} ({} body bytes)",
                    unknown.message_type,
                    unknown.raw.len()
                );
            }
        }

        self.encoder.respond(&message)
    }

    /// Returns whether the login should be acknowledged.
    async fn login(&mut self, login: &Login) -> bool {
        let conn = self.session.id();
        match self.session.identify(&login.imei) {
            Ok(outcome) => {
                let superseded = self.registry.bind(login.imei.clone(), self.session.handle()).await;
                match outcome {
                    LoginOutcome::Identified => info!(
                        %conn, imei = %login.imei, peer = %self.session.peer_addr(),
                        "Device logged in"
                    ),
                    LoginOutcome::Refreshed => debug!(%conn, imei = %login.imei, "Repeated login"),
                }
                if let Some(previous) = superseded {
                    info!(%conn, imei = %login.imei, "Superseded connection {}", previous.id);
                }
                true
            }
            Err(e) => {
                warn!(%conn, "Refusing login: {}", e);
                false
            }
        }
    }

    fn identity(&self, what: &str) -> Option<Imei> {
        let imei = self.session.imei().cloned();
        if imei.is_none() {
            warn!(conn = %self.session.id(), "Dropping {} from unidentified device", what);
        }
        imei
    }

    fn submit(&mut self, record: TelemetryRecord) {
        match self.dispatcher.submit(record) {
            Ok(()) => self.stats.records_submitted += 1,
            Err(e) => {
                self.stats.records_dropped += 1;
                warn!(conn = %self.session.id(), "Record dropped: {}", e);
            }
        }
    }
}

#[async_trait::async_trait]
impl ConnectionHandler for DeviceConnection {
    async fn on_bytes(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let conn = self.session.id();
        self.stats.bytes_received += chunk.len() as u64;
        trace!(%conn, "Received {} bytes", chunk.len());

        let mut replies = Vec::new();
        self.reassembler.extend(chunk);
        while let Some(candidate) = self.reassembler.next_candidate() {
            let frame = match self.validator.validate(&candidate) {
                Ok(frame) => frame,
                Err(rejection) => {
                    self.stats.frames_rejected += 1;
                    warn!(%conn, reason = rejection.kind(), "Dropping frame: {}", rejection);
                    self.reassembler.resync(&candidate);
                    continue;
                }
            };
            self.stats.frames_accepted += 1;

            if !self.session.observe_sequence(frame.sequence) {
                self.stats.retransmits += 1;
                debug!(%conn, "Retransmitted frame seq {}", frame.sequence);
            }

            let message = match self.decoder.decode(&frame) {
                Ok(message) => message,
                Err(e) => {
                    self.stats.decode_errors += 1;
                    warn!(%conn, "Undecodable frame type 0x{:02X}: {}", frame.message_type, e);
                    continue;
                }
            };
            trace!(%conn, "Decoded {} seq {}", message.kind_name(), message.sequence());

            if let Some(reply) = self.handle(message).await {
                self.stats.replies_sent += 1;
                replies.push(reply);
            }
        }
        replies
    }

    async fn on_close(&mut self) {
        let conn = self.session.id();
        self.reassembler.clear();

        if let Some(imei) = self.session.close() {
            self.registry.release(&imei, conn).await;
        }

        let stats = self.stats();
        info!(
            %conn,
            "Connection finished: {} bytes, {} frames, {} rejected, {} records",
            stats.bytes_received, stats.frames_accepted, stats.frames_rejected,
            stats.records_submitted
        );
    }
}
