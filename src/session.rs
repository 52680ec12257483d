//! Device sessions and the cross-connection identity registry
//!
//! Every connection owns a [`Session`] that moves through
//! `Unauthenticated → Identified(imei) → Closed`. The [`SessionRegistry`] maps
//! each IMEI to the connection currently speaking for it and is the only state
//! shared between connection tasks.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

use crate::types::{Imei, sequence_after};

/// Unique identifier for an accepted TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Atomic generator for monotonically increasing [`ConnectionId`]s.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// What the registry knows about the connection bound to an IMEI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub peer_addr: SocketAddr,
    /// When the IMEI was bound to this connection.
    pub since: Instant,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, peer_addr: SocketAddr) -> Self {
        Self { id, peer_addr, since: Instant::now() }
    }
}

/// Per-connection lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no login seen yet.
    Unauthenticated,
    /// Login accepted; the identity never changes afterwards.
    Identified(Imei),
    /// Connection terminated. Terminal.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("connection is bound to {bound}, refusing login as {claimed}")]
    IdentityConflict { bound: Imei, claimed: Imei },

    #[error("session is closed")]
    Closed,
}

/// Outcome of a successful login on a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// First login on this connection.
    Identified,
    /// Same IMEI logged in again.
    Refreshed,
}

/// State owned by exactly one connection task.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    peer_addr: SocketAddr,
    state: SessionState,
    last_sequence: Option<u16>,
}

impl Session {
    pub fn new(id: ConnectionId, peer_addr: SocketAddr) -> Self {
        Self { id, peer_addr, state: SessionState::Unauthenticated, last_sequence: None }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn imei(&self) -> Option<&Imei> {
        match &self.state {
            SessionState::Identified(imei) => Some(imei),
            _ => None,
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle::new(self.id, self.peer_addr)
    }

    /// Apply a login. A connection may only ever speak for one IMEI.
    pub fn identify(&mut self, imei: &Imei) -> Result<LoginOutcome, SessionError> {
        match &self.state {
            SessionState::Unauthenticated => {
                self.state = SessionState::Identified(imei.clone());
                Ok(LoginOutcome::Identified)
            }
            SessionState::Identified(bound) if bound == imei => Ok(LoginOutcome::Refreshed),
            SessionState::Identified(bound) => Err(SessionError::IdentityConflict {
                bound: bound.clone(),
                claimed: imei.clone(),
            }),
            SessionState::Closed => Err(SessionError::Closed),
        }
    }

    /// Mark the session closed, returning the identity it held.
    pub fn close(&mut self) -> Option<Imei> {
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Identified(imei) => Some(imei),
            _ => None,
        }
    }

    /// Record a frame's sequence number. Returns `false` if it did not advance.
    pub fn observe_sequence(&mut self, sequence: u16) -> bool {
        let advanced = self.last_sequence.is_none_or(|last| sequence_after(sequence, last));
        if advanced {
            self.last_sequence = Some(sequence);
        }
        advanced
    }
}

/// Identity changes published by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Bound { imei: Imei, connection: ConnectionId },
    Superseded { imei: Imei, previous: ConnectionId, current: ConnectionId },
    Released { imei: Imei, connection: ConnectionId },
}

const EVENT_CAPACITY: usize = 256;

/// IMEI → live connection map shared by all connection tasks.
#[derive(Debug)]
pub struct SessionRegistry {
    inner: RwLock<HashMap<Imei, ConnectionHandle>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { inner: RwLock::new(HashMap::new()), events }
    }

    /// Bind `imei` to `handle`, superseding any other connection.
    ///
    /// Returns the superseded handle. The old connection is not closed.
    pub async fn bind(&self, imei: Imei, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let previous = self.inner.write().await.insert(imei.clone(), handle);

        match previous {
            Some(prev) if prev.id != handle.id => {
                info!("IMEI {} moved from connection {} to {}", imei, prev.id, handle.id);
                self.publish(SessionEvent::Superseded { imei, previous: prev.id, current: handle.id });
                Some(prev)
            }
            Some(_) => {
                debug!("IMEI {} refreshed on connection {}", imei, handle.id);
                None
            }
            None => {
                info!("IMEI {} bound to connection {}", imei, handle.id);
                self.publish(SessionEvent::Bound { imei, connection: handle.id });
                None
            }
        }
    }

    /// Remove the mapping for `imei` only if it still points at `connection`.
    pub async fn release(&self, imei: &Imei, connection: ConnectionId) -> bool {
        let mut map = self.inner.write().await;
        let owned = map.get(imei).is_some_and(|handle| handle.id == connection);
        if owned {
            map.remove(imei);
        }
        drop(map);

        if owned {
            info!("IMEI {} released by connection {}", imei, connection);
            self.publish(SessionEvent::Released { imei: imei.clone(), connection });
        } else {
            debug!("Connection {} closed after IMEI {} moved on", connection, imei);
        }
        owned
    }

    pub async fn lookup(&self, imei: &Imei) -> Option<ConnectionHandle> {
        self.inner.read().await.get(imei).copied()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Copy of every current binding.
    pub async fn snapshot(&self) -> Vec<(Imei, ConnectionHandle)> {
        self.inner.read().await.iter().map(|(imei, handle)| (imei.clone(), *handle)).collect()
    }

    /// Stream of identity changes from now on. Lagging subscribers skip events.
    pub fn events(&self) -> impl Stream<Item = SessionEvent> + Send + 'static {
        BroadcastStream::new(self.events.subscribe()).filter_map(Result::ok)
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
