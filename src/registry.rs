//! Destination registry and per-destination connection pool
//!
//! A [`Destination`] is one remote administrative endpoint, identified by
//! its `host[:port]` string. The registry creates each destination at most
//! once per identity and never shrinks during a run; destinations are torn
//! down together by [`ServerRegistry::destroy_all`] at the end.
//!
//! Each destination owns a bounded pool of reusable connections (capacity
//! fixed at creation) and a bounded FIFO queue of usernames waiting for a
//! free connection.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;

use tracing::debug;

use crate::transport::{ConnectionLink, DestinationAddr};
use crate::types::{ConnId, SslFlags};

/// Maximum queued usernames per destination before a dispatch must drain
pub const SERVER_QUEUE_MAX: usize = 16;

/// One pooled connection and its busy state
///
/// A connection is busy from the moment a command is sent on it until the
/// reply for that command has been processed. Exactly one command is in
/// flight per connection.
pub struct Connection {
    id: ConnId,
    busy: bool,
    link: Box<dyn ConnectionLink>,
}

impl Connection {
    pub(crate) fn new(id: ConnId, link: Box<dyn ConnectionLink>) -> Self {
        Self {
            id,
            busy: false,
            link,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ConnId {
        self.id
    }

    #[must_use]
    pub const fn is_idle(&self) -> bool {
        !self.busy
    }

    pub(crate) fn mark_busy(&mut self) {
        self.busy = true;
    }

    pub(crate) fn mark_idle(&mut self) {
        self.busy = false;
    }

    pub(crate) fn link_mut(&mut self) -> &mut dyn ConnectionLink {
        self.link.as_mut()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("busy", &self.busy)
            .finish_non_exhaustive()
    }
}

/// One remote administrative endpoint with its pool and backlog
#[derive(Debug)]
pub struct Destination {
    addr: DestinationAddr,
    capacity: usize,
    connections: Vec<Connection>,
    queue: VecDeque<String>,
}

impl Destination {
    fn new(name: &str, capacity: usize) -> Self {
        // hostname is everything before the last ':' of the identity
        let hostname = match name.rsplit_once(':') {
            Some((host, _)) => host.to_string(),
            None => name.to_string(),
        };

        Self {
            addr: DestinationAddr {
                name: name.to_string(),
                hostname,
                ip: None,
                port: 0,
                ssl_flags: SslFlags::NONE,
            },
            capacity,
            connections: Vec::with_capacity(capacity),
            queue: VecDeque::with_capacity(SERVER_QUEUE_MAX),
        }
    }

    /// Network identity handed to the transport
    #[must_use]
    pub const fn addr(&self) -> &DestinationAddr {
        &self.addr
    }

    /// Refresh the network target from a routing decision
    pub(crate) fn set_route(&mut self, ip: Option<IpAddr>, port: u16, ssl_flags: SslFlags) {
        self.addr.ip = ip;
        self.addr.port = port;
        self.addr.ssl_flags = ssl_flags;
    }

    /// Find a connection not currently processing a command
    #[must_use]
    pub fn find_idle_connection(&self) -> Option<ConnId> {
        self.connections
            .iter()
            .find(|conn| conn.is_idle())
            .map(Connection::id)
    }

    /// True if any connection is mid-command
    #[must_use]
    pub fn has_busy_connections(&self) -> bool {
        self.connections.iter().any(|conn| !conn.is_idle())
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Pool capacity fixed at creation, never below 1
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn queue_is_full(&self) -> bool {
        self.queue.len() >= SERVER_QUEUE_MAX
    }

    pub(crate) fn queue_push(&mut self, username: String) {
        self.queue.push_back(username);
    }

    pub(crate) fn queue_pop_front(&mut self) -> Option<String> {
        self.queue.pop_front()
    }

    pub(crate) fn push_connection(&mut self, conn: Connection) {
        self.connections.push(conn);
    }

    pub(crate) fn connection_mut(&mut self, id: ConnId) -> Option<&mut Connection> {
        self.connections.iter_mut().find(|conn| conn.id() == id)
    }
}

/// Uniqueness map from destination identity to its [`Destination`]
#[derive(Debug, Default)]
pub struct ServerRegistry {
    destinations: HashMap<String, Destination>,
}

impl ServerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the destination for `name`, creating it with an empty pool
    /// and queue on first use. No network I/O happens here; `capacity`
    /// only applies on creation.
    pub fn get_or_create(&mut self, name: &str, capacity: usize) -> &mut Destination {
        self.destinations
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("registering destination {}", name);
                Destination::new(name, capacity)
            })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Destination> {
        self.destinations.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Destination> {
        self.destinations.get_mut(name)
    }

    /// Any destination that still has a command in flight
    #[must_use]
    pub fn find_any_with_busy_connections(&self) -> Option<String> {
        self.destinations
            .values()
            .find(|dest| dest.has_busy_connections())
            .map(|dest| dest.addr().name.clone())
    }

    /// Number of registered destinations
    #[must_use]
    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Shut down every connection on every destination and drop them all.
    /// Called once at process-wide teardown.
    pub(crate) fn destroy_all(&mut self) {
        for dest in self.destinations.values_mut() {
            for conn in &mut dest.connections {
                conn.link.shutdown();
            }
            dest.connections.clear();
        }
        self.destinations.clear();
    }
}
