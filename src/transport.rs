//! Connection transport interface
//!
//! The dispatcher never touches sockets or TLS itself; it drives a
//! [`Transport`] collaborator that owns the byte-level I/O. A transport
//! hands back one [`ConnectionLink`] per live connection and delivers every
//! completed reply as a [`ReplyEvent`] on the session's channel, tagged with
//! the [`ConnId`] the session assigned at connect time.

use std::net::IpAddr;

use tokio::sync::mpsc;

use crate::input::CommandInput;
use crate::protocol::Reply;
use crate::types::{ConnId, SslFlags};

/// Resolved network identity of one destination, as handed to
/// [`Transport::connect`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationAddr {
    /// Registry identity, `host[:port]`
    pub name: String,
    /// Hostname part of the identity
    pub hostname: String,
    /// Explicit address from the routing lookup, when present
    pub ip: Option<IpAddr>,
    pub port: u16,
    pub ssl_flags: SslFlags,
}

/// One reply delivered by the transport
#[derive(Debug, Clone)]
pub struct ReplyEvent {
    /// The connection the reply arrived on
    pub conn: ConnId,
    pub reply: Reply,
}

/// Sending half of the session's reply channel, cloned into every
/// connection the transport creates
#[derive(Debug, Clone)]
pub struct ReplySender {
    tx: mpsc::UnboundedSender<ReplyEvent>,
}

impl ReplySender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ReplyEvent>) -> Self {
        Self { tx }
    }

    /// Deliver one reply. Delivery after session teardown is silently
    /// discarded.
    pub fn deliver(&self, conn: ConnId, reply: Reply) {
        let _ = self.tx.send(ReplyEvent { conn, reply });
    }
}

/// One live wire connection, owned by the transport
///
/// The dispatcher sends at most one command at a time on a link and waits
/// for its reply event before reusing the link. Transport failures must
/// surface as a [`crate::protocol::codes::DISCONNECTED`] reply rather than
/// a send error, mirroring how a real socket fails asynchronously.
pub trait ConnectionLink: Send {
    /// Queue one serialized command line, with its optional input payload,
    /// for transmission
    fn send(&mut self, line: &str, input: Option<CommandInput>);

    /// Release the underlying stream and any TLS resources
    fn shutdown(&mut self) {}
}

/// Factory for connections to administrative destinations
pub trait Transport {
    /// Open a connection to `dest`. Replies for it must be delivered
    /// through `replies` tagged with `conn`.
    fn connect(
        &mut self,
        dest: &DestinationAddr,
        conn: ConnId,
        replies: ReplySender,
    ) -> anyhow::Result<Box<dyn ConnectionLink>>;
}
