//! Distributed administrative-command dispatcher for a multi-node mail
//! system
//!
//! A single administrative command ("show mailbox status for user X") may
//! have to run on whichever backend owns that user's mailbox. For each
//! target user this crate decides, via a passdb lookup, whether the
//! command runs locally, is proxied to a specific destination, or is
//! referred back to the caller; maintains a bounded pool of reusable
//! connections per destination with a bounded FIFO backlog; serializes
//! commands into tab-separated wire lines; interprets asynchronous replies,
//! transparently re-dispatching on mid-flight redirects; and aggregates all
//! per-command outcomes into one process exit code.
//!
//! Byte-level connection I/O, TLS and the auth lookup wire protocol are
//! collaborator traits ([`Transport`], [`PassdbLookup`]); this crate is the
//! state machine that coordinates pooling, backpressure, routing and
//! failure aggregation around them.
//!
//! # Example
//!
//! ```no_run
//! # async fn run<T, L>(transport: T, lookup: L) -> anyhow::Result<()>
//! # where T: mailadm_dispatch::Transport, L: mailadm_dispatch::PassdbLookup {
//! use mailadm_dispatch::{
//!     CommandSpec, DispatchConfig, DispatchOutcome, DispatcherSession, UserRequest,
//! };
//!
//! let config = DispatchConfig {
//!     admin_port: 24245,
//!     ..DispatchConfig::default()
//! };
//! let command = CommandSpec::new("mailbox status").with_args(vec!["INBOX".into()]);
//! let mut session = DispatcherSession::new(config, transport, lookup, command);
//!
//! for user in ["alice", "bob"] {
//!     match session.dispatch(&UserRequest::new(user)).await? {
//!         DispatchOutcome::Local => { /* run against local storage */ }
//!         DispatchOutcome::Remote => { /* reply handled by the session */ }
//!         DispatchOutcome::Referral(target) => {
//!             eprintln!("retry against {}", target);
//!         }
//!     }
//! }
//!
//! let exit_code = session.finish().await;
//! std::process::exit(exit_code);
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod input;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod transport;
pub mod types;

pub use auth::{AuthUserInfo, LookupError, PassdbLookup, PassdbResult};
pub use config::{load_config, DispatchConfig, TlsPolicy};
pub use error::DispatchError;
pub use input::CommandInput;
pub use protocol::{Reply, RedirectTarget};
pub use registry::{Destination, ServerRegistry, SERVER_QUEUE_MAX};
pub use resolver::{ProxyTarget, Routing, UserRequest};
pub use session::{CommandSpec, DispatchOutcome, DispatcherSession, KillSwitch};
pub use transport::{ConnectionLink, DestinationAddr, ReplyEvent, ReplySender, Transport};
pub use types::{ConnId, SslFlags};
