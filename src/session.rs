//! Dispatcher session: one administrative run from first dispatch to teardown
//!
//! The session owns everything that is process-wide for the duration of a
//! run: the destination registry, the single active command context, the
//! pending-command table, the reply channel and the failure latch. Replies
//! arrive as [`ReplyEvent`]s; "blocking" is re-entering the event loop and
//! receiving from the channel until the reply for some in-flight command has
//! been processed. All mutation happens synchronously between receives, so
//! one session must never be shared between concurrent runs; a new run
//! constructs a new session after [`DispatcherSession::finish`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

use crate::auth::PassdbLookup;
use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::input::CommandInput;
use crate::protocol::{self, codes};
use crate::registry::{Connection, Destination, ServerRegistry};
use crate::resolver::{self, Routing, UserRequest};
use crate::transport::{ReplyEvent, ReplySender, Transport};
use crate::types::ConnId;

/// External shutdown latch
///
/// Cloneable handle observed by every drain loop; once killed, the session
/// stops dispatching queued work and [`DispatcherSession::finish`] reports
/// the run as aborted. Typically wired to a signal handler by the caller.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch {
    inner: Arc<KillInner>,
}

#[derive(Debug, Default)]
struct KillInner {
    killed: AtomicBool,
    notify: Notify,
}

impl KillSwitch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent.
    pub fn kill(&self) {
        self.inner.killed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.inner.killed.load(Ordering::SeqCst)
    }

    /// Wait until [`KillSwitch::kill`] has been called
    pub async fn killed(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_killed() {
            return;
        }
        notified.await;
    }
}

/// The fully formed command a session runs for each user
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    /// Command name as sent on the wire
    pub name: String,
    /// Argument list, already parsed by the caller
    pub args: Vec<String>,
    /// Optional input payload, shared across every dispatch and redirect
    pub input: Option<CommandInput>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_input(mut self, input: CommandInput) -> Self {
        self.input = Some(input);
        self
    }
}

/// The single active command context: the command plus the aggregated exit
/// code for the whole run
#[derive(Debug)]
struct DispatchContext {
    command: CommandSpec,
    exit_code: i32,
}

impl DispatchContext {
    /// Record a failure code. An unset code always takes the new value;
    /// a temporary failure overwrites whatever non-fatal code was recorded
    /// before, since it means the operation should be retried externally.
    fn record_exit_code(&mut self, code: i32) {
        if self.exit_code == 0 || code == codes::TEMP_FAIL {
            self.exit_code = code;
        }
    }

    /// Record a failure code only if none has been recorded yet
    fn record_exit_code_if_unset(&mut self, code: i32) {
        if self.exit_code == 0 {
            self.exit_code = code;
        }
    }
}

/// One in-flight dispatch unit, keyed by its bound connection
#[derive(Debug)]
struct PendingCommand {
    /// Identity of the destination the command was sent to
    dest: String,
    username: String,
    cmdline: String,
    input: Option<CommandInput>,
}

/// What the caller should do with one user's command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Run the command locally; no connection was involved
    Local,
    /// The command was dispatched (or queued) to a remote destination
    Remote,
    /// Retry the whole command against `user@host`; no connection was
    /// opened
    Referral(String),
}

/// Administrative-command dispatcher for one run
pub struct DispatcherSession<T: Transport, L: PassdbLookup> {
    config: DispatchConfig,
    transport: T,
    lookup: L,
    registry: ServerRegistry,
    context: DispatchContext,
    pending: HashMap<ConnId, PendingCommand>,
    events_tx: mpsc::UnboundedSender<ReplyEvent>,
    events_rx: mpsc::UnboundedReceiver<ReplyEvent>,
    next_conn_id: u64,
    internal_failure: bool,
    kill: KillSwitch,
}

impl<T: Transport, L: PassdbLookup> DispatcherSession<T, L> {
    /// Create a session for one command run
    #[must_use]
    pub fn new(config: DispatchConfig, transport: T, lookup: L, command: CommandSpec) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            transport,
            lookup,
            registry: ServerRegistry::new(),
            context: DispatchContext {
                command,
                exit_code: 0,
            },
            pending: HashMap::new(),
            events_tx,
            events_rx,
            next_conn_id: 0,
            internal_failure: false,
            kill: KillSwitch::new(),
        }
    }

    /// Handle for external shutdown requests
    #[must_use]
    pub fn kill_switch(&self) -> KillSwitch {
        self.kill.clone()
    }

    /// Exit code aggregated so far
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.context.exit_code
    }

    /// Live connections to one destination (0 for an unknown identity)
    #[must_use]
    pub fn connection_count(&self, dest: &str) -> usize {
        self.registry.get(dest).map_or(0, Destination::connection_count)
    }

    /// Queued usernames on one destination (0 for an unknown identity)
    #[must_use]
    pub fn queue_len(&self, dest: &str) -> usize {
        self.registry.get(dest).map_or(0, Destination::queue_len)
    }

    fn failed(&self) -> bool {
        self.internal_failure || self.kill.is_killed()
    }

    /// Route one user's command and dispatch it remotely if needed
    ///
    /// Resolution happens first; `Local` and `Referral` outcomes return to
    /// the caller before any connection is involved. A `Proxy` outcome binds
    /// the command to an idle pooled connection, creates a connection while
    /// the destination is below its capacity, or queues the username. When
    /// the queue is already at capacity this drains the event loop first
    /// and a connection freed by the drain is used immediately.
    pub async fn dispatch(
        &mut self,
        request: &UserRequest,
    ) -> Result<DispatchOutcome, DispatchError> {
        let routing = match resolver::resolve(&self.lookup, &self.config, request).await {
            Ok(routing) => routing,
            Err(err) => {
                // terminal for this command only, but the run must report it
                self.context.record_exit_code(codes::TEMP_FAIL);
                return Err(err);
            }
        };
        let target = match routing {
            Routing::Local => return Ok(DispatchOutcome::Local),
            Routing::Referral(target) => {
                info!("referring {} to {}", request.username, target);
                return Ok(DispatchOutcome::Referral(target));
            }
            Routing::Proxy(target) => target,
        };

        let name = format!("{}:{}", target.host, target.port);
        let capacity = self.config.connection_capacity();
        let dest = self.registry.get_or_create(&name, capacity);
        dest.set_route(target.hostip, target.port, target.ssl_flags);

        loop {
            let (idle, below_capacity, queue_full) = match self.registry.get(&name) {
                Some(dest) => (
                    dest.find_idle_connection(),
                    dest.connection_count() < dest.capacity(),
                    dest.queue_is_full(),
                ),
                None => break,
            };

            if let Some(conn) = idle {
                self.handle(&name, conn, &target.user);
                break;
            }

            if below_capacity {
                match self.create_connection(&name) {
                    Ok(conn) => self.handle(&name, conn, &target.user),
                    Err(source) => {
                        self.internal_failure = true;
                        return Err(DispatchError::Connect {
                            server: name,
                            source,
                        });
                    }
                }
                break;
            }

            if queue_full {
                self.flush_one(name.clone()).await;
                if self.failed() {
                    return Err(DispatchError::ServerFailure);
                }
                // a connection may have freed, or a queue slot opened;
                // re-run admission from the top
                continue;
            }

            if let Some(dest) = self.registry.get_mut(&name) {
                debug!("{}: queueing {}", name, target.user);
                dest.queue_push(target.user.clone());
            }
            break;
        }

        if self.failed() {
            Err(DispatchError::ServerFailure)
        } else {
            Ok(DispatchOutcome::Remote)
        }
    }

    /// Serialize the command for `username` and send it on `conn`
    fn handle(&mut self, dest_name: &str, conn: ConnId, username: &str) {
        let cmdline = protocol::format_command_line(
            self.config.debug,
            self.config.verbose,
            username,
            &self.context.command.name,
            &self.context.command.args,
        );
        debug!(
            "{}: dispatching {} for {}",
            dest_name, self.context.command.name, username
        );
        self.bind_and_send(
            conn,
            PendingCommand {
                dest: dest_name.to_string(),
                username: username.to_string(),
                cmdline,
                input: self.context.command.input.clone(),
            },
        );
    }

    /// Bind a pending command to `conn` and hand its line and input to the
    /// connection's send primitive
    fn bind_and_send(&mut self, conn: ConnId, cmd: PendingCommand) {
        let dest_name = cmd.dest.clone();
        let cmdline = cmd.cmdline.clone();
        let input = cmd.input.clone();
        self.pending.insert(conn, cmd);

        let connection = self
            .registry
            .get_mut(&dest_name)
            .and_then(|dest| dest.connection_mut(conn));
        match connection {
            Some(connection) => {
                connection.mark_busy();
                connection.link_mut().send(&cmdline, input);
            }
            None => warn!("{}: lost connection {} before send", dest_name, conn),
        }
    }

    /// Open a new connection to `dest_name` and add it to the pool
    fn create_connection(&mut self, dest_name: &str) -> anyhow::Result<ConnId> {
        self.next_conn_id += 1;
        let id = ConnId::from_raw(self.next_conn_id);

        let addr = match self.registry.get(dest_name) {
            Some(dest) => dest.addr().clone(),
            None => anyhow::bail!("unknown destination {}", dest_name),
        };
        let replies = ReplySender::new(self.events_tx.clone());
        let link = self.transport.connect(&addr, id, replies)?;

        if let Some(dest) = self.registry.get_mut(dest_name) {
            dest.push_connection(Connection::new(id, link));
        }
        info!("{}: created {}", dest_name, id);
        Ok(id)
    }

    /// Re-dispatch a referred command to the destination it was redirected
    /// to, replaying the input payload from the start
    fn redirect(&mut self, mut cmd: PendingCommand, destination: &str) -> Result<(), DispatchError> {
        let (orig_port, orig_ssl) = match self.registry.get(&cmd.dest) {
            Some(dest) => (dest.addr().port, dest.addr().ssl_flags),
            None => (0, crate::types::SslFlags::NONE),
        };

        let Some(target) = protocol::parse_redirect(destination) else {
            return Err(DispatchError::InvalidRedirect {
                server: cmd.dest,
                destination: destination.to_string(),
            });
        };

        // redirect destinations are registered under the raw payload string;
        // TLS policy is inherited, the port only when the redirect names none
        let port = if target.port != 0 { target.port } else { orig_port };
        let capacity = self.config.connection_capacity();
        let dest = self.registry.get_or_create(destination, capacity);
        dest.set_route(target.ip, port, orig_ssl);

        let conn = match self
            .registry
            .get(destination)
            .and_then(Destination::find_idle_connection)
        {
            Some(conn) => conn,
            None => self
                .create_connection(destination)
                .map_err(|source| DispatchError::Connect {
                    server: destination.to_string(),
                    source,
                })?,
        };

        if let Some(input) = &cmd.input {
            input.rewind();
        }

        debug!("{}: redirecting {} to {}", cmd.dest, cmd.username, destination);
        cmd.dest = destination.to_string();
        self.bind_and_send(conn, cmd);
        Ok(())
    }

    /// Interpret one completed reply. Returns true when the event-loop
    /// iteration should end (every terminal outcome; a successfully
    /// redirected referral keeps the iteration running).
    fn process_reply(&mut self, event: ReplyEvent) -> bool {
        let Some(cmd) = self.pending.remove(&event.conn) else {
            debug!("reply for unknown {}", event.conn);
            return false;
        };

        // whatever the outcome, this connection finished its command
        if let Some(conn) = self
            .registry
            .get_mut(&cmd.dest)
            .and_then(|dest| dest.connection_mut(event.conn))
        {
            conn.mark_idle();
        }

        match event.reply.exit_code {
            codes::SUCCESS => {}
            codes::DISCONNECTED => {
                error!(
                    "{}: Command {} failed for {}: {}",
                    cmd.dest, self.context.command.name, cmd.username, event.reply.error
                );
                self.internal_failure = true;
                return true;
            }
            codes::NO_USER => {
                error!("{}: No such user: {}", cmd.dest, cmd.username);
                self.context.record_exit_code_if_unset(codes::NO_USER);
            }
            codes::REFERRAL => {
                let dest = cmd.dest.clone();
                if let Err(err) = self.redirect(cmd, &event.reply.error) {
                    error!("{}", err);
                    self.internal_failure = true;
                    return true;
                }
                self.pump_queue(&dest);
                return false;
            }
            code => {
                debug!(
                    "{}: command failed for {} with status {}",
                    cmd.dest, cmd.username, code
                );
                self.context.record_exit_code(code);
            }
        }

        self.pump_queue(&cmd.dest);
        true
    }

    /// Dispatch the oldest queued username if a connection is now idle
    fn pump_queue(&mut self, dest_name: &str) {
        let next = match self.registry.get_mut(dest_name) {
            Some(dest) if !dest.queue_is_empty() => dest
                .find_idle_connection()
                .and_then(|conn| dest.queue_pop_front().map(|user| (conn, user))),
            _ => None,
        };
        if let Some((conn, username)) = next {
            self.handle(dest_name, conn, &username);
        }
    }

    /// Receive reply events until one terminal reply has been processed or
    /// the session is killed
    async fn run_event_loop_once(&mut self) {
        loop {
            let event = {
                let kill = self.kill.clone();
                tokio::select! {
                    event = self.events_rx.recv() => event,
                    () = kill.killed() => None,
                }
            };
            let Some(event) = event else { return };
            if self.process_reply(event) {
                return;
            }
        }
    }

    /// Run the event loop until the destination's queue length changes, it
    /// has no busy connection left, or the run has failed
    async fn flush_one(&mut self, dest_name: String) {
        let starting_len = self.queue_len(&dest_name);
        loop {
            self.run_event_loop_once().await;
            if self.queue_len(&dest_name) != starting_len {
                break;
            }
            let busy = self
                .registry
                .get(&dest_name)
                .map_or(false, Destination::has_busy_connections);
            if !busy || self.failed() {
                break;
            }
        }
    }

    /// Drain all outstanding work and tear the session down
    ///
    /// Flushes every destination that still has commands in flight (unless
    /// the run has failed), destroys all pooled connections, reports an
    /// externally killed run as aborted, and escalates a temporary-failure
    /// exit code when the run failed without recording one. Returns the
    /// aggregated exit code for the whole run.
    pub async fn finish(mut self) -> i32 {
        while !self.failed() {
            let Some(name) = self.registry.find_any_with_busy_connections() else {
                break;
            };
            self.flush_one(name).await;
        }

        self.registry.destroy_all();

        if self.kill.is_killed() {
            error!("Aborted");
        }
        if self.failed() {
            self.context.record_exit_code_if_unset(codes::TEMP_FAIL);
        }

        self.context.exit_code
    }
}
