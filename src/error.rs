//! Dispatch error types
//!
//! Routing errors (lookup failures, bad routing fields, bad redirect
//! targets) are terminal for one command; connection-level failures abort
//! the whole run. The predicates below let callers tell the two apart
//! without matching on variants.

use std::fmt;

/// Errors produced while routing or dispatching one command
#[derive(Debug)]
#[non_exhaustive]
pub enum DispatchError {
    /// The passdb lookup itself failed
    Lookup {
        socket_path: String,
        message: String,
    },

    /// The lookup returned a `hostip` field that is not a valid address
    InvalidHostip { socket_path: String, value: String },

    /// The lookup requested proxying but named no destination host
    MissingProxyHost {
        socket_path: String,
        /// The socket path looks like a userdb-only endpoint, which cannot
        /// return proxy fields
        userdb_hint: bool,
    },

    /// A mid-flight redirect carried an unparseable destination
    InvalidRedirect { server: String, destination: String },

    /// Creating a connection to a destination failed
    Connect {
        server: String,
        source: anyhow::Error,
    },

    /// The run is already failed or externally killed
    ServerFailure,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lookup {
                socket_path,
                message,
            } => {
                write!(
                    f,
                    "{}: {} (to see if user is proxied, because admin_port is set)",
                    socket_path, message
                )
            }
            Self::InvalidHostip { socket_path, value } => {
                write!(f, "{}: Invalid hostip value '{}'", socket_path, value)
            }
            Self::MissingProxyHost {
                socket_path,
                userdb_hint,
            } => {
                write!(f, "{}: Proxy is missing destination host", socket_path)?;
                if *userdb_hint {
                    write!(
                        f,
                        " (maybe point admin_socket_path at a proxy-aware auth socket)"
                    )?;
                }
                Ok(())
            }
            Self::InvalidRedirect {
                server,
                destination,
            } => {
                write!(f, "{}: Invalid redirect destination: {}", server, destination)
            }
            Self::Connect { server, source } => {
                write!(f, "{}: Failed to create connection: {}", server, source)
            }
            Self::ServerFailure => write!(f, "admin server failure"),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connect { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl DispatchError {
    /// True for routing decisions that failed before any connection was
    /// involved
    #[must_use]
    pub const fn is_routing_error(&self) -> bool {
        matches!(
            self,
            Self::Lookup { .. } | Self::InvalidHostip { .. } | Self::MissingProxyHost { .. }
        )
    }

    /// True when the error aborts the entire run rather than one command
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidRedirect { .. } | Self::Connect { .. } | Self::ServerFailure
        )
    }

    /// Log level appropriate for this error
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        if self.is_fatal() {
            tracing::Level::ERROR
        } else {
            tracing::Level::WARN
        }
    }
}
