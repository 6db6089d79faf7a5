//! Authentication lookup interface
//!
//! Routing decisions come from a passdb lookup against the authentication
//! service named by `admin_socket_path`. The lookup itself is a collaborator
//! behind [`PassdbLookup`]; the dispatcher only consumes the ordered
//! `key[=value]` field list it returns.

use async_trait::async_trait;
use std::net::IpAddr;
use thiserror::Error;

/// Request metadata forwarded with every lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthUserInfo {
    /// Service name of the originating request
    pub service: String,
    pub local_ip: Option<IpAddr>,
    pub remote_ip: Option<IpAddr>,
    pub local_port: u16,
    pub remote_port: u16,
}

/// Outcome of a successful passdb query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassdbResult {
    /// The user is unknown to the passdb. Not an error: the user may still
    /// be resolvable by a later mailbox lookup.
    NotFound,
    /// Ordered `key[=value]` strings describing the user's routing
    Fields(Vec<String>),
}

/// Lookup failure, distinct from "user not found"
#[derive(Debug, Error)]
#[error("{message}")]
pub struct LookupError {
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl LookupError {
    /// Failure with a bare message
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Failure wrapping an underlying error
    #[must_use]
    pub fn with_source(message: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            message: message.into(),
            source: Some(source),
        }
    }
}

/// Authentication lookup service
#[async_trait]
pub trait PassdbLookup: Send + Sync {
    /// Socket path identifying the lookup endpoint, used in error context
    fn socket_path(&self) -> &str;

    /// Query the passdb for one user
    async fn pass_lookup(
        &self,
        username: &str,
        info: &AuthUserInfo,
    ) -> Result<PassdbResult, LookupError>;
}
