//! Routing resolution for one target user
//!
//! Decides whether an administrative command runs locally, is proxied to
//! the backend that owns the user's mailbox, or is referred back to the
//! caller to retry against a different administrative endpoint. The
//! decision comes from a single passdb lookup; there are no retries, one
//! lookup failure is terminal for that command's routing.

use std::net::IpAddr;

use tracing::debug;

use crate::auth::{AuthUserInfo, PassdbLookup, PassdbResult};
use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::types::SslFlags;

/// One user to run the command for, with the metadata forwarded to the
/// auth lookup
#[derive(Debug, Clone, Default)]
pub struct UserRequest {
    pub username: String,
    pub local_ip: Option<IpAddr>,
    pub remote_ip: Option<IpAddr>,
    pub local_port: u16,
    pub remote_port: u16,
}

impl UserRequest {
    /// Request with only a username, no originating connection metadata
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }
}

/// Where the command should run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    /// Execute locally, no connection involved
    Local,
    /// Forward to the destination that owns the user
    Proxy(ProxyTarget),
    /// Hand `user@host` back to the caller to retry against a different
    /// administrative endpoint
    Referral(String),
}

/// Resolved proxy destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    /// Target username, possibly renamed by the lookup
    pub user: String,
    pub host: String,
    /// Explicit address override from the lookup
    pub hostip: Option<IpAddr>,
    pub port: u16,
    pub ssl_flags: SslFlags,
}

/// Resolve the routing decision for one user
///
/// With no administrative port configured the command always runs locally
/// and no lookup is performed. A user unknown to the passdb also runs
/// locally: it may still be resolvable by a mailbox lookup, which is not
/// this module's call to make.
pub async fn resolve<L: PassdbLookup + ?Sized>(
    lookup: &L,
    config: &DispatchConfig,
    request: &UserRequest,
) -> Result<Routing, DispatchError> {
    if config.remote_disabled() {
        return Ok(Routing::Local);
    }

    let info = AuthUserInfo {
        service: config.service.clone(),
        local_ip: request.local_ip,
        remote_ip: request.remote_ip,
        local_port: request.local_port,
        remote_port: request.remote_port,
    };

    let fields = match lookup.pass_lookup(&request.username, &info).await {
        Err(err) => {
            return Err(DispatchError::Lookup {
                socket_path: lookup.socket_path().to_string(),
                message: err.to_string(),
            });
        }
        Ok(PassdbResult::NotFound) => return Ok(Routing::Local),
        Ok(PassdbResult::Fields(fields)) => fields,
    };

    parse_fields(&fields, config, lookup.socket_path(), &request.username)
}

/// Interpret the passdb field list into a routing decision
fn parse_fields(
    fields: &[String],
    config: &DispatchConfig,
    socket_path: &str,
    username: &str,
) -> Result<Routing, DispatchError> {
    let mut proxying = false;
    let mut nologin = false;
    let mut proxy_host: Option<String> = None;
    let mut hostip_raw: Option<&str> = None;
    let mut port = config.admin_port;
    let mut user = username.to_string();
    let mut ssl_flags = config.tls.ssl_flags();

    for field in fields {
        let (key, value) = match field.split_once('=') {
            Some((key, value)) => (key, value),
            None => (field.as_str(), ""),
        };

        match key {
            "proxy" => proxying = true,
            "nologin" => nologin = true,
            "host" => proxy_host = Some(value.to_string()),
            "hostip" => hostip_raw = Some(value),
            "user" | "destuser" => user = value.to_string(),
            "port" => match value.parse::<u16>() {
                Ok(parsed) => port = parsed,
                Err(_) => {
                    debug!("passdb returned unparseable port '{}' for {}", value, username);
                    port = 0;
                }
            },
            "ssl" => {
                ssl_flags.tls = true;
                if value == "any-cert" {
                    ssl_flags.any_cert = true;
                }
            }
            "starttls" => {
                ssl_flags.tls = true;
                ssl_flags.starttls = true;
                if value == "any-cert" {
                    ssl_flags.any_cert = true;
                }
            }
            _ => {}
        }
    }

    let hostip: Option<IpAddr> = match hostip_raw {
        Some(value) => Some(value.parse().map_err(|_| DispatchError::InvalidHostip {
            socket_path: socket_path.to_string(),
            value: value.to_string(),
        })?),
        None => None,
    };

    if !proxying {
        if !nologin {
            return Ok(Routing::Local);
        }
        return match proxy_host {
            // administrative access to disabled accounts is permitted
            None => Ok(Routing::Local),
            Some(host) => Ok(Routing::Referral(format!("{}@{}", user, host))),
        };
    }

    match proxy_host {
        None => Err(DispatchError::MissingProxyHost {
            socket_path: socket_path.to_string(),
            userdb_hint: socket_path.contains("auth-userdb"),
        }),
        Some(host) => Ok(Routing::Proxy(ProxyTarget {
            user,
            host,
            hostip,
            port,
            ssl_flags,
        })),
    }
}
