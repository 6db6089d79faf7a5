//! Configuration module
//!
//! Routing settings consumed by the dispatcher: the administrative port and
//! lookup socket path, the TLS policy for proxied destinations, and the
//! per-destination worker (connection) count.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::types::SslFlags;

/// TLS policy for connections to proxied destinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TlsPolicy {
    /// Plaintext connections
    #[default]
    None,
    /// Require an implicit TLS handshake
    Ssl,
    /// Require TLS negotiated in-band via STARTTLS
    Starttls,
}

impl TlsPolicy {
    /// Convert the policy into the flag set applied to new destinations
    #[must_use]
    pub const fn ssl_flags(&self) -> SslFlags {
        match self {
            Self::None => SslFlags::NONE,
            Self::Ssl => SslFlags {
                tls: true,
                starttls: false,
                any_cert: false,
            },
            Self::Starttls => SslFlags {
                tls: true,
                starttls: true,
                any_cert: false,
            },
        }
    }
}

/// Default service name reported to the auth lookup
fn default_service() -> String {
    "mailadm".to_string()
}

/// Default auth lookup socket path
fn default_socket_path() -> String {
    "/var/run/mailadm/auth-userdb".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    /// Administrative service port on backend hosts. 0 disables remote
    /// routing entirely: every command runs locally without a lookup.
    #[serde(default)]
    pub admin_port: u16,

    /// Socket path of the authentication lookup service. Included in
    /// routing error messages so failures name the endpoint consulted.
    #[serde(default = "default_socket_path")]
    pub admin_socket_path: String,

    /// TLS policy for proxied destinations
    #[serde(default)]
    pub tls: TlsPolicy,

    /// Maximum concurrent connections per destination. The effective bound
    /// is never below 1.
    #[serde(default)]
    pub worker_count: u32,

    /// Service name passed with every auth lookup
    #[serde(default = "default_service")]
    pub service: String,

    /// Emit the debug flag character on every wire command
    #[serde(default)]
    pub debug: bool,

    /// Emit the verbose flag character on every wire command
    #[serde(default)]
    pub verbose: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            admin_port: 0,
            admin_socket_path: default_socket_path(),
            tls: TlsPolicy::None,
            worker_count: 0,
            service: default_service(),
            debug: false,
            verbose: false,
        }
    }
}

impl DispatchConfig {
    /// Per-destination connection capacity, never below 1
    #[must_use]
    pub fn connection_capacity(&self) -> usize {
        std::cmp::max(self.worker_count, 1) as usize
    }

    /// True when remote routing is disabled
    #[must_use]
    pub const fn remote_disabled(&self) -> bool {
        self.admin_port == 0
    }
}

/// Load dispatcher configuration from a TOML file
pub fn load_config(config_path: &str) -> Result<DispatchConfig> {
    let config_content = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", config_path, e))?;

    let config: DispatchConfig = toml::from_str(&config_content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", config_path, e))?;

    Ok(config)
}
