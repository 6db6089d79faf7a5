//! Core identifier and policy types shared across the dispatcher

/// Identifier for one live server connection
///
/// Allocated by the session when a connection is created and carried by
/// every reply event so the owning destination can be found again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
    /// Create a connection ID from a raw counter value
    #[must_use]
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the underlying counter value
    #[must_use]
    #[inline]
    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// TLS policy bits for a destination
///
/// `tls` requires a TLS-protected session, `starttls` additionally requires
/// in-band negotiation instead of an implicit handshake, and `any_cert`
/// disables certificate verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SslFlags {
    pub tls: bool,
    pub starttls: bool,
    pub any_cert: bool,
}

impl SslFlags {
    /// No TLS requirement
    pub const NONE: Self = Self {
        tls: false,
        starttls: false,
        any_cert: false,
    };

    /// OR another flag set into this one
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self {
            tls: self.tls || other.tls,
            starttls: self.starttls || other.starttls,
            any_cert: self.any_cert || other.any_cert,
        }
    }

    /// True if any TLS requirement is set
    #[must_use]
    pub const fn requires_tls(&self) -> bool {
        self.tls
    }
}
