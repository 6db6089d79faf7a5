//! Administrative wire protocol: command serialization and reply handling
//!
//! One command is a single tab-separated line:
//!
//! ```text
//! [flagchar]\t<username>\t<command>[\t<arg>]*\n
//! ```
//!
//! The optional flag character selects debug (`D`) or verbose (`v`) output
//! on the remote side. Every variable field is tab-escaped (see [`escape`])
//! so user-controlled bytes cannot be confused with field separators. The
//! reply is a numeric status code (see [`codes`]) with an optional text
//! payload; for referrals the payload is the redirect destination.

pub mod codes;
pub mod escape;

pub use escape::{tab_escape, tab_unescape};

use std::net::IpAddr;

/// One completed reply from a destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Status code, see [`codes`]
    pub exit_code: i32,
    /// Error text, or the redirect destination for [`codes::REFERRAL`]
    pub error: String,
}

impl Reply {
    /// Successful reply with no payload
    #[must_use]
    pub const fn success() -> Self {
        Self {
            exit_code: codes::SUCCESS,
            error: String::new(),
        }
    }

    /// Failure reply with a status code and message
    #[must_use]
    pub fn failure(exit_code: i32, error: impl Into<String>) -> Self {
        Self {
            exit_code,
            error: error.into(),
        }
    }
}

/// Serialize one command line for the wire
///
/// `debug` wins over `verbose` when both are set; with neither, the flag
/// field is left empty.
#[must_use]
pub fn format_command_line(
    debug: bool,
    verbose: bool,
    username: &str,
    command: &str,
    args: &[String],
) -> String {
    let mut line = String::with_capacity(256);
    if debug {
        line.push('D');
    } else if verbose {
        line.push('v');
    }
    line.push('\t');
    escape::append_tabescaped(&mut line, username);
    line.push('\t');
    escape::append_tabescaped(&mut line, command);
    for arg in args {
        line.push('\t');
        escape::append_tabescaped(&mut line, arg);
    }
    line.push('\n');
    line
}

/// Parsed redirect destination, `[user@]host[:port]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    /// Rename target, informational only: the replayed command line keeps
    /// the originally resolved username
    pub user: Option<String>,
    pub host: String,
    /// Set when the host part is an IP literal
    pub ip: Option<IpAddr>,
    /// 0 when the redirect names no port (inherit the original's)
    pub port: u16,
}

/// Parse a redirect destination string
///
/// Accepts `host`, `host:port`, `[v6addr]`, `[v6addr]:port`, each optionally
/// prefixed with `user@`. Returns `None` for an empty host or an
/// unparseable port.
#[must_use]
pub fn parse_redirect(destination: &str) -> Option<RedirectTarget> {
    let (user, hostport) = match destination.split_once('@') {
        Some((user, rest)) => (Some(user.to_string()), rest),
        None => (None, destination),
    };

    let (host, port) = split_host_port(hostport)?;
    if host.is_empty() {
        return None;
    }

    let ip = host.parse::<IpAddr>().ok();
    Some(RedirectTarget {
        user,
        host,
        ip,
        port,
    })
}

/// Split `host[:port]`, with square-bracket IPv6 support. A bare IPv6
/// literal without brackets is taken as a host with no port.
fn split_host_port(s: &str) -> Option<(String, u16)> {
    if let Some(rest) = s.strip_prefix('[') {
        let (inside, after) = rest.split_once(']')?;
        if after.is_empty() {
            return Some((inside.to_string(), 0));
        }
        let port = after.strip_prefix(':')?.parse().ok()?;
        return Some((inside.to_string(), port));
    }

    match s.rsplit_once(':') {
        Some((host, _)) if host.contains(':') => Some((s.to_string(), 0)),
        Some((host, port)) => {
            let port = port.parse().ok()?;
            Some((host.to_string(), port))
        }
        None => Some((s.to_string(), 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_basic() {
        let line = format_command_line(false, false, "alice", "mailbox status", &[]);
        assert_eq!(line, "\talice\tmailbox status\n");
    }

    #[test]
    fn test_command_line_with_args() {
        let args = vec!["-t".to_string(), "INBOX".to_string()];
        let line = format_command_line(false, false, "alice", "fetch", &args);
        assert_eq!(line, "\talice\tfetch\t-t\tINBOX\n");
    }

    #[test]
    fn test_command_line_flag_characters() {
        assert!(format_command_line(true, false, "a", "c", &[]).starts_with("D\t"));
        assert!(format_command_line(false, true, "a", "c", &[]).starts_with("v\t"));
        // debug wins when both are set
        assert!(format_command_line(true, true, "a", "c", &[]).starts_with("D\t"));
    }

    #[test]
    fn test_command_line_escapes_fields() {
        let args = vec!["tab\there".to_string()];
        let line = format_command_line(false, false, "bad\tuser", "cmd", &args);
        // exactly the separators we wrote, none leaked from field content
        assert_eq!(line.matches('\t').count(), 3);
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_parse_redirect_host_only() {
        let target = parse_redirect("mail-12.example.com").unwrap();
        assert_eq!(target.user, None);
        assert_eq!(target.host, "mail-12.example.com");
        assert_eq!(target.port, 0);
        assert_eq!(target.ip, None);
    }

    #[test]
    fn test_parse_redirect_host_port() {
        let target = parse_redirect("mail-12.example.com:24245").unwrap();
        assert_eq!(target.host, "mail-12.example.com");
        assert_eq!(target.port, 24245);
    }

    #[test]
    fn test_parse_redirect_with_user() {
        let target = parse_redirect("carol@backend:2000").unwrap();
        assert_eq!(target.user.as_deref(), Some("carol"));
        assert_eq!(target.host, "backend");
        assert_eq!(target.port, 2000);
    }

    #[test]
    fn test_parse_redirect_ip_literal() {
        let target = parse_redirect("192.0.2.7:1000").unwrap();
        assert_eq!(target.ip, Some("192.0.2.7".parse().unwrap()));
        assert_eq!(target.port, 1000);
    }

    #[test]
    fn test_parse_redirect_bracketed_ipv6() {
        let target = parse_redirect("[2001:db8::1]:24245").unwrap();
        assert_eq!(target.host, "2001:db8::1");
        assert_eq!(target.ip, Some("2001:db8::1".parse().unwrap()));
        assert_eq!(target.port, 24245);

        let no_port = parse_redirect("[2001:db8::1]").unwrap();
        assert_eq!(no_port.port, 0);
    }

    #[test]
    fn test_parse_redirect_bare_ipv6_has_no_port() {
        let target = parse_redirect("2001:db8::1").unwrap();
        assert_eq!(target.host, "2001:db8::1");
        assert_eq!(target.port, 0);
        assert!(target.ip.is_some());
    }

    #[test]
    fn test_parse_redirect_invalid() {
        assert!(parse_redirect("").is_none());
        assert!(parse_redirect("host:notaport").is_none());
        assert!(parse_redirect("[2001:db8::1]:bad").is_none());
        assert!(parse_redirect(":100").is_none());
    }
}
