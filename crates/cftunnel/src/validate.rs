//! Validation of user-supplied tunnel parameters.

use crate::error::{Error, Result};

/// Maximum accepted tunnel name length.
pub const MAX_NAME_LEN: usize = 64;

/// URL schemes the tunnel daemon can proxy to.
const SERVICE_SCHEMES: &[&str] = &["http", "https", "tcp", "ssh", "rdp", "smb", "unix"];

/// Validate a tunnel name: `[A-Za-z0-9_-]{1,64}`, not starting with `-`.
///
/// The name doubles as a file stem and a systemd unit suffix, so anything
/// outside this set is rejected rather than escaped.
pub fn tunnel_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("tunnel name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::validation(format!(
            "tunnel name must be at most {MAX_NAME_LEN} characters (got {})",
            name.len()
        )));
    }
    if name.starts_with('-') {
        return Err(Error::validation("tunnel name must not start with '-'"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(Error::validation(format!(
            "tunnel name contains invalid character {c:?} (allowed: letters, digits, '-', '_')"
        )));
    }
    Ok(())
}

/// Validate a public DNS hostname such as `app.example.com`.
pub fn dns_hostname(host: &str) -> Result<()> {
    if host.is_empty() {
        return Err(Error::validation("DNS hostname must not be empty"));
    }
    if host.len() > 253 {
        return Err(Error::validation("DNS hostname is longer than 253 characters"));
    }
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return Err(Error::validation(format!(
            "DNS hostname '{host}' must be fully qualified (e.g. app.example.com)"
        )));
    }
    for label in labels {
        let ok = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !ok {
            return Err(Error::validation(format!(
                "DNS hostname '{host}' has an invalid label '{label}'"
            )));
        }
    }
    Ok(())
}

/// Validate a local service URL of the form `scheme://host[:port]`.
///
/// `unix:` URLs carry a socket path instead of a host and skip the port check.
pub fn service_url(url: &str) -> Result<()> {
    let Some((scheme, rest)) = url.split_once("://") else {
        return Err(Error::validation(format!(
            "service URL '{url}' must look like scheme://host:port (e.g. http://localhost:8080)"
        )));
    };
    if !SERVICE_SCHEMES.contains(&scheme) {
        return Err(Error::validation(format!(
            "unsupported scheme '{scheme}' (expected one of: {})",
            SERVICE_SCHEMES.join(", ")
        )));
    }
    if scheme == "unix" {
        if rest.is_empty() {
            return Err(Error::validation("unix socket path must not be empty"));
        }
        return Ok(());
    }

    let authority = rest.split('/').next().unwrap_or_default();
    let (host, port) = split_host_port(authority);
    if host.is_empty() {
        return Err(Error::validation(format!("service URL '{url}' has no host")));
    }
    if let Some(port) = port {
        match port.parse::<u16>() {
            Ok(p) if p > 0 => {}
            _ => {
                return Err(Error::validation(format!(
                    "service URL '{url}' has an invalid port '{port}'"
                )));
            }
        }
    }
    Ok(())
}

/// Split `host:port`, keeping bracketed IPv6 literals intact.
fn split_host_port(authority: &str) -> (&str, Option<&str>) {
    if let Some(stripped) = authority.strip_prefix('[') {
        return match stripped.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':')),
            None => ("", None),
        };
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    }
}
