//! Known tunnels, derived from the artifacts directory.
//!
//! The directory is the only source of truth: a tunnel is known iff its
//! config file is present.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::cmd::CommandRunner;
use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::tunnel::{ServiceState, Tunnel, name_from_config_file};

/// Config text plus live service state for one tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelDescription {
    pub config_contents: String,
    pub service_state: ServiceState,
}

/// Scan `config_directory` for tunnel configs, sorted by name.
///
/// A missing directory is treated as empty.
pub fn list_known_tunnels(config_directory: &Path) -> Result<Vec<Tunnel>> {
    let entries = match fs::read_dir(config_directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(
                "artifacts directory does not exist: {}",
                config_directory.display()
            );
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut tunnels = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(name_from_config_file) else {
            continue;
        };
        tunnels.push(load_tunnel(name, config_directory));
    }

    tunnels.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(tunnels)
}

/// Look up a single known tunnel by name.
pub fn find_tunnel(name: &str, config_directory: &Path) -> Result<Tunnel> {
    let tunnel = Tunnel::new(name, config_directory);
    if !tunnel.config_file_path().is_file() {
        return Err(Error::NotFound(name.to_string()));
    }
    Ok(load_tunnel(name, config_directory))
}

/// Read the tunnel's config and query its service.
pub fn describe<R: CommandRunner>(
    tunnel: &Tunnel,
    gateway: &Gateway<R>,
) -> Result<TunnelDescription> {
    let config_contents = fs::read_to_string(tunnel.config_file_path()).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            Error::NotFound(tunnel.name.clone())
        } else {
            Error::Io(e)
        }
    })?;
    let service_state = gateway.service_status(&tunnel.service_unit_name());
    Ok(TunnelDescription {
        config_contents,
        service_state,
    })
}

/// Build the record for `name`, filling ingress fields from its config when readable.
fn load_tunnel(name: &str, config_directory: &Path) -> Tunnel {
    let mut tunnel = Tunnel::new(name, config_directory);
    match fs::read_to_string(tunnel.config_file_path()) {
        Ok(content) => {
            let (hostname, service) = parse_ingress(&content);
            tunnel.dns_hostname = hostname;
            tunnel.local_service_url = service;
        }
        Err(e) => {
            tracing::warn!(
                "failed to read {}: {e}",
                tunnel.config_file_path().display()
            );
        }
    }
    tunnel
}

/// Pull the first `hostname:` and the `service:` paired with it from a config.
fn parse_ingress(content: &str) -> (Option<String>, Option<String>) {
    let mut hostname = None;
    for line in content.lines() {
        let line = line.trim().trim_start_matches("- ").trim();
        if hostname.is_none() {
            hostname = line
                .strip_prefix("hostname:")
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
        } else if let Some(val) = line.strip_prefix("service:") {
            return (hostname, Some(val.trim().to_string()));
        }
    }
    (hostname, None)
}
