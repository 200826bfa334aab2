//! Tunnel records and the artifact naming convention.
//!
//! For tunnel `n` under artifacts directory `D`:
//!
//! | artifact     | path                              |
//! |--------------|-----------------------------------|
//! | daemon config| `D/n.yml`                         |
//! | start script | `D/n.sh`                          |
//! | systemd unit | `D/cloudflare-tunnel-n.service`   |
//!
//! The unit file carries the unit name so `systemctl link` registers it
//! under that name. Nothing else is stored: every path is derived from `n`
//! and `D`.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::validate;

/// Extension of the daemon config file; also the marker for a known tunnel.
pub const CONFIG_EXT: &str = "yml";
/// Extension of the start script.
pub const SCRIPT_EXT: &str = "sh";
/// Prefix shared by every managed systemd unit.
pub const UNIT_PREFIX: &str = "cloudflare-tunnel-";

/// Derived artifact locations for one tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub config: PathBuf,
    pub script: PathBuf,
    pub unit: PathBuf,
}

impl ArtifactPaths {
    pub fn new(name: &str, config_directory: &Path) -> Self {
        Self {
            config: config_directory.join(format!("{name}.{CONFIG_EXT}")),
            script: config_directory.join(format!("{name}.{SCRIPT_EXT}")),
            unit: config_directory.join(unit_name(name)),
        }
    }

    /// All three paths, config first.
    pub fn all(&self) -> [&Path; 3] {
        [self.config.as_path(), self.script.as_path(), self.unit.as_path()]
    }

    /// Paths that currently exist on disk.
    pub fn existing(&self) -> Vec<&Path> {
        self.all().into_iter().filter(|p| p.exists()).collect()
    }
}

/// systemd unit name for a tunnel, e.g. `cloudflare-tunnel-demo.service`.
pub fn unit_name(name: &str) -> String {
    format!("{UNIT_PREFIX}{name}.service")
}

/// Recover a tunnel name from a config file name (`demo.yml` -> `demo`).
///
/// Returns `None` for anything that does not follow the convention.
pub fn name_from_config_file(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_suffix(CONFIG_EXT)?.strip_suffix('.')?;
    validate::tunnel_name(stem).ok()?;
    Some(stem)
}

/// A tunnel known to the app through its artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunnel {
    pub name: String,
    /// Public hostname from the ingress rule, if the config could be read.
    pub dns_hostname: Option<String>,
    /// Local origin from the ingress rule, if the config could be read.
    pub local_service_url: Option<String>,
    pub paths: ArtifactPaths,
}

impl Tunnel {
    /// Build the record for `name` under `config_directory` without touching disk.
    pub fn new(name: impl Into<String>, config_directory: &Path) -> Self {
        let name = name.into();
        let paths = ArtifactPaths::new(&name, config_directory);
        Self {
            name,
            dns_hostname: None,
            local_service_url: None,
            paths,
        }
    }

    pub fn service_unit_name(&self) -> String {
        unit_name(&self.name)
    }

    pub fn config_file_path(&self) -> &Path {
        &self.paths.config
    }

    pub fn script_file_path(&self) -> &Path {
        &self.paths.script
    }
}

/// Live state of a systemd unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Active,
    Inactive,
    Unknown,
}

impl ServiceState {
    /// Map `systemctl is-active` output to a state.
    pub fn from_is_active(output: &str) -> Self {
        match output.trim() {
            "active" | "reloading" | "activating" => Self::Active,
            "inactive" | "failed" | "deactivating" => Self::Inactive,
            _ => Self::Unknown,
        }
    }

    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}
