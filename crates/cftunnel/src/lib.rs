//! Interactive manager for Cloudflare tunnels run as systemd services.
//!
//! Tunnels are created through `cloudflared`, described by three artifact
//! files (daemon config, start script, systemd unit) in one directory, and
//! started through `systemctl`. The directory is the only registry.

pub mod artifacts;
pub mod cmd;
pub mod error;
pub mod gateway;
pub mod privilege;
pub mod prompt;
pub mod registry;
pub mod settings;
pub mod shell;
pub mod templates;
pub mod tracing_init;
pub mod tunnel;
pub mod validate;
pub mod workflow;

pub use error::{Error, Result};
