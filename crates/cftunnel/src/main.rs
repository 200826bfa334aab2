use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use cftunnel::cmd::{self, SystemRunner};
use cftunnel::gateway::Gateway;
use cftunnel::prompt::TerminalPrompter;
use cftunnel::settings::{SettingsStore, default_settings_path};
use cftunnel::shell::Shell;
use cftunnel::{privilege, tracing_init};

/// Manage Cloudflare tunnels and their systemd services.
#[derive(Debug, Parser)]
#[command(name = "cftunnel", version, about)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, env = "CFTUNNEL_SETTINGS")]
    settings: Option<PathBuf>,

    /// Prefix systemctl calls with sudo
    #[arg(long)]
    sudo: bool,

    /// Path to the cloudflared binary (looked up on PATH by default)
    #[arg(long, value_name = "PATH")]
    cloudflared: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    log_json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_init::init_tracing("cftunnel=warn", cli.log_json);

    let daemon = cmd::locate_binary(cli.cloudflared.as_deref(), "cloudflared")
        .context("cloudflared is required; install it or pass --cloudflared")?;
    let systemctl = cmd::resolve_binary("systemctl").context("systemctl is required")?;
    privilege::warn_if_unprivileged(cli.sudo);

    let store = SettingsStore::new(cli.settings.unwrap_or_else(default_settings_path));
    let settings = store.load();
    tracing::info!(
        "tunnel config directory: {}",
        settings.config_directory.display()
    );

    let gateway = Gateway::new(SystemRunner::new(daemon, systemctl, cli.sudo));
    let mut shell = Shell::new(gateway, store, settings, TerminalPrompter, io::stdout())
        .with_service_user(privilege::service_user())
        .with_clear_screen(true);
    shell.run()?;
    Ok(())
}
