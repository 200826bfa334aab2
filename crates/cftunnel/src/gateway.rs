//! Typed operations over the tunnel daemon and the service manager.
//!
//! Every method is a blocking call through a [`CommandRunner`]. Non-zero exits
//! become [`Error::Process`] carrying the command line, exit code and stderr.
//! Nothing is retried.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cmd::{CommandOutput, CommandRunner, StdioMode, command_line};
use crate::error::{Error, Result};
use crate::tunnel::ServiceState;

/// Tunnel registered with the daemon by `tunnel create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTunnel {
    pub id: String,
    pub credentials_file: PathBuf,
}

/// Tunnel as reported by `cloudflared tunnel list --output json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteTunnel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub connections: Vec<serde_json::Value>,
}

/// Thin typed wrapper around a [`CommandRunner`].
#[derive(Debug)]
pub struct Gateway<R> {
    runner: R,
}

impl<R: CommandRunner> Gateway<R> {
    pub const fn new(runner: R) -> Self {
        Self { runner }
    }

    pub const fn runner(&self) -> &R {
        &self.runner
    }

    pub fn daemon_binary(&self) -> &Path {
        self.runner.daemon_binary()
    }

    // -----------------------------------------------------------------------
    // Tunnel daemon
    // -----------------------------------------------------------------------

    /// `cloudflared tunnel create <name>`; returns the new tunnel's id.
    pub fn daemon_create_tunnel(&self, name: &str) -> Result<CreatedTunnel> {
        tracing::info!("creating tunnel {name}");
        let out = self.daemon(&["tunnel", "create", name], StdioMode::Capture)?;

        // cloudflared logs the credentials line on stderr and the id on stdout.
        let combined = format!("{}\n{}", out.stdout, out.stderr);
        let Some(id) = parse_tunnel_id(&combined) else {
            // The tunnel exists remotely but is unusable without its id.
            tracing::warn!("no tunnel id in create output, rolling back tunnel {name}");
            if let Err(e) = self.daemon_delete_tunnel(name) {
                tracing::warn!("rollback of tunnel {name} failed: {e}");
            }
            return Err(Error::Process {
                command: command_line("cloudflared", &["tunnel", "create", name]),
                exit_code: out.exit_code,
                stderr: format!("could not parse tunnel id from output:\n{}", combined.trim()),
            });
        };
        let credentials_file =
            parse_credentials_path(&combined).unwrap_or_else(|| default_credentials_path(&id));

        tracing::info!("created tunnel {name} ({id})");
        Ok(CreatedTunnel {
            id,
            credentials_file,
        })
    }

    /// `cloudflared tunnel delete <name>`.
    pub fn daemon_delete_tunnel(&self, name: &str) -> Result<()> {
        tracing::info!("deleting tunnel {name}");
        self.daemon(&["tunnel", "delete", name], StdioMode::Capture)?;
        Ok(())
    }

    /// `cloudflared tunnel route dns <name> <hostname>`.
    pub fn daemon_route_dns(&self, name: &str, hostname: &str) -> Result<()> {
        tracing::info!("routing {hostname} to tunnel {name}");
        self.daemon(&["tunnel", "route", "dns", name, hostname], StdioMode::Capture)?;
        Ok(())
    }

    /// `cloudflared tunnel login`; interactive, blocks until the browser flow ends.
    pub fn daemon_login(&self) -> Result<()> {
        tracing::info!("starting cloudflared login");
        self.daemon(&["tunnel", "login"], StdioMode::Inherit)?;
        Ok(())
    }

    /// Tunnels registered with the daemon's account.
    pub fn daemon_list_tunnels(&self) -> Result<Vec<RemoteTunnel>> {
        tracing::info!("listing tunnels registered with cloudflared");
        let out = self.daemon(&["tunnel", "list", "--output", "json"], StdioMode::Capture)?;
        let mut tunnels: Vec<RemoteTunnel> = if out.stdout.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&out.stdout)?
        };
        tunnels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tunnels)
    }

    // -----------------------------------------------------------------------
    // Service manager
    // -----------------------------------------------------------------------

    /// Register a unit file kept outside the systemd search path, then reload.
    pub fn service_install(&self, unit_path: &Path) -> Result<()> {
        tracing::info!("linking unit {}", unit_path.display());
        let path = unit_path.to_string_lossy();
        self.service(&["link", &path])?;
        self.service_reload()
    }

    /// `systemctl daemon-reload`.
    pub fn service_reload(&self) -> Result<()> {
        tracing::info!("reloading systemd units");
        self.service(&["daemon-reload"])?;
        Ok(())
    }

    /// `systemctl enable --now <unit>`: start now and on boot.
    pub fn service_enable(&self, unit: &str) -> Result<()> {
        tracing::info!("enabling and starting {unit}");
        self.service(&["enable", "--now", unit])?;
        Ok(())
    }

    /// `systemctl disable --now <unit>`: stop now and drop from boot.
    pub fn service_disable(&self, unit: &str) -> Result<()> {
        tracing::info!("disabling and stopping {unit}");
        self.service(&["disable", "--now", unit])?;
        Ok(())
    }

    /// `systemctl is-active <unit>`. Never fails; errors map to `Unknown`.
    pub fn service_status(&self, unit: &str) -> ServiceState {
        match self.runner.run_service_command(&["is-active", unit]) {
            // is-active exits non-zero for inactive units; stdout carries the state.
            Ok(out) => ServiceState::from_is_active(&out.stdout),
            Err(e) => {
                tracing::warn!("could not query {unit}: {e}");
                ServiceState::Unknown
            }
        }
    }

    /// Commands a user can run by hand to finish installing a unit.
    pub fn manual_install_commands(&self, unit_path: &Path, unit: &str) -> Vec<String> {
        let program = self.runner.service_program();
        let sudo = if program.starts_with("sudo ") { "" } else { "sudo " };
        vec![
            format!("{sudo}{program} link {}", unit_path.display()),
            format!("{sudo}{program} daemon-reload"),
            format!("{sudo}{program} enable --now {unit}"),
        ]
    }

    fn daemon(&self, args: &[&str], stdio: StdioMode) -> Result<CommandOutput> {
        let out = self.runner.run_daemon_command(args, stdio)?;
        check(out, || command_line("cloudflared", args))
    }

    fn service(&self, args: &[&str]) -> Result<CommandOutput> {
        let out = self.runner.run_service_command(args)?;
        check(out, || command_line(&self.runner.service_program(), args))
    }
}

fn check(out: CommandOutput, cmd_line: impl FnOnce() -> String) -> Result<CommandOutput> {
    if out.is_success() {
        return Ok(out);
    }
    let command = cmd_line();
    let stderr = out.stderr.trim().to_string();
    tracing::error!("command failed: {command}\nstderr: {stderr}");
    Err(Error::Process {
        command,
        exit_code: out.exit_code,
        stderr,
    })
}

/// Extract the id from `Created tunnel <name> with id <uuid>`.
pub fn parse_tunnel_id(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (_, rest) = line.split_once("with id ")?;
        let candidate = rest.split_whitespace().next()?;
        uuid::Uuid::parse_str(candidate)
            .ok()
            .map(|u| u.hyphenated().to_string())
    })
}

/// Extract the path from `Tunnel credentials written to <path>.`
pub fn parse_credentials_path(output: &str) -> Option<PathBuf> {
    output.lines().find_map(|line| {
        let (_, rest) = line.split_once("credentials written to ")?;
        let end = rest.find(".json")? + ".json".len();
        Some(PathBuf::from(&rest[..end]))
    })
}

/// `~/.cloudflared/<id>.json`, where cloudflared writes credentials by default.
fn default_credentials_path(id: &str) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".cloudflared")
        .join(format!("{id}.json"))
}

#[cfg(test)]
pub(crate) mod fake {
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    use crate::cmd::{CommandOutput, CommandRunner, StdioMode};
    use crate::error::Result;

    pub const CREATE_STDOUT: &str =
        "Created tunnel demo with id 6ff42ae2-765d-4adf-8112-31c55c1551ef\n";
    pub const CREATE_STDERR: &str = "2024-01-01T00:00:00Z INF Tunnel credentials written to \
         /home/alice/.cloudflared/6ff42ae2-765d-4adf-8112-31c55c1551ef.json. cloudflared chose \
         this file based on where your origin certificate was found.\n";

    /// Records every invocation; responses are scripted by command prefix.
    #[derive(Debug, Default)]
    pub struct RecordingRunner {
        pub calls: RefCell<Vec<String>>,
        scripted: Vec<(String, CommandOutput)>,
        daemon: PathBuf,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            Self {
                daemon: PathBuf::from("/usr/local/bin/cloudflared"),
                ..Self::default()
            }
        }

        /// Respond with `output` to any call whose line starts with `prefix`.
        pub fn on(mut self, prefix: &str, output: CommandOutput) -> Self {
            self.scripted.push((prefix.to_string(), output));
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        pub fn called(&self, prefix: &str) -> bool {
            self.calls.borrow().iter().any(|c| c.starts_with(prefix))
        }

        fn respond(&self, line: String) -> CommandOutput {
            let scripted = self
                .scripted
                .iter()
                .find(|(prefix, _)| line.starts_with(prefix.as_str()))
                .map(|(_, out)| out.clone());
            let out = scripted.unwrap_or_else(|| {
                if line.starts_with("cloudflared tunnel create ") {
                    CommandOutput {
                        exit_code: Some(0),
                        stdout: CREATE_STDOUT.into(),
                        stderr: CREATE_STDERR.into(),
                    }
                } else if line.starts_with("systemctl is-active") {
                    CommandOutput {
                        exit_code: Some(3),
                        stdout: "inactive\n".into(),
                        stderr: String::new(),
                    }
                } else {
                    CommandOutput::success("")
                }
            });
            self.calls.borrow_mut().push(line);
            out
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run_daemon_command(&self, args: &[&str], _stdio: StdioMode) -> Result<CommandOutput> {
            Ok(self.respond(format!("cloudflared {}", args.join(" "))))
        }

        fn run_service_command(&self, args: &[&str]) -> Result<CommandOutput> {
            Ok(self.respond(format!("systemctl {}", args.join(" "))))
        }

        fn daemon_binary(&self) -> &Path {
            &self.daemon
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::fake::{CREATE_STDERR, CREATE_STDOUT, RecordingRunner};
    use super::*;

    #[test]
    fn parses_tunnel_id() {
        assert_eq!(
            parse_tunnel_id(CREATE_STDOUT).as_deref(),
            Some("6ff42ae2-765d-4adf-8112-31c55c1551ef")
        );
    }

    #[test]
    fn tunnel_id_must_be_a_uuid() {
        assert_eq!(parse_tunnel_id("Created tunnel demo with id nope"), None);
        assert_eq!(parse_tunnel_id(""), None);
    }

    #[test]
    fn parses_credentials_path() {
        assert_eq!(
            parse_credentials_path(CREATE_STDERR),
            Some(PathBuf::from(
                "/home/alice/.cloudflared/6ff42ae2-765d-4adf-8112-31c55c1551ef.json"
            ))
        );
        assert_eq!(parse_credentials_path("nothing here"), None);
    }

    #[test]
    fn create_tunnel_returns_id_and_credentials() {
        let gw = Gateway::new(RecordingRunner::new());
        let created = gw.daemon_create_tunnel("demo").expect("create");
        assert_eq!(created.id, "6ff42ae2-765d-4adf-8112-31c55c1551ef");
        assert!(created.credentials_file.ends_with(
            ".cloudflared/6ff42ae2-765d-4adf-8112-31c55c1551ef.json"
        ));
        assert_eq!(gw.runner().calls(), vec!["cloudflared tunnel create demo"]);
    }

    #[test]
    fn create_tunnel_falls_back_to_default_credentials_path() {
        let gw = Gateway::new(
            RecordingRunner::new().on("cloudflared tunnel create", CommandOutput::success(CREATE_STDOUT)),
        );
        let created = gw.daemon_create_tunnel("demo").expect("create");
        assert!(created.credentials_file.ends_with(
            ".cloudflared/6ff42ae2-765d-4adf-8112-31c55c1551ef.json"
        ));
    }

    #[test]
    fn create_tunnel_failure_surfaces_stderr() {
        let gw = Gateway::new(RecordingRunner::new().on(
            "cloudflared tunnel create",
            CommandOutput::failure(1, "Cannot determine default origin certificate path\n"),
        ));
        let err = gw.daemon_create_tunnel("demo").expect_err("should fail");
        match err {
            Error::Process {
                command,
                exit_code,
                stderr,
            } => {
                assert_eq!(command, "cloudflared tunnel create demo");
                assert_eq!(exit_code, Some(1));
                assert_eq!(stderr, "Cannot determine default origin certificate path");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unparseable_create_output_is_a_process_error() {
        let gw = Gateway::new(
            RecordingRunner::new().on("cloudflared tunnel create", CommandOutput::success("ok")),
        );
        assert!(gw.daemon_create_tunnel("demo").expect_err("fail").is_process());
    }

    #[test]
    fn unparseable_create_output_deletes_the_new_tunnel() {
        let gw = Gateway::new(RecordingRunner::new().on(
            "cloudflared tunnel create",
            CommandOutput::success("Created tunnel demo\n"),
        ));
        let err = gw.daemon_create_tunnel("demo").expect_err("fail");
        assert!(err.to_string().contains("could not parse tunnel id"));
        assert_eq!(
            gw.runner().calls(),
            vec!["cloudflared tunnel create demo", "cloudflared tunnel delete demo"]
        );
    }

    #[test]
    fn failed_create_is_not_rolled_back() {
        let gw = Gateway::new(RecordingRunner::new().on(
            "cloudflared tunnel create",
            CommandOutput::failure(1, "tunnel with name already exists"),
        ));
        gw.daemon_create_tunnel("demo").expect_err("fail");
        assert!(!gw.runner().called("cloudflared tunnel delete"));
    }

    #[test]
    fn service_enable_uses_enable_now() {
        let gw = Gateway::new(RecordingRunner::new());
        gw.service_enable("cloudflare-tunnel-demo.service").expect("enable");
        assert_eq!(
            gw.runner().calls(),
            vec!["systemctl enable --now cloudflare-tunnel-demo.service"]
        );
    }

    #[test]
    fn service_disable_failure_is_process_error() {
        let gw = Gateway::new(RecordingRunner::new().on(
            "systemctl disable",
            CommandOutput::failure(1, "Failed to disable unit: Access denied"),
        ));
        let err = gw.service_disable("x.service").expect_err("should fail");
        assert!(err.to_string().contains("Access denied"));
    }

    #[test]
    fn service_install_links_then_reloads() {
        let gw = Gateway::new(RecordingRunner::new());
        gw.service_install(Path::new("/srv/t/cloudflare-tunnel-demo.service"))
            .expect("install");
        assert_eq!(
            gw.runner().calls(),
            vec![
                "systemctl link /srv/t/cloudflare-tunnel-demo.service",
                "systemctl daemon-reload",
            ]
        );
    }

    #[test]
    fn service_status_reads_stdout_despite_nonzero_exit() {
        let gw = Gateway::new(RecordingRunner::new());
        assert_eq!(gw.service_status("x.service"), ServiceState::Inactive);

        let gw = Gateway::new(
            RecordingRunner::new().on("systemctl is-active", CommandOutput::success("active\n")),
        );
        assert_eq!(gw.service_status("x.service"), ServiceState::Active);
    }

    #[test]
    fn list_tunnels_parses_json_sorted_by_name() {
        let json = r#"[
            {"id":"b1","name":"zeta","created_at":"2024-01-01T00:00:00Z","deleted_at":"0001-01-01T00:00:00Z","connections":[]},
            {"id":"a1","name":"alpha","connections":[{"colo_name":"ams01"}]}
        ]"#;
        let gw = Gateway::new(
            RecordingRunner::new().on("cloudflared tunnel list", CommandOutput::success(json)),
        );
        let tunnels = gw.daemon_list_tunnels().expect("list");
        assert_eq!(tunnels.len(), 2);
        assert_eq!(tunnels[0].name, "alpha");
        assert_eq!(tunnels[0].connections.len(), 1);
        assert_eq!(tunnels[1].created_at.as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn list_tunnels_handles_empty_output() {
        let gw = Gateway::new(RecordingRunner::new());
        assert!(gw.daemon_list_tunnels().expect("list").is_empty());
    }

    #[test]
    fn manual_commands_use_sudo() {
        let gw = Gateway::new(RecordingRunner::new());
        let cmds = gw.manual_install_commands(
            Path::new("/srv/t/cloudflare-tunnel-demo.service"),
            "cloudflare-tunnel-demo.service",
        );
        assert_eq!(cmds[0], "sudo systemctl link /srv/t/cloudflare-tunnel-demo.service");
        assert_eq!(cmds[2], "sudo systemctl enable --now cloudflare-tunnel-demo.service");
    }
}
