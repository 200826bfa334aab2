use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

/// Whether a subprocess's output is captured or shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    /// Capture stdout/stderr for parsing and error reporting.
    Capture,
    /// Inherit the terminal; used for flows the user must see (browser login).
    Inherit,
}

/// Result of one subprocess invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// The two external tools the app drives.
///
/// Implementations run one blocking subprocess per call. A non-zero exit is
/// *not* an error at this level; callers inspect [`CommandOutput`].
pub trait CommandRunner {
    /// Run the tunnel daemon (`cloudflared`) with `args`.
    fn run_daemon_command(&self, args: &[&str], stdio: StdioMode) -> Result<CommandOutput>;

    /// Run the service manager (`systemctl`) with `args`.
    fn run_service_command(&self, args: &[&str]) -> Result<CommandOutput>;

    /// Absolute path of the daemon binary, baked into start scripts.
    fn daemon_binary(&self) -> &Path;

    /// Human-readable program prefix for service commands, e.g. `sudo systemctl`.
    fn service_program(&self) -> String {
        "systemctl".to_string()
    }
}

/// Runs the real binaries on this host.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    daemon: PathBuf,
    service: PathBuf,
    sudo: bool,
}

impl SystemRunner {
    /// `sudo` prefixes every service-manager call with `sudo`.
    pub const fn new(daemon: PathBuf, service: PathBuf, sudo: bool) -> Self {
        Self {
            daemon,
            service,
            sudo,
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run_daemon_command(&self, args: &[&str], stdio: StdioMode) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.daemon);
        cmd.args(args);
        execute(cmd, stdio)
    }

    fn run_service_command(&self, args: &[&str]) -> Result<CommandOutput> {
        let cmd = if self.sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg(&self.service).args(args);
            cmd
        } else {
            let mut cmd = Command::new(&self.service);
            cmd.args(args);
            cmd
        };
        execute(cmd, StdioMode::Capture)
    }

    fn daemon_binary(&self) -> &Path {
        &self.daemon
    }

    fn service_program(&self) -> String {
        if self.sudo {
            format!("sudo {}", self.service.display())
        } else {
            self.service.display().to_string()
        }
    }
}

/// Format a command line for logs and error messages.
pub fn command_line(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}

fn execute(mut cmd: Command, stdio: StdioMode) -> Result<CommandOutput> {
    let program = cmd.get_program().to_string_lossy().to_string();
    let args: Vec<String> = cmd
        .get_args()
        .map(|a| a.to_string_lossy().to_string())
        .collect();
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let cmd_line = command_line(&program, &arg_refs);
    tracing::debug!("exec: {cmd_line}");

    let spawn_err = |e: std::io::Error| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::MissingBinary(program.clone())
        } else {
            Error::Io(e)
        }
    };

    let output = match stdio {
        StdioMode::Capture => {
            let out = cmd.stdin(Stdio::null()).output().map_err(spawn_err)?;
            CommandOutput {
                exit_code: out.status.code(),
                stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            }
        }
        StdioMode::Inherit => {
            let status = cmd.status().map_err(spawn_err)?;
            CommandOutput {
                exit_code: status.code(),
                ..CommandOutput::default()
            }
        }
    };

    if !output.is_success() {
        tracing::debug!(
            "command exited with {:?}: {cmd_line}\nstderr: {}",
            output.exit_code,
            output.stderr.trim()
        );
    }
    Ok(output)
}

/// Resolve a program on `PATH` to its absolute location.
pub fn resolve_binary(program: &str) -> Result<PathBuf> {
    let output = Command::new("which")
        .arg(program)
        .output()
        .map_err(|_| Error::MissingBinary(program.to_string()))?;

    if !output.status.success() {
        return Err(Error::MissingBinary(program.to_string()));
    }
    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if path.is_empty() {
        return Err(Error::MissingBinary(program.to_string()));
    }
    tracing::debug!("resolved {program} -> {path}");
    Ok(PathBuf::from(path))
}

/// Resolve an explicitly provided binary path, or look the program up on `PATH`.
pub fn locate_binary(explicit: Option<&Path>, program: &str) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return std::fs::canonicalize(path)
            .map_err(|_| Error::MissingBinary(path.display().to_string()));
    }
    resolve_binary(program)
}
