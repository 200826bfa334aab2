use std::path::Path;

use crate::artifacts::TunnelSpec;

/// Generate the cloudflared config file with a single ingress rule.
pub fn daemon_config(spec: &TunnelSpec) -> String {
    format!(
        r"tunnel: {id}
credentials-file: {creds}
ingress:
  - hostname: {hostname}
    service: {service}
  - service: http_status:404
",
        id = spec.tunnel_id,
        creds = spec.credentials_file.display(),
        hostname = spec.dns_hostname,
        service = spec.local_service_url,
    )
}

/// Generate the start script that runs the tunnel with its config.
pub fn start_script(daemon_binary: &Path, config_path: &Path) -> String {
    format!(
        r"#!/bin/sh
exec {binary} tunnel --no-autoupdate --config {config} run
",
        binary = shell_quote(daemon_binary),
        config = shell_quote(config_path),
    )
}

/// Generate the systemd unit supervising the start script.
pub fn systemd_unit(spec: &TunnelSpec, script_path: &Path) -> String {
    let user_line = spec
        .run_as
        .as_deref()
        .map(|u| format!("User={u}\n"))
        .unwrap_or_default();
    format!(
        r"[Unit]
Description=Cloudflare Tunnel for {name}
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
{user_line}ExecStart={script}
Restart=always
RestartSec=5

[Install]
WantedBy=multi-user.target
",
        name = spec.name,
        script = systemd_quote(script_path),
    )
}

/// Single-quote a path for `sh`; nothing inside single quotes is expanded.
fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

/// Quote a path as one `ExecStart=` word. `%` and `$` are escaped so systemd
/// does not treat them as specifiers or variables.
fn systemd_quote(path: &Path) -> String {
    let mut quoted = String::from('"');
    for c in path.display().to_string().chars() {
        match c {
            '"' | '\\' => {
                quoted.push('\\');
                quoted.push(c);
            }
            '%' => quoted.push_str("%%"),
            '$' => quoted.push_str("$$"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
