use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType};

use crate::error::Error;
use crate::gateway::RemoteTunnel;
use crate::tunnel::{ServiceState, Tunnel};

/// Clear the terminal and home the cursor.
pub fn clear(out: &mut impl Write) -> io::Result<()> {
    crossterm::execute!(out, Clear(ClearType::All), MoveTo(0, 0))
}

pub fn header(out: &mut impl Write, title: &str) -> io::Result<()> {
    let bar = "─".repeat(title.chars().count() + 4);
    writeln!(out, "{}", bar.as_str().dark_grey())?;
    writeln!(out, "  {}", title.bold())?;
    writeln!(out, "{}", bar.as_str().dark_grey())
}

pub fn success(out: &mut impl Write, msg: &str) -> io::Result<()> {
    writeln!(out, "{}", msg.green())
}

pub fn warning(out: &mut impl Write, msg: &str) -> io::Result<()> {
    writeln!(out, "{}", msg.yellow())
}

pub fn error(out: &mut impl Write, err: &Error) -> io::Result<()> {
    writeln!(out, "{} {err}", "Error:".red().bold())
}

pub fn service_state(state: ServiceState) -> String {
    match state {
        ServiceState::Active => format!("{}", "● active".green()),
        ServiceState::Inactive => format!("{}", "● inactive".red()),
        ServiceState::Unknown => format!("{}", "● unknown".yellow()),
    }
}

/// Known tunnels with their live service state.
pub fn tunnel_table(out: &mut impl Write, rows: &[(Tunnel, ServiceState)]) -> io::Result<()> {
    if rows.is_empty() {
        return warning(out, "No tunnels found.");
    }
    let name_w = column_width("NAME", rows.iter().map(|(t, _)| t.name.as_str()));
    let host_w = column_width(
        "HOSTNAME",
        rows.iter()
            .map(|(t, _)| t.dns_hostname.as_deref().unwrap_or("-")),
    );
    writeln!(
        out,
        "{}",
        format!("{:name_w$}  {:host_w$}  {:10}  SERVICE", "NAME", "HOSTNAME", "STATUS").bold()
    )?;
    for (tunnel, state) in rows {
        // Pad before styling so escape codes do not skew the columns.
        let status = format!("{:10}", state.to_string());
        let status = match state {
            ServiceState::Active => status.green(),
            ServiceState::Inactive => status.red(),
            ServiceState::Unknown => status.yellow(),
        };
        let name = format!("{:name_w$}", tunnel.name);
        writeln!(
            out,
            "{}  {:host_w$}  {status}  {}",
            name.cyan(),
            tunnel.dns_hostname.as_deref().unwrap_or("-"),
            tunnel.local_service_url.as_deref().unwrap_or("-"),
        )?;
    }
    Ok(())
}

/// Tunnels registered with the daemon account; `*` marks local artifacts.
pub fn remote_table(
    out: &mut impl Write,
    remote: &[RemoteTunnel],
    is_local: impl Fn(&str) -> bool,
) -> io::Result<()> {
    if remote.is_empty() {
        return warning(out, "No tunnels registered with Cloudflare.");
    }
    let name_w = column_width("NAME", remote.iter().map(|t| t.name.as_str()));
    writeln!(
        out,
        "{}",
        format!("  {:name_w$}  {:36}  CONNECTIONS", "NAME", "ID").bold()
    )?;
    for tunnel in remote {
        let marker = if is_local(&tunnel.name) { "*" } else { " " };
        writeln!(
            out,
            "{marker} {:name_w$}  {:36}  {}",
            tunnel.name,
            tunnel.id,
            tunnel.connections.len()
        )?;
    }
    writeln!(out)?;
    writeln!(out, "{}", "* managed from this machine".dark_grey())
}

fn column_width<'a>(title: &str, values: impl Iterator<Item = &'a str>) -> usize {
    values
        .map(|v| v.chars().count())
        .max()
        .unwrap_or(0)
        .max(title.len())
}
