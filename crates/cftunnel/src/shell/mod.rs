//! Interactive menu.
//!
//! A linear state machine over [`Screen`]s. Every screen blocks on user input,
//! performs at most one workflow, reports the outcome and returns the next
//! screen. Operation failures are printed and never end the session; only a
//! failing terminal (prompt or write error) does.

mod render;

use std::io::Write;
use std::path::PathBuf;

use crossterm::style::Stylize;

use crate::cmd::CommandRunner;
use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::prompt::Prompter;
use crate::registry::{self, TunnelDescription};
use crate::settings::{Settings, SettingsStore};
use crate::tunnel::{ServiceState, Tunnel};
use crate::validate;
use crate::workflow::{self, CreateReport, CreateRequest, ServiceOutcome};

/// Shell states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    MainMenu,
    ListTunnels,
    CreateTunnel,
    TunnelDetail(String),
    Settings,
    Exit,
}

const MAIN_ITEMS: [&str; 4] = ["List tunnels", "Create a new tunnel", "Settings", "Exit"];
const SETTINGS_ITEMS: [&str; 4] = [
    "Change tunnel config directory",
    "Cloudflare login",
    "Show tunnels registered with Cloudflare",
    "Back",
];

/// The interactive session: owns settings, gateway, prompter and output.
pub struct Shell<R, P, W> {
    gateway: Gateway<R>,
    store: SettingsStore,
    settings: Settings,
    prompter: P,
    out: W,
    run_as: Option<String>,
    clear_screen: bool,
}

impl<R: CommandRunner, P: Prompter, W: Write> Shell<R, P, W> {
    pub fn new(
        gateway: Gateway<R>,
        store: SettingsStore,
        settings: Settings,
        prompter: P,
        out: W,
    ) -> Self {
        Self {
            gateway,
            store,
            settings,
            prompter,
            out,
            run_as: None,
            clear_screen: false,
        }
    }

    /// User the generated systemd units run as.
    #[must_use]
    pub fn with_service_user(mut self, user: Option<String>) -> Self {
        self.run_as = user;
        self
    }

    /// Clear the terminal before each screen.
    #[must_use]
    pub const fn with_clear_screen(mut self, clear: bool) -> Self {
        self.clear_screen = clear;
        self
    }

    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    pub const fn gateway(&self) -> &Gateway<R> {
        &self.gateway
    }

    pub const fn output(&self) -> &W {
        &self.out
    }

    /// Run until the user exits.
    pub fn run(&mut self) -> Result<()> {
        let mut screen = Screen::MainMenu;
        while screen != Screen::Exit {
            tracing::debug!("screen: {screen:?}");
            screen = self.step(screen)?;
        }
        self.out.flush()?;
        Ok(())
    }

    /// Render one screen and return the next.
    pub fn step(&mut self, screen: Screen) -> Result<Screen> {
        if self.clear_screen {
            render::clear(&mut self.out)?;
        }
        match screen {
            Screen::MainMenu => self.main_menu(),
            Screen::ListTunnels => self.list_tunnels(),
            Screen::CreateTunnel => self.create_tunnel(),
            Screen::TunnelDetail(name) => self.tunnel_detail(&name),
            Screen::Settings => self.settings_menu(),
            Screen::Exit => Ok(Screen::Exit),
        }
    }

    // -----------------------------------------------------------------------
    // Screens
    // -----------------------------------------------------------------------

    fn main_menu(&mut self) -> Result<Screen> {
        render::header(&mut self.out, "Cloudflare Tunnel Manager")?;
        match self.known_tunnels() {
            Ok(tunnels) => {
                let rows: Vec<(Tunnel, ServiceState)> = tunnels
                    .into_iter()
                    .map(|t| {
                        let state = self.gateway.service_status(&t.service_unit_name());
                        (t, state)
                    })
                    .collect();
                render::tunnel_table(&mut self.out, &rows)?;
            }
            Err(e) => render::error(&mut self.out, &e)?,
        }
        writeln!(self.out)?;

        let next = match self.prompter.select("Options", &to_items(&MAIN_ITEMS))? {
            Some(0) => Screen::ListTunnels,
            Some(1) => Screen::CreateTunnel,
            Some(2) => Screen::Settings,
            _ => Screen::Exit,
        };
        Ok(next)
    }

    fn list_tunnels(&mut self) -> Result<Screen> {
        render::header(&mut self.out, "Tunnels")?;
        let tunnels = match self.known_tunnels() {
            Ok(t) => t,
            Err(e) => {
                render::error(&mut self.out, &e)?;
                self.prompter.pause()?;
                return Ok(Screen::MainMenu);
            }
        };
        if tunnels.is_empty() {
            render::warning(&mut self.out, "No tunnels found.")?;
            self.prompter.pause()?;
            return Ok(Screen::MainMenu);
        }

        let mut items: Vec<String> = tunnels.iter().map(|t| t.name.clone()).collect();
        items.push("Back".to_string());
        match self.prompter.select("Select a tunnel", &items)? {
            Some(i) if i < tunnels.len() => Ok(Screen::TunnelDetail(tunnels[i].name.clone())),
            _ => Ok(Screen::MainMenu),
        }
    }

    fn tunnel_detail(&mut self, name: &str) -> Result<Screen> {
        let tunnel = match registry::find_tunnel(name, &self.settings.config_directory) {
            Ok(t) => t,
            Err(e) => {
                render::error(&mut self.out, &e)?;
                self.prompter.pause()?;
                return Ok(Screen::ListTunnels);
            }
        };
        let description = match registry::describe(&tunnel, &self.gateway) {
            Ok(d) => d,
            Err(e) => {
                render::error(&mut self.out, &e)?;
                self.prompter.pause()?;
                return Ok(Screen::ListTunnels);
            }
        };

        render::header(&mut self.out, &format!("Managing tunnel: {name}"))?;
        self.print_detail(&tunnel, &description)?;

        let toggle = if description.service_state.is_active() {
            "Deactivate service"
        } else {
            "Activate service"
        };
        let items = to_items(&["View config", toggle, "Delete tunnel", "Back"]);
        let here = Screen::TunnelDetail(name.to_string());
        match self.prompter.select("Actions", &items)? {
            Some(0) => {
                writeln!(self.out)?;
                writeln!(self.out, "{}", description.config_contents.trim_end())?;
                self.prompter.pause()?;
                Ok(here)
            }
            Some(1) => {
                self.toggle_service(&tunnel)?;
                self.prompter.pause()?;
                Ok(here)
            }
            Some(2) => {
                let deleted = self.delete_tunnel(name)?;
                self.prompter.pause()?;
                Ok(if deleted { Screen::ListTunnels } else { here })
            }
            _ => Ok(Screen::ListTunnels),
        }
    }

    fn create_tunnel(&mut self) -> Result<Screen> {
        render::header(&mut self.out, "Create a new tunnel")?;
        writeln!(self.out, "{}", "Leave a field empty to cancel.".dark_grey())?;

        let dir = self.settings.config_directory.clone();
        let Some(name) = self.ask_until_valid("Tunnel name", |name| {
            validate::tunnel_name(name)?;
            workflow::ensure_unique(name, &dir)
        })?
        else {
            return self.cancelled();
        };
        let Some(dns_hostname) = self.ask_until_valid(
            "DNS hostname (e.g. myapp.example.com)",
            validate::dns_hostname,
        )?
        else {
            return self.cancelled();
        };
        let Some(local_service_url) = self.ask_until_valid(
            "Local service URL (e.g. http://localhost:8000)",
            validate::service_url,
        )?
        else {
            return self.cancelled();
        };

        let request = CreateRequest {
            name,
            dns_hostname,
            local_service_url,
        };
        writeln!(self.out, "Creating Cloudflare tunnel '{}'...", request.name)?;
        match workflow::create_tunnel(&self.gateway, &dir, &request, self.run_as.clone()) {
            Ok(report) => self.print_create_report(&report)?,
            Err(e) => render::error(&mut self.out, &e)?,
        }
        self.prompter.pause()?;
        Ok(Screen::MainMenu)
    }

    fn settings_menu(&mut self) -> Result<Screen> {
        render::header(&mut self.out, "Settings")?;
        writeln!(
            self.out,
            "Tunnel config directory: {}",
            self.settings.config_directory.display().to_string().cyan()
        )?;
        writeln!(
            self.out,
            "Settings file:           {}",
            self.store.path().display()
        )?;
        writeln!(self.out)?;

        match self.prompter.select("Settings", &to_items(&SETTINGS_ITEMS))? {
            Some(0) => self.change_directory()?,
            Some(1) => self.login()?,
            Some(2) => self.remote_tunnels()?,
            _ => return Ok(Screen::MainMenu),
        }
        self.prompter.pause()?;
        Ok(Screen::Settings)
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    fn toggle_service(&mut self, tunnel: &Tunnel) -> Result<()> {
        let unit = tunnel.service_unit_name();
        writeln!(self.out, "Updating service {unit}...")?;
        match workflow::toggle_service(&self.gateway, tunnel) {
            Ok(state) => {
                writeln!(self.out, "Service status: {}", render::service_state(state))?;
            }
            Err(e) => {
                render::error(&mut self.out, &e)?;
                if e.is_process() {
                    let cmds = self.gateway.manual_install_commands(&tunnel.paths.unit, &unit);
                    self.print_manual_commands(&cmds)?;
                }
            }
        }
        Ok(())
    }

    /// Returns whether the tunnel is gone afterwards.
    fn delete_tunnel(&mut self, name: &str) -> Result<bool> {
        let question = format!(
            "Delete tunnel '{name}'? This stops its service and removes all its files."
        );
        if !self.prompter.confirm(&question, false)? {
            render::warning(&mut self.out, "Deletion cancelled.")?;
            return Ok(false);
        }

        match workflow::delete_tunnel(&self.gateway, &self.settings.config_directory, name) {
            Ok(report) => {
                for warning in &report.warnings {
                    render::warning(&mut self.out, warning)?;
                }
                for path in &report.removed {
                    writeln!(self.out, "Removed {}", path.display())?;
                }
                render::success(&mut self.out, &format!("Tunnel '{name}' deleted."))?;
                Ok(true)
            }
            Err(e @ Error::NotFound(_)) => {
                render::error(&mut self.out, &e)?;
                Ok(true)
            }
            Err(e) => {
                render::error(&mut self.out, &e)?;
                Ok(false)
            }
        }
    }

    fn change_directory(&mut self) -> Result<()> {
        let current = self.settings.config_directory.display().to_string();
        let answer = self
            .prompter
            .input("New directory for tunnel configs", Some(&current))?;
        if answer.is_empty() || answer == current {
            render::warning(&mut self.out, "Directory unchanged.")?;
            return Ok(());
        }
        let new_dir = PathBuf::from(answer);
        match workflow::change_config_directory(&self.store, &mut self.settings, new_dir) {
            Ok(()) => render::success(
                &mut self.out,
                &format!(
                    "Tunnel config directory changed to {}",
                    self.settings.config_directory.display()
                ),
            )?,
            Err(e) => render::error(&mut self.out, &e)?,
        }
        Ok(())
    }

    fn login(&mut self) -> Result<()> {
        render::warning(&mut self.out, "Launching 'cloudflared tunnel login'...")?;
        self.out.flush()?;
        match self.gateway.daemon_login() {
            Ok(()) => render::success(&mut self.out, "Cloudflare login completed.")?,
            Err(e) => render::error(&mut self.out, &e)?,
        }
        Ok(())
    }

    fn remote_tunnels(&mut self) -> Result<()> {
        let remote = match self.gateway.daemon_list_tunnels() {
            Ok(r) => r,
            Err(e) => {
                render::error(&mut self.out, &e)?;
                return Ok(());
            }
        };
        let local: Vec<String> = self
            .known_tunnels()
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.name)
            .collect();
        render::remote_table(&mut self.out, &remote, |name| {
            local.iter().any(|l| l == name)
        })?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn known_tunnels(&self) -> Result<Vec<Tunnel>> {
        registry::list_known_tunnels(&self.settings.config_directory)
    }

    /// Prompt until `check` passes. `None` when the user leaves it empty.
    fn ask_until_valid(
        &mut self,
        prompt: &str,
        check: impl Fn(&str) -> Result<()>,
    ) -> Result<Option<String>> {
        loop {
            let answer = self.prompter.input(prompt, None)?;
            if answer.is_empty() {
                return Ok(None);
            }
            match check(&answer) {
                Ok(()) => return Ok(Some(answer)),
                Err(e) => render::error(&mut self.out, &e)?,
            }
        }
    }

    fn cancelled(&mut self) -> Result<Screen> {
        render::warning(&mut self.out, "Tunnel creation cancelled.")?;
        self.prompter.pause()?;
        Ok(Screen::MainMenu)
    }

    fn print_detail(&mut self, tunnel: &Tunnel, description: &TunnelDescription) -> Result<()> {
        let out = &mut self.out;
        writeln!(
            out,
            "Hostname:       {}",
            tunnel.dns_hostname.as_deref().unwrap_or("-")
        )?;
        writeln!(
            out,
            "Local service:  {}",
            tunnel.local_service_url.as_deref().unwrap_or("-")
        )?;
        writeln!(out, "Config file:    {}", tunnel.config_file_path().display())?;
        writeln!(out, "Service unit:   {}", tunnel.service_unit_name())?;
        writeln!(
            out,
            "Service status: {}",
            render::service_state(description.service_state)
        )?;
        writeln!(out)?;
        Ok(())
    }

    fn print_create_report(&mut self, report: &CreateReport) -> Result<()> {
        writeln!(self.out, "Tunnel id: {}", report.tunnel_id)?;
        for path in report.paths.all() {
            writeln!(self.out, "Created {}", path.display().to_string().cyan())?;
        }
        for warning in &report.warnings {
            render::warning(&mut self.out, warning)?;
        }
        match &report.service {
            ServiceOutcome::Enabled => {
                render::success(
                    &mut self.out,
                    &format!("Service {} enabled and started.", report.unit),
                )?;
            }
            ServiceOutcome::Failed {
                error,
                manual_commands,
            } => {
                render::error(&mut self.out, error)?;
                render::warning(
                    &mut self.out,
                    "The tunnel files were kept, but the service is not running.",
                )?;
                self.print_manual_commands(manual_commands)?;
            }
        }
        Ok(())
    }

    fn print_manual_commands(&mut self, commands: &[String]) -> Result<()> {
        writeln!(self.out, "Run these commands to finish the setup:")?;
        for cmd in commands {
            writeln!(self.out, "  {cmd}")?;
        }
        Ok(())
    }
}

fn to_items(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}
