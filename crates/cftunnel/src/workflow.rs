//! Multi-step tunnel operations sequenced over the gateway and artifacts.
//!
//! Partial-failure policy for [`create_tunnel`]:
//! - daemon create fails: nothing was written, error returned (a create that
//!   printed no tunnel id is deleted again by the gateway);
//! - artifact write fails: the daemon tunnel is deleted (best-effort), error returned;
//! - DNS route or service install/enable fails: artifacts and the daemon
//!   tunnel are kept and the failure is reported in [`CreateReport`].

use std::fs;
use std::path::{Path, PathBuf};

use crate::artifacts::{TunnelSpec, create_artifacts, remove_artifacts};
use crate::cmd::CommandRunner;
use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::settings::{Settings, SettingsStore};
use crate::tunnel::{ArtifactPaths, ServiceState, Tunnel, unit_name};
use crate::validate;

/// User input for a new tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    pub dns_hostname: String,
    pub local_service_url: String,
}

impl CreateRequest {
    pub fn validate(&self) -> Result<()> {
        validate::tunnel_name(&self.name)?;
        validate::dns_hostname(&self.dns_hostname)?;
        validate::service_url(&self.local_service_url)
    }
}

/// Outcome of the service step of tunnel creation.
#[derive(Debug)]
pub enum ServiceOutcome {
    Enabled,
    /// Artifacts are in place but the unit could not be installed or started.
    Failed {
        error: Error,
        manual_commands: Vec<String>,
    },
}

/// What [`create_tunnel`] did.
#[derive(Debug)]
pub struct CreateReport {
    pub tunnel_id: String,
    pub paths: ArtifactPaths,
    pub unit: String,
    pub service: ServiceOutcome,
    /// Non-fatal problems (e.g. DNS route already present).
    pub warnings: Vec<String>,
}

/// What [`delete_tunnel`] did.
#[derive(Debug, Default)]
pub struct DeleteReport {
    pub removed: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Fail with [`Error::AlreadyExists`] if any artifact for `name` exists.
pub fn ensure_unique(name: &str, config_directory: &Path) -> Result<()> {
    if ArtifactPaths::new(name, config_directory).existing().is_empty() {
        Ok(())
    } else {
        Err(Error::AlreadyExists(name.to_string()))
    }
}

/// Create the daemon tunnel, write artifacts, route DNS and enable the service.
pub fn create_tunnel<R: CommandRunner>(
    gateway: &Gateway<R>,
    config_directory: &Path,
    request: &CreateRequest,
    run_as: Option<String>,
) -> Result<CreateReport> {
    request.validate()?;
    ensure_unique(&request.name, config_directory)?;

    let created = gateway.daemon_create_tunnel(&request.name)?;

    let spec = TunnelSpec {
        name: request.name.clone(),
        dns_hostname: request.dns_hostname.clone(),
        local_service_url: request.local_service_url.clone(),
        tunnel_id: created.id.clone(),
        credentials_file: created.credentials_file,
        daemon_binary: gateway.daemon_binary().to_path_buf(),
        run_as,
    };

    let paths = match create_artifacts(&spec, config_directory) {
        Ok(paths) => paths,
        Err(e) => {
            tracing::warn!("artifact write failed, rolling back tunnel {}", request.name);
            if let Err(del) = gateway.daemon_delete_tunnel(&request.name) {
                tracing::warn!("rollback of tunnel {} failed: {del}", request.name);
            }
            return Err(e);
        }
    };

    let mut warnings = Vec::new();
    if let Err(e) = gateway.daemon_route_dns(&request.name, &request.dns_hostname) {
        warnings.push(format!("DNS route for {} not created: {e}", request.dns_hostname));
    }

    let unit = unit_name(&request.name);
    let service = match gateway
        .service_install(&paths.unit)
        .and_then(|()| gateway.service_enable(&unit))
    {
        Ok(()) => ServiceOutcome::Enabled,
        Err(error) => {
            tracing::warn!("service setup for {unit} failed; artifacts kept");
            ServiceOutcome::Failed {
                manual_commands: gateway.manual_install_commands(&paths.unit, &unit),
                error,
            }
        }
    };

    Ok(CreateReport {
        tunnel_id: created.id,
        paths,
        unit,
        service,
        warnings,
    })
}

/// Stop the service, delete the daemon tunnel and remove artifacts, in that order.
///
/// Returns [`Error::NotFound`] without side effects when no artifacts exist.
/// A disable failure aborts only while the unit is still active; the daemon
/// delete is best-effort.
pub fn delete_tunnel<R: CommandRunner>(
    gateway: &Gateway<R>,
    config_directory: &Path,
    name: &str,
) -> Result<DeleteReport> {
    if ArtifactPaths::new(name, config_directory).existing().is_empty() {
        return Err(Error::NotFound(name.to_string()));
    }

    let mut report = DeleteReport::default();
    let unit = unit_name(name);

    if let Err(e) = gateway.service_disable(&unit) {
        if gateway.service_status(&unit).is_active() {
            return Err(e);
        }
        report
            .warnings
            .push(format!("{unit} was not disabled (already inactive): {e}"));
    }
    if let Err(e) = gateway.service_reload() {
        report.warnings.push(format!("daemon-reload failed: {e}"));
    }

    if let Err(e) = gateway.daemon_delete_tunnel(name) {
        report.warnings.push(format!(
            "could not delete tunnel from Cloudflare (it may already be gone): {e}"
        ));
    }

    report.removed = remove_artifacts(name, config_directory)?;
    Ok(report)
}

/// Deactivate an active service, otherwise (re)install and activate it.
///
/// Returns the state observed afterwards.
pub fn toggle_service<R: CommandRunner>(
    gateway: &Gateway<R>,
    tunnel: &Tunnel,
) -> Result<ServiceState> {
    let unit = tunnel.service_unit_name();
    if gateway.service_status(&unit).is_active() {
        gateway.service_disable(&unit)?;
    } else {
        gateway.service_install(&tunnel.paths.unit)?;
        gateway.service_enable(&unit)?;
    }
    Ok(gateway.service_status(&unit))
}

/// Point the app at a new artifacts directory, creating it, and persist the change.
pub fn change_config_directory(
    store: &SettingsStore,
    settings: &mut Settings,
    new_dir: PathBuf,
) -> Result<()> {
    if new_dir.as_os_str().is_empty() {
        return Err(Error::validation("directory must not be empty"));
    }
    fs::create_dir_all(&new_dir)?;
    let updated = Settings {
        config_directory: new_dir,
    };
    store.save(&updated)?;
    *settings = updated;
    Ok(())
}
