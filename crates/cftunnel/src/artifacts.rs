//! Generation and removal of per-tunnel artifact files.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::templates;
use crate::tunnel::ArtifactPaths;

/// Everything needed to render a tunnel's artifacts.
#[derive(Debug, Clone)]
pub struct TunnelSpec {
    pub name: String,
    pub dns_hostname: String,
    pub local_service_url: String,
    /// Tunnel UUID assigned by the daemon.
    pub tunnel_id: String,
    /// Credentials JSON written by `cloudflared tunnel create`.
    pub credentials_file: PathBuf,
    /// Absolute path of the cloudflared binary, used by the start script.
    pub daemon_binary: PathBuf,
    /// User the systemd service runs as; `None` leaves it to systemd (root).
    pub run_as: Option<String>,
}

/// Write config, script and unit for `spec` under `config_directory`.
///
/// Never overwrites: fails with [`Error::AlreadyExists`] if any target file
/// is present. If a later write fails, files written by this call are removed.
pub fn create_artifacts(spec: &TunnelSpec, config_directory: &Path) -> Result<ArtifactPaths> {
    let existing = ArtifactPaths::new(&spec.name, config_directory);
    if !existing.existing().is_empty() {
        return Err(Error::AlreadyExists(spec.name.clone()));
    }

    fs::create_dir_all(config_directory)?;
    // Absolute paths are baked into the script and the unit.
    let dir = fs::canonicalize(config_directory)?;
    let paths = ArtifactPaths::new(&spec.name, &dir);

    let files = [
        (&paths.config, templates::daemon_config(spec), 0o644),
        (
            &paths.script,
            templates::start_script(&spec.daemon_binary, &paths.config),
            0o755,
        ),
        (
            &paths.unit,
            templates::systemd_unit(spec, &paths.script),
            0o644,
        ),
    ];

    let mut written: Vec<&Path> = Vec::with_capacity(files.len());
    for (path, content, mode) in &files {
        if let Err(e) = write_new_file(path, content, *mode) {
            for done in &written {
                if let Err(rm) = fs::remove_file(done) {
                    tracing::warn!("failed to clean up {}: {rm}", done.display());
                }
            }
            return Err(match e {
                Error::Io(io) if io.kind() == std::io::ErrorKind::AlreadyExists => {
                    Error::AlreadyExists(spec.name.clone())
                }
                other => other,
            });
        }
        tracing::info!("wrote {}", path.display());
        written.push(path.as_path());
    }

    Ok(paths)
}

/// Delete every artifact of `name` that is present.
///
/// Returns the removed paths. Missing files are skipped; [`Error::NotFound`]
/// is returned only when none existed.
pub fn remove_artifacts(name: &str, config_directory: &Path) -> Result<Vec<PathBuf>> {
    let paths = ArtifactPaths::new(name, config_directory);
    let mut removed = Vec::new();
    for path in paths.all() {
        match fs::remove_file(path) {
            Ok(()) => {
                tracing::info!("removed {}", path.display());
                removed.push(path.to_path_buf());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("already absent: {}", path.display());
            }
            Err(e) => return Err(e.into()),
        }
    }
    if removed.is_empty() {
        return Err(Error::NotFound(name.to_string()));
    }
    Ok(removed)
}

fn write_new_file(path: &Path, content: &str, mode: u32) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;

    // The umask may have masked the requested bits.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_spec(name: &str) -> TunnelSpec {
    TunnelSpec {
        name: name.to_string(),
        dns_hostname: format!("{name}.example.com"),
        local_service_url: "http://localhost:8080".into(),
        tunnel_id: "6ff42ae2-765d-4adf-8112-31c55c1551ef".into(),
        credentials_file: PathBuf::from(
            "/root/.cloudflared/6ff42ae2-765d-4adf-8112-31c55c1551ef.json",
        ),
        daemon_binary: PathBuf::from("/usr/local/bin/cloudflared"),
        run_as: None,
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn create_writes_three_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = create_artifacts(&test_spec("demo"), dir.path()).expect("create");
        for p in paths.all() {
            assert!(p.exists(), "{} should exist", p.display());
        }
        let config = fs::read_to_string(&paths.config).expect("read");
        assert!(config.contains("hostname: demo.example.com"));
    }

    #[test]
    fn create_returns_absolute_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = create_artifacts(&test_spec("demo"), dir.path()).expect("create");
        assert!(paths.script.is_absolute());
        let unit = fs::read_to_string(&paths.unit).expect("read");
        assert!(unit.contains(&format!("ExecStart=\"{}\"", paths.script.display())));
    }

    #[test]
    fn create_makes_missing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a/b");
        create_artifacts(&test_spec("demo"), &nested).expect("create");
        assert!(nested.join("demo.yml").exists());
    }

    #[cfg(unix)]
    #[test]
    fn script_is_executable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = create_artifacts(&test_spec("demo"), dir.path()).expect("create");
        let mode = fs::metadata(&paths.script).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn directory_with_space_yields_runnable_unit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spaced = dir.path().join("My Tunnels");
        let paths = create_artifacts(&test_spec("demo"), &spaced).expect("create");
        let unit = fs::read_to_string(&paths.unit).expect("read unit");
        assert!(unit.contains(&format!("ExecStart=\"{}\"\n", paths.script.display())));
        let script = fs::read_to_string(&paths.script).expect("read script");
        assert!(script.contains(&format!("--config '{}' run", paths.config.display())));
    }

    #[cfg(unix)]
    #[test]
    fn failed_last_write_removes_earlier_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = ArtifactPaths::new("demo", dir.path());
        // A dangling symlink is invisible to exists() but blocks create_new.
        std::os::unix::fs::symlink(dir.path().join("missing-target"), &paths.unit)
            .expect("symlink");

        let err = create_artifacts(&test_spec("demo"), dir.path()).expect_err("should fail");
        assert!(matches!(err, Error::AlreadyExists(ref n) if n == "demo"));
        assert!(!paths.config.exists());
        assert!(!paths.script.exists());
    }

    #[test]
    fn second_create_fails_and_keeps_originals() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = create_artifacts(&test_spec("demo"), dir.path()).expect("create");
        let before = fs::read_to_string(&paths.config).expect("read");

        let mut other = test_spec("demo");
        other.dns_hostname = "other.example.com".into();
        let err = create_artifacts(&other, dir.path()).expect_err("should fail");
        assert!(matches!(err, Error::AlreadyExists(ref n) if n == "demo"));

        assert_eq!(fs::read_to_string(&paths.config).expect("read"), before);
    }

    #[test]
    fn any_existing_artifact_blocks_create() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("demo.sh"), "stale").expect("write");
        let err = create_artifacts(&test_spec("demo"), dir.path()).expect_err("should fail");
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert!(!dir.path().join("demo.yml").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("demo.sh")).expect("read"),
            "stale"
        );
    }

    #[test]
    fn remove_deletes_all_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        create_artifacts(&test_spec("demo"), dir.path()).expect("create");
        let removed = remove_artifacts("demo", dir.path()).expect("remove");
        assert_eq!(removed.len(), 3);
        assert!(ArtifactPaths::new("demo", dir.path()).existing().is_empty());
    }

    #[test]
    fn remove_tolerates_partially_missing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = create_artifacts(&test_spec("demo"), dir.path()).expect("create");
        fs::remove_file(&paths.script).expect("rm");
        let removed = remove_artifacts("demo", dir.path()).expect("remove");
        assert_eq!(removed.len(), 2);
    }

    #[test]
    fn second_remove_reports_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        create_artifacts(&test_spec("demo"), dir.path()).expect("create");
        remove_artifacts("demo", dir.path()).expect("remove");
        let err = remove_artifacts("demo", dir.path()).expect_err("second remove");
        assert!(matches!(err, Error::NotFound(ref n) if n == "demo"));
    }

    #[test]
    fn remove_leaves_other_tunnels_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        create_artifacts(&test_spec("a"), dir.path()).expect("create a");
        create_artifacts(&test_spec("b"), dir.path()).expect("create b");
        remove_artifacts("a", dir.path()).expect("remove");
        assert_eq!(ArtifactPaths::new("b", dir.path()).existing().len(), 3);
    }
}
