use nix::unistd::{User, geteuid};

/// Check if the current process is running as root.
pub fn is_root() -> bool {
    geteuid().is_root()
}

/// User the generated systemd units should run as.
///
/// cloudflared writes credentials under the invoking user's home, so the
/// service must run as that user. Root needs no `User=` line.
pub fn service_user() -> Option<String> {
    let uid = geteuid();
    if uid.is_root() {
        return None;
    }
    match User::from_uid(uid) {
        Ok(Some(user)) => Some(user.name),
        Ok(None) => {
            tracing::warn!("no passwd entry for uid {uid}; unit will run as root");
            None
        }
        Err(e) => {
            tracing::warn!("failed to look up uid {uid}: {e}; unit will run as root");
            None
        }
    }
}

/// Warn when service-manager calls are likely to be refused.
pub fn warn_if_unprivileged(sudo: bool) {
    if !sudo && !is_root() {
        tracing::warn!(
            "not running as root and --sudo not set; enabling or disabling services may fail \
             with a permission error"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_gets_no_service_user() {
        if is_root() {
            assert_eq!(service_user(), None);
        } else if let Some(name) = service_user() {
            assert!(!name.is_empty());
        }
    }
}
