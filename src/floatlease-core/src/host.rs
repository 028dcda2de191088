//! Host runtime probes: machine fingerprinting and permission checks.
//!
//! The fingerprint only has to be stable per machine and user scope so
//! offline credentials can be bound to it. Hardened fingerprinting
//! belongs to the embedding application's platform layer.

use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::lease::PermissionFlag;
use crate::status::StatusCode;

/// Platform probes the lease manager depends on.
pub trait HostRuntime: Send + Sync {
    /// Stable machine fingerprint for the given scope.
    ///
    /// # Errors
    ///
    /// `FingerprintUnavailable` when no stable identity source exists,
    /// `InsufficientSystemPermission` when the scope needs elevation the
    /// process lacks.
    fn machine_fingerprint(&self, flag: PermissionFlag) -> Result<String, StatusCode>;

    /// Verify the process can operate at the given scope.
    ///
    /// # Errors
    ///
    /// `InsufficientSystemPermission` when `AllUsers` scope is requested
    /// without the permissions it needs.
    fn check_permission(&self, flag: PermissionFlag) -> Result<(), StatusCode>;
}

/// Fingerprint from OS identity sources (`/etc/machine-id` on Linux,
/// hostname/user environment otherwise), hashed with SHA-256.
#[derive(Debug, Default)]
pub struct EnvHostRuntime;

impl EnvHostRuntime {
    /// New runtime probe.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn identity_material(flag: PermissionFlag) -> Option<String> {
        let mut parts: Vec<String> = Vec::new();

        #[cfg(target_os = "linux")]
        if let Ok(machine_id) = std::fs::read_to_string("/etc/machine-id") {
            let machine_id = machine_id.trim();
            if !machine_id.is_empty() {
                parts.push(machine_id.to_string());
            }
        }

        for var in ["HOSTNAME", "COMPUTERNAME"] {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    parts.push(value);
                    break;
                }
            }
        }

        // Per-user scope binds the fingerprint to the user as well.
        if flag == PermissionFlag::User {
            for var in ["USER", "USERNAME"] {
                if let Ok(value) = std::env::var(var) {
                    if !value.is_empty() {
                        parts.push(value);
                        break;
                    }
                }
            }
        }

        if parts.is_empty() {
            return None;
        }
        parts.push(std::env::consts::OS.to_string());
        parts.push(std::env::consts::ARCH.to_string());
        Some(parts.join(":"))
    }

    fn system_scope_dir() -> PathBuf {
        #[cfg(windows)]
        {
            let base = std::env::var("ProgramData").unwrap_or_else(|_| "C:\\ProgramData".into());
            PathBuf::from(base).join("floatlease")
        }
        #[cfg(not(windows))]
        {
            PathBuf::from("/var/lib/floatlease")
        }
    }
}

impl HostRuntime for EnvHostRuntime {
    fn machine_fingerprint(&self, flag: PermissionFlag) -> Result<String, StatusCode> {
        let material =
            Self::identity_material(flag).ok_or(StatusCode::FingerprintUnavailable)?;
        let mut hasher = Sha256::new();
        hasher.update(b"floatlease-fingerprint:");
        hasher.update(material.as_bytes());
        let fingerprint = hex::encode(hasher.finalize());
        debug!(scope = ?flag, "computed machine fingerprint");
        Ok(fingerprint)
    }

    fn check_permission(&self, flag: PermissionFlag) -> Result<(), StatusCode> {
        if flag == PermissionFlag::User {
            return Ok(());
        }
        // System-wide scope: probe write access to the system data dir.
        let dir = Self::system_scope_dir();
        let probe = dir.join(".permission-probe");
        let writable = std::fs::create_dir_all(&dir)
            .and_then(|()| std::fs::write(&probe, b"probe"))
            .is_ok();
        let _ = std::fs::remove_file(&probe);
        if writable {
            Ok(())
        } else {
            debug!(dir = %dir.display(), "system-scope write probe failed");
            Err(StatusCode::InsufficientSystemPermission)
        }
    }
}

/// Fixed fingerprint, for tests and embedders with their own
/// fingerprinting.
#[derive(Debug, Clone)]
pub struct StaticHostRuntime {
    fingerprint: String,
}

impl StaticHostRuntime {
    /// Runtime that always reports the given fingerprint.
    #[must_use]
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
        }
    }
}

impl HostRuntime for StaticHostRuntime {
    fn machine_fingerprint(&self, _flag: PermissionFlag) -> Result<String, StatusCode> {
        Ok(self.fingerprint.clone())
    }

    fn check_permission(&self, _flag: PermissionFlag) -> Result<(), StatusCode> {
        Ok(())
    }
}
