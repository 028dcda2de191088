//! Lease types and state definitions.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::status::StatusCode;

/// Host process privilege scope, affecting fingerprinting and where the
/// offline credential store lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionFlag {
    /// The application runs without admin/root permissions (per-user scope).
    User,
    /// System-wide activation scope; requires elevated permissions.
    AllUsers,
}

impl Default for PermissionFlag {
    fn default() -> Self {
        Self::User
    }
}

/// Lifecycle state of the in-process lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseState {
    /// No lease held; acquire is possible.
    Unleased,
    /// An acquire request is in flight.
    Acquiring,
    /// Seat held; renewal timer armed.
    Active,
    /// A renewal request is in flight.
    Renewing,
    /// The lease lapsed (clock passed expiry, or a fatal renewal failure).
    Expired,
    /// The lease was released by the host.
    Dropped,
}

impl LeaseState {
    /// Check if a seat is currently held.
    #[must_use]
    pub fn is_held(&self) -> bool {
        matches!(self, Self::Active | Self::Renewing)
    }

    /// Check if a new acquire may start from this state.
    ///
    /// `Expired` and `Dropped` are terminal for the old lease but carry
    /// `Unleased` semantics for the next acquire.
    #[must_use]
    pub fn can_acquire(&self) -> bool {
        matches!(self, Self::Unleased | Self::Expired | Self::Dropped)
    }
}

/// How the current lease was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseMode {
    /// Server-assigned duration, renewed continuously over the network.
    Online,
    /// Host-requested bounded duration, usable without connectivity.
    Offline,
}

impl LeaseMode {
    /// Wire/display name of the mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// The seat currently held by this process.
///
/// Present only while the state is `Active`, `Renewing` or `Expired`;
/// replaced wholesale on every successful acquire or renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// How the lease was acquired.
    pub mode: LeaseMode,
    /// When the lease lapses without a successful renewal.
    pub expires_at: SystemTime,
    /// Granted lease duration (server-assigned online, host-requested offline).
    pub duration: Duration,
}

impl Lease {
    /// Check whether the local clock has passed the lease expiry.
    #[must_use]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

/// Product and server identity, validated and frozen for the duration of a
/// lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseIdentity {
    /// Unique product id of the protected application.
    pub product_id: String,
    /// Lease server address, `http://[host]:[port]` or `https://...`.
    pub host_url: String,
    /// Privilege scope of the host process.
    pub permission_flag: PermissionFlag,
}

impl LeaseIdentity {
    /// Build a validated identity.
    ///
    /// # Errors
    ///
    /// `ProductIdInvalid` for an empty product id, `HostUrlInvalid` for a
    /// url without an `http`/`https` scheme or without a host part.
    pub fn new(
        product_id: impl Into<String>,
        host_url: impl Into<String>,
        permission_flag: PermissionFlag,
    ) -> Result<Self, StatusCode> {
        let product_id = product_id.into();
        if product_id.trim().is_empty() {
            return Err(StatusCode::ProductIdInvalid);
        }
        let host_url = host_url.into();
        if !valid_host_url(&host_url) {
            return Err(StatusCode::HostUrlInvalid);
        }
        Ok(Self {
            product_id,
            host_url,
            permission_flag,
        })
    }
}

/// Minimal shape check for the lease server url.
pub(crate) fn valid_host_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    match rest {
        Some(host) => !host.trim_start_matches('/').is_empty(),
        None => false,
    }
}
