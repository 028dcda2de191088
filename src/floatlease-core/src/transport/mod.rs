//! Transport seam to the lease server.
//!
//! The core never speaks a wire protocol itself: every server interaction
//! goes through the [`Transport`] trait, which returns typed values and
//! reports failures as [`StatusCode`]s. Calls are blocking from the
//! caller's perspective; the lease manager releases its state lock before
//! every transport call, so a slow server blocks only the calling context.
//!
//! [`InMemoryServer`] is a reference implementation simulating a seat
//! pool, used by the integration tests and the CLI demo.

mod memory;

pub use memory::InMemoryServer;

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use crate::entitlements::{EntitlementSet, FeatureEntitlement, HostConfig, ProductVersion};
use crate::lease::LeaseIdentity;
use crate::meter::MeterAttribute;
use crate::status::StatusCode;

/// A granted (or renewed) seat, as reported by the server.
#[derive(Debug, Clone)]
pub struct LeaseGrant {
    /// Opaque token identifying this seat for renew/drop/meter calls.
    pub lease_token: String,
    /// Server clock at grant time, checked against the local clock.
    pub server_time: SystemTime,
    /// When the lease lapses without renewal.
    pub expires_at: SystemTime,
    /// Snapshot of the license's meter attributes.
    pub meter_attributes: Vec<MeterAttribute>,
    /// Entitlement set linked to the license, if any.
    pub entitlement_set: Option<EntitlementSet>,
}

impl LeaseGrant {
    /// Granted lease duration as seen by the server.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.expires_at
            .duration_since(self.server_time)
            .unwrap_or(Duration::ZERO)
    }
}

/// A meter-usage change recorded against the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterDelta {
    /// Add `n` uses.
    Increment(u64),
    /// Remove up to `n` uses (server clamps at zero).
    Decrement(u64),
    /// Reset the balance to zero.
    Reset,
}

/// Blocking client-to-server operations.
///
/// Implementations map their own failures (connection errors, timeouts,
/// protocol errors) onto the [`StatusCode`] taxonomy; `NetworkError` is
/// the transient catch-all the renewal loop retries on.
pub trait Transport: Send + Sync {
    /// Lease a seat from the pool.
    fn request_lease(
        &self,
        identity: &LeaseIdentity,
        client_metadata: &HashMap<String, String>,
    ) -> Result<LeaseGrant, StatusCode>;

    /// Lease a seat for offline use with a host-requested duration.
    fn request_offline_lease(
        &self,
        identity: &LeaseIdentity,
        duration: Duration,
        fingerprint: &str,
        client_metadata: &HashMap<String, String>,
    ) -> Result<LeaseGrant, StatusCode>;

    /// Renew a held seat before it expires.
    fn renew_lease(
        &self,
        identity: &LeaseIdentity,
        lease_token: &str,
    ) -> Result<LeaseGrant, StatusCode>;

    /// Release a held seat back to the pool.
    fn drop_lease(&self, identity: &LeaseIdentity, lease_token: &str) -> Result<(), StatusCode>;

    /// Fetch the host configuration; `None` when the server has no
    /// offline-lease configuration.
    fn host_config(&self, identity: &LeaseIdentity) -> Result<Option<HostConfig>, StatusCode>;

    /// Fetch the entitlement set linked to the server license; `None`
    /// when no set is linked.
    fn entitlement_set(
        &self,
        identity: &LeaseIdentity,
    ) -> Result<Option<EntitlementSet>, StatusCode>;

    /// Fetch the feature entitlements of the server license.
    fn feature_entitlements(
        &self,
        identity: &LeaseIdentity,
    ) -> Result<Vec<FeatureEntitlement>, StatusCode>;

    /// Fetch the product version linked to the server license; `None`
    /// when no version is linked.
    fn product_version(
        &self,
        identity: &LeaseIdentity,
    ) -> Result<Option<ProductVersion>, StatusCode>;

    /// Fetch the metadata defined on the server license.
    fn license_metadata(
        &self,
        identity: &LeaseIdentity,
    ) -> Result<HashMap<String, String>, StatusCode>;

    /// Fetch the expiry timestamp of the server license itself.
    fn license_expiry(&self, identity: &LeaseIdentity) -> Result<SystemTime, StatusCode>;

    /// Fetch a single meter attribute of the server license.
    fn license_meter_attribute(
        &self,
        identity: &LeaseIdentity,
        name: &str,
    ) -> Result<Option<MeterAttribute>, StatusCode>;

    /// Record a meter-usage change for a held seat.
    fn record_meter_uses(
        &self,
        identity: &LeaseIdentity,
        lease_token: &str,
        name: &str,
        delta: MeterDelta,
    ) -> Result<(), StatusCode>;
}
