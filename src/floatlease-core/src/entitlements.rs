//! Entitlement, product-version and host-configuration caching.
//!
//! The cache holds the most recent successful fetch of each slice of
//! server-held state. Slices are replaced atomically on a successful
//! fetch and never mutated on a failed or empty one, so a getter that
//! fails leaves the last-known-good values intact for offline fallback.

use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// A feature grant attached to the server license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEntitlement {
    /// Machine name of the feature.
    pub feature_name: String,
    /// Human-readable name.
    pub feature_display_name: String,
    /// Grant value, server-defined.
    pub value: String,
}

/// Identity of the entitlement set linked to the server license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementSet {
    /// Machine name of the set.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
}

/// A feature flag of the linked product version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    /// Flag name.
    pub name: String,
    /// Whether the flag is enabled.
    pub enabled: bool,
    /// Extra flag payload, server-defined.
    pub data: String,
}

/// The product version linked to the server license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVersion {
    /// Machine name of the version.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Feature flags of this version.
    pub feature_flags: Vec<FeatureFlag>,
}

impl ProductVersion {
    /// Look up a feature flag by name.
    #[must_use]
    pub fn feature_flag(&self, name: &str) -> Option<&FeatureFlag> {
        self.feature_flags.iter().find(|flag| flag.name == name)
    }
}

/// Server-side host configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Maximum offline lease duration in seconds.
    pub max_offline_lease_duration: u64,
}

/// Last-known-good server state, owned by the lease manager.
#[derive(Debug, Clone, Default)]
pub struct EntitlementCache {
    feature_entitlements: Option<Vec<FeatureEntitlement>>,
    entitlement_set: Option<EntitlementSet>,
    product_version: Option<ProductVersion>,
    license_metadata: Option<HashMap<String, String>>,
    license_expiry: Option<SystemTime>,
    host_config: Option<HostConfig>,
}

impl EntitlementCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached feature entitlements.
    pub fn store_feature_entitlements(&mut self, entitlements: Vec<FeatureEntitlement>) {
        trace!(count = entitlements.len(), "cache: stored feature entitlements");
        self.feature_entitlements = Some(entitlements);
    }

    /// Cached feature entitlements, if any fetch has succeeded.
    #[must_use]
    pub fn feature_entitlements(&self) -> Option<&[FeatureEntitlement]> {
        self.feature_entitlements.as_deref()
    }

    /// Replace the cached entitlement-set identity.
    pub fn store_entitlement_set(&mut self, set: EntitlementSet) {
        trace!(name = %set.name, "cache: stored entitlement set");
        self.entitlement_set = Some(set);
    }

    /// Cached entitlement-set identity.
    #[must_use]
    pub fn entitlement_set(&self) -> Option<&EntitlementSet> {
        self.entitlement_set.as_ref()
    }

    /// Replace the cached product version.
    pub fn store_product_version(&mut self, version: ProductVersion) {
        trace!(name = %version.name, "cache: stored product version");
        self.product_version = Some(version);
    }

    /// Cached product version.
    #[must_use]
    pub fn product_version(&self) -> Option<&ProductVersion> {
        self.product_version.as_ref()
    }

    /// Replace the cached host-license metadata.
    pub fn store_license_metadata(&mut self, metadata: HashMap<String, String>) {
        trace!(count = metadata.len(), "cache: stored license metadata");
        self.license_metadata = Some(metadata);
    }

    /// Cached host-license metadata.
    #[must_use]
    pub fn license_metadata(&self) -> Option<&HashMap<String, String>> {
        self.license_metadata.as_ref()
    }

    /// Replace the cached host-license expiry.
    pub fn store_license_expiry(&mut self, expiry: SystemTime) {
        self.license_expiry = Some(expiry);
    }

    /// Cached host-license expiry.
    #[must_use]
    pub fn license_expiry(&self) -> Option<SystemTime> {
        self.license_expiry
    }

    /// Replace the cached host configuration.
    pub fn store_host_config(&mut self, config: HostConfig) {
        trace!(
            max_offline_lease_duration = config.max_offline_lease_duration,
            "cache: stored host config"
        );
        self.host_config = Some(config);
    }

    /// Cached host configuration.
    #[must_use]
    pub fn host_config(&self) -> Option<HostConfig> {
        self.host_config
    }

    /// Drop every cached slice (lease teardown).
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
