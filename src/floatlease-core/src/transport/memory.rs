//! In-memory seat-pool simulator.
//!
//! Implements [`Transport`] against local state instead of a network:
//! a bounded seat pool, per-seat expiry, server-side meter attributes,
//! entitlements and host configuration, plus failure injection (network
//! outage, scripted renewal failures, server-health states) so tests can
//! drive every branch of the lease state machine.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::entitlements::{EntitlementSet, FeatureEntitlement, HostConfig, ProductVersion};
use crate::lease::{LeaseIdentity, LeaseMode};
use crate::meter::MeterAttribute;
use crate::status::StatusCode;

use super::{LeaseGrant, MeterDelta, Transport};

struct Seat {
    mode: LeaseMode,
    expires_at: SystemTime,
}

struct ServerState {
    seat_limit: usize,
    offline_seat_limit: usize,
    offline_allowed: bool,
    lease_duration: Duration,
    max_offline_lease_duration: u64,
    clock_offset: Duration,
    clock_offset_negative: bool,
    license_expiry: SystemTime,
    license_metadata: HashMap<String, String>,
    meter_attributes: HashMap<String, MeterAttribute>,
    entitlement_set: Option<EntitlementSet>,
    feature_entitlements: Vec<FeatureEntitlement>,
    product_version: Option<ProductVersion>,
    seats: HashMap<String, Seat>,
    next_token: u64,
    network_down: bool,
    health: Option<StatusCode>,
    renew_failures: VecDeque<StatusCode>,
}

/// A lease server running entirely in process memory.
pub struct InMemoryServer {
    state: Mutex<ServerState>,
}

impl InMemoryServer {
    /// New server: 5 seats, 60-second leases, offline allowed up to one day.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServerState {
                seat_limit: 5,
                offline_seat_limit: 5,
                offline_allowed: true,
                lease_duration: Duration::from_secs(60),
                max_offline_lease_duration: 86_400,
                clock_offset: Duration::ZERO,
                clock_offset_negative: false,
                license_expiry: SystemTime::now() + Duration::from_secs(365 * 24 * 3600),
                license_metadata: HashMap::new(),
                meter_attributes: HashMap::new(),
                entitlement_set: None,
                feature_entitlements: Vec::new(),
                product_version: None,
                seats: HashMap::new(),
                next_token: 0,
                network_down: false,
                health: None,
                renew_failures: VecDeque::new(),
            }),
        }
    }

    /// Set the number of online seats in the pool.
    #[must_use]
    pub fn with_seat_limit(self, limit: usize) -> Self {
        self.mutate(|s| s.seat_limit = limit);
        self
    }

    /// Set the duration granted to online leases.
    #[must_use]
    pub fn with_lease_duration(self, duration: Duration) -> Self {
        self.mutate(|s| s.lease_duration = duration);
        self
    }

    /// Configure offline leasing limits.
    #[must_use]
    pub fn with_offline(self, max_duration_secs: u64, seat_limit: usize) -> Self {
        self.mutate(|s| {
            s.offline_allowed = true;
            s.max_offline_lease_duration = max_duration_secs;
            s.offline_seat_limit = seat_limit;
        });
        self
    }

    /// Forbid offline leasing entirely.
    #[must_use]
    pub fn deny_offline(self) -> Self {
        self.mutate(|s| s.offline_allowed = false);
        self
    }

    /// Define a server-side meter attribute.
    #[must_use]
    pub fn with_meter_attribute(self, attr: MeterAttribute) -> Self {
        self.mutate(|s| {
            s.meter_attributes.insert(attr.name.clone(), attr);
        });
        self
    }

    /// Link an entitlement set to the license.
    #[must_use]
    pub fn with_entitlement_set(self, set: EntitlementSet) -> Self {
        self.mutate(|s| s.entitlement_set = Some(set));
        self
    }

    /// Add a feature entitlement to the license.
    #[must_use]
    pub fn with_feature_entitlement(self, entitlement: FeatureEntitlement) -> Self {
        self.mutate(|s| s.feature_entitlements.push(entitlement));
        self
    }

    /// Link a product version to the license.
    #[must_use]
    pub fn with_product_version(self, version: ProductVersion) -> Self {
        self.mutate(|s| s.product_version = Some(version));
        self
    }

    /// Define a license metadata field.
    #[must_use]
    pub fn with_license_metadata(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.mutate(|s| {
            s.license_metadata.insert(key.into(), value.into());
        });
        self
    }

    /// Skew the server clock relative to the local clock. Positive
    /// `offset_secs` puts the server ahead.
    #[must_use]
    pub fn with_clock_offset(self, offset_secs: i64) -> Self {
        self.mutate(|s| {
            s.clock_offset = Duration::from_secs(offset_secs.unsigned_abs());
            s.clock_offset_negative = offset_secs < 0;
        });
        self
    }

    /// Simulate a network outage (every call fails with `NetworkError`).
    pub fn set_network_down(&self, down: bool) {
        self.mutate(|s| s.network_down = down);
    }

    /// Put the server into a health-failure state (every call fails with
    /// the given status), or clear it with `None`.
    pub fn set_health(&self, health: Option<StatusCode>) {
        self.mutate(|s| s.health = health);
    }

    /// Script the next renewal attempts to fail with the given statuses,
    /// in order.
    pub fn fail_next_renewals(&self, statuses: impl IntoIterator<Item = StatusCode>) {
        self.mutate(|s| s.renew_failures.extend(statuses));
    }

    /// Number of currently leased seats.
    #[must_use]
    pub fn leased_seats(&self) -> usize {
        self.state.lock().map(|s| s.seats.len()).unwrap_or(0)
    }

    /// Server-side view of a meter attribute (test assertions).
    #[must_use]
    pub fn meter_attribute(&self, name: &str) -> Option<MeterAttribute> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.meter_attributes.get(name).cloned())
    }

    fn mutate(&self, f: impl FnOnce(&mut ServerState)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
    }
}

impl Default for InMemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    fn check_reachable(&self) -> Result<(), StatusCode> {
        if self.network_down {
            return Err(StatusCode::NetworkError);
        }
        if let Some(health) = self.health {
            return Err(health);
        }
        Ok(())
    }

    fn server_now(&self) -> SystemTime {
        if self.clock_offset_negative {
            SystemTime::now() - self.clock_offset
        } else {
            SystemTime::now() + self.clock_offset
        }
    }

    fn grant(&mut self, mode: LeaseMode, duration: Duration) -> LeaseGrant {
        self.next_token += 1;
        let token = format!("seat-{}", self.next_token);
        let now = self.server_now();
        let expires_at = now + duration;
        self.seats.insert(
            token.clone(),
            Seat {
                mode,
                expires_at,
            },
        );
        debug!(token = %token, mode = mode.as_str(), "memory server: seat granted");
        LeaseGrant {
            lease_token: token,
            server_time: now,
            expires_at,
            meter_attributes: self.meter_attributes.values().cloned().collect(),
            entitlement_set: self.entitlement_set.clone(),
        }
    }

    fn evict_expired(&mut self) {
        let now = self.server_now();
        self.seats.retain(|_, seat| seat.expires_at > now);
    }

    fn seats_in_mode(&self, mode: LeaseMode) -> usize {
        self.seats.values().filter(|s| s.mode == mode).count()
    }
}

impl Transport for InMemoryServer {
    fn request_lease(
        &self,
        _identity: &LeaseIdentity,
        _client_metadata: &HashMap<String, String>,
    ) -> Result<LeaseGrant, StatusCode> {
        let mut state = self.state.lock().map_err(|_| StatusCode::ServerError)?;
        state.check_reachable()?;
        state.evict_expired();
        if state.seats_in_mode(LeaseMode::Online) >= state.seat_limit {
            return Err(StatusCode::LicenseLimitReached);
        }
        let duration = state.lease_duration;
        Ok(state.grant(LeaseMode::Online, duration))
    }

    fn request_offline_lease(
        &self,
        _identity: &LeaseIdentity,
        duration: Duration,
        _fingerprint: &str,
        _client_metadata: &HashMap<String, String>,
    ) -> Result<LeaseGrant, StatusCode> {
        let mut state = self.state.lock().map_err(|_| StatusCode::ServerError)?;
        state.check_reachable()?;
        state.evict_expired();
        if !state.offline_allowed {
            return Err(StatusCode::OfflineNotAllowed);
        }
        if duration.as_secs() > state.max_offline_lease_duration {
            return Err(StatusCode::MaxOfflineDurationExceeded);
        }
        if state.seats_in_mode(LeaseMode::Offline) >= state.offline_seat_limit {
            return Err(StatusCode::OfflineClientsLimitReached);
        }
        Ok(state.grant(LeaseMode::Offline, duration))
    }

    fn renew_lease(
        &self,
        _identity: &LeaseIdentity,
        lease_token: &str,
    ) -> Result<LeaseGrant, StatusCode> {
        let mut state = self.state.lock().map_err(|_| StatusCode::ServerError)?;
        state.check_reachable()?;
        if let Some(status) = state.renew_failures.pop_front() {
            debug!(status = %status, "memory server: scripted renewal failure");
            return Err(status);
        }
        state.evict_expired();
        let mode = match state.seats.get(lease_token) {
            Some(seat) => seat.mode,
            None => return Err(StatusCode::LicenseNotFound),
        };
        state.seats.remove(lease_token);
        let duration = state.lease_duration;
        Ok(state.grant(mode, duration))
    }

    fn drop_lease(
        &self,
        _identity: &LeaseIdentity,
        lease_token: &str,
    ) -> Result<(), StatusCode> {
        let mut state = self.state.lock().map_err(|_| StatusCode::ServerError)?;
        state.check_reachable()?;
        match state.seats.remove(lease_token) {
            Some(_) => {
                debug!(token = %lease_token, "memory server: seat released");
                Ok(())
            },
            None => Err(StatusCode::LicenseNotFound),
        }
    }

    fn host_config(&self, _identity: &LeaseIdentity) -> Result<Option<HostConfig>, StatusCode> {
        let state = self.state.lock().map_err(|_| StatusCode::ServerError)?;
        state.check_reachable()?;
        Ok(Some(HostConfig {
            max_offline_lease_duration: state.max_offline_lease_duration,
        }))
    }

    fn entitlement_set(
        &self,
        _identity: &LeaseIdentity,
    ) -> Result<Option<EntitlementSet>, StatusCode> {
        let state = self.state.lock().map_err(|_| StatusCode::ServerError)?;
        state.check_reachable()?;
        Ok(state.entitlement_set.clone())
    }

    fn feature_entitlements(
        &self,
        _identity: &LeaseIdentity,
    ) -> Result<Vec<FeatureEntitlement>, StatusCode> {
        let state = self.state.lock().map_err(|_| StatusCode::ServerError)?;
        state.check_reachable()?;
        Ok(state.feature_entitlements.clone())
    }

    fn product_version(
        &self,
        _identity: &LeaseIdentity,
    ) -> Result<Option<ProductVersion>, StatusCode> {
        let state = self.state.lock().map_err(|_| StatusCode::ServerError)?;
        state.check_reachable()?;
        Ok(state.product_version.clone())
    }

    fn license_metadata(
        &self,
        _identity: &LeaseIdentity,
    ) -> Result<HashMap<String, String>, StatusCode> {
        let state = self.state.lock().map_err(|_| StatusCode::ServerError)?;
        state.check_reachable()?;
        Ok(state.license_metadata.clone())
    }

    fn license_expiry(&self, _identity: &LeaseIdentity) -> Result<SystemTime, StatusCode> {
        let state = self.state.lock().map_err(|_| StatusCode::ServerError)?;
        state.check_reachable()?;
        Ok(state.license_expiry)
    }

    fn license_meter_attribute(
        &self,
        _identity: &LeaseIdentity,
        name: &str,
    ) -> Result<Option<MeterAttribute>, StatusCode> {
        let state = self.state.lock().map_err(|_| StatusCode::ServerError)?;
        state.check_reachable()?;
        Ok(state.meter_attributes.get(name).cloned())
    }

    fn record_meter_uses(
        &self,
        _identity: &LeaseIdentity,
        lease_token: &str,
        name: &str,
        delta: MeterDelta,
    ) -> Result<(), StatusCode> {
        let mut state = self.state.lock().map_err(|_| StatusCode::ServerError)?;
        state.check_reachable()?;
        if !state.seats.contains_key(lease_token) {
            return Err(StatusCode::LicenseNotFound);
        }
        let attr = state
            .meter_attributes
            .get_mut(name)
            .ok_or(StatusCode::MeterAttributeNotFound)?;
        match delta {
            MeterDelta::Increment(n) => {
                if attr.would_exceed(n) {
                    return Err(StatusCode::MeterAttributeLimitReached);
                }
                attr.total_uses = attr.total_uses.saturating_add(n);
                attr.gross_uses = attr.gross_uses.saturating_add(n);
            },
            MeterDelta::Decrement(n) => {
                attr.total_uses = attr.total_uses.saturating_sub(n);
            },
            MeterDelta::Reset => {
                attr.total_uses = 0;
            },
        }
        Ok(())
    }
}
