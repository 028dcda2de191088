//! Lease lifecycle orchestration.
//!
//! [`FloatingClient`] is the public entry point: a handle object owned by
//! the host (never process-global state), wrapping the lease manager that
//! drives every transition of the lease state machine:
//!
//! ```text
//! Unleased --acquire--> Acquiring --success--> Active
//!                            \--failure--> Unleased
//! Active --timer--> Renewing --success--> Active (expiry refreshed)
//!                        \--transient--> Active (retry sooner)
//!                        \--fatal-----> Expired
//! Active|Renewing|Expired --drop--> Dropped
//! ```
//!
//! ## Locking
//!
//! All mutable lease/cache state sits behind one mutex. The lock is
//! released before every `Transport` call and before every callback
//! dispatch, so a slow server blocks only the calling context and a host
//! callback may re-enter the client. An epoch counter, bumped on every
//! acquire and drop, lets a renewal that raced a drop detect that the
//! lease it started with is gone and discard its result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::callback::CallbackDispatcher;
use crate::config::ClientConfig;
use crate::entitlements::{
    EntitlementCache, EntitlementSet, FeatureEntitlement, FeatureFlag, HostConfig, ProductVersion,
};
use crate::host::{EnvHostRuntime, HostRuntime};
use crate::lease::{valid_host_url, Lease, LeaseIdentity, LeaseMode, LeaseState, PermissionFlag};
use crate::meter::{MeterAttribute, MeterAttributeTracker};
use crate::scheduler::RenewalScheduler;
use crate::status::StatusCode;
use crate::store::{EncryptedFileStore, NullStore, OfflineCredential, OfflineStore};
use crate::transport::{LeaseGrant, MeterDelta, Transport};

/// Mutable lease and cache state, guarded by the manager's single lock.
struct ManagerState {
    product_id: Option<String>,
    host_url: Option<String>,
    permission_flag: PermissionFlag,
    client_metadata: HashMap<String, String>,
    lease_state: LeaseState,
    lease: Option<Lease>,
    lease_token: Option<String>,
    fingerprint: Option<String>,
    epoch: u64,
    meters: MeterAttributeTracker,
    entitlements: EntitlementCache,
}

impl ManagerState {
    fn new() -> Self {
        Self {
            product_id: None,
            host_url: None,
            permission_flag: PermissionFlag::default(),
            client_metadata: HashMap::new(),
            lease_state: LeaseState::Unleased,
            lease: None,
            lease_token: None,
            fingerprint: None,
            epoch: 0,
            meters: MeterAttributeTracker::new(),
            entitlements: EntitlementCache::new(),
        }
    }

    /// Validated identity snapshot for a transport call.
    fn identity(&self) -> Result<LeaseIdentity, StatusCode> {
        let product_id = self
            .product_id
            .clone()
            .ok_or(StatusCode::ProductIdInvalid)?;
        let host_url = self.host_url.clone().ok_or(StatusCode::HostUrlInvalid)?;
        LeaseIdentity::new(product_id, host_url, self.permission_flag)
    }

    /// An acquire is in progress or a seat is held.
    fn lease_busy(&self) -> bool {
        self.lease_state.is_held() || self.lease_state == LeaseState::Acquiring
    }
}

struct LeaseManager {
    transport: Arc<dyn Transport>,
    host: Arc<dyn HostRuntime>,
    store: Arc<dyn OfflineStore>,
    config: ClientConfig,
    callbacks: CallbackDispatcher,
    scheduler: RenewalScheduler,
    state: Mutex<ManagerState>,
}

impl LeaseManager {
    fn lock(&self) -> Result<MutexGuard<'_, ManagerState>, StatusCode> {
        self.state.lock().map_err(|_| StatusCode::Fail)
    }

    /// Refuse grants whose server clock diverges from ours beyond
    /// tolerance.
    fn validate_clock(&self, grant: &LeaseGrant) -> Result<(), StatusCode> {
        let now = SystemTime::now();
        let skew = match grant.server_time.duration_since(now) {
            Ok(ahead) => ahead,
            Err(e) => e.duration(),
        };
        if skew > self.config.clock_skew_tolerance {
            warn!(
                skew_secs = skew.as_secs(),
                "server clock diverges from local clock beyond tolerance"
            );
            return Err(StatusCode::TimeTampered);
        }
        Ok(())
    }

    /// Install a grant as the current lease. Bumps the epoch and returns
    /// the renewal deadline for the new expiry.
    fn install_grant(&self, state: &mut ManagerState, grant: LeaseGrant, mode: LeaseMode) -> Instant {
        state.epoch += 1;
        let duration = grant.duration();
        state.lease_state = LeaseState::Active;
        state.lease = Some(Lease {
            mode,
            expires_at: grant.expires_at,
            duration,
        });
        state.lease_token = Some(grant.lease_token);
        state.meters.replace_all(grant.meter_attributes);
        if let Some(set) = grant.entitlement_set {
            state.entitlements.store_entitlement_set(set);
        }
        self.renewal_deadline(grant.expires_at, duration)
    }

    /// Fire time: safety margin before expiry, never in the past.
    fn renewal_deadline(&self, expires_at: SystemTime, duration: Duration) -> Instant {
        let margin = self.config.renewal_margin(duration);
        let remaining = expires_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
        Instant::now() + remaining.saturating_sub(margin)
    }

    /// Roll an aborted acquire back to `Unleased` and pass the failure
    /// through.
    fn abort_acquire(&self, status: StatusCode) -> StatusCode {
        if let Ok(mut state) = self.state.lock() {
            if state.lease_state == LeaseState::Acquiring {
                state.lease_state = LeaseState::Unleased;
            }
        }
        status
    }

    /// Arm the renewal timer for the lease identified by `epoch`.
    fn arm_renewal(manager: &Arc<Self>, deadline: Instant, epoch: u64) {
        let weak = Arc::downgrade(manager);
        manager.scheduler.arm(deadline, move || {
            if let Some(manager) = weak.upgrade() {
                Self::renew_once(&manager, epoch);
            }
        });
    }

    /// One renewal attempt, driven by the scheduler thread.
    fn renew_once(manager: &Arc<Self>, epoch: u64) {
        let (identity, token) = {
            let mut state = match manager.state.lock() {
                Ok(state) => state,
                Err(_) => return,
            };
            if state.epoch != epoch || !state.lease_state.is_held() {
                debug!("renewal fired for a stale lease, ignoring");
                return;
            }
            let identity = match state.identity() {
                Ok(identity) => identity,
                Err(_) => return,
            };
            let token = match state.lease_token.clone() {
                Some(token) => token,
                None => return,
            };
            state.lease_state = LeaseState::Renewing;
            (identity, token)
        };

        debug!("renewing lease");
        let result = manager
            .transport
            .renew_lease(&identity, &token)
            .and_then(|grant| manager.validate_clock(&grant).map(|()| grant));

        let mut rearm: Option<(Instant, u64)> = None;
        let mut persist: Option<OfflineCredential> = None;
        let status = {
            let mut state = match manager.state.lock() {
                Ok(state) => state,
                Err(_) => return,
            };
            if state.epoch != epoch || state.lease_state != LeaseState::Renewing {
                // The lease was dropped (or replaced) while the request
                // was in flight: discard the result, still report it.
                debug!("lease changed during renewal, discarding result");
                match &result {
                    Ok(_) => StatusCode::Ok,
                    Err(status) => *status,
                }
            } else {
                match result {
                    Ok(grant) => {
                        let mode = state
                            .lease
                            .as_ref()
                            .map(|lease| lease.mode)
                            .unwrap_or(LeaseMode::Online);
                        if mode == LeaseMode::Offline {
                            if let Some(fingerprint) = state.fingerprint.clone() {
                                persist = Some(OfflineCredential {
                                    product_id: identity.product_id.clone(),
                                    fingerprint,
                                    lease_token: grant.lease_token.clone(),
                                    issued_at: unix_secs(grant.server_time),
                                    expires_at: unix_secs(grant.expires_at),
                                });
                            }
                        }
                        let deadline = manager.install_grant(&mut state, grant, mode);
                        rearm = Some((deadline, state.epoch));
                        info!(mode = mode.as_str(), "lease renewed");
                        StatusCode::Ok
                    },
                    Err(status) if status.is_fatal_to_lease() => {
                        warn!(status = %status, "renewal failed fatally, lease expired");
                        state.lease_state = LeaseState::Expired;
                        state.lease_token = None;
                        status
                    },
                    Err(status) => {
                        let now = SystemTime::now();
                        let expired = state
                            .lease
                            .as_ref()
                            .map(|lease| lease.is_expired_at(now))
                            .unwrap_or(true);
                        if expired {
                            warn!(status = %status, "lease expired before renewal could succeed");
                            state.lease_state = LeaseState::Expired;
                            state.lease_token = None;
                            StatusCode::LicenseExpiredDueToNetwork
                        } else {
                            state.lease_state = LeaseState::Active;
                            let remaining = state
                                .lease
                                .as_ref()
                                .and_then(|lease| lease.expires_at.duration_since(now).ok())
                                .unwrap_or(Duration::ZERO);
                            let retry_in = manager.config.retry_interval.min(remaining / 2);
                            warn!(
                                status = %status,
                                retry_in_ms = retry_in.as_millis() as u64,
                                "transient renewal failure, retrying"
                            );
                            rearm = Some((Instant::now() + retry_in, epoch));
                            status
                        }
                    },
                }
            }
        };

        if let Some(credential) = persist {
            if let Err(status) = manager.store.save(&credential) {
                warn!(status = %status, "failed to persist renewed offline credential");
            }
        }
        if let Some((deadline, epoch)) = rearm {
            Self::arm_renewal(manager, deadline, epoch);
        }
        manager.callbacks.dispatch(status);
    }

    /// Online acquire.
    fn acquire_online(manager: &Arc<Self>) -> Result<(), StatusCode> {
        let (identity, metadata) = {
            let mut state = manager.lock()?;
            if state.lease_busy() {
                return Err(StatusCode::LicenseExists);
            }
            if !manager.callbacks.is_registered() {
                return Err(StatusCode::CallbackMissing);
            }
            let identity = state.identity()?;
            state.lease_state = LeaseState::Acquiring;
            (identity, state.client_metadata.clone())
        };

        info!(product_id = %identity.product_id, host_url = %identity.host_url, "requesting floating license");
        let grant = match manager.transport.request_lease(&identity, &metadata) {
            Ok(grant) => grant,
            Err(status) => {
                warn!(status = %status, "floating license request failed");
                return Err(manager.abort_acquire(status));
            },
        };
        if let Err(status) = manager.validate_clock(&grant) {
            // Best-effort release of the seat we will not keep.
            let _ = manager.transport.drop_lease(&identity, &grant.lease_token);
            return Err(manager.abort_acquire(status));
        }

        let mut state = manager.lock()?;
        if state.lease_state != LeaseState::Acquiring {
            // Dropped while the request was in flight: give the seat back.
            drop(state);
            let _ = manager.transport.drop_lease(&identity, &grant.lease_token);
            return Err(StatusCode::Fail);
        }
        let deadline = manager.install_grant(&mut state, grant, LeaseMode::Online);
        let epoch = state.epoch;
        let expires_at = state.lease.as_ref().map(|lease| lease.expires_at);
        drop(state);
        Self::arm_renewal(manager, deadline, epoch);
        info!(expires_at = ?expires_at, "floating license acquired");
        Ok(())
    }

    /// Offline acquire with a host-requested duration.
    fn acquire_offline(manager: &Arc<Self>, duration_secs: u64) -> Result<(), StatusCode> {
        let (identity, metadata) = {
            let mut state = manager.lock()?;
            if state.lease_busy() {
                return Err(StatusCode::LicenseExists);
            }
            let identity = state.identity()?;
            state.lease_state = LeaseState::Acquiring;
            (identity, state.client_metadata.clone())
        };

        let fingerprint = match manager.host.machine_fingerprint(identity.permission_flag) {
            Ok(fingerprint) => fingerprint,
            Err(status) => return Err(manager.abort_acquire(status)),
        };

        // A persisted, still-valid credential is resumed without a
        // server round trip; a stale one is discarded.
        match manager.store.load(&identity.product_id, &fingerprint) {
            Ok(Some(credential)) => {
                let expires_at = system_time_from_unix(credential.expires_at);
                if SystemTime::now() < expires_at {
                    return Self::adopt_credential(manager, credential, fingerprint);
                }
                debug!("persisted offline credential expired, discarding");
                manager.store.remove(&identity.product_id);
            },
            Ok(None) => {},
            Err(status) => return Err(manager.abort_acquire(status)),
        }

        // Enforce the server-configured offline maximum before asking.
        let host_config = match Self::known_host_config(manager, &identity) {
            Ok(config) => config,
            Err(status) => return Err(manager.abort_acquire(status)),
        };
        if duration_secs > host_config.max_offline_lease_duration {
            debug!(
                requested = duration_secs,
                max = host_config.max_offline_lease_duration,
                "offline lease duration over limit"
            );
            return Err(manager.abort_acquire(StatusCode::MaxOfflineDurationExceeded));
        }

        info!(
            product_id = %identity.product_id,
            duration_secs,
            "requesting offline floating license"
        );
        let grant = match manager.transport.request_offline_lease(
            &identity,
            Duration::from_secs(duration_secs),
            &fingerprint,
            &metadata,
        ) {
            Ok(grant) => grant,
            Err(status) => {
                warn!(status = %status, "offline floating license request failed");
                return Err(manager.abort_acquire(status));
            },
        };
        if let Err(status) = manager.validate_clock(&grant) {
            let _ = manager.transport.drop_lease(&identity, &grant.lease_token);
            return Err(manager.abort_acquire(status));
        }

        let credential = OfflineCredential {
            product_id: identity.product_id.clone(),
            fingerprint: fingerprint.clone(),
            lease_token: grant.lease_token.clone(),
            issued_at: unix_secs(grant.server_time),
            expires_at: unix_secs(grant.expires_at),
        };

        let mut state = manager.lock()?;
        if state.lease_state != LeaseState::Acquiring {
            drop(state);
            let _ = manager.transport.drop_lease(&identity, &grant.lease_token);
            return Err(StatusCode::Fail);
        }
        let deadline = manager.install_grant(&mut state, grant, LeaseMode::Offline);
        state.fingerprint = Some(fingerprint);
        let epoch = state.epoch;
        drop(state);

        if let Err(status) = manager.store.save(&credential) {
            // The lease is valid in memory either way; it just will not
            // survive a restart.
            warn!(status = %status, "failed to persist offline credential");
        }
        Self::arm_renewal(manager, deadline, epoch);
        info!("offline floating license acquired");
        Ok(())
    }

    /// Resume a persisted offline credential as the current lease.
    fn adopt_credential(
        manager: &Arc<Self>,
        credential: OfflineCredential,
        fingerprint: String,
    ) -> Result<(), StatusCode> {
        let expires_at = system_time_from_unix(credential.expires_at);
        let issued_at = system_time_from_unix(credential.issued_at);
        let duration = expires_at
            .duration_since(issued_at)
            .unwrap_or(Duration::ZERO);

        let mut state = manager.lock()?;
        if state.lease_state != LeaseState::Acquiring {
            return Err(StatusCode::Fail);
        }
        state.epoch += 1;
        state.lease_state = LeaseState::Active;
        state.lease = Some(Lease {
            mode: LeaseMode::Offline,
            expires_at,
            duration,
        });
        state.lease_token = Some(credential.lease_token);
        state.fingerprint = Some(fingerprint);
        let deadline = manager.renewal_deadline(expires_at, duration);
        let epoch = state.epoch;
        drop(state);

        Self::arm_renewal(manager, deadline, epoch);
        info!(expires_at = ?expires_at, "resumed persisted offline lease");
        Ok(())
    }

    /// Cached host config, fetched through transport on a miss.
    fn known_host_config(
        manager: &Arc<Self>,
        identity: &LeaseIdentity,
    ) -> Result<HostConfig, StatusCode> {
        if let Some(config) = manager.lock()?.entitlements.host_config() {
            return Ok(config);
        }
        match manager.transport.host_config(identity)? {
            Some(config) => {
                manager.lock()?.entitlements.store_host_config(config);
                Ok(config)
            },
            None => Err(StatusCode::OfflineNotAllowed),
        }
    }

    /// Release the seat and tear the lease down.
    fn drop_lease(&self) -> Result<(), StatusCode> {
        let (previous, mode, identity, token, product_id) = {
            let mut state = self.lock()?;
            if matches!(
                state.lease_state,
                LeaseState::Unleased | LeaseState::Dropped
            ) {
                return Ok(());
            }
            // Clearing the armed slot here (before the state transition
            // is visible) guarantees no renewal fires after drop returns.
            self.scheduler.cancel();
            state.epoch += 1;
            let previous = state.lease_state;
            let mode = state.lease.as_ref().map(|lease| lease.mode);
            let identity = state.identity().ok();
            let token = state.lease_token.take();
            let product_id = state.product_id.clone();
            state.lease_state = LeaseState::Dropped;
            state.lease = None;
            state.fingerprint = None;
            state.meters.clear();
            state.entitlements.clear();
            (previous, mode, identity, token, product_id)
        };

        match mode {
            Some(LeaseMode::Offline) => {
                // No server round trip is owed mid-lease; drop the
                // persisted credential so it cannot be resumed.
                if let Some(product_id) = product_id {
                    self.store.remove(&product_id);
                }
                info!("offline floating license dropped");
                Ok(())
            },
            Some(LeaseMode::Online) => {
                if previous == LeaseState::Expired {
                    // The server already reclaimed the seat.
                    info!("expired floating license dropped locally");
                    return Ok(());
                }
                match (identity, token) {
                    (Some(identity), Some(token)) => {
                        match self.transport.drop_lease(&identity, &token) {
                            Ok(()) | Err(StatusCode::LicenseNotFound) => {
                                info!("floating license dropped");
                                Ok(())
                            },
                            Err(status) => {
                                // Local state is already cleared; the
                                // server seat may linger until its own
                                // expiry reclaims it.
                                warn!(
                                    status = %status,
                                    "seat release failed, local lease cleared anyway"
                                );
                                Err(status)
                            },
                        }
                    },
                    _ => Ok(()),
                }
            },
            None => Ok(()),
        }
    }

    /// Identity and token of the held seat, or `NoLicense`.
    fn held_session(&self) -> Result<(LeaseIdentity, String), StatusCode> {
        let state = self.lock()?;
        if !state.lease_state.is_held() {
            return Err(StatusCode::NoLicense);
        }
        let identity = state.identity()?;
        let token = state.lease_token.clone().ok_or(StatusCode::NoLicense)?;
        Ok((identity, token))
    }

    /// Identity while a seat is held, or `NoLicense`.
    fn held_identity(&self) -> Result<LeaseIdentity, StatusCode> {
        self.held_session().map(|(identity, _)| identity)
    }
}

fn unix_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_secs() as i64,
        Err(before) => -(before.duration().as_secs() as i64),
    }
}

fn system_time_from_unix(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

/// Handle to one floating-license client instance.
///
/// Cheap to clone; all clones share the same lease. Typical flow:
///
/// ```
/// use std::sync::Arc;
/// use floatlease_core::{FloatingClient, InMemoryServer};
///
/// let server = Arc::new(InMemoryServer::new());
/// let client = FloatingClient::new(server);
/// client.set_host_product_id("P1").unwrap();
/// client.set_host_url("http://localhost:8090").unwrap();
/// client.set_floating_license_callback(|status| {
///     eprintln!("renewal: {status}");
/// });
/// client.request_floating_license().unwrap();
/// assert!(client.has_floating_license());
/// client.drop_floating_license().unwrap();
/// ```
#[derive(Clone)]
pub struct FloatingClient {
    inner: Arc<LeaseManager>,
}

impl FloatingClient {
    /// Client with default configuration, environment-derived host
    /// runtime, and credential persistence per
    /// [`ClientConfig::offline_store_dir`].
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    /// Client with custom configuration.
    #[must_use]
    pub fn with_config(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        let store: Arc<dyn OfflineStore> = match &config.offline_store_dir {
            Some(dir) => Arc::new(EncryptedFileStore::new(dir.clone())),
            None => Arc::new(NullStore),
        };
        Self::with_runtime(transport, config, Arc::new(EnvHostRuntime::new()), store)
    }

    /// Client with every collaborator supplied by the embedder.
    #[must_use]
    pub fn with_runtime(
        transport: Arc<dyn Transport>,
        config: ClientConfig,
        host: Arc<dyn HostRuntime>,
        store: Arc<dyn OfflineStore>,
    ) -> Self {
        Self {
            inner: Arc::new(LeaseManager {
                transport,
                host,
                store,
                config,
                callbacks: CallbackDispatcher::new(),
                scheduler: RenewalScheduler::new(),
                state: Mutex::new(ManagerState::new()),
            }),
        }
    }

    /// Set the product id. Fails with `LicenseExists` while a lease is
    /// live.
    pub fn set_host_product_id(&self, product_id: &str) -> Result<(), StatusCode> {
        if product_id.trim().is_empty() {
            return Err(StatusCode::ProductIdInvalid);
        }
        let mut state = self.inner.lock()?;
        if state.lease_busy() {
            return Err(StatusCode::LicenseExists);
        }
        state.product_id = Some(product_id.to_string());
        Ok(())
    }

    /// Set the lease server url (`http://[host]:[port]` or `https://...`).
    pub fn set_host_url(&self, host_url: &str) -> Result<(), StatusCode> {
        if !valid_host_url(host_url) {
            return Err(StatusCode::HostUrlInvalid);
        }
        let mut state = self.inner.lock()?;
        if state.lease_busy() {
            return Err(StatusCode::LicenseExists);
        }
        state.host_url = Some(host_url.to_string());
        Ok(())
    }

    /// Set the permission flag, verifying the process can operate at
    /// that scope.
    pub fn set_permission_flag(&self, flag: PermissionFlag) -> Result<(), StatusCode> {
        self.inner.host.check_permission(flag)?;
        let mut state = self.inner.lock()?;
        if state.lease_busy() {
            return Err(StatusCode::LicenseExists);
        }
        state.permission_flag = flag;
        Ok(())
    }

    /// Register the renewal callback, silently replacing any previous
    /// one. Invoked once per renewal attempt with its terminal status;
    /// the host must tolerate one late invocation after a drop.
    pub fn set_floating_license_callback(
        &self,
        callback: impl Fn(StatusCode) + Send + Sync + 'static,
    ) {
        self.inner.callbacks.register(callback);
    }

    /// Set a floating-client metadata field, shown with the lease on the
    /// server dashboard.
    pub fn set_floating_client_metadata(&self, key: &str, value: &str) -> Result<(), StatusCode> {
        if key.chars().count() > 256 {
            return Err(StatusCode::MetadataKeyTooLong);
        }
        if value.chars().count() > 4096 {
            return Err(StatusCode::MetadataValueTooLong);
        }
        let mut state = self.inner.lock()?;
        if !state.client_metadata.contains_key(key)
            && state.client_metadata.len() >= self.inner.config.metadata_limit
        {
            return Err(StatusCode::MetadataLimitReached);
        }
        state.client_metadata.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Get a floating-client metadata field.
    pub fn get_floating_client_metadata(&self, key: &str) -> Result<String, StatusCode> {
        let state = self.inner.lock()?;
        if !state.lease_state.is_held() {
            return Err(StatusCode::NoLicense);
        }
        state
            .client_metadata
            .get(key)
            .cloned()
            .ok_or(StatusCode::MetadataKeyNotFound)
    }

    /// Lease a seat from the pool.
    ///
    /// # Errors
    ///
    /// `ProductIdInvalid`/`HostUrlInvalid` when identity is unset,
    /// `CallbackMissing` without a registered callback, `LicenseExists`
    /// while a lease is live, plus any transport failure.
    pub fn request_floating_license(&self) -> Result<(), StatusCode> {
        LeaseManager::acquire_online(&self.inner)
    }

    /// Lease a seat for offline use.
    ///
    /// # Errors
    ///
    /// Everything `request_floating_license` can fail with except
    /// `CallbackMissing`, plus `OfflineNotAllowed`,
    /// `MaxOfflineDurationExceeded`, `OfflineClientsLimitReached`,
    /// `FingerprintUnavailable` and `InsufficientSystemPermission`.
    pub fn request_offline_floating_license(&self, duration_secs: u64) -> Result<(), StatusCode> {
        LeaseManager::acquire_offline(&self.inner, duration_secs)
    }

    /// Release the seat. No-op success when nothing is held.
    ///
    /// # Errors
    ///
    /// A network failure during the online release is reported even
    /// though local state is cleared regardless, so the host can
    /// distinguish a confirmed from an assumed release.
    pub fn drop_floating_license(&self) -> Result<(), StatusCode> {
        self.inner.drop_lease()
    }

    /// Check whether a seat is currently held (`Active` or `Renewing`).
    #[must_use]
    pub fn has_floating_license(&self) -> bool {
        self.inner
            .lock()
            .map(|state| state.lease_state.is_held())
            .unwrap_or(false)
    }

    /// Mode of the held lease.
    pub fn get_floating_license_mode(&self) -> Result<LeaseMode, StatusCode> {
        let state = self.inner.lock()?;
        match &state.lease {
            Some(lease) if state.lease_state.is_held() => Ok(lease.mode),
            _ => Err(StatusCode::NoLicense),
        }
    }

    /// Expiry timestamp of the held lease.
    pub fn get_lease_expiry_date(&self) -> Result<SystemTime, StatusCode> {
        let state = self.inner.lock()?;
        match &state.lease {
            Some(lease) if state.lease_state.is_held() => Ok(lease.expires_at),
            _ => Err(StatusCode::NoLicense),
        }
    }

    /// Current uses of a floating-client meter attribute.
    pub fn get_floating_client_meter_attribute_uses(&self, name: &str) -> Result<u64, StatusCode> {
        let state = self.inner.lock()?;
        if !state.lease_state.is_held() {
            return Err(StatusCode::NoLicense);
        }
        state
            .meters
            .get(name)
            .map(|attr| attr.total_uses)
            .ok_or(StatusCode::MeterAttributeNotFound)
    }

    /// Increment a meter attribute's uses, recording them server-side.
    ///
    /// Local state is mutated only after the server acknowledges; the
    /// attribute is left unchanged on rejection.
    pub fn increment_floating_client_meter_attribute_uses(
        &self,
        name: &str,
        increment: u64,
    ) -> Result<u64, StatusCode> {
        let (identity, token) = {
            let state = self.inner.lock()?;
            if !state.lease_state.is_held() {
                return Err(StatusCode::NoLicense);
            }
            let attr = state
                .meters
                .get(name)
                .ok_or(StatusCode::MeterAttributeNotFound)?;
            if attr.would_exceed(increment) {
                return Err(StatusCode::MeterAttributeLimitReached);
            }
            let identity = state.identity()?;
            let token = state.lease_token.clone().ok_or(StatusCode::NoLicense)?;
            (identity, token)
        };
        self.inner.transport.record_meter_uses(
            &identity,
            &token,
            name,
            MeterDelta::Increment(increment),
        )?;
        self.inner.lock()?.meters.increment(name, increment)
    }

    /// Decrement a meter attribute's uses, clamping at zero.
    ///
    /// A decrement beyond the current uses resets them to 0 and still
    /// succeeds.
    pub fn decrement_floating_client_meter_attribute_uses(
        &self,
        name: &str,
        decrement: u64,
    ) -> Result<u64, StatusCode> {
        let (identity, token) = {
            let state = self.inner.lock()?;
            if !state.lease_state.is_held() {
                return Err(StatusCode::NoLicense);
            }
            if state.meters.get(name).is_none() {
                return Err(StatusCode::MeterAttributeNotFound);
            }
            let identity = state.identity()?;
            let token = state.lease_token.clone().ok_or(StatusCode::NoLicense)?;
            (identity, token)
        };
        self.inner.transport.record_meter_uses(
            &identity,
            &token,
            name,
            MeterDelta::Decrement(decrement),
        )?;
        self.inner.lock()?.meters.decrement(name, decrement)
    }

    /// Reset a meter attribute's uses to zero.
    pub fn reset_floating_client_meter_attribute_uses(
        &self,
        name: &str,
    ) -> Result<(), StatusCode> {
        let (identity, token) = {
            let state = self.inner.lock()?;
            if !state.lease_state.is_held() {
                return Err(StatusCode::NoLicense);
            }
            if state.meters.get(name).is_none() {
                return Err(StatusCode::MeterAttributeNotFound);
            }
            let identity = state.identity()?;
            let token = state.lease_token.clone().ok_or(StatusCode::NoLicense)?;
            (identity, token)
        };
        self.inner
            .transport
            .record_meter_uses(&identity, &token, name, MeterDelta::Reset)?;
        self.inner.lock()?.meters.reset(name)
    }

    /// A meter attribute of the server license (allowed, total and gross
    /// uses).
    pub fn get_host_license_meter_attribute(
        &self,
        name: &str,
    ) -> Result<MeterAttribute, StatusCode> {
        let identity = self.inner.held_identity()?;
        self.inner
            .transport
            .license_meter_attribute(&identity, name)?
            .ok_or(StatusCode::MeterAttributeNotFound)
    }

    /// A metadata field of the server license.
    ///
    /// Served from the last-known-good cache when the server is
    /// unreachable.
    pub fn get_host_license_metadata(&self, key: &str) -> Result<String, StatusCode> {
        let identity = self.inner.held_identity()?;
        match self.inner.transport.license_metadata(&identity) {
            Ok(metadata) => {
                let value = metadata.get(key).cloned();
                self.inner.lock()?.entitlements.store_license_metadata(metadata);
                value.ok_or(StatusCode::MetadataKeyNotFound)
            },
            Err(status) if status.is_transient() => {
                debug!(status = %status, "serving license metadata from cache");
                let state = self.inner.lock()?;
                match state.entitlements.license_metadata() {
                    Some(metadata) => metadata
                        .get(key)
                        .cloned()
                        .ok_or(StatusCode::MetadataKeyNotFound),
                    None => Err(status),
                }
            },
            Err(status) => Err(status),
        }
    }

    /// Expiry timestamp of the server license itself.
    pub fn get_host_license_expiry_date(&self) -> Result<SystemTime, StatusCode> {
        let identity = self.inner.held_identity()?;
        match self.inner.transport.license_expiry(&identity) {
            Ok(expiry) => {
                self.inner.lock()?.entitlements.store_license_expiry(expiry);
                Ok(expiry)
            },
            Err(status) if status.is_transient() => self
                .inner
                .lock()?
                .entitlements
                .license_expiry()
                .ok_or(status),
            Err(status) => Err(status),
        }
    }

    /// The entitlement set linked to the server license.
    pub fn get_host_license_entitlement_set(&self) -> Result<EntitlementSet, StatusCode> {
        let identity = self.inner.held_identity()?;
        match self.inner.transport.entitlement_set(&identity) {
            Ok(Some(set)) => {
                self.inner.lock()?.entitlements.store_entitlement_set(set.clone());
                Ok(set)
            },
            Ok(None) => Err(StatusCode::EntitlementSetNotLinked),
            Err(status) if status.is_transient() => self
                .inner
                .lock()?
                .entitlements
                .entitlement_set()
                .cloned()
                .ok_or(status),
            Err(status) => Err(status),
        }
    }

    /// All feature entitlements of the server license.
    pub fn get_host_feature_entitlements(&self) -> Result<Vec<FeatureEntitlement>, StatusCode> {
        let identity = self.inner.held_identity()?;
        match self.inner.transport.feature_entitlements(&identity) {
            Ok(entitlements) => {
                self.inner
                    .lock()?
                    .entitlements
                    .store_feature_entitlements(entitlements.clone());
                Ok(entitlements)
            },
            Err(status) if status.is_transient() => {
                let state = self.inner.lock()?;
                match state.entitlements.feature_entitlements() {
                    Some(cached) => Ok(cached.to_vec()),
                    None => Err(status),
                }
            },
            Err(status) => Err(status),
        }
    }

    /// A single feature entitlement by name.
    pub fn get_host_feature_entitlement(
        &self,
        name: &str,
    ) -> Result<FeatureEntitlement, StatusCode> {
        self.get_host_feature_entitlements()?
            .into_iter()
            .find(|entitlement| entitlement.feature_name == name)
            .ok_or(StatusCode::FeatureEntitlementNotFound)
    }

    /// The product version linked to the server license.
    pub fn get_host_product_version(&self) -> Result<ProductVersion, StatusCode> {
        let identity = self.inner.held_identity()?;
        match self.inner.transport.product_version(&identity) {
            Ok(Some(version)) => {
                self.inner
                    .lock()?
                    .entitlements
                    .store_product_version(version.clone());
                Ok(version)
            },
            Ok(None) => Err(StatusCode::ProductVersionNotLinked),
            Err(status) if status.is_transient() => self
                .inner
                .lock()?
                .entitlements
                .product_version()
                .cloned()
                .ok_or(status),
            Err(status) => Err(status),
        }
    }

    /// A feature flag of the linked product version.
    pub fn get_host_product_version_feature_flag(
        &self,
        name: &str,
    ) -> Result<FeatureFlag, StatusCode> {
        self.get_host_product_version()?
            .feature_flag(name)
            .cloned()
            .ok_or(StatusCode::FeatureFlagNotFound)
    }

    /// The host configuration. Works before any lease is acquired (it is
    /// consulted when deciding an offline duration), requiring only
    /// product id and host url.
    pub fn get_host_config(&self) -> Result<HostConfig, StatusCode> {
        let identity = self.inner.lock()?.identity()?;
        match self.inner.transport.host_config(&identity) {
            Ok(Some(config)) => {
                self.inner.lock()?.entitlements.store_host_config(config);
                Ok(config)
            },
            Ok(None) => Err(StatusCode::Fail),
            Err(status) if status.is_transient() => self
                .inner
                .lock()?
                .entitlements
                .host_config()
                .ok_or(status),
            Err(status) => Err(status),
        }
    }

    /// Version of this library.
    #[must_use]
    pub fn library_version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

impl std::fmt::Debug for FloatingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        let lease_state = state.as_ref().map(|s| s.lease_state).ok();
        f.debug_struct("FloatingClient")
            .field("lease_state", &lease_state)
            .finish()
    }
}
