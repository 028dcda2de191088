//! Status codes returned by every public floating-license operation.
//!
//! Every operation on [`FloatingClient`](crate::FloatingClient) reports its
//! outcome as a [`StatusCode`], either as the `Err` side of a `Result` or,
//! for background renewal attempts, as the argument of the registered
//! renewal callback. No other error type crosses the public boundary.
//!
//! The taxonomy is closed: downstream code is expected to match on it
//! exhaustively, so variants are never added in patch releases.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of a floating-license operation.
///
/// `Ok` only ever reaches host code through the renewal callback; fallible
/// operations return `Result` and never construct `Err(StatusCode::Ok)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum StatusCode {
    /// Success.
    #[error("success")]
    Ok,

    /// General failure.
    #[error("general failure")]
    Fail,

    /// The product id is missing or incorrect.
    #[error("the product id is missing or incorrect")]
    ProductIdInvalid,

    /// Invalid or missing renewal callback.
    #[error("invalid or missing renewal callback")]
    CallbackMissing,

    /// Missing or invalid lease server url.
    #[error("missing or invalid lease server url")]
    HostUrlInvalid,

    /// The permission flag is not valid for this host.
    #[error("invalid permission flag")]
    InvalidPermissionFlag,

    /// Local and server clocks diverge beyond tolerance.
    #[error("system date and time settings appear to be tampered")]
    TimeTampered,

    /// Failed to reach the lease server due to a network error.
    #[error("failed to connect to the lease server due to a network error")]
    NetworkError,

    /// No license has been leased yet.
    #[error("no license has been leased yet")]
    NoLicense,

    /// A license has already been leased.
    #[error("a license has already been leased")]
    LicenseExists,

    /// The license does not exist on the server or has already expired.
    #[error("license does not exist on the server or has already expired")]
    LicenseNotFound,

    /// The lease expired because renewal kept failing with network errors.
    #[error("license lease has expired due to a network error")]
    LicenseExpiredDueToNetwork,

    /// The server has reached its allowed limit of floating licenses.
    #[error("the server has reached its allowed limit of floating licenses")]
    LicenseLimitReached,

    /// The buffer size was smaller than required.
    ///
    /// Carried for taxonomy compatibility; never produced by this
    /// implementation, which has no fixed-size marshalling buffers.
    #[error("the buffer size was smaller than required")]
    BufferTooSmall,

    /// The metadata key does not exist.
    #[error("the metadata key does not exist")]
    MetadataKeyNotFound,

    /// Metadata key length is more than 256 characters.
    #[error("metadata key length is more than 256 characters")]
    MetadataKeyTooLong,

    /// Metadata value length is more than 4096 characters.
    #[error("metadata value length is more than 4096 characters")]
    MetadataValueTooLong,

    /// The floating client has reached its metadata fields limit.
    #[error("the floating client has reached its metadata fields limit")]
    MetadataLimitReached,

    /// The meter attribute does not exist.
    #[error("the meter attribute does not exist")]
    MeterAttributeNotFound,

    /// The meter attribute has reached its usage limit.
    #[error("the meter attribute has reached its usage limit")]
    MeterAttributeLimitReached,

    /// No entitlement set is linked to the server license.
    #[error("no entitlement set is linked to the server license")]
    EntitlementSetNotLinked,

    /// The feature entitlement does not exist.
    #[error("the feature entitlement does not exist")]
    FeatureEntitlementNotFound,

    /// The feature flag does not exist.
    #[error("the feature flag does not exist")]
    FeatureFlagNotFound,

    /// No product version is linked to the server license.
    #[error("no product version is linked to the server license")]
    ProductVersionNotLinked,

    /// Offline floating licenses are not allowed by the leasing strategy.
    #[error("offline floating licenses are not allowed")]
    OfflineNotAllowed,

    /// The requested duration exceeds the configured offline maximum.
    #[error("the requested lease duration exceeds the maximum offline lease duration")]
    MaxOfflineDurationExceeded,

    /// The server has reached its allowed limit of offline clients.
    #[error("the server has reached its allowed limit of offline floating clients")]
    OfflineClientsLimitReached,

    /// The machine fingerprint could not be computed.
    #[error("the machine fingerprint could not be computed")]
    FingerprintUnavailable,

    /// The machine fingerprint changed since the lease was issued.
    #[error("the machine fingerprint has changed since the lease was issued")]
    MachineFingerprintChanged,

    /// The request was routed through an untrusted proxy.
    #[error("the request was routed through an untrusted proxy")]
    UntrustedProxy,

    /// Server error.
    #[error("server error")]
    ServerError,

    /// The server has not been activated using a license key.
    #[error("the server has not been activated using a license key")]
    ServerNotActivated,

    /// The server license has expired.
    #[error("the server license has expired")]
    ServerExpired,

    /// The server license has been suspended.
    #[error("the server license has been suspended")]
    ServerSuspended,

    /// The grace period for the server license is over.
    #[error("the grace period for the server license is over")]
    ServerGracePeriodOver,

    /// The process lacks the system permission required for the operation.
    #[error("insufficient system permission")]
    InsufficientSystemPermission,
}

impl StatusCode {
    /// Check if this is a transient failure the renewal loop retries on
    /// its own backoff rather than surfacing as fatal.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkError | Self::LicenseExpiredDueToNetwork)
    }

    /// Check if this failure invalidates the current lease outright.
    ///
    /// Covers integrity failures and server-health failures: once one of
    /// these is observed during renewal, the seat is considered lost and
    /// the lease transitions to `Expired`.
    #[must_use]
    pub fn is_fatal_to_lease(&self) -> bool {
        matches!(
            self,
            Self::TimeTampered
                | Self::UntrustedProxy
                | Self::MachineFingerprintChanged
                | Self::LicenseNotFound
                | Self::ServerNotActivated
                | Self::ServerExpired
                | Self::ServerSuspended
                | Self::ServerGracePeriodOver
        )
    }

    /// Check if this is a programming-usage error (never retried).
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::NoLicense | Self::LicenseExists)
    }

    /// Check if this is a quota/limit failure, terminal for the call that
    /// produced it.
    #[must_use]
    pub fn is_limit_error(&self) -> bool {
        matches!(
            self,
            Self::LicenseLimitReached
                | Self::MeterAttributeLimitReached
                | Self::MetadataLimitReached
                | Self::OfflineClientsLimitReached
        )
    }
}
