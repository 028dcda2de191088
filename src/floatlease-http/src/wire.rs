//! Wire types for the lease server's JSON API.
//!
//! Timestamps travel as unix seconds; the conversion to `SystemTime`
//! happens at the boundary so the rest of the client never sees raw
//! integers. Server failures arrive as an [`ErrorBody`] whose `code`
//! field is the status-code name itself, so a decoded error maps
//! one-to-one onto [`StatusCode`].

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use floatlease_core::{EntitlementSet, LeaseGrant, MeterAttribute, StatusCode};

/// Body of `POST /api/v1/leases`.
#[derive(Debug, Serialize)]
pub struct AcquireRequest<'a> {
    /// Product the seat is requested for.
    pub product_id: &'a str,
    /// Floating-client metadata shown on the server dashboard.
    pub client_metadata: &'a HashMap<String, String>,
    /// Present only for offline leases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline: Option<OfflineParams<'a>>,
}

/// Offline-lease parameters inside an [`AcquireRequest`].
#[derive(Debug, Serialize)]
pub struct OfflineParams<'a> {
    /// Requested lease duration in seconds.
    pub duration_secs: u64,
    /// Machine fingerprint the credential is bound to.
    pub fingerprint: &'a str,
}

/// Body of `POST /api/v1/leases/{token}/renew`.
#[derive(Debug, Serialize)]
pub struct RenewRequest<'a> {
    /// Product the seat belongs to.
    pub product_id: &'a str,
}

/// Meter operation inside a [`MeterRequest`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterOp {
    /// Add `amount` uses.
    Increment,
    /// Remove `amount` uses, clamping at zero.
    Decrement,
    /// Reset uses to zero.
    Reset,
}

/// Body of `POST /api/v1/leases/{token}/meter/{name}`.
#[derive(Debug, Serialize)]
pub struct MeterRequest {
    /// Operation to apply.
    pub op: MeterOp,
    /// Use count for increment/decrement; ignored for reset.
    pub amount: u64,
}

/// A granted (or renewed) lease as the server encodes it.
#[derive(Debug, Deserialize)]
pub struct GrantBody {
    /// Opaque token identifying the seat.
    pub lease_token: String,
    /// Server wall clock at grant time, unix seconds.
    pub server_time: i64,
    /// Lease expiry, unix seconds.
    pub expires_at: i64,
    /// Meter attributes available to this client.
    #[serde(default)]
    pub meter_attributes: Vec<MeterAttribute>,
    /// Entitlement set linked to the license, when any.
    #[serde(default)]
    pub entitlement_set: Option<EntitlementSet>,
}

impl From<GrantBody> for LeaseGrant {
    fn from(body: GrantBody) -> Self {
        LeaseGrant {
            lease_token: body.lease_token,
            server_time: time_from_unix(body.server_time),
            expires_at: time_from_unix(body.expires_at),
            meter_attributes: body.meter_attributes,
            entitlement_set: body.entitlement_set,
        }
    }
}

/// License expiry as the server encodes it.
#[derive(Debug, Deserialize)]
pub struct ExpiryBody {
    /// Unix seconds.
    pub expires_at: i64,
}

/// Server error payload, returned with a 4xx/5xx status.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    /// Status-code name, e.g. `"LicenseLimitReached"`.
    pub code: StatusCode,
    /// Human-readable detail. Logged, never interpreted.
    #[serde(default)]
    pub message: String,
}

pub(crate) fn time_from_unix(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_body_decodes_and_converts() {
        let body: GrantBody = serde_json::from_str(
            r#"{
                "lease_token": "tok-1",
                "server_time": 1700000000,
                "expires_at": 1700000300,
                "meter_attributes": [
                    {"name": "report", "allowed_uses": 10, "total_uses": 2, "gross_uses": 7}
                ]
            }"#,
        )
        .unwrap();
        let grant = LeaseGrant::from(body);
        assert_eq!(grant.lease_token, "tok-1");
        assert_eq!(grant.duration(), Duration::from_secs(300));
        assert_eq!(grant.meter_attributes.len(), 1);
        assert!(grant.entitlement_set.is_none());
    }

    #[test]
    fn test_error_body_code_maps_to_status() {
        let body: ErrorBody = serde_json::from_str(
            r#"{"code": "LicenseLimitReached", "message": "pool exhausted"}"#,
        )
        .unwrap();
        assert_eq!(body.code, StatusCode::LicenseLimitReached);
    }

    #[test]
    fn test_acquire_request_omits_absent_offline_params() {
        let metadata = HashMap::new();
        let request = AcquireRequest {
            product_id: "P1",
            client_metadata: &metadata,
            offline: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("offline"));
    }

    #[test]
    fn test_meter_op_wire_names() {
        assert_eq!(
            serde_json::to_string(&MeterOp::Increment).unwrap(),
            "\"increment\""
        );
        assert_eq!(serde_json::to_string(&MeterOp::Reset).unwrap(), "\"reset\"");
    }
}
