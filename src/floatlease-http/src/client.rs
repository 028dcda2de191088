//! Blocking HTTP implementation of the [`Transport`] seam.
//!
//! One `reqwest` blocking client with connect and request timeouts;
//! every call is a single request/response exchange. Connection and
//! timeout failures surface as [`StatusCode::NetworkError`] so the
//! lease manager treats them as transient; a structured server error
//! surfaces as exactly the status code the server named.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use reqwest::blocking::{Client, RequestBuilder, Response};
use tracing::{debug, warn};

use floatlease_core::{
    EntitlementSet, FeatureEntitlement, HostConfig, LeaseGrant, LeaseIdentity, MeterAttribute,
    MeterDelta, ProductVersion, StatusCode, Transport,
};

use crate::wire::{
    time_from_unix, AcquireRequest, ErrorBody, ExpiryBody, GrantBody, MeterOp, MeterRequest,
    OfflineParams, RenewRequest,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP transport to a lease server.
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    /// Build the transport with its default timeouts.
    pub fn new() -> Result<Self, StatusCode> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("floatlease/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                warn!("http: failed to build client: {}", e);
                StatusCode::Fail
            })?;
        Ok(Self { http })
    }

    fn url(identity: &LeaseIdentity, path: &str) -> String {
        format!("{}/api/v1/{}", identity.host_url.trim_end_matches('/'), path)
    }

    /// Send a request; decode the body as `T` on success, the server's
    /// error code on failure.
    fn exchange<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, StatusCode> {
        let response = request.send().map_err(Self::network_error)?;
        let response = Self::check(response)?;
        response.json::<T>().map_err(|e| {
            warn!("http: failed to decode response body: {}", e);
            StatusCode::Fail
        })
    }

    /// Send a request expecting no body.
    fn exchange_empty(&self, request: RequestBuilder) -> Result<(), StatusCode> {
        let response = request.send().map_err(Self::network_error)?;
        Self::check(response).map(|_| ())
    }

    fn network_error(e: reqwest::Error) -> StatusCode {
        warn!("http: request failed: {}", e);
        StatusCode::NetworkError
    }

    /// Pass 2xx through; map an error response onto the status code the
    /// server named, or `Fail` when the body is not ours.
    fn check(response: Response) -> Result<Response, StatusCode> {
        let http_status = response.status();
        if http_status.is_success() {
            return Ok(response);
        }
        match response.json::<ErrorBody>() {
            Ok(body) => {
                debug!(
                    code = %body.code,
                    message = %body.message,
                    "http: server rejected request"
                );
                Err(body.code)
            },
            Err(e) => {
                warn!(
                    http_status = http_status.as_u16(),
                    "http: unstructured error response: {}", e
                );
                Err(StatusCode::Fail)
            },
        }
    }
}

impl Transport for HttpTransport {
    fn request_lease(
        &self,
        identity: &LeaseIdentity,
        client_metadata: &HashMap<String, String>,
    ) -> Result<LeaseGrant, StatusCode> {
        let body = AcquireRequest {
            product_id: &identity.product_id,
            client_metadata,
            offline: None,
        };
        let grant: GrantBody =
            self.exchange(self.http.post(Self::url(identity, "leases")).json(&body))?;
        Ok(grant.into())
    }

    fn request_offline_lease(
        &self,
        identity: &LeaseIdentity,
        duration: Duration,
        fingerprint: &str,
        client_metadata: &HashMap<String, String>,
    ) -> Result<LeaseGrant, StatusCode> {
        let body = AcquireRequest {
            product_id: &identity.product_id,
            client_metadata,
            offline: Some(OfflineParams {
                duration_secs: duration.as_secs(),
                fingerprint,
            }),
        };
        let grant: GrantBody =
            self.exchange(self.http.post(Self::url(identity, "leases")).json(&body))?;
        Ok(grant.into())
    }

    fn renew_lease(
        &self,
        identity: &LeaseIdentity,
        lease_token: &str,
    ) -> Result<LeaseGrant, StatusCode> {
        let body = RenewRequest {
            product_id: &identity.product_id,
        };
        let url = Self::url(identity, &format!("leases/{lease_token}/renew"));
        let grant: GrantBody = self.exchange(self.http.post(url).json(&body))?;
        Ok(grant.into())
    }

    fn drop_lease(&self, identity: &LeaseIdentity, lease_token: &str) -> Result<(), StatusCode> {
        let url = Self::url(identity, &format!("leases/{lease_token}"));
        self.exchange_empty(
            self.http
                .delete(url)
                .query(&[("product_id", identity.product_id.as_str())]),
        )
    }

    fn host_config(&self, identity: &LeaseIdentity) -> Result<Option<HostConfig>, StatusCode> {
        let url = Self::url(
            identity,
            &format!("products/{}/host-config", identity.product_id),
        );
        self.exchange(self.http.get(url))
    }

    fn entitlement_set(
        &self,
        identity: &LeaseIdentity,
    ) -> Result<Option<EntitlementSet>, StatusCode> {
        let url = Self::url(
            identity,
            &format!("products/{}/entitlement-set", identity.product_id),
        );
        self.exchange(self.http.get(url))
    }

    fn feature_entitlements(
        &self,
        identity: &LeaseIdentity,
    ) -> Result<Vec<FeatureEntitlement>, StatusCode> {
        let url = Self::url(
            identity,
            &format!("products/{}/feature-entitlements", identity.product_id),
        );
        self.exchange(self.http.get(url))
    }

    fn product_version(
        &self,
        identity: &LeaseIdentity,
    ) -> Result<Option<ProductVersion>, StatusCode> {
        let url = Self::url(
            identity,
            &format!("products/{}/product-version", identity.product_id),
        );
        self.exchange(self.http.get(url))
    }

    fn license_metadata(
        &self,
        identity: &LeaseIdentity,
    ) -> Result<HashMap<String, String>, StatusCode> {
        let url = Self::url(
            identity,
            &format!("products/{}/metadata", identity.product_id),
        );
        self.exchange(self.http.get(url))
    }

    fn license_expiry(&self, identity: &LeaseIdentity) -> Result<SystemTime, StatusCode> {
        let url = Self::url(
            identity,
            &format!("products/{}/expiry", identity.product_id),
        );
        let body: ExpiryBody = self.exchange(self.http.get(url))?;
        Ok(time_from_unix(body.expires_at))
    }

    fn license_meter_attribute(
        &self,
        identity: &LeaseIdentity,
        name: &str,
    ) -> Result<Option<MeterAttribute>, StatusCode> {
        let url = Self::url(
            identity,
            &format!("products/{}/meter-attributes/{name}", identity.product_id),
        );
        self.exchange(self.http.get(url))
    }

    fn record_meter_uses(
        &self,
        identity: &LeaseIdentity,
        lease_token: &str,
        name: &str,
        delta: MeterDelta,
    ) -> Result<(), StatusCode> {
        let (op, amount) = match delta {
            MeterDelta::Increment(n) => (MeterOp::Increment, n),
            MeterDelta::Decrement(n) => (MeterOp::Decrement, n),
            MeterDelta::Reset => (MeterOp::Reset, 0),
        };
        let body = MeterRequest { op, amount };
        let url = Self::url(identity, &format!("leases/{lease_token}/meter/{name}"));
        self.exchange_empty(self.http.post(url).json(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floatlease_core::PermissionFlag;

    fn identity() -> LeaseIdentity {
        LeaseIdentity::new(
            "P1".to_string(),
            "http://localhost:8090/".to_string(),
            PermissionFlag::User,
        )
        .unwrap()
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        assert_eq!(
            HttpTransport::url(&identity(), "leases"),
            "http://localhost:8090/api/v1/leases"
        );
    }

    #[test]
    fn test_unreachable_server_is_network_error() {
        let transport = HttpTransport::new().unwrap();
        // Port 1 on loopback refuses the connection immediately.
        let identity = LeaseIdentity::new(
            "P1".to_string(),
            "http://127.0.0.1:1".to_string(),
            PermissionFlag::User,
        )
        .unwrap();
        let err = transport
            .drop_lease(&identity, "tok")
            .unwrap_err();
        assert_eq!(err, StatusCode::NetworkError);
    }
}
