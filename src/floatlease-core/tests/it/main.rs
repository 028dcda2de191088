//! Consolidated integration tests for floatlease-core.
//!
//! One external test binary keeps the renewal-timer tests from
//! competing for threads across multiple compiled test crates.
//! See: https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

use floatlease_core::{
    ClientConfig, FloatingClient, InMemoryServer, NullStore, StaticHostRuntime, StatusCode,
};

mod entitlements;
mod lifecycle;
mod metering;

/// Short intervals so renewal paths run inside a test's lifetime.
fn fast_config() -> ClientConfig {
    ClientConfig {
        retry_interval: Duration::from_millis(40),
        ..ClientConfig::default()
    }
}

/// Client with fixed fingerprint and no credential persistence.
fn bare_client(server: Arc<InMemoryServer>) -> FloatingClient {
    FloatingClient::with_runtime(
        server,
        fast_config(),
        Arc::new(StaticHostRuntime::new("it-fingerprint")),
        Arc::new(NullStore),
    )
}

/// Configured client plus a receiver of every renewal-callback status.
fn configured_client(server: Arc<InMemoryServer>) -> (FloatingClient, Receiver<StatusCode>) {
    let client = bare_client(server);
    client.set_host_product_id("P1").unwrap();
    client.set_host_url("http://localhost:8090").unwrap();
    let (tx, rx) = mpsc::channel();
    client.set_floating_license_callback(move |status| {
        let _ = tx.send(status);
    });
    (client, rx)
}
