//! Lease lifecycle: acquire, renew, expire, drop.

use std::sync::Arc;
use std::time::Duration;

use floatlease_core::{
    EncryptedFileStore, FloatingClient, InMemoryServer, LeaseMode, StaticHostRuntime, StatusCode,
};

use crate::{bare_client, configured_client, fast_config};

const CALLBACK_WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_acquire_hold_drop_cycle() {
    let server = Arc::new(InMemoryServer::new());
    let (client, _rx) = configured_client(server.clone());

    client.request_floating_license().unwrap();
    assert!(client.has_floating_license());
    assert_eq!(client.get_floating_license_mode().unwrap(), LeaseMode::Online);
    assert!(client.get_lease_expiry_date().is_ok());
    assert_eq!(server.leased_seats(), 1);

    // A second acquire on the same client must not take a second seat.
    assert_eq!(
        client.request_floating_license().unwrap_err(),
        StatusCode::LicenseExists
    );
    assert_eq!(server.leased_seats(), 1);

    client.drop_floating_license().unwrap();
    assert!(!client.has_floating_license());
    assert_eq!(server.leased_seats(), 0);

    // Dropping again is a no-op success.
    client.drop_floating_license().unwrap();

    // The cycle can start over.
    client.request_floating_license().unwrap();
    assert!(client.has_floating_license());
    client.drop_floating_license().unwrap();
}

#[test]
fn test_seat_pool_exhaustion_and_refill() {
    let server = Arc::new(InMemoryServer::new().with_seat_limit(1));
    let (first, _rx1) = configured_client(server.clone());
    let (second, _rx2) = configured_client(server.clone());

    first.request_floating_license().unwrap();
    assert_eq!(
        second.request_floating_license().unwrap_err(),
        StatusCode::LicenseLimitReached
    );
    // The failed acquire leaves the second client able to retry.
    first.drop_floating_license().unwrap();
    second.request_floating_license().unwrap();
    second.drop_floating_license().unwrap();
}

#[test]
fn test_background_renewal_extends_lease() {
    let server = Arc::new(
        InMemoryServer::new().with_lease_duration(Duration::from_millis(400)),
    );
    let (client, rx) = configured_client(server.clone());

    client.request_floating_license().unwrap();
    let first_expiry = client.get_lease_expiry_date().unwrap();

    let status = rx.recv_timeout(CALLBACK_WAIT).unwrap();
    assert_eq!(status, StatusCode::Ok);
    assert!(client.has_floating_license());
    let renewed_expiry = client.get_lease_expiry_date().unwrap();
    assert!(renewed_expiry > first_expiry);

    client.drop_floating_license().unwrap();
}

#[test]
fn test_transient_renewal_failure_keeps_lease() {
    let server = Arc::new(
        InMemoryServer::new().with_lease_duration(Duration::from_secs(2)),
    );
    let (client, rx) = configured_client(server.clone());

    client.request_floating_license().unwrap();
    server.fail_next_renewals([StatusCode::NetworkError]);

    assert_eq!(
        rx.recv_timeout(CALLBACK_WAIT).unwrap(),
        StatusCode::NetworkError
    );
    // Still inside the lease window: the seat is kept and retried.
    assert!(client.has_floating_license());

    assert_eq!(rx.recv_timeout(CALLBACK_WAIT).unwrap(), StatusCode::Ok);
    assert!(client.has_floating_license());

    client.drop_floating_license().unwrap();
}

#[test]
fn test_fatal_renewal_failure_expires_lease() {
    let server = Arc::new(
        InMemoryServer::new().with_lease_duration(Duration::from_millis(400)),
    );
    let (client, rx) = configured_client(server.clone());

    client.request_floating_license().unwrap();
    server.fail_next_renewals([StatusCode::LicenseNotFound]);

    assert_eq!(
        rx.recv_timeout(CALLBACK_WAIT).unwrap(),
        StatusCode::LicenseNotFound
    );
    assert!(!client.has_floating_license());
    assert_eq!(
        client.get_floating_license_mode().unwrap_err(),
        StatusCode::NoLicense
    );

    // Drop of an expired lease succeeds locally.
    client.drop_floating_license().unwrap();
    client.request_floating_license().unwrap();
    client.drop_floating_license().unwrap();
}

#[test]
fn test_outage_past_expiry_reports_network_expiry() {
    let server = Arc::new(
        InMemoryServer::new().with_lease_duration(Duration::from_millis(300)),
    );
    let (client, rx) = configured_client(server.clone());

    client.request_floating_license().unwrap();
    server.set_network_down(true);

    // Retries report NetworkError until the lease itself lapses.
    let mut saw_final = false;
    for _ in 0..200 {
        match rx.recv_timeout(CALLBACK_WAIT).unwrap() {
            StatusCode::NetworkError => continue,
            StatusCode::LicenseExpiredDueToNetwork => {
                saw_final = true;
                break;
            },
            other => panic!("unexpected renewal status: {other}"),
        }
    }
    assert!(saw_final);
    assert!(!client.has_floating_license());
}

#[test]
fn test_no_callback_after_drop() {
    let server = Arc::new(
        InMemoryServer::new().with_lease_duration(Duration::from_millis(300)),
    );
    let (client, rx) = configured_client(server);

    client.request_floating_license().unwrap();
    client.drop_floating_license().unwrap();

    // The renewal slot was cleared under the drop; nothing may fire.
    assert!(rx.recv_timeout(Duration::from_millis(600)).is_err());
}

#[test]
fn test_drop_during_outage_clears_local_state() {
    let server = Arc::new(InMemoryServer::new());
    let (client, _rx) = configured_client(server.clone());

    client.request_floating_license().unwrap();
    server.set_network_down(true);

    assert_eq!(
        client.drop_floating_license().unwrap_err(),
        StatusCode::NetworkError
    );
    // The local lease is gone even though the release never reached the
    // server; identity becomes mutable again.
    assert!(!client.has_floating_license());
    client.set_host_product_id("P2").unwrap();
}

#[test]
fn test_offline_lease_persists_and_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let server = Arc::new(InMemoryServer::new().with_offline(3600, 5));
    let runtime = Arc::new(StaticHostRuntime::new("it-fingerprint"));

    let client = FloatingClient::with_runtime(
        server.clone(),
        fast_config(),
        runtime.clone(),
        Arc::new(EncryptedFileStore::new(dir.path())),
    );
    client.set_host_product_id("P1").unwrap();
    client.set_host_url("http://localhost:8090").unwrap();
    client.request_offline_floating_license(600).unwrap();
    assert_eq!(
        client.get_floating_license_mode().unwrap(),
        LeaseMode::Offline
    );
    drop(client);

    // A fresh process resumes the persisted credential without the
    // server being reachable.
    server.set_network_down(true);
    let resumed = FloatingClient::with_runtime(
        server.clone(),
        fast_config(),
        runtime,
        Arc::new(EncryptedFileStore::new(dir.path())),
    );
    resumed.set_host_product_id("P1").unwrap();
    resumed.set_host_url("http://localhost:8090").unwrap();
    resumed.request_offline_floating_license(600).unwrap();
    assert_eq!(
        resumed.get_floating_license_mode().unwrap(),
        LeaseMode::Offline
    );
}

#[test]
fn test_offline_drop_removes_credential() {
    let dir = tempfile::tempdir().unwrap();
    let server = Arc::new(InMemoryServer::new().with_offline(3600, 5));
    let runtime = Arc::new(StaticHostRuntime::new("it-fingerprint"));
    let make_client = || {
        let client = FloatingClient::with_runtime(
            server.clone(),
            fast_config(),
            runtime.clone(),
            Arc::new(EncryptedFileStore::new(dir.path())),
        );
        client.set_host_product_id("P1").unwrap();
        client.set_host_url("http://localhost:8090").unwrap();
        client
    };

    let client = make_client();
    client.request_offline_floating_license(600).unwrap();
    client.drop_floating_license().unwrap();

    // With the credential removed and the server down, there is nothing
    // to resume.
    server.set_network_down(true);
    assert_eq!(
        make_client()
            .request_offline_floating_license(600)
            .unwrap_err(),
        StatusCode::NetworkError
    );
}

#[test]
fn test_offline_duration_over_limit_refused_before_network() {
    let server = Arc::new(InMemoryServer::new().with_offline(3600, 5));
    let (client, _rx) = configured_client(server.clone());

    assert_eq!(
        client.request_offline_floating_license(7200).unwrap_err(),
        StatusCode::MaxOfflineDurationExceeded
    );
    assert_eq!(server.leased_seats(), 0);

    // The refused acquire rolled back; an online acquire still works.
    client.request_floating_license().unwrap();
    client.drop_floating_license().unwrap();
}

#[test]
fn test_offline_refused_when_server_denies_it() {
    let server = Arc::new(InMemoryServer::new().deny_offline());
    let client = bare_client(server);
    client.set_host_product_id("P1").unwrap();
    client.set_host_url("http://localhost:8090").unwrap();

    // Absent offline configuration means no offline leasing at all.
    let err = client.request_offline_floating_license(60).unwrap_err();
    assert_eq!(err, StatusCode::OfflineNotAllowed);
    assert!(!client.has_floating_license());
}
