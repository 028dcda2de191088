//! Metering against a held lease: server-acknowledged increments,
//! clamped decrements, resets.

use std::sync::Arc;

use floatlease_core::{InMemoryServer, MeterAttribute, StatusCode};

use crate::configured_client;

fn metered_server() -> Arc<InMemoryServer> {
    Arc::new(
        InMemoryServer::new()
            .with_meter_attribute(MeterAttribute::bounded("report", 5))
            .with_meter_attribute(MeterAttribute::unlimited("api-call")),
    )
}

#[test]
fn test_meters_seeded_from_grant() {
    let (client, _rx) = configured_client(metered_server());
    client.request_floating_license().unwrap();

    assert_eq!(
        client
            .get_floating_client_meter_attribute_uses("report")
            .unwrap(),
        0
    );
    assert_eq!(
        client
            .get_floating_client_meter_attribute_uses("api-call")
            .unwrap(),
        0
    );
}

#[test]
fn test_increment_recorded_on_server() {
    let server = metered_server();
    let (client, _rx) = configured_client(server.clone());
    client.request_floating_license().unwrap();

    assert_eq!(
        client
            .increment_floating_client_meter_attribute_uses("report", 3)
            .unwrap(),
        3
    );
    let server_view = server.meter_attribute("report").unwrap();
    assert_eq!(server_view.total_uses, 3);
    assert_eq!(server_view.gross_uses, 3);
}

#[test]
fn test_increment_over_quota_leaves_state_untouched() {
    let server = metered_server();
    let (client, _rx) = configured_client(server.clone());
    client.request_floating_license().unwrap();

    client
        .increment_floating_client_meter_attribute_uses("report", 4)
        .unwrap();
    assert_eq!(
        client
            .increment_floating_client_meter_attribute_uses("report", 2)
            .unwrap_err(),
        StatusCode::MeterAttributeLimitReached
    );
    // Neither side moved: no partial increment.
    assert_eq!(
        client
            .get_floating_client_meter_attribute_uses("report")
            .unwrap(),
        4
    );
    assert_eq!(server.meter_attribute("report").unwrap().total_uses, 4);

    // Filling exactly to the quota is allowed.
    assert_eq!(
        client
            .increment_floating_client_meter_attribute_uses("report", 1)
            .unwrap(),
        5
    );
}

#[test]
fn test_unlimited_attribute_never_hits_quota() {
    let (client, _rx) = configured_client(metered_server());
    client.request_floating_license().unwrap();

    assert_eq!(
        client
            .increment_floating_client_meter_attribute_uses("api-call", 1_000_000)
            .unwrap(),
        1_000_000
    );
}

#[test]
fn test_decrement_clamps_at_zero() {
    let (client, _rx) = configured_client(metered_server());
    client.request_floating_license().unwrap();

    client
        .increment_floating_client_meter_attribute_uses("report", 2)
        .unwrap();
    // Over-decrement clamps to zero and still succeeds.
    assert_eq!(
        client
            .decrement_floating_client_meter_attribute_uses("report", 10)
            .unwrap(),
        0
    );
}

#[test]
fn test_reset_zeroes_uses_but_not_gross() {
    let server = metered_server();
    let (client, _rx) = configured_client(server.clone());
    client.request_floating_license().unwrap();

    client
        .increment_floating_client_meter_attribute_uses("report", 5)
        .unwrap();
    client
        .reset_floating_client_meter_attribute_uses("report")
        .unwrap();
    assert_eq!(
        client
            .get_floating_client_meter_attribute_uses("report")
            .unwrap(),
        0
    );
    // Gross uses only ever grow.
    assert_eq!(server.meter_attribute("report").unwrap().gross_uses, 5);
    // The freed quota is spendable again.
    client
        .increment_floating_client_meter_attribute_uses("report", 5)
        .unwrap();
    assert_eq!(server.meter_attribute("report").unwrap().gross_uses, 10);
}

#[test]
fn test_unknown_attribute_and_missing_lease() {
    let (client, _rx) = configured_client(metered_server());

    assert_eq!(
        client
            .increment_floating_client_meter_attribute_uses("report", 1)
            .unwrap_err(),
        StatusCode::NoLicense
    );

    client.request_floating_license().unwrap();
    assert_eq!(
        client
            .increment_floating_client_meter_attribute_uses("nope", 1)
            .unwrap_err(),
        StatusCode::MeterAttributeNotFound
    );
    assert_eq!(
        client
            .get_floating_client_meter_attribute_uses("nope")
            .unwrap_err(),
        StatusCode::MeterAttributeNotFound
    );
}

#[test]
fn test_host_license_meter_attribute_reflects_server() {
    let server = metered_server();
    let (client, _rx) = configured_client(server);
    client.request_floating_license().unwrap();

    client
        .increment_floating_client_meter_attribute_uses("report", 2)
        .unwrap();
    let attr = client.get_host_license_meter_attribute("report").unwrap();
    assert_eq!(attr.allowed_uses, 5);
    assert_eq!(attr.total_uses, 2);
    assert_eq!(
        client
            .get_host_license_meter_attribute("nope")
            .unwrap_err(),
        StatusCode::MeterAttributeNotFound
    );
}
