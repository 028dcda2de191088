//! Entitlement, product-version and license-metadata getters, including
//! the last-known-good fallback during an outage.

use std::sync::Arc;

use floatlease_core::{
    EntitlementSet, FeatureEntitlement, FeatureFlag, InMemoryServer, ProductVersion, StatusCode,
};

use crate::configured_client;

fn entitled_server() -> Arc<InMemoryServer> {
    Arc::new(
        InMemoryServer::new()
            .with_entitlement_set(EntitlementSet {
                name: "pro".into(),
                display_name: "Professional".into(),
            })
            .with_feature_entitlement(FeatureEntitlement {
                feature_name: "export".into(),
                feature_display_name: "Export".into(),
                value: "enabled".into(),
            })
            .with_product_version(ProductVersion {
                name: "v2".into(),
                display_name: "Version 2".into(),
                feature_flags: vec![FeatureFlag {
                    name: "dark-mode".into(),
                    enabled: true,
                    data: String::new(),
                }],
            })
            .with_license_metadata("tier", "gold"),
    )
}

#[test]
fn test_entitlement_getters_require_lease() {
    let (client, _rx) = configured_client(entitled_server());
    assert_eq!(
        client.get_host_license_entitlement_set().unwrap_err(),
        StatusCode::NoLicense
    );
    assert_eq!(
        client.get_host_product_version().unwrap_err(),
        StatusCode::NoLicense
    );
    assert_eq!(
        client.get_host_license_metadata("tier").unwrap_err(),
        StatusCode::NoLicense
    );
}

#[test]
fn test_entitlement_getters_fetch_server_values() {
    let (client, _rx) = configured_client(entitled_server());
    client.request_floating_license().unwrap();

    assert_eq!(client.get_host_license_entitlement_set().unwrap().name, "pro");
    assert_eq!(
        client.get_host_feature_entitlement("export").unwrap().value,
        "enabled"
    );
    assert_eq!(client.get_host_product_version().unwrap().name, "v2");
    assert!(
        client
            .get_host_product_version_feature_flag("dark-mode")
            .unwrap()
            .enabled
    );
    assert_eq!(client.get_host_license_metadata("tier").unwrap(), "gold");
    assert!(client.get_host_license_expiry_date().is_ok());
}

#[test]
fn test_missing_links_report_specific_codes() {
    let (client, _rx) = configured_client(Arc::new(InMemoryServer::new()));
    client.request_floating_license().unwrap();

    assert_eq!(
        client.get_host_license_entitlement_set().unwrap_err(),
        StatusCode::EntitlementSetNotLinked
    );
    assert_eq!(
        client.get_host_product_version().unwrap_err(),
        StatusCode::ProductVersionNotLinked
    );
    assert_eq!(
        client.get_host_feature_entitlement("export").unwrap_err(),
        StatusCode::FeatureEntitlementNotFound
    );
    assert_eq!(
        client.get_host_license_metadata("tier").unwrap_err(),
        StatusCode::MetadataKeyNotFound
    );
}

#[test]
fn test_missing_flag_on_linked_version() {
    let (client, _rx) = configured_client(entitled_server());
    client.request_floating_license().unwrap();
    assert_eq!(
        client
            .get_host_product_version_feature_flag("nope")
            .unwrap_err(),
        StatusCode::FeatureFlagNotFound
    );
}

#[test]
fn test_outage_serves_cached_entitlements() {
    let server = entitled_server();
    let (client, _rx) = configured_client(server.clone());
    client.request_floating_license().unwrap();

    // Prime the cache, then cut the network.
    client.get_host_feature_entitlements().unwrap();
    client.get_host_product_version().unwrap();
    client.get_host_license_metadata("tier").unwrap();
    client.get_host_license_expiry_date().unwrap();
    server.set_network_down(true);

    assert_eq!(
        client.get_host_feature_entitlement("export").unwrap().value,
        "enabled"
    );
    assert_eq!(client.get_host_product_version().unwrap().name, "v2");
    assert_eq!(client.get_host_license_metadata("tier").unwrap(), "gold");
    assert!(client.get_host_license_expiry_date().is_ok());
    // The entitlement set came with the grant, so it is cached too.
    assert_eq!(client.get_host_license_entitlement_set().unwrap().name, "pro");
}

#[test]
fn test_outage_without_cache_is_a_network_error() {
    let server = Arc::new(InMemoryServer::new().with_license_metadata("tier", "gold"));
    let (client, _rx) = configured_client(server.clone());
    client.request_floating_license().unwrap();
    server.set_network_down(true);

    assert_eq!(
        client.get_host_license_metadata("tier").unwrap_err(),
        StatusCode::NetworkError
    );
    assert_eq!(
        client.get_host_product_version().unwrap_err(),
        StatusCode::NetworkError
    );
}

#[test]
fn test_client_metadata_round_trip() {
    let (client, _rx) = configured_client(Arc::new(InMemoryServer::new()));
    client.set_floating_client_metadata("session", "it").unwrap();
    client.request_floating_license().unwrap();

    assert_eq!(
        client.get_floating_client_metadata("session").unwrap(),
        "it"
    );
    assert_eq!(
        client.get_floating_client_metadata("nope").unwrap_err(),
        StatusCode::MetadataKeyNotFound
    );
}
