use azmux_arm::{ArmClient, ClientConfig, Environment, StaticToken};
use azmux_facade::{AzureProvider, CloudResource, FacadeError};
use azmux_domain::ResourceStatus;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> AzureProvider {
    let config = ClientConfig::new(Environment::custom(&server.uri()), "tenant", "app", "secret").subscription("S");
    AzureProvider::new(ArmClient::with_token_provider(config, Box::new(StaticToken("t".into()))))
}

fn account(name: &str, location: &str) -> serde_json::Value {
    json!({
        "id": format!("/subscriptions/S/resourceGroups/Data-RG/providers/Microsoft.Storage/storageAccounts/{}", name),
        "name": name,
        "location": location,
        "type": "Microsoft.Storage/storageAccounts",
        "kind": "StorageV2",
        "sku": {"name": "Standard_LRS"},
        "properties": {"provisioningState": "ResolvingDNS"}
    })
}

#[tokio::test]
async fn buckets_are_cached_until_invalidated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscriptions/S/providers/Microsoft.Storage/storageAccounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [
            account("alpha", "eastus"),
            account("beta", "westeurope"),
        ]})))
        .expect(2)
        .mount(&server)
        .await;

    let provider = provider(&server);
    assert_eq!(provider.buckets().await.unwrap().len(), 2);
    let west = provider.region_buckets("WestEurope").await.unwrap();
    assert_eq!(west.len(), 1);
    assert_eq!(west[0].name(), "beta");

    provider.invalidate_buckets().await;
    let alpha = provider.bucket_by_name("alpha").await.unwrap();
    assert_eq!(alpha.project_id(), "data-rg");
    assert_eq!(alpha.status(), ResourceStatus::Creating);
    assert_eq!(alpha.storage_class(), "Standard_LRS");

    let err = provider.bucket_by_name("gamma").await.unwrap_err();
    assert!(err.is_not_found(), "got: {}", err);
}

#[tokio::test]
async fn delete_bucket_refreshes_the_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscriptions/S/providers/Microsoft.Storage/storageAccounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [account("alpha", "eastus")]})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/subscriptions/S/resourceGroups/Data-RG/providers/Microsoft.Storage/storageAccounts/alpha"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server);
    provider.delete_bucket("alpha").await.unwrap();
    // Reloaded from ARM, not served from the stale cache.
    provider.buckets().await.unwrap();
}

#[tokio::test]
async fn bucket_existence_is_global_name_availability() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/subscriptions/S/providers/Microsoft.Storage/checkNameAvailability"))
        .and(body_partial_json(json!({"name": "taken"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"nameAvailable": false, "reason": "AlreadyExists"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/subscriptions/S/providers/Microsoft.Storage/checkNameAvailability"))
        .and(body_partial_json(json!({"name": "fresh"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"nameAvailable": true})))
        .mount(&server)
        .await;

    let provider = provider(&server);
    assert!(provider.is_bucket_exists("taken").await.unwrap());
    assert!(!provider.is_bucket_exists("fresh").await.unwrap());
}

#[tokio::test]
async fn storage_classes_are_distinct_sku_names() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscriptions/S/providers/Microsoft.Storage/skus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [
            {"name": "Standard_LRS", "kind": "Storage", "locations": ["eastus"]},
            {"name": "Standard_LRS", "kind": "StorageV2", "locations": ["eastus"]},
            {"name": "Premium_LRS", "kind": "StorageV2", "locations": ["eastus"]},
            {"name": "Standard_ZRS", "kind": "StorageV2", "locations": ["westus"]}
        ]})))
        .mount(&server)
        .await;

    let classes = provider(&server).storage_classes(Some("eastus")).await.unwrap();
    assert_eq!(classes, vec!["Premium_LRS".to_string(), "Standard_LRS".to_string()]);
}

#[tokio::test]
async fn unbound_provider_has_no_default_region() {
    let server = MockServer::start().await;
    let provider = provider(&server);
    let err = provider.create_project("rg1").await.unwrap_err();
    assert!(matches!(err, FacadeError::NotSupported(_)), "got: {}", err);
    assert!(provider.balance().is_err());
    assert!(provider.capabilities().contains(&"objectstore"));
}

#[tokio::test]
async fn resources_carry_provisioning_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscriptions/S/providers/Microsoft.Compute/virtualMachines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [
            {
                "id": "/subscriptions/S/resourceGroups/rg1/providers/Microsoft.Compute/virtualMachines/vm1",
                "name": "vm1",
                "type": "Microsoft.Compute/virtualMachines",
                "location": "eastus",
                "properties": {"provisioningState": "Deleting"}
            }
        ]})))
        .expect(1)
        .mount(&server)
        .await;

    let vms = provider(&server).resources("Microsoft.Compute/virtualMachines").await.unwrap();
    assert_eq!(vms.len(), 1);
    assert_eq!(vms[0].name(), "vm1");
    assert_eq!(vms[0].status(), ResourceStatus::Deleting);
}
