use std::collections::BTreeMap;

use azmux_domain::ResourceId;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::{ArmClient, ClientConfig};
use crate::error::ArmError;

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subscription_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl Subscription {
    pub fn is_enabled(&self) -> bool {
        self.state.eq_ignore_ascii_case("Enabled")
    }
}

/// An Azure location as seen from one subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    /// Short name, e.g. `eastus`.
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub subscription_id: String,
    /// `{access_env}/{name}`.
    pub global_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLocation {
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default, deserialize_with = "coordinate")]
    latitude: Option<f64>,
    #[serde(default, deserialize_with = "coordinate")]
    longitude: Option<f64>,
    #[serde(default)]
    metadata: Option<RawLocationMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLocationMetadata {
    #[serde(default, deserialize_with = "coordinate")]
    latitude: Option<f64>,
    #[serde(default, deserialize_with = "coordinate")]
    longitude: Option<f64>,
}

/// Coordinates arrive as strings in older API versions, numbers in newer.
fn coordinate<'de, D: Deserializer<'de>>(de: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceGroup {
    #[serde(default)]
    pub id: ResourceId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub properties: ResourceGroupProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupProperties {
    #[serde(default)]
    pub provisioning_state: String,
}

impl ResourceGroup {
    /// Lowercased group name; the project id of everything inside it.
    pub fn slug(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    pub fn tags(&self) -> BTreeMap<String, String> {
        self.tags.clone().unwrap_or_default()
    }
}

// ── Multiplexer ───────────────────────────────────────────────────────────────

impl ArmClient {
    /// Authenticate, bind a subscription and load its regions and groups.
    pub async fn connect(config: ClientConfig) -> Result<Self, ArmError> {
        ArmClient::new(config)?.init().await
    }

    /// Load subscriptions, bind one, list its regions and resource groups.
    ///
    /// The configured subscription wins; otherwise the first enabled one.
    pub async fn init(mut self) -> Result<Self, ArmError> {
        let subscriptions: Vec<Subscription> = self.list("subscriptions", &[]).await?;
        debug!(count = subscriptions.len(), "subscriptions listed");

        let bound = match self.subscription_id().ok().map(str::to_string) {
            Some(id) => {
                if !subscriptions.iter().any(|s| s.subscription_id.eq_ignore_ascii_case(&id)) {
                    warn!(subscription = %id, "configured subscription is not visible to this principal");
                }
                Some(id)
            }
            None => subscriptions
                .iter()
                .find(|s| s.is_enabled())
                .map(|s| s.subscription_id.clone()),
        };
        self.subscriptions = subscriptions;
        self.set_subscription(bound);

        let Ok(sub) = self.subscription_id().map(str::to_string) else {
            warn!(tenant = %self.tenant_id(), "no enabled subscription; subscription-scoped calls will fail");
            return Ok(self);
        };

        let locations: Vec<RawLocation> = self.list("locations", &[]).await?;
        let access_env = self.environment().access_env.clone();
        self.regions = locations
            .into_iter()
            .map(|loc| {
                let meta = loc.metadata.unwrap_or_default();
                Region {
                    id: loc.name.clone(),
                    global_id: format!("{}/{}", access_env, loc.name),
                    display_name: loc.display_name,
                    subscription_id: sub.clone(),
                    latitude: loc.latitude.or(meta.latitude),
                    longitude: loc.longitude.or(meta.longitude),
                    name: loc.name,
                }
            })
            .collect();

        self.refresh_resource_groups().await?;
        info!(subscription = %sub, regions = self.regions.len(), "Azure client ready");
        Ok(self)
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Region by short name; case-sensitive like the ARM location names.
    pub fn region(&self, id: &str) -> Result<&Region, ArmError> {
        self.regions.iter().find(|r| r.id == id).ok_or(ArmError::NotFound)
    }

    pub fn region_by_global_id(&self, global_id: &str) -> Result<&Region, ArmError> {
        self.regions
            .iter()
            .find(|r| r.global_id == global_id)
            .ok_or(ArmError::NotFound)
    }

    pub fn default_region(&self) -> Option<&Region> {
        self.regions.first()
    }

    /// `{tenant}/{subscription}` for every enabled subscription.
    pub fn sub_accounts(&self) -> Vec<String> {
        self.subscriptions
            .iter()
            .filter(|s| s.is_enabled())
            .map(|s| format!("{}/{}", self.tenant_id(), s.subscription_id))
            .collect()
    }

    pub fn iam_login_url(&self) -> &str {
        &self.environment().portal
    }

    pub fn access_env(&self) -> &str {
        &self.environment().access_env
    }

    pub fn account_id(&self) -> &str {
        self.tenant_id()
    }

    /// Re-read the bound subscription's resource groups into the cache.
    pub async fn refresh_resource_groups(&self) -> Result<Vec<ResourceGroup>, ArmError> {
        let groups = self.list_resource_groups().await?;
        *self.resource_groups.write().await = Some(groups.clone());
        Ok(groups)
    }

    /// Cached resource groups, loaded on first use.
    pub async fn resource_groups(&self) -> Result<Vec<ResourceGroup>, ArmError> {
        if let Some(groups) = self.resource_groups.read().await.as_ref() {
            return Ok(groups.clone());
        }
        self.refresh_resource_groups().await
    }

    /// Resource groups of every enabled subscription.
    pub async fn list_projects(&self) -> Result<Vec<ResourceGroup>, ArmError> {
        let mut projects = Vec::new();
        for sub in self.subscriptions.iter().filter(|s| s.is_enabled()) {
            let mut groups: Vec<ResourceGroup> =
                self.list_in_subscription(&sub.subscription_id, "resourcegroups").await?;
            projects.append(&mut groups);
        }
        Ok(projects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lro::ManualClock;
    use crate::testing::client;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_tenant(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [
                {"subscriptionId": "D", "displayName": "disabled", "state": "Disabled"},
                {"subscriptionId": "S", "displayName": "main", "state": "Enabled"},
                {"subscriptionId": "T", "displayName": "second", "state": "Enabled"},
            ]})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/subscriptions/S/locations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [
                {"name": "eastus", "displayName": "East US", "latitude": "37.3719", "longitude": "-79.8164"},
                {"name": "westeurope", "displayName": "West Europe", "metadata": {"latitude": 52.3667, "longitude": 4.9}},
            ]})))
            .mount(server)
            .await;
        for (sub, rg) in [("S", "Prod"), ("T", "Other")] {
            Mock::given(method("GET"))
                .and(path(format!("/subscriptions/{}/resourcegroups", sub)))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [{
                    "id": format!("/subscriptions/{}/resourceGroups/{}", sub, rg),
                    "name": rg,
                    "location": "eastus",
                    "tags": null,
                    "properties": {"provisioningState": "Succeeded"},
                }]})))
                .mount(server)
                .await;
        }
    }

    #[tokio::test]
    async fn init_binds_first_enabled_subscription() {
        let server = MockServer::start().await;
        mount_tenant(&server).await;

        let mut c = client(&server, Arc::new(ManualClock::new()));
        c.set_subscription(None);
        let c = c.init().await.unwrap();

        assert_eq!(c.subscription_id().unwrap(), "S");
        assert_eq!(c.regions().len(), 2);
        let east = c.region("eastus").unwrap();
        assert_eq!(east.subscription_id, "S");
        assert_eq!(east.latitude, Some(37.3719));
        assert_eq!(c.region("westeurope").unwrap().longitude, Some(4.9));
        assert!(c.region("EastUS").is_err());
        assert_eq!(c.region_by_global_id("Azure/westeurope").unwrap().display_name, "West Europe");
        assert_eq!(c.sub_accounts(), vec!["tenant/S".to_string(), "tenant/T".to_string()]);

        let groups = c.resource_groups().await.unwrap();
        assert_eq!(groups[0].slug(), "prod");
        assert!(groups[0].tags().is_empty());
    }

    #[tokio::test]
    async fn projects_span_enabled_subscriptions() {
        let server = MockServer::start().await;
        mount_tenant(&server).await;

        let c = client(&server, Arc::new(ManualClock::new())).init().await.unwrap();
        let projects = c.list_projects().await.unwrap();
        let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Prod", "Other"]);
        assert_eq!(projects[1].id.subscription_id(), Some("T"));
    }

    #[tokio::test]
    async fn tenant_without_subscriptions_still_connects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(&server)
            .await;

        let mut c = client(&server, Arc::new(ManualClock::new()));
        c.set_subscription(None);
        let c = c.init().await.unwrap();
        assert!(c.regions().is_empty());
        assert!(matches!(c.subscription_id(), Err(ArmError::MissingSubscription)));
        assert_eq!(c.account_id(), "tenant");
    }
}
