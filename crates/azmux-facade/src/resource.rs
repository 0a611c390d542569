use std::collections::BTreeMap;

use async_trait::async_trait;
use azmux_arm::{ArmClient, ResourceGroup};
use azmux_domain::{ResourceId, ResourceStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FacadeError;

/// Which status table a resource's `provisioningState` is read with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Generic,
    ResourceGroup,
    StorageAccount,
}

impl ResourceKind {
    pub fn from_type(resource_type: &str) -> Self {
        match resource_type.to_ascii_lowercase().as_str() {
            "microsoft.storage/storageaccounts" => ResourceKind::StorageAccount,
            "microsoft.resources/resourcegroups" => ResourceKind::ResourceGroup,
            _ => ResourceKind::Generic,
        }
    }

    pub fn status(&self, provisioning_state: &str) -> ResourceStatus {
        match self {
            ResourceKind::StorageAccount => match provisioning_state.to_ascii_lowercase().as_str() {
                "succeeded" => ResourceStatus::Available,
                "resolvingdns" | "creating" => ResourceStatus::Creating,
                _ => ResourceStatus::Unknown,
            },
            ResourceKind::Generic | ResourceKind::ResourceGroup => {
                ResourceStatus::from_provisioning_state(provisioning_state)
            }
        }
    }
}

// ── Contract ──────────────────────────────────────────────────────────────────

/// What every Azure entity exposes upward. Identifiers leave this layer
/// lowercased.
#[async_trait]
pub trait CloudResource: Send + Sync {
    fn id(&self) -> &ResourceId;

    fn name(&self) -> &str;

    fn kind(&self) -> ResourceKind;

    fn provisioning_state(&self) -> &str;

    fn tags(&self) -> BTreeMap<String, String>;

    fn global_id(&self) -> String {
        self.id().global_id()
    }

    fn status(&self) -> ResourceStatus {
        self.kind().status(self.provisioning_state())
    }

    /// Owning resource group, lowercased.
    fn project_id(&self) -> String {
        self.id().resource_group().unwrap_or_default()
    }

    /// Re-read the resource from ARM.
    async fn refresh(&mut self, client: &ArmClient) -> Result<(), FacadeError>;
}

#[async_trait]
impl CloudResource for ResourceGroup {
    fn id(&self) -> &ResourceId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::ResourceGroup
    }

    fn provisioning_state(&self) -> &str {
        &self.properties.provisioning_state
    }

    fn tags(&self) -> BTreeMap<String, String> {
        ResourceGroup::tags(self)
    }

    fn project_id(&self) -> String {
        self.slug()
    }

    async fn refresh(&mut self, client: &ArmClient) -> Result<(), FacadeError> {
        *self = client.get(self.id.as_str(), &[]).await?;
        Ok(())
    }
}

/// Any ARM resource read without a dedicated model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericResource {
    pub id:       ResourceId,
    #[serde(default)]
    pub name:     String,
    #[serde(rename = "type", default)]
    pub resource_type: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub tags:     Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub properties: Value,
}

#[async_trait]
impl CloudResource for GenericResource {
    fn id(&self) -> &ResourceId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::from_type(&self.resource_type)
    }

    fn provisioning_state(&self) -> &str {
        // Resource lists often leave `properties` out.
        self.properties["provisioningState"].as_str().unwrap_or("Succeeded")
    }

    fn tags(&self) -> BTreeMap<String, String> {
        self.tags.clone().unwrap_or_default()
    }

    async fn refresh(&mut self, client: &ArmClient) -> Result<(), FacadeError> {
        *self = client.get(self.id.as_str(), &[]).await?;
        Ok(())
    }
}
