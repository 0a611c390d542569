use std::collections::BTreeMap;
use std::sync::Arc;

use azmux_arm::{ArmClient, ArmError};
use azmux_domain::ResourceId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::client::BlobClient;
use crate::error::BlobError;

pub const STORAGE_NAMESPACE: &str = "Microsoft.Storage";
pub const STORAGE_ACCOUNT_TYPE: &str = "Microsoft.Storage/storageAccounts";
pub const DEFAULT_SKU: &str = "Standard_GRS";
pub const DEFAULT_KIND: &str = "Storage";
const NAME_ATTEMPTS: usize = 20;

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEndpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob:  Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file:  Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessUrl {
    pub url:         String,
    pub primary:     bool,
    pub description: String,
}

impl StorageEndpoints {
    fn access_urls(&self, prefix: &str, primary: bool) -> Vec<AccessUrl> {
        [("blob", &self.blob), ("queue", &self.queue), ("table", &self.table), ("file", &self.file)]
            .into_iter()
            .filter_map(|(kind, url)| {
                let url = url.as_deref().filter(|u| !u.is_empty())?;
                Some(AccessUrl {
                    url:         url.to_string(),
                    primary:     primary && kind == "blob",
                    description: if prefix.is_empty() { kind.to_string() } else { format!("{}-{}", prefix, kind) },
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageAccountProperties {
    #[serde(default)]
    pub provisioning_state: String,
    #[serde(default)]
    pub primary_endpoints: StorageEndpoints,
    #[serde(default)]
    pub secondary_endpoints: StorageEndpoints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_tier: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sku {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

/// A storage account as ARM returns it. The account key is fetched once and
/// cached on the value (shared between clones).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageAccount {
    pub id:       ResourceId,
    pub name:     String,
    #[serde(default)]
    pub location: String,
    #[serde(rename = "type", default)]
    pub resource_type: String,
    #[serde(default)]
    pub kind:     String,
    #[serde(default)]
    pub sku:      Option<Sku>,
    #[serde(default)]
    pub tags:     Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub properties: StorageAccountProperties,
    #[serde(skip)]
    key: Arc<OnceCell<String>>,
}

impl StorageAccount {
    pub fn tags(&self) -> BTreeMap<String, String> {
        self.tags.clone().unwrap_or_default()
    }

    /// Primary endpoints first, then secondary ones described as `secondary-*`.
    pub fn access_urls(&self) -> Vec<AccessUrl> {
        let mut urls = self.properties.primary_endpoints.access_urls("", true);
        urls.extend(self.properties.secondary_endpoints.access_urls("secondary", false));
        urls
    }

    pub fn sku_name(&self) -> &str {
        self.sku.as_ref().map(|s| s.name.as_str()).unwrap_or_default()
    }
}

/// One entry of `Microsoft.Storage/skus`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSkuInfo {
    #[serde(default)]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub tier: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountKey {
    #[serde(default)]
    key_name: String,
    #[serde(default)]
    permissions: String,
    value: String,
}

/// `listKeys` answers with a key list, classic accounts with `primaryKey`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum KeyBundle {
    Keys { keys: Vec<AccountKey> },
    Classic {
        #[serde(rename = "primaryKey")]
        primary_key: String,
    },
}

impl KeyBundle {
    fn full_key(self) -> Option<String> {
        match self {
            KeyBundle::Keys { keys } => keys
                .into_iter()
                .find(|k| k.permissions.eq_ignore_ascii_case("full"))
                .map(|k| {
                    debug!(key = %k.key_name, "using storage key");
                    k.value
                }),
            KeyBundle::Classic { primary_key } => Some(primary_key).filter(|k| !k.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NameAvailability {
    name_available: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Parameters of a new storage account. An empty name asks for a generated one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageAccountOptions {
    pub name:     String,
    pub location: String,
    pub sku:      Option<String>,
    pub tags:     BTreeMap<String, String>,
}

impl StorageAccountOptions {
    pub fn new(name: &str, location: &str) -> Self {
        StorageAccountOptions {
            name:     name.to_string(),
            location: location.to_string(),
            ..Default::default()
        }
    }

    pub fn sku(mut self, sku: &str) -> Self {
        self.sku = Some(sku.to_string()).filter(|s| !s.is_empty());
        self
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }
}

// ── Operations ────────────────────────────────────────────────────────────────

pub async fn list_storage_accounts(arm: &ArmClient) -> Result<Vec<StorageAccount>, BlobError> {
    Ok(arm.list(STORAGE_ACCOUNT_TYPE, &[]).await?)
}

pub async fn get_storage_account(arm: &ArmClient, id: &str) -> Result<StorageAccount, BlobError> {
    Ok(arm.get(id, &[]).await?)
}

/// The account's full-permission key, fetched on first use.
pub async fn storage_account_key(arm: &ArmClient, account: &StorageAccount) -> Result<String, BlobError> {
    let key = account
        .key
        .get_or_try_init(|| async {
            let bundle: KeyBundle = arm
                .perform_action(account.id.as_str(), "listKeys", None::<&Value>)
                .await?;
            bundle
                .full_key()
                .ok_or_else(|| BlobError::InvalidKey(format!("no full-permission key for {}", account.name)))
        })
        .await?;
    Ok(key.clone())
}

/// Blob client for the account, using its primary blob endpoint.
pub async fn blob_client(arm: &ArmClient, account: &StorageAccount) -> Result<BlobClient, BlobError> {
    let key = storage_account_key(arm, account).await?;
    match account.properties.primary_endpoints.blob.as_deref().filter(|e| !e.is_empty()) {
        Some(endpoint) => BlobClient::with_endpoint(&account.name, &key, endpoint),
        None => BlobClient::new(&account.name, &key, &arm.environment().storage_suffix),
    }
}

/// Whether `name` is free across all of Azure Storage.
pub async fn is_storage_account_name_available(arm: &ArmClient, name: &str) -> Result<bool, BlobError> {
    let body = json!({"name": name, "type": STORAGE_ACCOUNT_TYPE});
    let answer: NameAvailability = arm.check_name_availability(STORAGE_NAMESPACE, &body).await?;
    if !answer.name_available {
        debug!(name, reason = answer.reason.as_deref().unwrap_or(""), "storage account name taken");
    }
    Ok(answer.name_available)
}

/// `storage` followed by 8 random lowercase alphanumerics, checked with
/// the storage provider until one is free.
pub async fn unique_storage_account_name(arm: &ArmClient) -> Result<String, BlobError> {
    for _ in 0..NAME_ATTEMPTS {
        let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let name = format!("storage{}", suffix);
        if is_storage_account_name_available(arm, &name).await? {
            return Ok(name);
        }
    }
    Err(BlobError::Duplicate("storage account".into()))
}

pub async fn storage_skus(arm: &ArmClient, location: &str) -> Result<Vec<StorageSkuInfo>, BlobError> {
    let skus: Vec<StorageSkuInfo> = arm.list("Microsoft.Storage/skus", &[]).await?;
    Ok(skus
        .into_iter()
        .filter(|s| s.locations.iter().any(|l| l.eq_ignore_ascii_case(location)))
        .collect())
}

/// Kind for `sku` in a location, preferring `StorageV2` over `Storage`.
fn pick_kind(skus: &[StorageSkuInfo], sku: &str) -> Option<String> {
    let matching: Vec<&StorageSkuInfo> = skus.iter().filter(|s| s.name.eq_ignore_ascii_case(sku)).collect();
    ["StorageV2", "Storage"]
        .into_iter()
        .find(|kind| matching.iter().any(|s| s.kind == *kind))
        .map(String::from)
}

pub async fn create_storage_account(arm: &ArmClient, opts: &StorageAccountOptions) -> Result<StorageAccount, BlobError> {
    let name = if opts.name.is_empty() {
        unique_storage_account_name(arm).await?
    } else if is_storage_account_name_available(arm, &opts.name).await? {
        opts.name.clone()
    } else {
        return Err(BlobError::Duplicate(opts.name.clone()));
    };

    let (sku, kind) = match &opts.sku {
        Some(sku) => {
            let skus = storage_skus(arm, &opts.location).await?;
            let kind = pick_kind(&skus, sku).ok_or_else(|| {
                ArmError::NotSupported(format!("storage sku {} in {}", sku, opts.location))
            })?;
            (sku.clone(), kind)
        }
        None => (DEFAULT_SKU.to_string(), DEFAULT_KIND.to_string()),
    };

    let mut tags = opts.tags.clone();
    tags.insert("id".into(), name.clone());
    let body = json!({
        "type":       STORAGE_ACCOUNT_TYPE,
        "name":       name,
        "location":   opts.location,
        "sku":        {"name": sku},
        "kind":       kind,
        "properties": {},
        "tags":       tags,
    });
    info!(name = %name, location = %opts.location, sku = %sku, kind = %kind, "creating storage account");
    Ok(arm.create(&body).await?)
}

pub async fn delete_storage_account(arm: &ArmClient, id: &str) -> Result<(), BlobError> {
    info!(id, "deleting storage account");
    Ok(arm.delete(id).await?)
}
