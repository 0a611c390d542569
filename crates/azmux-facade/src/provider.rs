use std::collections::BTreeSet;

use azmux_arm::{ArmClient, ArmError, ClientConfig, Region, ResourceGroup};
use azmux_blob::StorageAccountOptions;
use azmux_domain::BucketAcl;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::bucket::Bucket;
use crate::error::FacadeError;
use crate::resource::GenericResource;

/// Service families this provider can drive.
pub const CAPABILITIES: [&str; 6] = ["project", "compute", "network", "objectstore", "event", "cloudid"];

/// Parameters of a new bucket. An empty name asks for a generated one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateBucketOptions {
    pub name:          String,
    pub region:        String,
    pub storage_class: Option<String>,
    /// Applied to containers the bucket creates later.
    pub acl:           Option<BucketAcl>,
}

impl CreateBucketOptions {
    pub fn new(name: &str, region: &str) -> Self {
        CreateBucketOptions {
            name:   name.to_string(),
            region: region.to_string(),
            ..Default::default()
        }
    }

    pub fn storage_class(mut self, class: &str) -> Self {
        self.storage_class = Some(class.to_string()).filter(|c| !c.is_empty());
        self
    }

    pub fn acl(mut self, acl: BucketAcl) -> Self {
        self.acl = Some(acl);
        self
    }
}

/// The Azure side of the provider: one client plus the caches the façades
/// read through.
pub struct AzureProvider {
    client:      ArmClient,
    default_acl: BucketAcl,
    buckets:     RwLock<Option<Vec<Bucket>>>,
}

impl AzureProvider {
    pub fn new(client: ArmClient) -> Self {
        AzureProvider {
            client,
            default_acl: BucketAcl::Private,
            buckets:     RwLock::new(None),
        }
    }

    pub fn with_default_acl(mut self, acl: BucketAcl) -> Self {
        self.default_acl = acl;
        self
    }

    /// Authenticate and load subscriptions, regions and resource groups.
    pub async fn connect(config: ClientConfig) -> Result<Self, FacadeError> {
        Ok(Self::new(ArmClient::connect(config).await?))
    }

    pub fn client(&self) -> &ArmClient {
        &self.client
    }

    // ── Regions & accounts ────────────────────────────────────────────────────

    pub fn regions(&self) -> &[Region] {
        self.client.regions()
    }

    pub fn region(&self, id: &str) -> Result<&Region, FacadeError> {
        Ok(self.client.region(id)?)
    }

    pub fn region_by_global_id(&self, global_id: &str) -> Result<&Region, FacadeError> {
        Ok(self.client.region_by_global_id(global_id)?)
    }

    pub fn sub_accounts(&self) -> Vec<String> {
        self.client.sub_accounts()
    }

    pub fn capabilities(&self) -> Vec<&'static str> {
        CAPABILITIES.to_vec()
    }

    pub fn balance(&self) -> Result<f64, FacadeError> {
        Err(FacadeError::NotSupported("account balance".into()))
    }

    // ── Projects ──────────────────────────────────────────────────────────────

    /// Resource groups of every enabled subscription.
    pub async fn projects(&self) -> Result<Vec<ResourceGroup>, FacadeError> {
        Ok(self.client.list_projects().await?)
    }

    /// New resource group in the default region.
    pub async fn create_project(&self, name: &str) -> Result<ResourceGroup, FacadeError> {
        let region = self
            .client
            .default_region()
            .ok_or_else(|| FacadeError::NotSupported("no region available for new project".into()))?;
        Ok(self.client.create_resource_group(name, &region.id).await?)
    }

    /// Every resource of an ARM type in the bound subscription.
    pub async fn resources(&self, resource_type: &str) -> Result<Vec<GenericResource>, FacadeError> {
        Ok(self.client.list_all(resource_type).await?)
    }

    // ── Storage ───────────────────────────────────────────────────────────────

    /// Storage SKU names offered in `region`, the default region when `None`.
    pub async fn storage_classes(&self, region: Option<&str>) -> Result<Vec<String>, FacadeError> {
        let location = match region {
            Some(r) => r.to_string(),
            None => self
                .client
                .default_region()
                .map(|r| r.id.clone())
                .ok_or(ArmError::NotFound)?,
        };
        let names: BTreeSet<String> = azmux_blob::storage_skus(&self.client, &location)
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect();
        Ok(names.into_iter().collect())
    }

    /// All buckets of the subscription, cached until invalidated.
    pub async fn buckets(&self) -> Result<Vec<Bucket>, FacadeError> {
        if let Some(buckets) = self.buckets.read().await.as_ref() {
            return Ok(buckets.clone());
        }
        let mut cache = self.buckets.write().await;
        if let Some(buckets) = cache.as_ref() {
            return Ok(buckets.clone());
        }
        let buckets: Vec<Bucket> = azmux_blob::list_storage_accounts(&self.client)
            .await?
            .into_iter()
            .map(|a| Bucket::new(a).with_default_acl(self.default_acl))
            .collect();
        debug!(count = buckets.len(), "bucket cache loaded");
        *cache = Some(buckets.clone());
        Ok(buckets)
    }

    pub async fn region_buckets(&self, region_id: &str) -> Result<Vec<Bucket>, FacadeError> {
        Ok(self
            .buckets()
            .await?
            .into_iter()
            .filter(|b| b.location().eq_ignore_ascii_case(region_id))
            .collect())
    }

    pub async fn invalidate_buckets(&self) {
        *self.buckets.write().await = None;
    }

    pub async fn bucket_by_name(&self, name: &str) -> Result<Bucket, FacadeError> {
        self.buckets()
            .await?
            .into_iter()
            .find(|b| b.account().name == name)
            .ok_or(FacadeError::Arm(ArmError::NotFound))
    }

    /// Whether the name is taken anywhere in Azure Storage, not only here.
    pub async fn is_bucket_exists(&self, name: &str) -> Result<bool, FacadeError> {
        Ok(!azmux_blob::is_storage_account_name_available(&self.client, name).await?)
    }

    pub async fn create_bucket(&self, opts: &CreateBucketOptions) -> Result<Bucket, FacadeError> {
        let mut account = StorageAccountOptions::new(&opts.name, &opts.region);
        if let Some(class) = &opts.storage_class {
            account = account.sku(class);
        }
        let created = azmux_blob::create_storage_account(&self.client, &account).await;
        self.invalidate_buckets().await;
        let bucket = Bucket::new(created?).with_default_acl(opts.acl.unwrap_or(self.default_acl));
        info!(bucket = %bucket.account().name, region = %opts.region, "bucket created");
        Ok(bucket)
    }

    pub async fn delete_bucket(&self, name: &str) -> Result<(), FacadeError> {
        let bucket = self.bucket_by_name(name).await?;
        let deleted = azmux_blob::delete_storage_account(&self.client, bucket.account().id.as_str()).await;
        self.invalidate_buckets().await;
        deleted?;
        info!(bucket = name, "bucket deleted");
        Ok(())
    }
}
