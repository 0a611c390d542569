use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use azmux_arm::ArmClient;
use azmux_blob::{
    AccessUrl, BlobClient, ListBlobsOptions, StorageAccount, MAX_PART_COUNT, MAX_PART_SIZE_BYTES,
};
use azmux_domain::{BucketAcl, ByteRange, ObjectHeaders, ObjectKey, ResourceId};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::FacadeError;
use crate::resource::{CloudResource, ResourceKind};

pub const DEFAULT_LIST_MAX: usize = 1000;
/// Lifetime of the signed URL a server-side copy reads its source through.
const COPY_SOURCE_TTL: Duration = Duration::from_secs(3600);

/// One entry of an object listing. Container entries end in `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CloudObject {
    pub key:           String,
    pub size_bytes:    u64,
    pub etag:          String,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_type:  String,
}

impl CloudObject {
    fn dir(key: String) -> Self {
        CloudObject { key, ..Default::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListObjectsResult {
    pub objects:         Vec<CloudObject>,
    pub common_prefixes: Vec<CloudObject>,
    /// Pass back as `marker` to continue.
    pub next_marker:     Option<String>,
    pub is_truncated:    bool,
}

/// A storage account seen as an object store keyed `container/blob`.
#[derive(Debug, Clone)]
pub struct Bucket {
    account:     StorageAccount,
    default_acl: BucketAcl,
    blob:        Arc<OnceCell<BlobClient>>,
}

impl Bucket {
    pub fn new(account: StorageAccount) -> Self {
        Bucket {
            account,
            default_acl: BucketAcl::Private,
            blob:        Arc::new(OnceCell::new()),
        }
    }

    /// ACL given to containers this bucket creates on demand.
    pub fn with_default_acl(mut self, acl: BucketAcl) -> Self {
        self.default_acl = acl;
        self
    }

    pub fn account(&self) -> &StorageAccount {
        &self.account
    }

    pub fn location(&self) -> &str {
        &self.account.location
    }

    pub fn storage_class(&self) -> &str {
        self.account.sku_name()
    }

    pub fn access_urls(&self) -> Vec<AccessUrl> {
        self.account.access_urls()
    }

    pub fn max_part_size_bytes(&self) -> u64 {
        MAX_PART_SIZE_BYTES
    }

    pub fn max_part_count(&self) -> u32 {
        MAX_PART_COUNT
    }

    /// Data-plane client, built once from the account key.
    pub async fn blob(&self, arm: &ArmClient) -> Result<&BlobClient, FacadeError> {
        Ok(self
            .blob
            .get_or_try_init(|| azmux_blob::blob_client(arm, &self.account))
            .await?)
    }

    // ── ACL ───────────────────────────────────────────────────────────────────

    /// The ACL all containers share; private as soon as one differs.
    pub async fn acl(&self, arm: &ArmClient) -> Result<BucketAcl, FacadeError> {
        let containers = self.blob(arm).await?.list_containers().await?;
        let mut acls = containers.iter().map(|c| c.acl);
        let first = acls.next().unwrap_or_default();
        Ok(if acls.all(|a| a == first) { first } else { BucketAcl::Private })
    }

    pub async fn set_acl(&self, arm: &ArmClient, acl: BucketAcl) -> Result<(), FacadeError> {
        let blob = self.blob(arm).await?;
        for container in blob.list_containers().await? {
            if container.acl != acl {
                blob.set_container_acl(&container.name, acl).await?;
            }
        }
        Ok(())
    }

    // ── Listing ───────────────────────────────────────────────────────────────

    /// S3-style listing where container names act as the first directory
    /// level. `max` of zero means [`DEFAULT_LIST_MAX`].
    pub async fn list_objects(
        &self,
        arm: &ArmClient,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        max: usize,
    ) -> Result<ListObjectsResult, FacadeError> {
        let blob = self.blob(arm).await?;
        let mut containers = blob.list_containers().await?;
        containers.sort_by(|a, b| a.name.cmp(&b.name));

        // `container` resumes after it, `container/token` inside it.
        let (marker_container, sub_marker) = match marker.split_once('/') {
            Some((c, sub)) => (c, Some(sub)),
            None => (marker, None),
        };
        let mut budget = if max == 0 { DEFAULT_LIST_MAX } else { max };
        let mut result = ListObjectsResult::default();

        for (pos, container) in containers.iter().enumerate() {
            let name = container.name.as_str();
            if !marker_container.is_empty() && name < marker_container {
                continue;
            }
            let resuming = name == marker_container;
            if resuming && sub_marker.is_none() {
                continue;
            }

            let dir = format!("{}/", name);
            // (container entry, listing prefix inside the container)
            let (entry, sub_prefix): (Option<bool>, Option<&str>) = if prefix.len() <= dir.len() {
                if !dir.starts_with(prefix) {
                    continue;
                }
                if prefix == dir {
                    (delimiter.is_empty().then_some(false), Some(""))
                } else if delimiter == "/" {
                    (Some(true), None)
                } else {
                    (Some(false), delimiter.is_empty().then_some(""))
                }
            } else if let Some(rest) = prefix.strip_prefix(dir.as_str()) {
                (None, Some(rest))
            } else {
                continue;
            };

            // Some(true): rolled up into a common prefix. A resumed container
            // was already reported on the previous page.
            match entry {
                Some(_) if resuming => {}
                Some(true) => {
                    result.common_prefixes.push(CloudObject::dir(dir.clone()));
                    budget -= 1;
                }
                Some(false) => {
                    result.objects.push(CloudObject::dir(dir.clone()));
                    budget -= 1;
                }
                None => {}
            }

            if let Some(sub_prefix) = sub_prefix {
                if budget == 0 {
                    result.next_marker  = Some(dir.clone());
                    result.is_truncated = true;
                    break;
                }
                let opts = ListBlobsOptions::new()
                    .prefix(sub_prefix)
                    .marker(if resuming { sub_marker.unwrap_or_default() } else { "" })
                    .delimiter(delimiter)
                    .max_results(budget as u32);
                let page = blob.list_blobs(name, &opts).await?;
                for item in page.blobs {
                    result.objects.push(CloudObject {
                        key:           format!("{}{}", dir, item.name),
                        size_bytes:    item.content_length,
                        etag:          item.etag,
                        last_modified: item.last_modified,
                        content_type:  item.content_type,
                    });
                    budget = budget.saturating_sub(1);
                }
                for p in page.prefixes {
                    result.common_prefixes.push(CloudObject::dir(format!("{}{}", dir, p)));
                    budget = budget.saturating_sub(1);
                }
                if let Some(next) = page.next_marker {
                    result.next_marker  = Some(format!("{}{}", dir, next));
                    result.is_truncated = true;
                    break;
                }
            }

            if budget == 0 && pos + 1 < containers.len() {
                result.next_marker  = Some(name.to_string());
                result.is_truncated = true;
                break;
            }
        }
        debug!(
            bucket = %self.account.name,
            prefix, marker, delimiter,
            objects = result.objects.len(),
            prefixes = result.common_prefixes.len(),
            "objects listed"
        );
        Ok(result)
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Parse `key` for a write and create its container on first use.
    async fn prepare_write<'a>(
        &'a self,
        arm: &ArmClient,
        key: &str,
        has_data: bool,
    ) -> Result<(&'a BlobClient, ObjectKey), FacadeError> {
        let key = ObjectKey::parse(key)?;
        if key.is_container() && has_data {
            return Err(FacadeError::Forbidden(format!(
                "cannot put data into container {} itself",
                key.container
            )));
        }
        let blob = self.blob(arm).await?;
        blob.ensure_container_with_acl(&key.container, self.default_acl).await?;
        Ok((blob, key))
    }

    /// Store `data` at `key`. A key `container/` only creates the container.
    pub async fn put_object(
        &self,
        arm: &ArmClient,
        key: &str,
        data: impl Into<Bytes>,
        headers: &ObjectHeaders,
    ) -> Result<(), FacadeError> {
        let data = data.into();
        let (blob, key) = self.prepare_write(arm, key, !data.is_empty()).await?;
        if key.is_container() {
            return Ok(());
        }
        blob.put_block_blob(&key.container, &key.blob, data, headers).await?;
        Ok(())
    }

    /// Like [`put_object`](Self::put_object) for input of unknown length.
    pub async fn upload_stream<R>(
        &self,
        arm: &ArmClient,
        key: &str,
        reader: R,
        headers: &ObjectHeaders,
    ) -> Result<u64, FacadeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let key = ObjectKey::parse_blob(key)?;
        let blob = self.blob(arm).await?;
        blob.ensure_container_with_acl(&key.container, self.default_acl).await?;
        Ok(blob.upload_stream(&key.container, &key.blob, reader, headers).await?)
    }

    pub async fn new_multipart_upload(
        &self,
        arm: &ArmClient,
        key: &str,
        headers: &ObjectHeaders,
    ) -> Result<String, FacadeError> {
        let key = ObjectKey::parse_blob(key)?;
        let blob = self.blob(arm).await?;
        blob.ensure_container_with_acl(&key.container, self.default_acl).await?;
        Ok(blob.new_multipart_upload(&key.container, &key.blob, headers).await?)
    }

    pub async fn upload_part(
        &self,
        arm: &ArmClient,
        key: &str,
        upload_id: &str,
        part: u32,
        data: impl Into<Bytes>,
    ) -> Result<String, FacadeError> {
        let key = ObjectKey::parse_blob(key)?;
        let blob = self.blob(arm).await?;
        Ok(blob.upload_part(&key.container, &key.blob, upload_id, part, data).await?)
    }

    /// Stage part `part` from `range` of `source_key` in `source`.
    #[allow(clippy::too_many_arguments)]
    pub async fn copy_part(
        &self,
        arm: &ArmClient,
        key: &str,
        upload_id: &str,
        part: u32,
        source: &Bucket,
        source_key: &str,
        range: ByteRange,
    ) -> Result<String, FacadeError> {
        let key = ObjectKey::parse_blob(key)?;
        let source_url = source.temp_url(arm, "GET", source_key, COPY_SOURCE_TTL).await?;
        let blob = self.blob(arm).await?;
        Ok(blob
            .copy_part(&key.container, &key.blob, upload_id, part, &source_url, range)
            .await?)
    }

    pub async fn complete_multipart_upload(
        &self,
        arm: &ArmClient,
        key: &str,
        upload_id: &str,
        parts: &[String],
    ) -> Result<(), FacadeError> {
        let key = ObjectKey::parse_blob(key)?;
        let blob = self.blob(arm).await?;
        Ok(blob
            .complete_multipart_upload(&key.container, &key.blob, upload_id, parts)
            .await?)
    }

    /// Abandon an upload; aborting one that is already gone succeeds.
    pub async fn abort_multipart_upload(&self, arm: &ArmClient, key: &str, upload_id: &str) -> Result<(), FacadeError> {
        let key = ObjectKey::parse_blob(key)?;
        let blob = self.blob(arm).await?;
        Ok(blob.abort_multipart_upload(&key.container, &key.blob, upload_id).await?)
    }

    /// Server-side copy of `source_key` in `source` to `key` here.
    pub async fn copy_object(
        &self,
        arm: &ArmClient,
        key: &str,
        source: &Bucket,
        source_key: &str,
        headers: &ObjectHeaders,
    ) -> Result<(), FacadeError> {
        let source_url = source.temp_url(arm, "GET", source_key, COPY_SOURCE_TTL).await?;
        let (blob, key) = self.prepare_write(arm, key, true).await?;
        let status = blob.copy_blob(&key.container, &key.blob, &source_url, headers).await?;
        info!(bucket = %self.account.name, key = %key, status = %status, "object copied");
        Ok(())
    }

    /// Delete a blob, or the whole container for a `container/` key.
    pub async fn delete_object(&self, arm: &ArmClient, key: &str) -> Result<(), FacadeError> {
        let key = ObjectKey::parse(key)?;
        let blob = self.blob(arm).await?;
        if key.is_container() {
            blob.delete_container(&key.container).await?;
        } else {
            blob.delete_blob(&key.container, &key.blob).await?;
        }
        Ok(())
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    pub async fn get_object(&self, arm: &ArmClient, key: &str, range: Option<ByteRange>) -> Result<Bytes, FacadeError> {
        let key = ObjectKey::parse_blob(key)?;
        let blob = self.blob(arm).await?;
        Ok(blob.get_blob(&key.container, &key.blob, range).await?)
    }

    /// Signed URL granting `method` on `key` for `ttl`.
    pub async fn temp_url(&self, arm: &ArmClient, method: &str, key: &str, ttl: Duration) -> Result<String, FacadeError> {
        let key = ObjectKey::parse_blob(key)?;
        let blob = self.blob(arm).await?;
        Ok(blob.sign_url(method, &key.container, &key.blob, ttl)?)
    }

    /// Header set of an object. A container key has none.
    pub async fn object_headers(&self, arm: &ArmClient, key: &str) -> Result<ObjectHeaders, FacadeError> {
        let key = ObjectKey::parse(key)?;
        if key.is_container() {
            return Ok(ObjectHeaders::new());
        }
        let blob = self.blob(arm).await?;
        Ok(blob.blob_properties(&key.container, &key.blob).await?.headers)
    }

    pub async fn set_object_headers(&self, arm: &ArmClient, key: &str, headers: &ObjectHeaders) -> Result<(), FacadeError> {
        let key = ObjectKey::parse_blob(key)?;
        let blob = self.blob(arm).await?;
        Ok(blob.update_blob_headers(&key.container, &key.blob, headers).await?)
    }
}

#[async_trait]
impl CloudResource for Bucket {
    fn id(&self) -> &ResourceId {
        &self.account.id
    }

    fn name(&self) -> &str {
        &self.account.name
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::StorageAccount
    }

    fn provisioning_state(&self) -> &str {
        &self.account.properties.provisioning_state
    }

    fn tags(&self) -> BTreeMap<String, String> {
        self.account.tags()
    }

    async fn refresh(&mut self, client: &ArmClient) -> Result<(), FacadeError> {
        self.account = azmux_blob::get_storage_account(client, self.account.id.as_str()).await?;
        Ok(())
    }
}
