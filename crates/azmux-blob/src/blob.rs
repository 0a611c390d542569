use std::collections::BTreeMap;
use std::time::Duration;

use azmux_domain::{ByteRange, ObjectHeaders, PROPERTY_HEADERS};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Method, Response};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use crate::client::{header_str, BlobClient, BlobRequest};
use crate::container::parse_http_date;
use crate::error::BlobError;
use crate::sign::{blob_sas, sas_permissions};
use crate::xml::{block_list_xml, xml_children, xml_elements, xml_text};

/// Chunk size used by [`BlobClient::upload_stream`].
pub const STREAM_BLOCK_SIZE: usize = 4 * 1024 * 1024;

const META_PREFIX: &str = "x-ms-meta-";

/// Fixed-width block id for stream uploads; all ids of one blob must share
/// a length.
fn stream_block_id(seq: u32) -> String {
    URL_SAFE.encode(format!("{:06}", seq))
}

/// `Content-Type` → `x-ms-blob-content-type`.
fn property_header(name: &str) -> String {
    format!("x-ms-blob-{}", name.to_ascii_lowercase())
}

/// Request headers for a header set: the six properties as `x-ms-blob-*`,
/// everything else as `x-ms-meta-*`.
pub(crate) fn blob_header_pairs(headers: &ObjectHeaders) -> Vec<(String, String)> {
    let (props, meta) = headers.split();
    props
        .iter()
        .map(|(k, v)| (property_header(k), v.to_string()))
        .chain(meta.iter().map(|(k, v)| (format!("{}{}", META_PREFIX, k), v.to_string())))
        .collect()
}

fn metadata_pairs(meta: &ObjectHeaders) -> Vec<(String, String)> {
    meta.iter()
        .map(|(k, v)| (format!("{}{}", META_PREFIX, k), v.to_string()))
        .collect()
}

// ── Listing ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListBlobsOptions {
    pub prefix:      Option<String>,
    pub marker:      Option<String>,
    pub delimiter:   Option<String>,
    pub max_results: Option<u32>,
}

impl ListBlobsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into()).filter(|p: &String| !p.is_empty());
        self
    }

    pub fn marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into()).filter(|m: &String| !m.is_empty());
        self
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into()).filter(|d: &String| !d.is_empty());
        self
    }

    pub fn max_results(mut self, max: u32) -> Self {
        self.max_results = Some(max).filter(|m| *m > 0);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobItem {
    pub name:           String,
    pub content_length: u64,
    pub etag:           String,
    pub last_modified:  Option<DateTime<Utc>>,
    pub content_type:   String,
    pub metadata:       BTreeMap<String, String>,
}

impl BlobItem {
    fn from_xml(xml: &str) -> Result<Self, BlobError> {
        let metadata = xml_elements(xml, "Metadata")?
            .first()
            .map(|m| xml_children(m))
            .unwrap_or_default();
        Ok(BlobItem {
            name:           xml_text(xml, "Name").unwrap_or_default(),
            content_length: xml_text(xml, "Content-Length").and_then(|s| s.parse().ok()).unwrap_or(0),
            etag:           xml_text(xml, "Etag").unwrap_or_default(),
            last_modified:  xml_text(xml, "Last-Modified").as_deref().and_then(parse_http_date),
            content_type:   xml_text(xml, "Content-Type").unwrap_or_default(),
            metadata,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobListing {
    pub blobs:       Vec<BlobItem>,
    pub prefixes:    Vec<String>,
    pub next_marker: Option<String>,
}

// ── Properties ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobProperties {
    pub content_length: u64,
    pub etag:           String,
    pub last_modified:  Option<DateTime<Utc>>,
    pub blob_type:      String,
    pub lease_state:    String,
    /// Properties under their HTTP header names plus user metadata.
    pub headers:        ObjectHeaders,
}

impl BlobProperties {
    fn from_response(resp: &Response) -> Self {
        let mut headers = ObjectHeaders::new();
        for name in PROPERTY_HEADERS {
            let value = header_str(resp, &name.to_ascii_lowercase());
            if !value.is_empty() {
                headers.insert(name, value);
            }
        }
        for (name, value) in resp.headers() {
            if let (Some(key), Ok(v)) = (name.as_str().strip_prefix(META_PREFIX), value.to_str()) {
                headers.insert(key, v);
            }
        }
        BlobProperties {
            content_length: header_str(resp, "content-length").parse().unwrap_or(0),
            etag:           header_str(resp, "etag"),
            last_modified:  parse_http_date(&header_str(resp, "last-modified")),
            blob_type:      header_str(resp, "x-ms-blob-type"),
            lease_state:    header_str(resp, "x-ms-lease-state"),
            headers,
        }
    }
}

impl BlobClient {
    pub async fn list_blobs(&self, container: &str, opts: &ListBlobsOptions) -> Result<BlobListing, BlobError> {
        let mut req = BlobRequest::new(Method::GET, Self::container_path(container))
            .query("restype", "container")
            .query("comp", "list")
            .query("include", "metadata");
        if let Some(p) = &opts.prefix {
            req = req.query("prefix", p.as_str());
        }
        if let Some(m) = &opts.marker {
            req = req.query("marker", m.as_str());
        }
        if let Some(d) = &opts.delimiter {
            req = req.query("delimiter", d.as_str());
        }
        if let Some(n) = opts.max_results {
            req = req.query("maxresults", n.to_string());
        }

        let body = self.send_text(req).await?;
        let blobs = xml_elements(&body, "Blob")?
            .iter()
            .map(|b| BlobItem::from_xml(b))
            .collect::<Result<Vec<_>, _>>()?;
        let prefixes = xml_elements(&body, "BlobPrefix")?
            .iter()
            .filter_map(|p| xml_text(p, "Name"))
            .collect();
        Ok(BlobListing {
            blobs,
            prefixes,
            next_marker: xml_text(&body, "NextMarker").filter(|m| !m.is_empty()),
        })
    }

    /// Every blob under `prefix`, walking all pages.
    pub async fn list_all_blobs(&self, container: &str, prefix: &str) -> Result<Vec<BlobItem>, BlobError> {
        let mut out  = Vec::new();
        let mut opts = ListBlobsOptions::new().prefix(prefix);
        loop {
            let page = self.list_blobs(container, &opts).await?;
            out.extend(page.blobs);
            match page.next_marker {
                Some(m) => opts = opts.marker(m),
                None => break,
            }
        }
        Ok(out)
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Single-shot Put Blob.
    pub async fn put_block_blob(
        &self,
        container: &str,
        blob: &str,
        data: impl Into<Bytes>,
        headers: &ObjectHeaders,
    ) -> Result<(), BlobError> {
        let data = data.into();
        debug!(container, blob, len = data.len(), "Put Blob");
        let req = BlobRequest::new(Method::PUT, Self::blob_path(container, blob))
            .header("x-ms-blob-type", "BlockBlob")
            .headers(blob_header_pairs(headers))
            .body(data);
        self.send(req).await?;
        Ok(())
    }

    /// Upload everything `reader` yields. Small inputs go up in one Put Blob;
    /// larger ones as blocks committed in read order. Returns the byte count.
    pub async fn upload_stream<R>(
        &self,
        container: &str,
        blob: &str,
        mut reader: R,
        headers: &ObjectHeaders,
    ) -> Result<u64, BlobError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut ids   = Vec::new();
        let mut total = 0u64;
        loop {
            let chunk = read_chunk(&mut reader, STREAM_BLOCK_SIZE).await?;
            let at_end = chunk.len() < STREAM_BLOCK_SIZE;
            if ids.is_empty() && at_end {
                total = chunk.len() as u64;
                self.put_block_blob(container, blob, chunk, headers).await?;
                return Ok(total);
            }
            if !chunk.is_empty() {
                let id = stream_block_id(ids.len() as u32 + 1);
                total += chunk.len() as u64;
                let req = BlobRequest::new(Method::PUT, Self::blob_path(container, blob))
                    .query("comp", "block")
                    .query("blockid", id.as_str())
                    .body(chunk);
                self.send(req).await?;
                ids.push(id);
            }
            if at_end {
                break;
            }
        }
        self.put_block_list(container, blob, &ids, headers, None).await?;
        info!(container, blob, blocks = ids.len(), bytes = total, "stream uploaded");
        Ok(total)
    }

    pub(crate) async fn put_block_list(
        &self,
        container: &str,
        blob: &str,
        block_ids: &[String],
        headers: &ObjectHeaders,
        lease_id: Option<&str>,
    ) -> Result<(), BlobError> {
        let mut req = BlobRequest::new(Method::PUT, Self::blob_path(container, blob))
            .query("comp", "blocklist")
            .header("content-type", "application/xml")
            .headers(blob_header_pairs(headers))
            .body(block_list_xml(block_ids));
        if let Some(lease) = lease_id {
            req = req.header("x-ms-lease-id", lease);
        }
        self.send(req).await?;
        Ok(())
    }

    /// Server-side copy from `source_url`; returns `x-ms-copy-status`.
    pub async fn copy_blob(
        &self,
        container: &str,
        blob: &str,
        source_url: &str,
        headers: &ObjectHeaders,
    ) -> Result<String, BlobError> {
        info!(container, blob, source_url, "Copy Blob");
        let (_, meta) = headers.split();
        let req = BlobRequest::new(Method::PUT, Self::blob_path(container, blob))
            .header("x-ms-copy-source", source_url)
            .headers(metadata_pairs(&meta));
        let resp = self.send(req).await?;
        Ok(header_str(&resp, "x-ms-copy-status"))
    }

    /// Copy a disk snapshot (or any readable URL) into `container/blob`.
    pub async fn copy_snapshot(&self, snapshot_url: &str, container: &str, blob: &str) -> Result<String, BlobError> {
        self.ensure_container(container).await?;
        self.copy_blob(container, blob, snapshot_url, &ObjectHeaders::new()).await
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    /// Blob content, optionally only the inclusive `range`.
    pub async fn get_blob(&self, container: &str, blob: &str, range: Option<ByteRange>) -> Result<Bytes, BlobError> {
        let mut req = BlobRequest::new(Method::GET, Self::blob_path(container, blob));
        if let Some(r) = range {
            req = req.header("x-ms-range", r.header_value());
        }
        Ok(self.send(req).await?.bytes().await?)
    }

    pub async fn blob_properties(&self, container: &str, blob: &str) -> Result<BlobProperties, BlobError> {
        let resp = self.send(BlobRequest::new(Method::HEAD, Self::blob_path(container, blob))).await?;
        Ok(BlobProperties::from_response(&resp))
    }

    /// Apply `headers` to an existing blob. Properties and metadata are only
    /// written when they differ from what the blob already has.
    pub async fn update_blob_headers(&self, container: &str, blob: &str, headers: &ObjectHeaders) -> Result<(), BlobError> {
        let current = self.blob_properties(container, blob).await?;
        let (cur_props, cur_meta) = current.headers.split();
        let (new_props, new_meta) = headers.split();

        if new_props != cur_props {
            debug!(container, blob, "Set Blob Properties");
            let pairs: Vec<(String, String)> = new_props
                .iter()
                .map(|(k, v)| (property_header(k), v.to_string()))
                .collect();
            let req = BlobRequest::new(Method::PUT, Self::blob_path(container, blob))
                .query("comp", "properties")
                .headers(pairs);
            self.send(req).await?;
        }
        if new_meta != cur_meta {
            debug!(container, blob, "Set Blob Metadata");
            let req = BlobRequest::new(Method::PUT, Self::blob_path(container, blob))
                .query("comp", "metadata")
                .headers(metadata_pairs(&new_meta));
            self.send(req).await?;
        }
        Ok(())
    }

    /// Delete a blob and its snapshots; a missing blob counts as deleted.
    pub async fn delete_blob(&self, container: &str, blob: &str) -> Result<(), BlobError> {
        let req = BlobRequest::new(Method::DELETE, Self::blob_path(container, blob))
            .header("x-ms-delete-snapshots", "include");
        match self.send(req).await {
            Ok(_) | Err(BlobError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    // ── Signed URLs ───────────────────────────────────────────────────────────

    /// Blob URL carrying a service SAS valid from now for `ttl`.
    pub fn sign_url(&self, method: &str, container: &str, blob: &str, ttl: Duration) -> Result<String, BlobError> {
        self.sign_url_at(method, container, blob, Utc::now(), ttl)
    }

    pub fn sign_url_at(
        &self,
        method: &str,
        container: &str,
        blob: &str,
        start: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<String, BlobError> {
        let permissions = sas_permissions(method)?;
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        let sas = blob_sas(self.account(), self.key(), container, blob, permissions, start, start + ttl)?;
        Ok(format!("{}?{}", self.blob_url(container, blob), sas))
    }
}

/// Fill up to `size` bytes; shorter only at end of input.
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, size: usize) -> Result<Bytes, BlobError> {
    let mut buf    = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(Bytes::from(buf))
}
