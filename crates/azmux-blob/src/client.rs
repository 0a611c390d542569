use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::Utc;
use reqwest::{Method, Response};
use tracing::debug;

use crate::error::BlobError;
use crate::sign::{decode_key, rfc1123, shared_key_authorization, string_to_sign, STORAGE_VERSION};
use crate::xml::xml_error;

/// Percent-encode each segment of a blob path, keeping the `/` separators.
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

// ── Request builder ───────────────────────────────────────────────────────────

/// One signed call against the blob service.
#[derive(Debug, Clone)]
pub(crate) struct BlobRequest {
    method:  Method,
    /// Encoded resource path, always starting with `/`.
    path:    String,
    query:   Vec<(String, String)>,
    /// Keyed by lowercase header name.
    headers: BTreeMap<String, String>,
    body:    Bytes,
}

impl BlobRequest {
    pub(crate) fn new(method: Method, path: String) -> Self {
        BlobRequest {
            method,
            path,
            query:   Vec::new(),
            headers: BTreeMap::new(),
            body:    Bytes::new(),
        }
    }

    pub(crate) fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub(crate) fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub(crate) fn headers<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (k, v) in pairs {
            self.headers.insert(k.as_ref().to_ascii_lowercase(), v.into());
        }
        self
    }

    pub(crate) fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Shared-key authenticated client for one storage account's blob service.
#[derive(Clone)]
pub struct BlobClient {
    http:     reqwest::Client,
    account:  String,
    key:      Vec<u8>,
    endpoint: String,
}

impl std::fmt::Debug for BlobClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobClient")
            .field("account", &self.account)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl BlobClient {
    /// Client for `https://{account}.blob.{storage_suffix}`.
    pub fn new(account: &str, key: &str, storage_suffix: &str) -> Result<Self, BlobError> {
        let endpoint = format!("https://{}.blob.{}", account, storage_suffix);
        Self::with_endpoint(account, key, &endpoint)
    }

    /// Client for an explicit endpoint such as the account's
    /// `primaryEndpoints.blob` or a local emulator.
    pub fn with_endpoint(account: &str, key: &str, endpoint: &str) -> Result<Self, BlobError> {
        Ok(BlobClient {
            http:     reqwest::Client::new(),
            account:  account.to_string(),
            key:      decode_key(key)?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn key(&self) -> &[u8] {
        &self.key
    }

    pub(crate) fn container_path(container: &str) -> String {
        format!("/{}", urlencoding::encode(container))
    }

    pub(crate) fn blob_path(container: &str, blob: &str) -> String {
        format!("/{}/{}", urlencoding::encode(container), encode_path(blob))
    }

    pub fn container_url(&self, container: &str) -> String {
        format!("{}{}", self.endpoint, Self::container_path(container))
    }

    pub fn blob_url(&self, container: &str, blob: &str) -> String {
        format!("{}{}", self.endpoint, Self::blob_path(container, blob))
    }

    /// Sign and send `req`. A `404` becomes [`BlobError::NotFound`]; any other
    /// non-2xx status is decoded from the storage XML error body.
    pub(crate) async fn send(&self, req: BlobRequest) -> Result<Response, BlobError> {
        let BlobRequest { method, path, query, mut headers, body } = req;

        headers.insert("x-ms-date".into(), rfc1123(Utc::now()));
        headers.insert("x-ms-version".into(), STORAGE_VERSION.into());

        let to_sign = string_to_sign(method.as_str(), &headers, body.len(), &self.account, &path, &query);
        let auth    = shared_key_authorization(&self.account, &self.key, &to_sign)?;

        let mut url = format!("{}{}", self.endpoint, path);
        if !query.is_empty() {
            let qs = query
                .iter()
                .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&qs);
        }
        debug!(method = %method, url, len = body.len(), "Azure Blob request");

        let mut rb = self.http.request(method.clone(), &url);
        for (k, v) in &headers {
            rb = rb.header(k, v);
        }
        let resp = rb.header("authorization", auth).body(body).send().await?;

        let status = resp.status();
        if status.as_u16() == 404 {
            debug!(method = %method, url, "Azure Blob: not found");
            return Err(BlobError::NotFound);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let (code, message) = xml_error(&text);
            return Err(BlobError::Storage {
                status: status.as_u16(),
                code,
                message,
            });
        }
        Ok(resp)
    }

    /// `send` and read the response body as text.
    pub(crate) async fn send_text(&self, req: BlobRequest) -> Result<String, BlobError> {
        Ok(self.send(req).await?.text().await?)
    }
}

/// Header value as an owned string; empty when absent or not UTF-8.
pub(crate) fn header_str(resp: &Response, name: &str) -> String {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
