use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::error::DomainError;

// ── Identifiers ──────────────────────────────────────────────────────────────

/// An ARM resource path such as
/// `/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}`.
///
/// Azure hands back ids in whatever casing the resource was created with, so
/// equality and hashing ignore ASCII case. The server's form is kept verbatim
/// for use in request URLs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(s: impl Into<String>) -> Self {
        ResourceId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercased identity used at every outward boundary.
    pub fn global_id(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// Segment following `key` (matched case-insensitively).
    fn segment_after(&self, key: &str) -> Option<&str> {
        let mut parts = self.0.split('/').filter(|p| !p.is_empty());
        while let Some(part) = parts.next() {
            if part.eq_ignore_ascii_case(key) {
                return parts.next();
            }
        }
        None
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.segment_after("subscriptions")
    }

    /// Owning resource group, lowercased (the project slug).
    pub fn resource_group(&self) -> Option<String> {
        self.segment_after("resourceGroups").map(|s| s.to_ascii_lowercase())
    }

    /// `Microsoft.Storage/storageAccounts` for a storage account id.
    pub fn resource_type(&self) -> Option<String> {
        let rest = self
            .0
            .split("/providers/")
            .nth(1)
            .or_else(|| self.0.split("/Providers/").nth(1))?;
        let mut parts = rest.split('/');
        let ns = parts.next()?;
        let ty = parts.next()?;
        Some(format!("{}/{}", ns, ty))
    }

    pub fn provider_namespace(&self) -> Option<&str> {
        self.segment_after("providers")
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.0
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

impl PartialEq for ResourceId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for ResourceId {}

impl Hash for ResourceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        ResourceId::new(s)
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        ResourceId(s)
    }
}

// ── Status ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    Creating,
    Available,
    Deleting,
    CreateFailed,
    Unknown,
}

impl ResourceStatus {
    /// Generic ARM `provisioningState` mapping shared by most resource kinds.
    pub fn from_provisioning_state(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "succeeded" | "updating" => ResourceStatus::Available,
            "deleting" => ResourceStatus::Deleting,
            "failed" => ResourceStatus::CreateFailed,
            "creating" | "accepted" | "running" => ResourceStatus::Creating,
            _ => ResourceStatus::Unknown,
        }
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Creating => write!(f, "CREATING"),
            ResourceStatus::Available => write!(f, "AVAILABLE"),
            ResourceStatus::Deleting => write!(f, "DELETING"),
            ResourceStatus::CreateFailed => write!(f, "CREATE_FAILED"),
            ResourceStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ── Bucket ACL ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BucketAcl {
    #[default]
    Private,
    PublicRead,
}

impl std::str::FromStr for BucketAcl {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(BucketAcl::Private),
            "public-read" => Ok(BucketAcl::PublicRead),
            other => Err(DomainError::UnsupportedAcl(other.to_string())),
        }
    }
}

impl std::fmt::Display for BucketAcl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BucketAcl::Private => write!(f, "private"),
            BucketAcl::PublicRead => write!(f, "public-read"),
        }
    }
}

// ── Object headers ───────────────────────────────────────────────────────────

pub const CACHE_CONTROL: &str = "Cache-Control";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_MD5: &str = "Content-Md5";
pub const CONTENT_ENCODING: &str = "Content-Encoding";
pub const CONTENT_LANGUAGE: &str = "Content-Language";
pub const CONTENT_DISPOSITION: &str = "Content-Disposition";

/// Headers that map onto blob properties rather than user metadata.
pub const PROPERTY_HEADERS: [&str; 6] = [
    CACHE_CONTROL,
    CONTENT_TYPE,
    CONTENT_MD5,
    CONTENT_ENCODING,
    CONTENT_LANGUAGE,
    CONTENT_DISPOSITION,
];

/// `x-custom-thing` → `X-Custom-Thing`.
pub fn canonical_header_key(key: &str) -> String {
    key.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Object header set keyed by canonical header name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHeaders(BTreeMap<String, String>);

impl ObjectHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(canonical_header_key(key.as_ref()), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&canonical_header_key(key)).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(&canonical_header_key(key))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_property(key: &str) -> bool {
        let key = canonical_header_key(key);
        PROPERTY_HEADERS.iter().any(|p| *p == key)
    }

    /// Split into (property headers, user metadata). Empty values are dropped.
    pub fn split(&self) -> (ObjectHeaders, ObjectHeaders) {
        let mut props = ObjectHeaders::new();
        let mut meta = ObjectHeaders::new();
        for (k, v) in self.iter().filter(|(_, v)| !v.is_empty()) {
            if Self::is_property(k) {
                props.insert(k, v);
            } else {
                meta.insert(k, v);
            }
        }
        (props, meta)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for ObjectHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut out = ObjectHeaders::new();
        for (k, v) in iter {
            out.insert(k, v);
        }
        out
    }
}

// ── Object keys ──────────────────────────────────────────────────────────────

/// A bucket-level object key `container/blob`. `container/` alone names the
/// container itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKey {
    pub container: String,
    pub blob: String,
}

impl ObjectKey {
    pub fn parse(key: &str) -> Result<Self, DomainError> {
        match key.find('/') {
            Some(pos) if pos > 0 => Ok(ObjectKey {
                container: key[..pos].to_string(),
                blob: key[pos + 1..].to_string(),
            }),
            _ => Err(DomainError::ObjectAtRoot(key.to_string())),
        }
    }

    /// Like `parse`, but the key must name a blob inside the container.
    pub fn parse_blob(key: &str) -> Result<Self, DomainError> {
        let parsed = Self::parse(key)?;
        if parsed.blob.is_empty() {
            return Err(DomainError::EmptyBlobPath(key.to_string()));
        }
        Ok(parsed)
    }

    pub fn is_container(&self) -> bool {
        self.blob.is_empty()
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.container, self.blob)
    }
}

/// Inclusive byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        ByteRange { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// `bytes=start-end`
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl std::str::FromStr for ByteRange {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once('-')
            .ok_or_else(|| DomainError::InvalidRange(s.to_string()))?;
        let start = a.trim().parse().map_err(|_| DomainError::InvalidRange(s.to_string()))?;
        let end = b.trim().parse().map_err(|_| DomainError::InvalidRange(s.to_string()))?;
        if end < start {
            return Err(DomainError::InvalidRange(s.to_string()));
        }
        Ok(ByteRange { start, end })
    }
}
