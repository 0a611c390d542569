use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::BlobError;

type HmacSha256 = Hmac<Sha256>;

pub const STORAGE_VERSION: &str = "2020-10-02";
pub const SAS_VERSION: &str = "2021-06-08";

/// Standard headers in the order the Shared Key string-to-sign lists them.
/// `Date` stays empty because every request carries `x-ms-date`.
const SIGNED_STANDARD_HEADERS: [&str; 11] = [
    "content-encoding",
    "content-language",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

pub(crate) fn decode_key(key: &str) -> Result<Vec<u8>, BlobError> {
    BASE64
        .decode(key.trim())
        .map_err(|e| BlobError::InvalidKey(e.to_string()))
}

fn hmac_base64(key: &[u8], data: &str) -> Result<String, BlobError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| BlobError::InvalidKey(e.to_string()))?;
    mac.update(data.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// `Tue, 01 Jun 2021 10:00:00 GMT`
pub fn rfc1123(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

// ── Shared Key ────────────────────────────────────────────────────────────────

/// Shared Key string-to-sign.
///
/// `headers` must be keyed by lowercase name; `path` is the encoded URL path
/// (`/container/blob`); `query` values are unencoded.
pub fn string_to_sign(
    method: &str,
    headers: &BTreeMap<String, String>,
    content_length: usize,
    account: &str,
    path: &str,
    query: &[(String, String)],
) -> String {
    let mut out = String::new();
    out.push_str(method);
    out.push('\n');

    for name in SIGNED_STANDARD_HEADERS {
        let value = match name {
            "content-length" if content_length > 0 => content_length.to_string(),
            "content-length" | "date" => String::new(),
            _ => headers.get(name).cloned().unwrap_or_default(),
        };
        out.push_str(&value);
        out.push('\n');
    }

    // BTreeMap iteration is already sorted by name.
    for (name, value) in headers.iter().filter(|(k, _)| k.starts_with("x-ms-")) {
        out.push_str(&format!("{}:{}\n", name, value.trim()));
    }

    out.push_str(&format!("/{}{}", account, path));
    let mut params: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for (k, v) in query {
        params.entry(k.to_ascii_lowercase()).or_default().push(v.as_str());
    }
    for (k, mut values) in params {
        values.sort_unstable();
        out.push_str(&format!("\n{}:{}", k, values.join(",")));
    }
    out
}

pub fn shared_key_authorization(account: &str, key: &[u8], string_to_sign: &str) -> Result<String, BlobError> {
    Ok(format!("SharedKey {}:{}", account, hmac_base64(key, string_to_sign)?))
}

// ── SAS ───────────────────────────────────────────────────────────────────────

/// Permissions granted to a signed URL for an HTTP method.
pub fn sas_permissions(method: &str) -> Result<&'static str, BlobError> {
    match method.to_ascii_uppercase().as_str() {
        "GET" => Ok("r"),
        "PUT" => Ok("racw"),
        "DELETE" => Ok("rwd"),
        other => Err(BlobError::UnsupportedMethod(other.to_string())),
    }
}

/// Blob service SAS query string (`sr=b`, HTTPS only).
pub fn blob_sas(
    account: &str,
    key: &[u8],
    container: &str,
    blob: &str,
    permissions: &str,
    start: DateTime<Utc>,
    expiry: DateTime<Utc>,
) -> Result<String, BlobError> {
    let st = start.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let se = expiry.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let resource = format!("/blob/{}/{}/{}", account, container, blob);

    // sp st se resource si sip spr sv sr snapshot ses rscc rscd rsce rscl rsct
    let to_sign = format!(
        "{}\n{}\n{}\n{}\n\n\nhttps\n{}\nb\n\n\n\n\n\n\n",
        permissions, st, se, resource, SAS_VERSION
    );
    let sig = hmac_base64(key, &to_sign)?;

    Ok(format!(
        "sv={}&st={}&se={}&sr=b&sp={}&spr=https&sig={}",
        SAS_VERSION,
        urlencoding::encode(&st),
        urlencoding::encode(&se),
        permissions,
        urlencoding::encode(&sig),
    ))
}
