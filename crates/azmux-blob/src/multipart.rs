use azmux_domain::{ByteRange, ObjectHeaders};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use bytes::Bytes;
use reqwest::Method;
use tracing::{debug, info};

use crate::client::{header_str, BlobClient, BlobRequest};
use crate::error::BlobError;

pub const MAX_PART_SIZE_BYTES: u64 = 100_000_000;
pub const MAX_PART_COUNT: u32 = 50_000;

/// Block id of part `index`: URL-safe base64 of its decimal form.
pub fn block_id(index: u32) -> String {
    URL_SAFE.encode(index.to_string())
}

fn check_part(index: u32, len: u64) -> Result<(), BlobError> {
    if index == 0 || index > MAX_PART_COUNT {
        return Err(BlobError::InvalidPart(format!("part number {} outside 1..={}", index, MAX_PART_COUNT)));
    }
    if len > MAX_PART_SIZE_BYTES {
        return Err(BlobError::InvalidPart(format!(
            "part {} is {} bytes, limit {}",
            index, len, MAX_PART_SIZE_BYTES
        )));
    }
    Ok(())
}

impl BlobClient {
    /// Create an empty block blob and take an infinite lease on it. The
    /// lease id is the upload id every later part call presents.
    pub async fn new_multipart_upload(
        &self,
        container: &str,
        blob: &str,
        headers: &ObjectHeaders,
    ) -> Result<String, BlobError> {
        self.put_block_blob(container, blob, Bytes::new(), headers).await?;
        let req = BlobRequest::new(Method::PUT, Self::blob_path(container, blob))
            .query("comp", "lease")
            .header("x-ms-lease-action", "acquire")
            .header("x-ms-lease-duration", "-1");
        let resp = self.send(req).await?;
        let lease = header_str(&resp, "x-ms-lease-id");
        if lease.is_empty() {
            return Err(BlobError::Storage {
                status:  resp.status().as_u16(),
                code:    "LeaseIdMissing".into(),
                message: "lease acquire returned no x-ms-lease-id".into(),
            });
        }
        info!(container, blob, upload_id = %lease, "multipart upload started");
        Ok(lease)
    }

    /// Stage part `index` (1-based); returns its block id.
    pub async fn upload_part(
        &self,
        container: &str,
        blob: &str,
        upload_id: &str,
        index: u32,
        data: impl Into<Bytes>,
    ) -> Result<String, BlobError> {
        let data = data.into();
        check_part(index, data.len() as u64)?;
        let id = block_id(index);
        debug!(container, blob, index, len = data.len(), "Put Block");
        let req = BlobRequest::new(Method::PUT, Self::blob_path(container, blob))
            .query("comp", "block")
            .query("blockid", id.as_str())
            .header("x-ms-lease-id", upload_id)
            .body(data);
        self.send(req).await?;
        Ok(id)
    }

    /// Stage part `index` from `range` of `source_url` (Put Block From URL).
    pub async fn copy_part(
        &self,
        container: &str,
        blob: &str,
        upload_id: &str,
        index: u32,
        source_url: &str,
        range: ByteRange,
    ) -> Result<String, BlobError> {
        check_part(index, range.len())?;
        let id = block_id(index);
        debug!(container, blob, index, source_url, range = %range.header_value(), "Put Block From URL");
        let req = BlobRequest::new(Method::PUT, Self::blob_path(container, blob))
            .query("comp", "block")
            .query("blockid", id.as_str())
            .header("x-ms-lease-id", upload_id)
            .header("x-ms-copy-source", source_url)
            .header("x-ms-source-range", range.header_value());
        self.send(req).await?;
        Ok(id)
    }

    /// Commit `block_ids` in the given order and release the lease. Headers
    /// set when the upload started are carried over to the committed blob.
    pub async fn complete_multipart_upload(
        &self,
        container: &str,
        blob: &str,
        upload_id: &str,
        block_ids: &[String],
    ) -> Result<(), BlobError> {
        let current = self.blob_properties(container, blob).await?;
        self.put_block_list(container, blob, block_ids, &current.headers, Some(upload_id))
            .await?;
        self.release_lease(container, blob, upload_id).await?;
        info!(container, blob, parts = block_ids.len(), "multipart upload completed");
        Ok(())
    }

    /// Release the lease and delete the blob with its snapshots. Aborting an
    /// upload that is already gone succeeds.
    pub async fn abort_multipart_upload(&self, container: &str, blob: &str, upload_id: &str) -> Result<(), BlobError> {
        match self.release_lease(container, blob, upload_id).await {
            Ok(()) | Err(BlobError::NotFound) => {}
            Err(e) => return Err(e),
        }
        self.delete_blob(container, blob).await?;
        info!(container, blob, "multipart upload aborted");
        Ok(())
    }

    async fn release_lease(&self, container: &str, blob: &str, lease_id: &str) -> Result<(), BlobError> {
        let req = BlobRequest::new(Method::PUT, Self::blob_path(container, blob))
            .query("comp", "lease")
            .header("x-ms-lease-action", "release")
            .header("x-ms-lease-id", lease_id);
        self.send(req).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::blob_client;
    use crate::xml::block_list_xml;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn block_ids_are_base64_of_decimal_index() {
        assert_eq!(block_id(1), "MQ==");
        assert_eq!(block_id(2), "Mg==");
        assert_eq!(block_id(10), "MTA=");
    }

    #[test]
    fn part_limits() {
        assert!(check_part(1, MAX_PART_SIZE_BYTES).is_ok());
        assert!(matches!(check_part(0, 1), Err(BlobError::InvalidPart(_))));
        assert!(matches!(check_part(MAX_PART_COUNT + 1, 1), Err(BlobError::InvalidPart(_))));
        assert!(matches!(check_part(1, MAX_PART_SIZE_BYTES + 1), Err(BlobError::InvalidPart(_))));
    }

    #[tokio::test]
    async fn multipart_commits_parts_in_caller_order() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/c/big"))
            .and(header("x-ms-blob-type", "BlockBlob"))
            .and(header("x-ms-blob-content-type", "application/zip"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(query_param("comp", "lease"))
            .and(header("x-ms-lease-action", "acquire"))
            .and(header("x-ms-lease-duration", "-1"))
            .respond_with(ResponseTemplate::new(201).insert_header("x-ms-lease-id", "lease-1"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(query_param("comp", "block"))
            .and(header("x-ms-lease-id", "lease-1"))
            .respond_with(ResponseTemplate::new(201))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/c/big"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "application/zip"))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(query_param("comp", "blocklist"))
            .and(header("x-ms-lease-id", "lease-1"))
            .and(header("x-ms-blob-content-type", "application/zip"))
            .and(body_string(block_list_xml(&["Mg==".into(), "MQ==".into()])))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(query_param("comp", "lease"))
            .and(header("x-ms-lease-action", "release"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client  = blob_client(&server);
        let headers: ObjectHeaders = [("Content-Type", "application/zip")].into_iter().collect();
        let upload  = client.new_multipart_upload("c", "big", &headers).await.unwrap();
        assert_eq!(upload, "lease-1");

        let first  = client.upload_part("c", "big", &upload, 1, vec![1u8; 1024]).await.unwrap();
        let second = client.upload_part("c", "big", &upload, 2, vec![2u8; 512]).await.unwrap();
        assert_eq!(first, "MQ==");
        assert_eq!(second, "Mg==");

        // Caller order wins over part numbers.
        client
            .complete_multipart_upload("c", "big", &upload, &[second, first])
            .await
            .unwrap();

        let staged: Vec<usize> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.query().is_some_and(|q| q.contains("comp=block&")))
            .map(|r| r.body.len())
            .collect();
        assert_eq!(staged, vec![1024, 512]);
    }

    #[tokio::test]
    async fn abort_twice_is_idempotent() {
        let server = MockServer::start().await;
        // First abort finds the blob, the second finds nothing.
        Mock::given(method("PUT"))
            .and(query_param("comp", "lease"))
            .and(header("x-ms-lease-action", "release"))
            .respond_with(ResponseTemplate::new(200))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/c/k"))
            .respond_with(ResponseTemplate::new(202))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = blob_client(&server);
        client.abort_multipart_upload("c", "k", "lease-1").await.unwrap();
        client.abort_multipart_upload("c", "k", "lease-1").await.unwrap();
        assert_eq!(server.received_requests().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn copy_part_sends_source_range() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(query_param("comp", "block"))
            .and(query_param("blockid", "Mw=="))
            .and(header("x-ms-copy-source", "https://src.blob.core.windows.net/c/s"))
            .and(header("x-ms-source-range", "bytes=0-99"))
            .and(header("x-ms-lease-id", "lease-1"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let id = blob_client(&server)
            .copy_part("c", "k", "lease-1", 3, "https://src.blob.core.windows.net/c/s", ByteRange::new(0, 99))
            .await
            .unwrap();
        assert_eq!(id, "Mw==");
    }
}
