use wiremock::MockServer;

use crate::client::BlobClient;

/// base64 of `secret-key`.
pub(crate) const KEY: &str = "c2VjcmV0LWtleQ==";

pub(crate) fn blob_client(server: &MockServer) -> BlobClient {
    BlobClient::with_endpoint("acct", KEY, &server.uri()).unwrap()
}
