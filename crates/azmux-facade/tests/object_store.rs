use azmux_arm::{ArmClient, ClientConfig, Environment, StaticToken};
use azmux_blob::StorageAccount;
use azmux_domain::{BucketAcl, ByteRange, ObjectHeaders};
use azmux_facade::{Bucket, FacadeError};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ACCOUNT_ID: &str = "/subscriptions/S/resourceGroups/RG/providers/Microsoft.Storage/storageAccounts/acct";

fn arm(server: &MockServer) -> ArmClient {
    let config = ClientConfig::new(Environment::custom(&server.uri()), "tenant", "app", "secret").subscription("S");
    ArmClient::with_token_provider(config, Box::new(StaticToken("t".into())))
}

/// Bucket whose blob endpoint is the mock server, with `listKeys` mounted.
async fn bucket(server: &MockServer) -> Bucket {
    Mock::given(method("POST"))
        .and(path(format!("{}/listKeys", ACCOUNT_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"keys": [
            {"keyName": "key1", "permissions": "FULL", "value": "c2VjcmV0LWtleQ=="}
        ]})))
        .mount(server)
        .await;
    let account: StorageAccount = serde_json::from_value(json!({
        "id": ACCOUNT_ID,
        "name": "acct",
        "location": "eastus",
        "type": "Microsoft.Storage/storageAccounts",
        "sku": {"name": "Standard_GRS"},
        "properties": {
            "provisioningState": "Succeeded",
            "primaryEndpoints": {"blob": format!("{}/", server.uri())}
        }
    }))
    .unwrap();
    Bucket::new(account)
}

fn containers_xml(names: &[&str]) -> String {
    let items: String = names
        .iter()
        .map(|n| format!("<Container><Name>{}</Name><Properties><Etag>\"e\"</Etag></Properties></Container>", n))
        .collect();
    format!("<EnumerationResults><Containers>{}</Containers><NextMarker/></EnumerationResults>", items)
}

fn blobs_xml(names: &[&str], next: &str) -> String {
    let items: String = names
        .iter()
        .map(|n| {
            format!(
                "<Blob><Name>{}</Name><Properties><Content-Length>3</Content-Length><Content-Type>text/plain</Content-Type></Properties></Blob>",
                n
            )
        })
        .collect();
    format!(
        "<EnumerationResults><Blobs>{}</Blobs><NextMarker>{}</NextMarker></EnumerationResults>",
        items, next
    )
}

async fn mount_containers(server: &MockServer, names: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("comp", "list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(containers_xml(names)))
        .mount(server)
        .await;
}

async fn mount_blobs(server: &MockServer, container: &str, names: &[&str]) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", container)))
        .and(query_param("comp", "list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(blobs_xml(names, "")))
        .mount(server)
        .await;
}

fn keys(objects: &[azmux_facade::CloudObject]) -> Vec<&str> {
    objects.iter().map(|o| o.key.as_str()).collect()
}

// ── Writes ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn put_into_missing_container_creates_it() {
    let server = MockServer::start().await;
    let bucket = bucket(&server).await.with_default_acl(BucketAcl::PublicRead);
    Mock::given(method("HEAD"))
        .and(path("/photos"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/photos"))
        .and(query_param("restype", "container"))
        .and(header("x-ms-blob-public-access", "container"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/photos/2021/cat.jpg"))
        .and(header("x-ms-blob-type", "BlockBlob"))
        .and(header("x-ms-blob-content-type", "image/jpeg"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/photos/2021/cat.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"meow".to_vec()))
        .mount(&server)
        .await;

    let arm = arm(&server);
    let headers: ObjectHeaders = [("Content-Type", "image/jpeg")].into_iter().collect();
    bucket.put_object(&arm, "photos/2021/cat.jpg", &b"meow"[..], &headers).await.unwrap();
    let body = bucket.get_object(&arm, "photos/2021/cat.jpg", None).await.unwrap();
    assert_eq!(&body[..], b"meow");
}

#[tokio::test]
async fn container_key_creates_only_the_container() {
    let server = MockServer::start().await;
    let bucket = bucket(&server).await;
    Mock::given(method("HEAD"))
        .and(path("/logs"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/logs"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    bucket.put_object(&arm(&server), "logs/", Vec::<u8>::new(), &ObjectHeaders::new()).await.unwrap();
}

#[tokio::test]
async fn writes_outside_a_container_are_rejected() {
    let server = MockServer::start().await;
    let bucket = bucket(&server).await;
    let arm = arm(&server);

    let err = bucket.put_object(&arm, "loose.txt", &b"x"[..], &ObjectHeaders::new()).await.unwrap_err();
    assert!(matches!(err, FacadeError::Domain(_)), "got: {}", err);

    let err = bucket.put_object(&arm, "logs/", &b"x"[..], &ObjectHeaders::new()).await.unwrap_err();
    assert!(matches!(err, FacadeError::Forbidden(_)), "got: {}", err);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn ranged_read_sends_inclusive_range() {
    let server = MockServer::start().await;
    let bucket = bucket(&server).await;
    Mock::given(method("GET"))
        .and(path("/c/big.bin"))
        .and(header("x-ms-range", "bytes=10-19"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![7u8; 10]))
        .expect(1)
        .mount(&server)
        .await;

    let body = bucket
        .get_object(&arm(&server), "c/big.bin", Some(ByteRange::new(10, 19)))
        .await
        .unwrap();
    assert_eq!(body.len(), 10);
}

#[tokio::test]
async fn deleting_container_key_drops_container() {
    let server = MockServer::start().await;
    let bucket = bucket(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/old"))
        .and(query_param("restype", "container"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    bucket.delete_object(&arm(&server), "old/").await.unwrap();
}

#[tokio::test]
async fn temp_url_is_signed_for_the_blob() {
    let server = MockServer::start().await;
    let bucket = bucket(&server).await;
    let url = bucket
        .temp_url(&arm(&server), "GET", "c/a b.txt", std::time::Duration::from_secs(600))
        .await
        .unwrap();
    assert!(url.starts_with(&format!("{}/c/a%20b.txt?", server.uri())), "got: {}", url);
    assert!(url.contains("sp=r"), "got: {}", url);

    let err = bucket
        .temp_url(&arm(&server), "PATCH", "c/a.txt", std::time::Duration::from_secs(600))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("PATCH"), "got: {}", err);
}

// ── ACL ───────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn mixed_container_acls_read_as_private() {
    let server = MockServer::start().await;
    let bucket = bucket(&server).await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("comp", "list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<EnumerationResults><Containers>\
             <Container><Name>a</Name><Properties><PublicAccess>container</PublicAccess></Properties></Container>\
             <Container><Name>b</Name><Properties></Properties></Container>\
             </Containers><NextMarker/></EnumerationResults>",
        ))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/b"))
        .and(query_param("comp", "acl"))
        .and(header("x-ms-blob-public-access", "container"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let arm = arm(&server);
    assert_eq!(bucket.acl(&arm).await.unwrap(), BucketAcl::Private);
    bucket.set_acl(&arm, BucketAcl::PublicRead).await.unwrap();
}

// ── Listing ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn flat_listing_spans_containers() {
    let server = MockServer::start().await;
    let bucket = bucket(&server).await;
    mount_containers(&server, &["b", "a"]).await;
    mount_blobs(&server, "a", &["x", "y"]).await;
    mount_blobs(&server, "b", &["z"]).await;

    let out = bucket.list_objects(&arm(&server), "", "", "", 0).await.unwrap();
    assert_eq!(keys(&out.objects), vec!["a/", "a/x", "a/y", "b/", "b/z"]);
    assert!(out.common_prefixes.is_empty());
    assert!(!out.is_truncated);
    assert_eq!(out.objects[1].size_bytes, 3);
    assert_eq!(out.objects[1].content_type, "text/plain");
}

#[tokio::test]
async fn delimiter_rolls_containers_into_prefixes() {
    let server = MockServer::start().await;
    let bucket = bucket(&server).await;
    mount_containers(&server, &["a", "b"]).await;

    let out = bucket.list_objects(&arm(&server), "", "", "/", 0).await.unwrap();
    assert!(out.objects.is_empty());
    assert_eq!(keys(&out.common_prefixes), vec!["a/", "b/"]);
}

#[tokio::test]
async fn prefix_inside_container_lists_its_blobs() {
    let server = MockServer::start().await;
    let bucket = bucket(&server).await;
    mount_containers(&server, &["a", "b"]).await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .and(query_param("comp", "list"))
        .and(query_param("prefix", "dir/"))
        .and(query_param("delimiter", "/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<EnumerationResults><Blobs>\
             <Blob><Name>dir/f</Name><Properties><Content-Length>1</Content-Length></Properties></Blob>\
             <BlobPrefix><Name>dir/sub/</Name></BlobPrefix>\
             </Blobs><NextMarker/></EnumerationResults>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let out = bucket.list_objects(&arm(&server), "a/dir/", "", "/", 0).await.unwrap();
    assert_eq!(keys(&out.objects), vec!["a/dir/f"]);
    assert_eq!(keys(&out.common_prefixes), vec!["a/dir/sub/"]);
}

#[tokio::test]
async fn markers_resume_inside_a_container() {
    let server = MockServer::start().await;
    let bucket = bucket(&server).await;
    mount_containers(&server, &["a", "b"]).await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .and(query_param("comp", "list"))
        .and(query_param("maxresults", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(blobs_xml(&["x"], "m2")))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .and(query_param("comp", "list"))
        .and(query_param("marker", "m2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(blobs_xml(&["y"], "")))
        .with_priority(1)
        .mount(&server)
        .await;
    mount_blobs(&server, "b", &["z"]).await;

    let arm = arm(&server);
    let first = bucket.list_objects(&arm, "", "", "", 2).await.unwrap();
    assert_eq!(keys(&first.objects), vec!["a/", "a/x"]);
    assert!(first.is_truncated);
    assert_eq!(first.next_marker.as_deref(), Some("a/m2"));

    let rest = bucket.list_objects(&arm, "", "a/m2", "", 0).await.unwrap();
    assert_eq!(keys(&rest.objects), vec!["a/y", "b/", "b/z"]);
    assert!(!rest.is_truncated);
}

#[tokio::test]
async fn container_marker_skips_past_it() {
    let server = MockServer::start().await;
    let bucket = bucket(&server).await;
    mount_containers(&server, &["a", "b", "c"]).await;
    mount_blobs(&server, "c", &["q"]).await;

    let arm = arm(&server);
    let first = bucket.list_objects(&arm, "", "", "/", 2).await.unwrap();
    assert_eq!(keys(&first.common_prefixes), vec!["a/", "b/"]);
    assert_eq!(first.next_marker.as_deref(), Some("b"));

    let rest = bucket.list_objects(&arm, "", "b", "/", 2).await.unwrap();
    assert_eq!(keys(&rest.common_prefixes), vec!["c/"]);
    assert!(rest.next_marker.is_none());
}
