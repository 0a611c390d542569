use azmux_domain::BucketAcl;
use chrono::{DateTime, Utc};
use reqwest::{Method, Response};
use tracing::{debug, info};

use crate::client::{header_str, BlobClient, BlobRequest};
use crate::error::BlobError;
use crate::xml::{xml_elements, xml_text};

const PUBLIC_ACCESS: &str = "x-ms-blob-public-access";

/// Public access level `container` is the only one treated as public-read.
fn acl_from_public_access(level: &str) -> BucketAcl {
    if level.eq_ignore_ascii_case("container") {
        BucketAcl::PublicRead
    } else {
        BucketAcl::Private
    }
}

pub(crate) fn parse_http_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s.trim()).ok().map(|d| d.with_timezone(&Utc))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub name:          String,
    pub etag:          String,
    pub last_modified: Option<DateTime<Utc>>,
    pub acl:           BucketAcl,
}

impl Container {
    fn from_response(name: &str, resp: &Response) -> Self {
        Container {
            name:          name.to_string(),
            etag:          header_str(resp, "etag"),
            last_modified: parse_http_date(&header_str(resp, "last-modified")),
            acl:           acl_from_public_access(&header_str(resp, PUBLIC_ACCESS)),
        }
    }

    fn from_xml(xml: &str) -> Self {
        Container {
            name:          xml_text(xml, "Name").unwrap_or_default(),
            etag:          xml_text(xml, "Etag").unwrap_or_default(),
            last_modified: xml_text(xml, "Last-Modified").as_deref().and_then(parse_http_date),
            acl:           acl_from_public_access(&xml_text(xml, "PublicAccess").unwrap_or_default()),
        }
    }
}

impl BlobClient {
    pub async fn create_container(&self, name: &str, acl: BucketAcl) -> Result<Container, BlobError> {
        info!(account = self.account(), container = name, %acl, "creating container");
        let mut req = BlobRequest::new(Method::PUT, Self::container_path(name)).query("restype", "container");
        if acl == BucketAcl::PublicRead {
            req = req.header(PUBLIC_ACCESS, "container");
        }
        let resp = self.send(req).await?;
        let mut container = Container::from_response(name, &resp);
        container.acl = acl;
        Ok(container)
    }

    /// The container, created private when it does not exist yet.
    pub async fn ensure_container(&self, name: &str) -> Result<Container, BlobError> {
        self.ensure_container_with_acl(name, BucketAcl::Private).await
    }

    /// The container, created with `acl` when it does not exist yet. An
    /// existing container keeps its ACL.
    pub async fn ensure_container_with_acl(&self, name: &str, acl: BucketAcl) -> Result<Container, BlobError> {
        match self.get_container(name).await {
            Ok(c) => Ok(c),
            Err(BlobError::NotFound) => match self.create_container(name, acl).await {
                Err(BlobError::Storage { code, .. }) if code == "ContainerAlreadyExists" => {
                    self.get_container(name).await
                }
                other => other,
            },
            Err(e) => Err(e),
        }
    }

    pub async fn get_container(&self, name: &str) -> Result<Container, BlobError> {
        let req = BlobRequest::new(Method::HEAD, Self::container_path(name)).query("restype", "container");
        let resp = self.send(req).await?;
        Ok(Container::from_response(name, &resp))
    }

    /// Every container of the account, following `NextMarker`.
    pub async fn list_containers(&self) -> Result<Vec<Container>, BlobError> {
        let mut out = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut req = BlobRequest::new(Method::GET, "/".into()).query("comp", "list");
            if let Some(m) = marker.take() {
                req = req.query("marker", m);
            }
            let body = self.send_text(req).await?;
            for item in xml_elements(&body, "Container")? {
                out.push(Container::from_xml(&item));
            }
            marker = xml_text(&body, "NextMarker").filter(|m| !m.is_empty());
            if marker.is_none() {
                break;
            }
        }
        debug!(account = self.account(), count = out.len(), "containers listed");
        Ok(out)
    }

    /// Delete a container; a missing one counts as deleted.
    pub async fn delete_container(&self, name: &str) -> Result<(), BlobError> {
        let req = BlobRequest::new(Method::DELETE, Self::container_path(name)).query("restype", "container");
        match self.send(req).await {
            Ok(_) | Err(BlobError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn container_acl(&self, name: &str) -> Result<BucketAcl, BlobError> {
        let req = BlobRequest::new(Method::GET, Self::container_path(name))
            .query("restype", "container")
            .query("comp", "acl");
        let resp = self.send(req).await?;
        Ok(acl_from_public_access(&header_str(&resp, PUBLIC_ACCESS)))
    }

    pub async fn set_container_acl(&self, name: &str, acl: BucketAcl) -> Result<(), BlobError> {
        info!(account = self.account(), container = name, %acl, "setting container ACL");
        let mut req = BlobRequest::new(Method::PUT, Self::container_path(name))
            .query("restype", "container")
            .query("comp", "acl");
        if acl == BucketAcl::PublicRead {
            req = req.header(PUBLIC_ACCESS, "container");
        }
        self.send(req).await?;
        Ok(())
    }
}
