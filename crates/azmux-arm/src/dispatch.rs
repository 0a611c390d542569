use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::api_version::with_api_version;
use crate::client::ArmClient;
use crate::env::{join_url, Audience};
use crate::error::{ArmError, AzureError};
use crate::lro::AsyncOperation;
use crate::recovery::namespaces_to_register;

const CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";
const GRAPH_API_VERSION: &str = "1.6";
const TRACE_BODY_LIMIT: usize = 200;

fn is_absolute(path: &str) -> bool {
    path.starts_with("https://") || path.starts_with("http://")
}

fn truncate(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

impl ArmClient {
    /// Full URL for `path` against the audience's endpoint.
    pub fn resolve_url(&self, path: &str, audience: Audience) -> String {
        let env = self.environment();
        match audience {
            Audience::ResourceManager => {
                let url = if is_absolute(path) {
                    path.to_string()
                } else {
                    join_url(&env.resource_manager, path)
                };
                self.api_versions().apply(&url)
            }
            Audience::Graph => {
                let url = if is_absolute(path) {
                    path.to_string()
                } else {
                    join_url(
                        &env.graph,
                        &format!("{}/{}", self.tenant_id(), path.trim_start_matches('/')),
                    )
                };
                with_api_version(&url, GRAPH_API_VERSION)
            }
        }
    }

    /// One request, with async operations driven to completion but without
    /// error recovery.
    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        audience: Audience,
    ) -> Result<Value, ArmError> {
        let url = self.resolve_url(path, audience);
        url::Url::parse(&url).map_err(|source| ArmError::InvalidUrl { url: url.clone(), source })?;

        let token = self.bearer(audience).await?;
        let request_id = Uuid::new_v4().to_string();
        debug!(%method, url = %url, "Azure ARM {}", method);
        if self.is_debug() {
            if let Some(body) = body {
                debug!(request_id = %request_id, body = %truncate(&body.to_string(), TRACE_BODY_LIMIT), "request body");
            }
        }

        let mut req = self
            .http()
            .request(method.clone(), &url)
            .bearer_auth(&token)
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .header(CLIENT_REQUEST_ID, &request_id);
        if let Some(body) = body {
            req = req.body(body.to_string());
        }
        let resp = req.send().await?;
        let status = resp.status();

        if status == StatusCode::NOT_FOUND {
            debug!(%method, url = %url, "not found");
            return Err(ArmError::NotFound);
        }

        let operation = AsyncOperation::from_response(&method, &url, status, resp.headers()).map(|mut op| {
            op.audience = audience;
            op
        });
        let text = resp.text().await?.replace('\r', "");
        if self.is_debug() {
            debug!(
                request_id = %request_id,
                status = status.as_u16(),
                body = %truncate(&text, TRACE_BODY_LIMIT),
                "response"
            );
        }

        let data: Value = if text.trim().is_empty() {
            json!({})
        } else {
            match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(_) if !status.is_success() => {
                    return Err(ArmError::Http { status: status.as_u16(), body: text })
                }
                Err(e) => return Err(e.into()),
            }
        };

        if let Some(err) = AzureError::from_body(&data) {
            return Err(ArmError::Arm(err));
        }
        if !status.is_success() {
            return Err(ArmError::Http { status: status.as_u16(), body: text });
        }

        if let Some(op) = operation {
            let deadline = self.poll_policy().deadline_for(&method);
            let output = self.await_operation(op, deadline).await?;
            if !output.is_null() {
                return Ok(output);
            }
        }
        Ok(data)
    }

    /// ARM request with one recovery pass for unregistered providers.
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, ArmError> {
        match self.send(method.clone(), path, body, Audience::ResourceManager).await {
            Err(ArmError::Arm(err)) => {
                let Some(namespaces) = namespaces_to_register(&err) else {
                    return Err(ArmError::Arm(err));
                };
                info!(code = %err.code, ?namespaces, path, "registering providers before retrying");
                for namespace in &namespaces {
                    self.register_provider(namespace).await?;
                }
                self.send(method, path, body, Audience::ResourceManager).await
            }
            other => other,
        }
    }
}
