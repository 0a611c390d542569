use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::env::join_url;
use crate::error::ArmError;

/// Abstraction over bearer-token acquisition; enables test injection.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A bearer token valid for `resource` (the audience URL).
    async fn token(&self, resource: &str) -> Result<String, ArmError>;
}

// ── Client credentials ────────────────────────────────────────────────────────

/// OAuth2 client-credentials flow against `{aad}/{tenant}/oauth2/token`.
pub struct ClientSecretCredential {
    tenant_id:     String,
    client_id:     String,
    client_secret: String,
    authority:     String,
    client:        reqwest::Client,
    cache:         Mutex<HashMap<String, (String, Instant)>>,
}

impl ClientSecretCredential {
    pub fn new(
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        authority: &str,
        client: reqwest::Client,
    ) -> Result<Self, ArmError> {
        if tenant_id.is_empty() {
            return Err(ArmError::MissingParameter("tenant_id"));
        }
        if client_id.is_empty() {
            return Err(ArmError::MissingParameter("client_id"));
        }
        if client_secret.is_empty() {
            return Err(ArmError::MissingParameter("client_secret"));
        }
        Ok(Self {
            tenant_id:     tenant_id.to_string(),
            client_id:     client_id.to_string(),
            client_secret: client_secret.to_string(),
            authority:     authority.to_string(),
            client,
            cache:         Mutex::new(HashMap::new()),
        })
    }
}

impl ClientSecretCredential {
    async fn fetch(&self, resource: &str) -> Result<(String, Instant), ArmError> {
        let url = join_url(&self.authority, &format!("{}/oauth2/token", self.tenant_id));
        debug!(resource, "requesting AAD token");
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("resource", resource),
        ];
        let resp = self.client.post(&url).form(&params).send().await?;
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let reason = body["error_description"]
                .as_str()
                .or_else(|| body["error"].as_str())
                .unwrap_or("token request rejected");
            return Err(ArmError::AuthFailed(format!("{} ({})", reason, status.as_u16())));
        }

        let tok = body["access_token"]
            .as_str()
            .ok_or_else(|| ArmError::AuthFailed("no access_token in AAD response".into()))?
            .to_string();
        // v1 endpoints report expires_in as a string.
        let expires_in = body["expires_in"]
            .as_u64()
            .or_else(|| body["expires_in"].as_str().and_then(|s| s.parse().ok()))
            .unwrap_or(3600);
        Ok((tok, Instant::now() + Duration::from_secs(expires_in.saturating_sub(60))))
    }
}

#[async_trait]
impl TokenProvider for ClientSecretCredential {
    async fn token(&self, resource: &str) -> Result<String, ArmError> {
        // Held across the refresh so concurrent callers share one AAD round-trip.
        let mut cache = self.cache.lock().await;
        if let Some((tok, expiry)) = cache.get(resource) {
            if Instant::now() < *expiry {
                return Ok(tok.clone());
            }
        }

        let (tok, expiry) = self.fetch(resource).await?;
        cache.insert(resource.to_string(), (tok.clone(), expiry));
        Ok(tok)
    }
}

// ── Static (tests) ────────────────────────────────────────────────────────────

pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self, _resource: &str) -> Result<String, ArmError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential(server: &MockServer) -> ClientSecretCredential {
        ClientSecretCredential::new("tenant", "app", "secret", &server.uri(), reqwest::Client::new())
            .unwrap()
    }

    #[tokio::test]
    async fn token_is_cached_per_resource() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=app"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-1",
                "expires_in": "3599",
            })))
            .expect(2)
            .mount(&server)
            .await;

        let cred = credential(&server);
        assert_eq!(cred.token("https://management.azure.com/").await.unwrap(), "tok-1");
        assert_eq!(cred.token("https://management.azure.com/").await.unwrap(), "tok-1");
        // second audience fetches its own token
        assert_eq!(cred.token("https://graph.windows.net/").await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn near_expiry_token_is_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "short",
                "expires_in": 30,
            })))
            .expect(2)
            .mount(&server)
            .await;

        let cred = credential(&server);
        cred.token("r").await.unwrap();
        cred.token("r").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "shared", "expires_in": 3600}))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cred = std::sync::Arc::new(credential(&server));
        let callers: Vec<_> = (0..8)
            .map(|_| {
                let cred = cred.clone();
                tokio::spawn(async move { cred.token("r").await })
            })
            .collect();
        for caller in callers {
            assert_eq!(caller.await.unwrap().unwrap(), "shared");
        }
    }

    #[tokio::test]
    async fn rejected_credentials_are_auth_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret",
            })))
            .mount(&server)
            .await;

        let err = credential(&server).token("r").await.unwrap_err();
        assert!(matches!(err, ArmError::AuthFailed(_)), "got: {}", err);
        assert!(err.to_string().contains("AADSTS7000215"), "got: {}", err);
    }

    #[test]
    fn missing_credentials_rejected() {
        let res = ClientSecretCredential::new("t", "", "s", "https://x", reqwest::Client::new());
        assert!(matches!(res, Err(ArmError::MissingParameter("client_id"))));
    }
}
