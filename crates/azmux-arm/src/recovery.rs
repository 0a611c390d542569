use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info};

use crate::client::ArmClient;
use crate::env::Audience;
use crate::error::{ArmError, AzureError};

/// Providers whose registration repairs `err`, or `None` when the error is
/// not one the client knows how to recover from.
pub fn namespaces_to_register(err: &AzureError) -> Option<Vec<String>> {
    match err.code.as_str() {
        "SubscriptionNotRegistered" => Some(vec!["Microsoft.Network".to_string()]),
        "MissingSubscriptionRegistration" => {
            let targets: Vec<String> = err
                .details
                .iter()
                .map(|d| d.target.clone())
                .filter(|t| !t.is_empty())
                .collect();
            if targets.is_empty() {
                None
            } else {
                Some(targets)
            }
        }
        _ => None,
    }
}

impl ArmClient {
    /// Register a resource provider and wait until ARM reports it registered.
    pub async fn register_provider(&self, namespace: &str) -> Result<(), ArmError> {
        let sub = self.subscription_id()?;
        let provider = format!("/subscriptions/{}/providers/{}", sub, namespace);
        info!(namespace, subscription = sub, "registering resource provider");
        self.send(Method::POST, &format!("{}/register", provider), None, Audience::ResourceManager)
            .await?;

        let policy = *self.poll_policy();
        for attempt in 1..=policy.registration_attempts {
            let state = self.send(Method::GET, &provider, None, Audience::ResourceManager).await?;
            let registration = state["registrationState"].as_str().unwrap_or_default();
            if registration.eq_ignore_ascii_case("Registered") {
                info!(namespace, attempt, "resource provider registered");
                return Ok(());
            }
            if attempt < policy.registration_attempts {
                let wait = policy.registration_backoff * attempt;
                debug!(namespace, attempt, registration, ?wait, "waiting for provider registration");
                self.clock().sleep(wait).await;
            }
        }
        Err(ArmError::RegistrationTimeout {
            namespace: namespace.to_string(),
            attempts: policy.registration_attempts,
        })
    }

    /// Registration state of every provider in the bound subscription.
    pub async fn list_providers(&self) -> Result<Vec<Value>, ArmError> {
        self.list("providers", &[]).await
    }
}
