use std::collections::BTreeMap;
use std::iter;
use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::api_version::ApiVersionTable;
use crate::auth::{ClientSecretCredential, TokenProvider};
use crate::env::{Audience, Environment};
use crate::error::ArmError;
use crate::lro::{Clock, PollPolicy, TokioClock};
use crate::subscription::{Region, ResourceGroup, Subscription};

/// Name of the resource group created when a subscription has none.
pub const DEFAULT_RESOURCE_GROUP: &str = "Default";

/// How many `{name}-{n}` suffixes are probed before giving up. The bare
/// `name` is tried first, so a full search issues one more GET than this.
pub const UNIQUE_NAME_ATTEMPTS: usize = 20;

const TAGS_API_VERSION: &str = "2020-06-01";
const RESERVED_TAG_PREFIXES: [&str; 3] = ["microsoft", "azure", "windows"];

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub environment:     Environment,
    pub tenant_id:       String,
    pub client_id:       String,
    pub client_secret:   String,
    pub subscription_id: Option<String>,
    /// Trace request and response bodies at `debug!`.
    pub debug:           bool,
    pub poll:            PollPolicy,
}

impl ClientConfig {
    pub fn new(environment: Environment, tenant_id: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            environment,
            tenant_id:       tenant_id.to_string(),
            client_id:       client_id.to_string(),
            client_secret:   client_secret.to_string(),
            subscription_id: None,
            debug:           false,
            poll:            PollPolicy::default(),
        }
    }

    pub fn subscription(mut self, subscription_id: &str) -> Self {
        self.subscription_id = Some(subscription_id.to_string());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Authenticated handle to one tenant and (at most) one bound subscription.
pub struct ArmClient {
    http:            reqwest::Client,
    env:             Environment,
    tenant_id:       String,
    client_id:       String,
    subscription_id: Option<String>,
    token:           Box<dyn TokenProvider>,
    versions:        ApiVersionTable,
    poll:            PollPolicy,
    clock:           Arc<dyn Clock>,
    debug:           bool,

    pub(crate) subscriptions:   Vec<Subscription>,
    pub(crate) regions:         Vec<Region>,
    pub(crate) resource_groups: RwLock<Option<Vec<ResourceGroup>>>,
}

impl ArmClient {
    /// Client authenticating with the configured service principal.
    pub fn new(config: ClientConfig) -> Result<Self, ArmError> {
        let http = reqwest::Client::new();
        let credential = ClientSecretCredential::new(
            &config.tenant_id,
            &config.client_id,
            &config.client_secret,
            &config.environment.active_directory,
            http.clone(),
        )?;
        Ok(Self::build(config, http, Box::new(credential)))
    }

    /// Client with an injected token source.
    pub fn with_token_provider(config: ClientConfig, token: Box<dyn TokenProvider>) -> Self {
        Self::build(config, reqwest::Client::new(), token)
    }

    fn build(config: ClientConfig, http: reqwest::Client, token: Box<dyn TokenProvider>) -> Self {
        Self {
            http,
            env:             config.environment,
            tenant_id:       config.tenant_id,
            client_id:       config.client_id,
            subscription_id: config.subscription_id.filter(|s| !s.is_empty()),
            token,
            versions:        ApiVersionTable::azure(),
            poll:            config.poll,
            clock:           Arc::new(TokioClock),
            debug:           config.debug,
            subscriptions:   Vec::new(),
            regions:         Vec::new(),
            resource_groups: RwLock::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_api_versions(mut self, versions: ApiVersionTable) -> Self {
        self.versions = versions;
        self
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn subscription_id(&self) -> Result<&str, ArmError> {
        self.subscription_id.as_deref().ok_or(ArmError::MissingSubscription)
    }

    pub(crate) fn set_subscription(&mut self, subscription_id: Option<String>) {
        self.subscription_id = subscription_id;
    }

    pub fn api_versions(&self) -> &ApiVersionTable {
        &self.versions
    }

    pub fn poll_policy(&self) -> &PollPolicy {
        &self.poll
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) async fn bearer(&self, audience: Audience) -> Result<String, ArmError> {
        self.token.token(self.env.token_resource(audience)).await
    }

    // ── Typed primitives ──────────────────────────────────────────────────────

    pub async fn get<T: DeserializeOwned>(&self, id: &str, query: &[(&str, &str)]) -> Result<T, ArmError> {
        if id.trim().is_empty() {
            return Err(ArmError::NotFound);
        }
        let body = self.request(Method::GET, &with_query(id, query), None).await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn list<T: DeserializeOwned>(&self, resource: &str, query: &[(&str, &str)]) -> Result<Vec<T>, ArmError> {
        self.list_with_key(resource, query, "value").await
    }

    /// List `resource`, reading items from `key` of every page.
    pub async fn list_with_key<T: DeserializeOwned>(
        &self,
        resource: &str,
        query: &[(&str, &str)],
        key: &str,
    ) -> Result<Vec<T>, ArmError> {
        let path = self.list_path(self.subscription_id.as_deref(), resource)?;
        self.collect_pages(&with_query(&path, query), key).await
    }

    /// Same as [`list`](Self::list) against a subscription other than the bound one.
    pub async fn list_in_subscription<T: DeserializeOwned>(
        &self,
        subscription_id: &str,
        resource: &str,
    ) -> Result<Vec<T>, ArmError> {
        let path = self.list_path(Some(subscription_id), resource)?;
        self.collect_pages(&path, "value").await
    }

    /// Every resource of an ARM type (`Microsoft.Compute/virtualMachines`) in
    /// the bound subscription.
    pub async fn list_all<T: DeserializeOwned>(&self, resource_type: &str) -> Result<Vec<T>, ArmError> {
        let sub = self.subscription_id()?;
        let path = self.list_path(Some(sub), resource_type.trim_start_matches('/'))?;
        self.collect_pages(&path, "value").await
    }

    fn list_path(&self, subscription_id: Option<&str>, resource: &str) -> Result<String, ArmError> {
        let lower = resource.to_ascii_lowercase();
        if lower == "subscriptions" {
            return Ok("/subscriptions".to_string());
        }
        if resource.starts_with('/') || lower.starts_with("subscriptions/") {
            return Ok(format!("/{}", resource.trim_start_matches('/')));
        }
        let sub = subscription_id.ok_or(ArmError::MissingSubscription)?;
        Ok(match lower.as_str() {
            "locations" | "resourcegroups" | "providers" => format!("/subscriptions/{}/{}", sub, resource),
            _ => format!("/subscriptions/{}/providers/{}", sub, resource),
        })
    }

    async fn collect_pages<T: DeserializeOwned>(&self, first: &str, key: &str) -> Result<Vec<T>, ArmError> {
        let mut items = Vec::new();
        let mut next = Some(first.to_string());
        let mut pages = 0u32;

        while let Some(path) = next.take() {
            let page = self.request(Method::GET, &path, None).await?;
            pages += 1;
            if let Some(batch) = page.get(key).filter(|v| !v.is_null()) {
                let mut batch: Vec<T> = serde_json::from_value(batch.clone())?;
                items.append(&mut batch);
            }
            next = page
                .get("nextLink")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(|link| next_page(first, link));
        }
        debug!(path = first, pages, count = items.len(), "list complete");
        Ok(items)
    }

    /// PUT `body` into the default resource group under a unique name.
    pub async fn create<B: Serialize, T: DeserializeOwned>(&self, body: &B) -> Result<T, ArmError> {
        let body = serde_json::to_value(body)?;
        let location = body["location"].as_str().unwrap_or_default().to_string();
        let group = self.default_resource_group(&location).await?;
        self.create_in(&group, body).await
    }

    /// PUT `body` into `resource_group`, creating the group when missing.
    pub async fn create_with_resource_group<B: Serialize, T: DeserializeOwned>(
        &self,
        resource_group: &str,
        body: &B,
    ) -> Result<T, ArmError> {
        let body = serde_json::to_value(body)?;
        let sub = self.subscription_id()?;
        let rg_path = format!("/subscriptions/{}/resourcegroups/{}", sub, resource_group);
        match self.request(Method::GET, &rg_path, None).await {
            Ok(_) => {}
            Err(ArmError::NotFound) => {
                let location = body["location"].as_str().unwrap_or_default();
                self.create_resource_group(resource_group, location).await?;
            }
            Err(e) => return Err(e),
        }
        self.create_in(resource_group, body).await
    }

    async fn create_in<T: DeserializeOwned>(&self, resource_group: &str, mut body: Value) -> Result<T, ArmError> {
        let sub = self.subscription_id()?;
        let resource_type = body["type"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or(ArmError::MissingParameter("type"))?
            .to_string();
        let name = body["name"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or(ArmError::MissingParameter("name"))?
            .to_string();

        let base = format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}",
            sub, resource_group, resource_type
        );
        let unique = self.unique_name(&base, &resource_type, &name).await?;
        body["name"] = Value::String(unique.clone());

        let out = self.request(Method::PUT, &format!("{}/{}", base, unique), Some(&body)).await?;
        Ok(serde_json::from_value(out)?)
    }

    /// First of `name`, `name-0` … `name-19` that does not exist yet.
    async fn unique_name(&self, base: &str, resource_type: &str, name: &str) -> Result<String, ArmError> {
        let candidates = iter::once(name.to_string())
            .chain((0..UNIQUE_NAME_ATTEMPTS).map(|i| format!("{}-{}", name, i)));
        for candidate in candidates {
            match self.request(Method::GET, &format!("{}/{}", base, candidate), None).await {
                Err(ArmError::NotFound) => return Ok(candidate),
                Ok(_) => debug!(name = %candidate, resource_type, "name taken"),
                Err(e) => return Err(e),
            }
        }
        Err(ArmError::Duplicate {
            resource_type: resource_type.to_string(),
            name: name.to_string(),
        })
    }

    /// PUT `body` back to its own `id`.
    pub async fn update<B: Serialize, T: DeserializeOwned>(&self, body: &B) -> Result<T, ArmError> {
        let body = serde_json::to_value(body)?;
        let id = body["id"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or(ArmError::MissingParameter("id"))?
            .to_string();
        let out = self.request(Method::PUT, &id, Some(&body)).await?;
        Ok(serde_json::from_value(out)?)
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(&self, id: &str, body: &B) -> Result<T, ArmError> {
        let body = serde_json::to_value(body)?;
        let out = self.request(Method::PATCH, id, Some(&body)).await?;
        Ok(serde_json::from_value(out)?)
    }

    /// DELETE `id`; a resource that is already gone counts as deleted.
    pub async fn delete(&self, id: &str) -> Result<(), ArmError> {
        match self.request(Method::DELETE, id, None).await {
            Ok(_) => Ok(()),
            Err(ArmError::NotFound) => {
                debug!(id, "delete: already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// POST `{id}/{action}`.
    pub async fn perform_action<B: Serialize, T: DeserializeOwned>(
        &self,
        id: &str,
        action: &str,
        body: Option<&B>,
    ) -> Result<T, ArmError> {
        let body = body.map(serde_json::to_value).transpose()?;
        let path = format!("{}/{}", id.trim_end_matches('/'), action);
        let out = self.request(Method::POST, &path, body.as_ref()).await?;
        Ok(serde_json::from_value(out)?)
    }

    pub async fn check_name_availability<B: Serialize, T: DeserializeOwned>(
        &self,
        namespace: &str,
        body: &B,
    ) -> Result<T, ArmError> {
        let sub = self.subscription_id()?;
        let path = format!("/subscriptions/{}/providers/{}/checkNameAvailability", sub, namespace);
        let body = serde_json::to_value(body)?;
        let out = self.request(Method::POST, &path, Some(&body)).await?;
        Ok(serde_json::from_value(out)?)
    }

    // ── Tags ──────────────────────────────────────────────────────────────────

    fn tags_path(id: &str) -> String {
        format!(
            "{}/providers/Microsoft.Resources/tags/default?api-version={}",
            id.trim_end_matches('/'),
            TAGS_API_VERSION
        )
    }

    pub async fn get_tags(&self, id: &str) -> Result<BTreeMap<String, String>, ArmError> {
        match self.request(Method::GET, &Self::tags_path(id), None).await {
            Ok(body) => match body.pointer("/properties/tags") {
                Some(tags) if !tags.is_null() => Ok(serde_json::from_value(tags.clone())?),
                _ => Ok(BTreeMap::new()),
            },
            Err(ArmError::NotFound) => Ok(BTreeMap::new()),
            Err(e) => Err(e),
        }
    }

    /// Replace every tag of `id`; an empty map removes them all.
    pub async fn set_tags(&self, id: &str, tags: &BTreeMap<String, String>) -> Result<(), ArmError> {
        for key in tags.keys() {
            let lower = key.to_ascii_lowercase();
            if let Some(prefix) = RESERVED_TAG_PREFIXES.iter().find(|p| lower.starts_with(*p)) {
                return Err(ArmError::NotSupported(format!(
                    "tag key '{}' uses reserved prefix '{}'",
                    key, prefix
                )));
            }
        }

        let path = Self::tags_path(id);
        if tags.is_empty() {
            return match self.request(Method::DELETE, &path, None).await {
                Ok(_) | Err(ArmError::NotFound) => Ok(()),
                Err(e) => Err(e),
            };
        }
        let body = json!({ "operation": "replace", "properties": { "tags": tags } });
        self.request(Method::PATCH, &path, Some(&body)).await?;
        Ok(())
    }

    // ── Resource groups ───────────────────────────────────────────────────────

    async fn put_resource_group(&self, name: &str, location: &str) -> Result<ResourceGroup, ArmError> {
        if location.is_empty() {
            return Err(ArmError::MissingParameter("location"));
        }
        let sub = self.subscription_id()?;
        let path = format!("/subscriptions/{}/resourcegroups/{}", sub, name);
        info!(name, location, "creating resource group");
        let out = self.request(Method::PUT, &path, Some(&json!({ "location": location }))).await?;
        Ok(serde_json::from_value(out)?)
    }

    pub async fn create_resource_group(&self, name: &str, location: &str) -> Result<ResourceGroup, ArmError> {
        let group = self.put_resource_group(name, location).await?;
        let mut cache = self.resource_groups.write().await;
        if let Some(groups) = cache.as_mut() {
            groups.retain(|g| g.id != group.id);
            groups.push(group.clone());
        }
        Ok(group)
    }

    pub async fn list_resource_groups(&self) -> Result<Vec<ResourceGroup>, ArmError> {
        self.list("resourcegroups", &[]).await
    }

    pub async fn delete_resource_group(&self, name: &str) -> Result<(), ArmError> {
        let sub = self.subscription_id()?;
        self.delete(&format!("/subscriptions/{}/resourcegroups/{}", sub, name)).await?;
        if let Some(groups) = self.resource_groups.write().await.as_mut() {
            groups.retain(|g| !g.name.eq_ignore_ascii_case(name));
        }
        Ok(())
    }

    /// Name of the group `create` puts resources into, creating `Default`
    /// in `location` when the subscription has no group at all.
    async fn default_resource_group(&self, location: &str) -> Result<String, ArmError> {
        if let Some(first) = self.resource_groups.read().await.as_ref().and_then(|g| g.first()) {
            return Ok(first.name.clone());
        }

        let mut cache = self.resource_groups.write().await;
        if cache.is_none() {
            *cache = Some(self.list_resource_groups().await?);
        }
        if let Some(first) = cache.as_ref().and_then(|g| g.first()) {
            return Ok(first.name.clone());
        }
        let group = self.put_resource_group(DEFAULT_RESOURCE_GROUP, location).await?;
        let name = group.name.clone();
        *cache = Some(vec![group]);
        Ok(name)
    }

    // ── Graph ─────────────────────────────────────────────────────────────────

    pub async fn graph_get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ArmError> {
        let body = self.send(Method::GET, path, None, Audience::Graph).await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn graph_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ArmError> {
        let mut items = Vec::new();
        let mut next = Some(path.to_string());
        while let Some(current) = next.take() {
            let page = self.send(Method::GET, &current, None, Audience::Graph).await?;
            if let Some(batch) = page.get("value").filter(|v| !v.is_null()) {
                let mut batch: Vec<T> = serde_json::from_value(batch.clone())?;
                items.append(&mut batch);
            }
            next = page
                .get("odata.nextLink")
                .and_then(Value::as_str)
                .and_then(skip_token)
                .map(|(key, token)| with_query(path, &[(key.as_str(), token.as_str())]));
        }
        Ok(items)
    }

    pub async fn graph_create<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ArmError> {
        let body = serde_json::to_value(body)?;
        let out = self.send(Method::POST, path, Some(&body), Audience::Graph).await?;
        Ok(serde_json::from_value(out)?)
    }

    pub async fn graph_patch<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ArmError> {
        let body = serde_json::to_value(body)?;
        self.send(Method::PATCH, path, Some(&body), Audience::Graph).await?;
        Ok(())
    }

    pub async fn graph_delete(&self, path: &str) -> Result<(), ArmError> {
        match self.send(Method::DELETE, path, None, Audience::Graph).await {
            Ok(_) | Err(ArmError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

// ── Paths ─────────────────────────────────────────────────────────────────────

/// Append URL-encoded `key=value` pairs to `path`.
pub fn with_query(path: &str, query: &[(&str, &str)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let pairs: Vec<String> = query
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect();
    let sep = if path.contains('?') { '&' } else { '?' };
    format!("{}{}{}", path, sep, pairs.join("&"))
}

/// The `$skiptoken` (either casing) carried by a continuation link.
fn skip_token(link: &str) -> Option<(String, String)> {
    let query = link.split_once('?')?.1;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == "$skiptoken" || k == "$skipToken")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
}

/// Path of the page after `first`: the original request plus the skip token,
/// or the link itself when it carries none.
fn next_page(first: &str, link: &str) -> String {
    match skip_token(link) {
        Some((key, token)) => with_query(first, &[(key.as_str(), token.as_str())]),
        None => link.to_string(),
    }
}
