use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api_version::with_api_version;
use crate::client::ArmClient;
use crate::env::Audience;
use crate::error::{ArmError, AzureError};

pub const AZURE_ASYNC_OPERATION: &str = "Azure-AsyncOperation";
pub const LOCATION: &str = "Location";
pub const RETRY_AFTER: &str = "Retry-After";

/// Failure codes after which the VM is usable; only guest provisioning
/// reported trouble.
pub const OS_PROVISIONING_CODES: [&str; 3] = [
    "OSProvisioningTimedOut",
    "OSProvisioningClientError",
    "OSProvisioningInternalError",
];

const DIRECTORY_SERVICE_SUFFIXES: [&str; 2] = [
    "Microsoft.DirectoryServices.User",
    "Microsoft.DirectoryServices.Group",
];

// ── Clock ─────────────────────────────────────────────────────────────────────

/// Time source for poll sleeps; tests substitute a simulated one.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Simulated clock: `sleep` returns immediately and advances `now`.
pub struct ManualClock {
    start: Instant,
    slept: StdMutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            slept: StdMutex::new(Vec::new()),
        }
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        match self.slept.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        match self.slept.lock() {
            Ok(mut g) => g.push(duration),
            Err(poisoned) => poisoned.into_inner().push(duration),
        }
        tokio::task::yield_now().await;
    }
}

// ── Policy ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between polls when the server gives no `Retry-After`.
    pub interval: Duration,
    /// Deadline for provisioning operations (PUT/POST/PATCH).
    pub timeout: Duration,
    /// Deadline for deletes.
    pub delete_timeout: Duration,
    /// Report OS-provisioning failures as success.
    pub demote_os_provisioning: bool,
    /// Unit of the linear back-off while waiting for provider registration.
    pub registration_backoff: Duration,
    pub registration_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval:               Duration::from_secs(5),
            timeout:                Duration::from_secs(30 * 60),
            delete_timeout:         Duration::from_secs(30 * 60),
            demote_os_provisioning: true,
            registration_backoff:   Duration::from_secs(2),
            registration_attempts:  10,
        }
    }
}

impl PollPolicy {
    pub fn deadline_for(&self, method: &Method) -> Duration {
        if *method == Method::DELETE {
            self.delete_timeout
        } else {
            self.timeout
        }
    }
}

// ── Operation handle ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusHeader {
    AzureAsyncOperation,
    Location,
}

/// An in-flight asynchronous ARM operation.
#[derive(Debug, Clone)]
pub struct AsyncOperation {
    pub status_url: String,
    pub header: StatusHeader,
    /// Method and URL of the request that started the operation.
    pub method: Method,
    pub request_url: String,
    /// Version appended to a status URL that lacks one.
    pub api_version: Option<String>,
    pub audience: Audience,
}

impl AsyncOperation {
    /// Detect whether a response starts an asynchronous operation.
    pub fn from_response(
        method: &Method,
        request_url: &str,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Option<Self> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let location = header(LOCATION);
        let async_op = header(AZURE_ASYNC_OPERATION);

        let triggered = location.is_some()
            || (async_op.is_some() && status != StatusCode::OK)
            || (async_op.is_some() && request_url.to_ascii_lowercase().contains("enablevmaccess"));
        if !triggered {
            return None;
        }

        let (status_url, kind) = match (async_op, location) {
            (Some(url), _) => (url, StatusHeader::AzureAsyncOperation),
            (None, Some(url)) => (url, StatusHeader::Location),
            (None, None) => return None,
        };
        let api_version = url::Url::parse(request_url).ok().and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "api-version")
                .map(|(_, v)| v.into_owned())
        });

        Some(AsyncOperation {
            status_url,
            header: kind,
            method: method.clone(),
            request_url: request_url.to_string(),
            api_version,
            audience: Audience::ResourceManager,
        })
    }

    fn poll_url(&self) -> String {
        let url = &self.status_url;
        if DIRECTORY_SERVICE_SUFFIXES.iter().any(|s| url.ends_with(s)) {
            return with_api_version(url, "1.6");
        }
        match &self.api_version {
            Some(v) => with_api_version(url, v),
            None => url.clone(),
        }
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

// ── State machine ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum OperationState {
    Accepted,
    InProgress,
    Succeeded(Value),
    Failed(AzureError),
    TimedOut,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationState::Succeeded(_) | OperationState::Failed(_) | OperationState::TimedOut
        )
    }
}

/// What one poll response says about the operation.
#[derive(Debug)]
enum PollOutcome {
    Pending { next_url: Option<String>, retry_after: Option<Duration> },
    Done(Value),
    Failed(AzureError),
}

fn classify(
    op: &AsyncOperation,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> Result<PollOutcome, ArmError> {
    let retry = retry_after(headers);
    if status == StatusCode::ACCEPTED {
        let next_url = headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        return Ok(PollOutcome::Pending { next_url, retry_after: retry });
    }
    if !status.is_success() {
        // The Location target of a finished delete is the deleted resource.
        if status == StatusCode::NOT_FOUND && op.method == Method::DELETE && op.header == StatusHeader::Location {
            return Ok(PollOutcome::Done(Value::Null));
        }
        let envelope = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|data| AzureError::from_body(&data));
        return match envelope {
            Some(e) => Err(ArmError::Arm(e)),
            None => Err(ArmError::Http { status: status.as_u16(), body: body.to_string() }),
        };
    }
    if body.trim().is_empty() {
        return Ok(PollOutcome::Done(Value::Null));
    }

    let data: Value = serde_json::from_str(body)?;

    match data.get("status").and_then(Value::as_str) {
        Some("InProgress") => Ok(PollOutcome::Pending { next_url: None, retry_after: retry }),
        Some("Succeeded") => Ok(PollOutcome::Done(
            data.pointer("/properties/output").cloned().unwrap_or(Value::Null),
        )),
        Some("Failed") | Some("Canceled") => {
            let err = data
                .get("error")
                .filter(|e| e.is_object())
                .map(AzureError::from_object)
                .unwrap_or_else(|| AzureError {
                    code: data["status"].as_str().unwrap_or("Failed").to_string(),
                    message: data.to_string(),
                    details: vec![],
                });
            Ok(PollOutcome::Failed(err))
        }
        Some(other) if op.header == StatusHeader::AzureAsyncOperation => {
            Err(ArmError::UnknownAsyncStatus(other.to_string()))
        }
        // A Location target answers with the finished resource itself.
        _ => Ok(PollOutcome::Done(data)),
    }
}

impl ArmClient {
    /// Drive an asynchronous operation to a terminal state.
    ///
    /// Returns `properties.output` of a succeeded operation (or the body a
    /// `Location` target answered with), `Value::Null` when there is none.
    pub async fn await_operation(
        &self,
        mut op: AsyncOperation,
        deadline: Duration,
    ) -> Result<Value, ArmError> {
        let clock = self.clock();
        let started = clock.now();
        let mut state = OperationState::Accepted;
        let mut polls: u32 = 0;

        loop {
            let url = op.poll_url();
            let token = self.bearer(op.audience).await?;
            let resp = self.http().get(&url).bearer_auth(&token).send().await?;
            polls += 1;

            let status = resp.status();
            let headers = resp.headers().clone();
            let body = resp.text().await?.replace('\r', "");

            let outcome = classify(&op, status, &headers, &body)?;
            let mut wait_hint = None;
            let next = match outcome {
                PollOutcome::Done(output) => OperationState::Succeeded(output),
                PollOutcome::Failed(err) => OperationState::Failed(err),
                PollOutcome::Pending { next_url, retry_after } => {
                    if let Some(next_url) = next_url {
                        debug!(from = %op.status_url, to = %next_url, "async operation moved");
                        op.status_url = next_url;
                        op.header = StatusHeader::Location;
                    }
                    wait_hint = retry_after;
                    OperationState::InProgress
                }
            };
            if std::mem::discriminant(&next) != std::mem::discriminant(&state) {
                debug!(from = ?state, to = ?next, url = %op.request_url, "async operation transition");
            }
            state = next;

            match state {
                OperationState::Succeeded(output) => {
                    debug!(method = %op.method, url = %op.request_url, polls, "async operation succeeded");
                    return Ok(output);
                }
                OperationState::Failed(err) => {
                    if self.poll_policy().demote_os_provisioning
                        && OS_PROVISIONING_CODES.contains(&err.code.as_str())
                    {
                        warn!(method = %op.method, url = %op.request_url, error = %err, "ignoring OS provisioning failure");
                        return Ok(Value::Null);
                    }
                    return Err(ArmError::AsyncFailed(err));
                }
                _ => {}
            }

            let wait = wait_hint.unwrap_or(self.poll_policy().interval);
            let waited = clock.now().saturating_duration_since(started);
            if waited + wait > deadline {
                debug!(from = ?state, to = ?OperationState::TimedOut, polls, "async operation deadline reached");
                return Err(ArmError::AsyncTimeout {
                    method: op.method.to_string(),
                    url: op.request_url.clone(),
                    waited,
                });
            }

            if polls % 10 == 0 {
                info!(polls, url = %op.request_url, "still waiting for Azure ARM operation");
            } else {
                debug!(polls, url = %op.request_url, ?wait, "Azure ARM operation pending, waiting");
            }
            clock.sleep(wait).await;
        }
    }
}
