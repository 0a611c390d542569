use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One entry of an ARM error's `details` array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub target: String,
}

/// The `error` object of an ARM (or `odata.error` of a Graph) response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureError {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Vec<AzureErrorDetail>,
}

impl AzureError {
    /// Extract the error object embedded in a response body, if any.
    pub fn from_body(body: &Value) -> Option<AzureError> {
        ["error", "odata.error"]
            .iter()
            .find_map(|key| body.get(*key))
            .filter(|e| e.is_object())
            .map(Self::from_object)
    }

    pub(crate) fn from_object(err: &Value) -> AzureError {
        let code = err["code"].as_str().unwrap_or("Unknown").to_string();
        // Graph nests the text as {"lang": .., "value": ..}.
        let message = err["message"]
            .as_str()
            .or_else(|| err["message"]["value"].as_str())
            .unwrap_or("unknown error")
            .to_string();
        let details = err
            .get("details")
            .and_then(|d| serde_json::from_value(d.clone()).ok())
            .unwrap_or_default();
        AzureError { code, message, details }
    }
}

impl std::fmt::Display for AzureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if !self.details.is_empty() {
            let details: Vec<String> = self
                .details
                .iter()
                .map(|d| {
                    if d.target.is_empty() {
                        format!("{}: {}", d.code, d.message)
                    } else {
                        format!("{}: {} ({})", d.code, d.message, d.target)
                    }
                })
                .collect();
            write!(f, " [{}]", details.join("; "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ArmError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("resource not found")]
    NotFound,

    #[error("no unique name left for {resource_type} '{name}'")]
    Duplicate { resource_type: String, name: String },

    #[error("{0}")]
    Arm(AzureError),

    #[error("unexpected HTTP status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("{method} {url} did not finish within {waited:?}")]
    AsyncTimeout {
        method: String,
        url: String,
        waited: Duration,
    },

    #[error("async operation failed: {0}")]
    AsyncFailed(AzureError),

    #[error("unknown async operation status '{0}'")]
    UnknownAsyncStatus(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("no subscription bound to this client")]
    MissingSubscription,

    #[error("unknown Azure environment '{0}'")]
    EnvironmentUnknown(String),

    #[error("provider {namespace} still not registered after {attempts} checks")]
    RegistrationTimeout { namespace: String, attempts: u32 },

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl ArmError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ArmError::NotFound)
    }

    /// The ARM error code carried by this error, if it came from Azure.
    pub fn code(&self) -> Option<&str> {
        match self {
            ArmError::Arm(e) | ArmError::AsyncFailed(e) => Some(&e.code),
            _ => None,
        }
    }
}
