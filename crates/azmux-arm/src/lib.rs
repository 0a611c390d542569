pub mod api_version;
pub mod auth;
pub mod client;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod lro;
pub mod recovery;
pub mod subscription;

#[cfg(test)]
mod testing;

pub use api_version::{ApiVersionTable, DEFAULT_API_VERSION};
pub use auth::{ClientSecretCredential, StaticToken, TokenProvider};
pub use client::{with_query, ArmClient, ClientConfig, DEFAULT_RESOURCE_GROUP};
pub use env::{Audience, Environment};
pub use error::{ArmError, AzureError, AzureErrorDetail};
pub use lro::{AsyncOperation, Clock, ManualClock, OperationState, PollPolicy, TokioClock};
pub use subscription::{Region, ResourceGroup, Subscription};

pub use reqwest::Method;
