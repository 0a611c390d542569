use serde::{Deserialize, Serialize};

/// Raw YAML representation of an account file.
#[derive(Debug, Deserialize, Serialize)]
pub struct RawAccount {
    /// Human label; defaults to the file stem.
    pub name: Option<String>,
    /// `AzurePublicCloud` when absent.
    pub environment: Option<String>,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub poll: RawPoll,
    /// Treat OS-provisioning failures as failures instead of demoting them.
    #[serde(default)]
    pub strict_os_provisioning: bool,
    /// "private" (default) or "public-read".
    pub default_bucket_acl: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawPoll {
    pub interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub delete_timeout_secs: Option<u64>,
}
