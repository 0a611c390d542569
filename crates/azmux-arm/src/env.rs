use crate::error::ArmError;

/// Which token audience a request is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    ResourceManager,
    Graph,
}

/// Endpoint set of one Azure cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub name: String,
    pub resource_manager: String,
    pub active_directory: String,
    pub graph: String,
    /// DNS suffix of storage endpoints, e.g. `core.windows.net`.
    pub storage_suffix: String,
    /// Label used as the global-id prefix of regions.
    pub access_env: String,
    pub portal: String,
}

pub const PUBLIC_CLOUD: &str = "AzurePublicCloud";
pub const CHINA_CLOUD: &str = "AzureChinaCloud";
pub const GERMAN_CLOUD: &str = "AzureGermanCloud";
pub const US_GOVERNMENT_CLOUD: &str = "AzureUSGovernmentCloud";

impl Environment {
    pub fn from_name(name: &str) -> Result<Self, ArmError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ArmError::MissingParameter("environment"));
        }
        let env = match name.to_ascii_lowercase().as_str() {
            "azurepubliccloud" => Environment {
                name: PUBLIC_CLOUD.into(),
                resource_manager: "https://management.azure.com/".into(),
                active_directory: "https://login.microsoftonline.com/".into(),
                graph: "https://graph.windows.net/".into(),
                storage_suffix: "core.windows.net".into(),
                access_env: "Azure".into(),
                portal: "https://portal.azure.com".into(),
            },
            "azurechinacloud" => Environment {
                name: CHINA_CLOUD.into(),
                resource_manager: "https://management.chinacloudapi.cn/".into(),
                active_directory: "https://login.chinacloudapi.cn/".into(),
                graph: "https://graph.chinacloudapi.cn/".into(),
                storage_suffix: "core.chinacloudapi.cn".into(),
                access_env: "AzureChina".into(),
                portal: "https://portal.azure.cn".into(),
            },
            "azuregermancloud" => Environment {
                name: GERMAN_CLOUD.into(),
                resource_manager: "https://management.microsoftazure.de/".into(),
                active_directory: "https://login.microsoftonline.de/".into(),
                graph: "https://graph.cloudapi.de/".into(),
                storage_suffix: "core.cloudapi.de".into(),
                access_env: "AzureGerman".into(),
                portal: "https://portal.microsoftazure.de".into(),
            },
            "azureusgovernmentcloud" => Environment {
                name: US_GOVERNMENT_CLOUD.into(),
                resource_manager: "https://management.usgovcloudapi.net/".into(),
                active_directory: "https://login.microsoftonline.us/".into(),
                graph: "https://graph.windows.net/".into(),
                storage_suffix: "core.usgovcloudapi.net".into(),
                access_env: "AzureUSGovernment".into(),
                portal: "https://portal.azure.us".into(),
            },
            _ => return Err(ArmError::EnvironmentUnknown(name.to_string())),
        };
        Ok(env)
    }

    /// Every endpoint pointed at `base` (a mock server in tests).
    pub fn custom(base: &str) -> Self {
        let base = format!("{}/", base.trim_end_matches('/'));
        Environment {
            name: "Custom".into(),
            resource_manager: base.clone(),
            active_directory: base.clone(),
            graph: base.clone(),
            storage_suffix: "core.windows.net".into(),
            access_env: "Azure".into(),
            portal: base,
        }
    }

    pub fn base_url(&self, audience: Audience) -> &str {
        match audience {
            Audience::ResourceManager => &self.resource_manager,
            Audience::Graph => &self.graph,
        }
    }

    /// The `resource` value requested from AAD for this audience.
    pub fn token_resource(&self, audience: Audience) -> &str {
        self.base_url(audience)
    }

    pub fn is_china(&self) -> bool {
        self.name == CHINA_CLOUD
    }
}

/// `base` + `path` with exactly one slash between them.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
