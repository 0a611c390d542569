use std::path::Path;
use std::time::Duration;

use azmux_domain::BucketAcl;
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::RawAccount;

pub const DEFAULT_ENVIRONMENT: &str = "AzurePublicCloud";

/// Credentials and client tuning for one Azure account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    pub name: String,
    pub environment: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub subscription_id: Option<String>,
    pub debug: bool,
    pub poll: PollSettings,
    pub strict_os_provisioning: bool,
    pub default_bucket_acl: BucketAcl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub delete_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(30 * 60),
            delete_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Load a single account file.
pub fn load_account(path: &Path) -> Result<AccountConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let default_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    debug!("Loading account from {}", path.display());
    parse_account(&content, &default_name, path)
}

/// Load every `*.yml` / `*.yaml` account file directly inside `dir`,
/// sorted by file name.
pub fn load_accounts(dir: &Path) -> Result<Vec<AccountConfig>, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        );
        if path.is_file() && is_yaml {
            paths.push(path);
        }
    }
    paths.sort();

    paths.iter().map(|p| load_account(p)).collect()
}

pub fn parse_account(
    content: &str,
    default_name: &str,
    path: &Path,
) -> Result<AccountConfig, ConfigError> {
    let raw: RawAccount = serde_yaml::from_str(content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;
    convert_account(raw, default_name, path)
}

fn convert_account(
    raw: RawAccount,
    default_name: &str,
    path: &Path,
) -> Result<AccountConfig, ConfigError> {
    require(&raw.tenant_id, "tenant_id", path)?;
    require(&raw.client_id, "client_id", path)?;
    require(&raw.client_secret, "client_secret", path)?;

    let environment = match raw.environment {
        Some(env) if env.trim().is_empty() => {
            return Err(ConfigError::Conversion {
                path: path.display().to_string(),
                message: "environment must not be empty".into(),
            })
        }
        Some(env) => env,
        None => DEFAULT_ENVIRONMENT.to_string(),
    };

    let defaults = PollSettings::default();
    let poll = PollSettings {
        interval: raw.poll.interval_secs.map(Duration::from_secs).unwrap_or(defaults.interval),
        timeout: raw.poll.timeout_secs.map(Duration::from_secs).unwrap_or(defaults.timeout),
        delete_timeout: raw
            .poll
            .delete_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.delete_timeout),
    };
    if poll.interval.is_zero() {
        return Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: "poll.interval_secs must be positive".into(),
        });
    }

    let default_bucket_acl = match raw.default_bucket_acl.as_deref() {
        Some(s) => s.parse()?,
        None => BucketAcl::Private,
    };

    Ok(AccountConfig {
        name: raw.name.unwrap_or_else(|| default_name.to_string()),
        environment,
        tenant_id: raw.tenant_id,
        client_id: raw.client_id,
        client_secret: raw.client_secret,
        subscription_id: raw.subscription_id.filter(|s| !s.is_empty()),
        debug: raw.debug,
        poll,
        strict_os_provisioning: raw.strict_os_provisioning,
        default_bucket_acl,
    })
}

fn require(value: &str, field: &str, path: &Path) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: format!("missing required field '{}'", field),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<AccountConfig, ConfigError> {
        parse_account(yaml, "acct", Path::new("acct.yml"))
    }

    #[test]
    fn defaults_applied() {
        let cfg = parse("tenant_id: t\nclient_id: c\nclient_secret: s\n").unwrap();
        assert_eq!(cfg.name, "acct");
        assert_eq!(cfg.environment, DEFAULT_ENVIRONMENT);
        assert_eq!(cfg.poll, PollSettings::default());
        assert_eq!(cfg.subscription_id, None);
        assert!(!cfg.strict_os_provisioning);
        assert_eq!(cfg.default_bucket_acl, BucketAcl::Private);
    }

    #[test]
    fn missing_secret_rejected() {
        let err = parse("tenant_id: t\nclient_id: c\n").unwrap_err();
        assert!(err.to_string().contains("client_secret"), "got: {}", err);
    }

    #[test]
    fn empty_environment_rejected() {
        let err = parse("environment: ''\ntenant_id: t\nclient_id: c\nclient_secret: s\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Conversion { .. }));
    }

    #[test]
    fn bad_acl_is_domain_error() {
        let err = parse(
            "tenant_id: t\nclient_id: c\nclient_secret: s\ndefault_bucket_acl: everyone\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Domain(_)));
    }

    #[test]
    fn poll_overrides() {
        let cfg = parse(
            "tenant_id: t\nclient_id: c\nclient_secret: s\npoll:\n  interval_secs: 2\n  delete_timeout_secs: 600\n",
        )
        .unwrap();
        assert_eq!(cfg.poll.interval, Duration::from_secs(2));
        assert_eq!(cfg.poll.timeout, Duration::from_secs(1800));
        assert_eq!(cfg.poll.delete_timeout, Duration::from_secs(600));
    }
}
