use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use azmux_arm::{ClientConfig, Environment, PollPolicy};
use azmux_config::{load_account, AccountConfig, DEFAULT_ENVIRONMENT};
use azmux_domain::{ByteRange, ObjectHeaders, ObjectKey, CONTENT_TYPE};
use azmux_facade::{AzureProvider, Bucket};
use tracing::debug;

use crate::cli::Cli;
use crate::output;

// ── Connection ────────────────────────────────────────────────────────────────

/// Credentials from `--config`, each overridable by flag or `AZURE_*`.
fn client_config(cli: &Cli) -> Result<(ClientConfig, Option<AccountConfig>)> {
    let file = cli
        .config
        .as_deref()
        .map(load_account)
        .transpose()
        .context("Failed to load account config")?;

    let pick = |flag: &Option<String>, from_file: fn(&AccountConfig) -> &str| -> Option<String> {
        flag.clone()
            .or_else(|| file.as_ref().map(|f| from_file(f).to_string()))
            .filter(|v| !v.is_empty())
    };
    let tenant = pick(&cli.tenant_id, |f| f.tenant_id.as_str())
        .context("tenant id missing: pass --tenant-id, set AZURE_TENANT_ID or use --config")?;
    let client = pick(&cli.client_id, |f| f.client_id.as_str())
        .context("client id missing: pass --client-id, set AZURE_CLIENT_ID or use --config")?;
    let secret = pick(&cli.client_secret, |f| f.client_secret.as_str())
        .context("client secret missing: set AZURE_CLIENT_SECRET or use --config")?;
    let env_name = pick(&cli.environment, |f| f.environment.as_str()).unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
    let environment = Environment::from_name(&env_name).with_context(|| format!("Unknown environment {env_name}"))?;

    let mut poll = PollPolicy::default();
    let mut config = ClientConfig::new(environment, &tenant, &client, &secret);
    if let Some(f) = &file {
        poll.interval               = f.poll.interval;
        poll.timeout                = f.poll.timeout;
        poll.delete_timeout         = f.poll.delete_timeout;
        poll.demote_os_provisioning = !f.strict_os_provisioning;
        config = config.debug(f.debug);
    }
    if let Some(sub) = pick(&cli.subscription_id, |f| f.subscription_id.as_deref().unwrap_or_default()) {
        config = config.subscription(&sub);
    }
    Ok((config.poll(poll), file))
}

async fn connect(cli: &Cli) -> Result<AzureProvider> {
    let (config, file) = client_config(cli)?;
    let provider = AzureProvider::connect(config).await.context("Failed to connect to Azure")?;
    Ok(match file {
        Some(f) => provider.with_default_acl(f.default_bucket_acl),
        None => provider,
    })
}

async fn bucket(provider: &AzureProvider, name: &str) -> Result<Bucket> {
    provider
        .bucket_by_name(name)
        .await
        .with_context(|| format!("Bucket {name} not found"))
}

// ── Listings ──────────────────────────────────────────────────────────────────

pub async fn regions(cli: &Cli) -> Result<()> {
    let provider = connect(cli).await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(provider.regions())?);
    } else {
        print!("{}", output::render_regions(provider.regions()));
    }
    Ok(())
}

pub async fn projects(cli: &Cli) -> Result<()> {
    let provider = connect(cli).await?;
    let groups = provider.projects().await.context("Failed to list resource groups")?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
    } else {
        print!("{}", output::render_resources(&groups));
    }
    Ok(())
}

pub async fn resources(cli: &Cli, resource_type: &str) -> Result<()> {
    let provider = connect(cli).await?;
    let found = provider
        .resources(resource_type)
        .await
        .with_context(|| format!("Failed to list {resource_type}"))?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else {
        print!("{}", output::render_resources(&found));
    }
    Ok(())
}

pub async fn buckets(cli: &Cli) -> Result<()> {
    let provider = connect(cli).await?;
    let buckets = provider.buckets().await.context("Failed to list storage accounts")?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output::buckets_json(&buckets))?);
    } else {
        print!("{}", output::render_buckets(&buckets));
    }
    Ok(())
}

pub async fn objects(
    cli: &Cli,
    bucket_name: &str,
    prefix: &str,
    delimiter: &str,
    marker: &str,
    max: usize,
) -> Result<()> {
    let provider = connect(cli).await?;
    let bucket = bucket(&provider, bucket_name).await?;
    let listing = bucket
        .list_objects(provider.client(), prefix, marker, delimiter, max)
        .await
        .with_context(|| format!("Failed to list objects of {bucket_name}"))?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        print!("{}", output::render_objects(&listing));
    }
    Ok(())
}

// ── Objects ───────────────────────────────────────────────────────────────────

pub async fn put(cli: &Cli, bucket_name: &str, key: &str, file: &Path, content_type: Option<String>) -> Result<()> {
    let provider = connect(cli).await?;
    let bucket = bucket(&provider, bucket_name).await?;
    let mut headers = ObjectHeaders::new();
    if let Some(ct) = content_type {
        headers.insert(CONTENT_TYPE, ct);
    }
    let reader = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let written = bucket
        .upload_stream(provider.client(), key, reader, &headers)
        .await
        .with_context(|| format!("Failed to upload {key}"))?;
    println!("{} bytes -> {}/{}", written, bucket_name, key);
    Ok(())
}

pub async fn get(cli: &Cli, bucket_name: &str, key: &str, range: Option<String>, output: Option<PathBuf>) -> Result<()> {
    let range = range
        .map(|r| r.parse::<ByteRange>())
        .transpose()
        .context("Invalid --range, expected start-end")?;
    let provider = connect(cli).await?;
    let bucket = bucket(&provider, bucket_name).await?;
    let data = bucket
        .get_object(provider.client(), key, range)
        .await
        .with_context(|| format!("Failed to read {key}"))?;
    match output {
        Some(path) => {
            tokio::fs::write(&path, &data)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            debug!(bytes = data.len(), path = %path.display(), "object saved");
        }
        None => {
            use tokio::io::AsyncWriteExt;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

pub async fn rm(cli: &Cli, bucket_name: &str, key: &str) -> Result<()> {
    let provider = connect(cli).await?;
    let bucket = bucket(&provider, bucket_name).await?;
    bucket
        .delete_object(provider.client(), key)
        .await
        .with_context(|| format!("Failed to delete {key}"))?;
    println!("deleted {}/{}", bucket_name, key);
    Ok(())
}

pub async fn sign_url(cli: &Cli, bucket_name: &str, key: &str, method: &str, ttl: u64) -> Result<()> {
    let provider = connect(cli).await?;
    let bucket = bucket(&provider, bucket_name).await?;
    let url = bucket
        .temp_url(provider.client(), method, key, Duration::from_secs(ttl))
        .await
        .with_context(|| format!("Failed to sign {key}"))?;
    println!("{}", url);
    Ok(())
}

pub async fn upload_vhd(cli: &Cli, bucket_name: &str, key: &str, file: &Path) -> Result<()> {
    let key = ObjectKey::parse_blob(key).context("Invalid key, expected container/blob")?;
    let provider = connect(cli).await?;
    let bucket = bucket(&provider, bucket_name).await?;
    let url = bucket
        .blob(provider.client())
        .await?
        .upload_vhd(&key.container, &key.blob, file)
        .await
        .with_context(|| format!("Failed to upload {}", file.display()))?;
    println!("{}", url);
    Ok(())
}
