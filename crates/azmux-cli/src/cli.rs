use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "azmux",
    about = "Azure Resource Manager and Blob Storage from the command line",
    version
)]
pub struct Cli {
    /// YAML account file (tenant, service principal, poll settings).
    #[arg(long, env = "AZMUX_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Cloud name, e.g. AzurePublicCloud or AzureChinaCloud.
    #[arg(long, env = "AZURE_ENVIRONMENT", global = true)]
    pub environment: Option<String>,

    #[arg(long, env = "AZURE_TENANT_ID", global = true)]
    pub tenant_id: Option<String>,

    #[arg(long, env = "AZURE_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    #[arg(long, env = "AZURE_CLIENT_SECRET", global = true, hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Subscription to bind; the first enabled one when omitted.
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID", global = true)]
    pub subscription_id: Option<String>,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the regions of the bound subscription.
    Regions,

    /// List resource groups across enabled subscriptions.
    Projects,

    /// List every resource of an ARM type.
    Resources {
        /// e.g. Microsoft.Network/virtualNetworks
        resource_type: String,
    },

    /// List storage accounts.
    Buckets,

    /// List objects of a bucket; containers act as the first directory level.
    Objects {
        bucket: String,

        #[arg(long, default_value = "")]
        prefix: String,

        #[arg(long, default_value = "")]
        delimiter: String,

        #[arg(long, default_value = "")]
        marker: String,

        #[arg(long, default_value_t = 0)]
        max: usize,
    },

    /// Upload a file to `container/blob`.
    Put {
        bucket: String,
        key: String,
        file: PathBuf,

        #[arg(long)]
        content_type: Option<String>,
    },

    /// Download an object to stdout or a file.
    Get {
        bucket: String,
        key: String,

        /// Inclusive byte range `start-end`.
        #[arg(long)]
        range: Option<String>,

        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Delete an object, or a whole container for `container/`.
    Rm { bucket: String, key: String },

    /// Print a signed URL for an object.
    SignUrl {
        bucket: String,
        key: String,

        #[arg(long, default_value = "GET")]
        method: String,

        /// Lifetime in seconds.
        #[arg(long, default_value_t = 3600)]
        ttl: u64,
    },

    /// Upload a fixed VHD as a page blob.
    UploadVhd {
        bucket: String,
        /// `container/blob` of the page blob.
        key: String,
        file: PathBuf,
    },
}
