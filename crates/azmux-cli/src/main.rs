mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Regions => commands::regions(&cli).await,
        Command::Projects => commands::projects(&cli).await,
        Command::Resources { resource_type } => commands::resources(&cli, resource_type).await,
        Command::Buckets => commands::buckets(&cli).await,
        Command::Objects { bucket, prefix, delimiter, marker, max } => {
            commands::objects(&cli, bucket, prefix, delimiter, marker, *max).await
        }
        Command::Put { bucket, key, file, content_type } => {
            commands::put(&cli, bucket, key, file, content_type.clone()).await
        }
        Command::Get { bucket, key, range, output } => {
            commands::get(&cli, bucket, key, range.clone(), output.clone()).await
        }
        Command::Rm { bucket, key } => commands::rm(&cli, bucket, key).await,
        Command::SignUrl { bucket, key, method, ttl } => {
            commands::sign_url(&cli, bucket, key, method, *ttl).await
        }
        Command::UploadVhd { bucket, key, file } => commands::upload_vhd(&cli, bucket, key, file).await,
    }
}
