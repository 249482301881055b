//! Command-line front end
//!
//! ```bash
//! s3conduit ls s3://bucket/prefix/ --recursive
//! s3conduit get s3://bucket/key -o local.bin
//! s3conduit put local.bin s3://bucket/key
//! s3conduit rm s3://bucket/a s3://bucket/b
//! s3conduit stat s3://bucket/key
//! ```

pub mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::StaticCredentialsProvider;
use crate::config;
use crate::s3::S3Client;

#[derive(Debug, Parser)]
#[command(name = "s3conduit")]
#[command(version, about = "Asynchronous S3 client over a bounded channel pool", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Profile to use from config
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List objects
    Ls {
        /// S3 path (s3://bucket/prefix/)
        path: String,

        /// List recursively instead of grouping by '/'
        #[arg(short, long)]
        recursive: bool,

        /// Page size requested from the service
        #[arg(long)]
        max_keys: Option<u32>,
    },

    /// Download an object
    Get {
        /// S3 path (s3://bucket/key)
        path: String,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload a file
    Put {
        /// Local file
        file: PathBuf,

        /// S3 path (s3://bucket/key)
        path: String,

        /// Content-Type of the object
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Remove objects; several keys of one bucket go out as bulk deletes
    Rm {
        /// S3 paths to remove
        #[arg(required = true)]
        paths: Vec<String>,

        /// Remove every object under each prefix
        #[arg(short, long)]
        recursive: bool,
    },

    /// Show object info
    Stat {
        /// S3 path
        path: String,
    },
}

/// Parse `s3://bucket/key` (or the `s3/bucket/key` shorthand) into bucket and key
pub fn parse_s3_path(path: &str) -> Result<(String, Option<String>)> {
    let path = path.trim();

    let stripped = if let Some(p) = path.strip_prefix("s3://") {
        p
    } else if let Some(p) = path.strip_prefix("s3/") {
        p
    } else {
        anyhow::bail!("Invalid S3 path '{}'. Expected: s3://bucket/key", path);
    };

    let (bucket, key) = match stripped.split_once('/') {
        Some((bucket, key)) => (bucket, (!key.is_empty()).then(|| key.to_string())),
        None => (stripped, None),
    };
    if bucket.is_empty() {
        anyhow::bail!("Bucket name cannot be empty");
    }

    Ok((bucket.to_string(), key))
}

/// Build a client from the config file or the environment
pub fn build_client(config_path: Option<&str>, profile_name: Option<&str>) -> Result<S3Client> {
    let config = config::load_config(config_path, profile_name)?;
    let profile = config
        .get_profile(profile_name)
        .context("No profile configured")?;

    let credentials = profile.credentials().context("Invalid credentials in profile")?;
    let client = S3Client::new(
        config.client_config(profile),
        Arc::new(StaticCredentialsProvider::new(credentials)),
    )
    .context("Failed to create S3 client")?;
    Ok(client)
}

/// Run a parsed command line
pub async fn run(cli: Cli) -> Result<()> {
    let client = build_client(cli.config.as_deref(), cli.profile.as_deref())?;

    let result = match cli.command {
        Commands::Ls {
            path,
            recursive,
            max_keys,
        } => commands::cmd_ls(&client, &path, recursive, max_keys).await,
        Commands::Get { path, output } => commands::cmd_get(&client, &path, output.as_deref()).await,
        Commands::Put {
            file,
            path,
            content_type,
        } => commands::cmd_put(&client, &file, &path, content_type).await,
        Commands::Rm { paths, recursive } => commands::cmd_rm(&client, &paths, recursive).await,
        Commands::Stat { path } => commands::cmd_stat(&client, &path).await,
    };

    client.close();
    result
}
