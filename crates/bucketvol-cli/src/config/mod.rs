//! CLI configuration management.
//!
//! ```text
//! Cli
//! ├── secret: SecretBundle   # Keys, region, endpoint, IAM role
//! ├── mounter, delete_parallelism
//! └── command: Command       # exists | create | delete | describe
//! ```
//!
//! All configuration can be provided via CLI arguments or environment variables.
//! Use `--help` to see all available options.

mod command;

use std::process;
use std::sync::Arc;

use anyhow::Context;
use bucketvol_s3::client::DEFAULT_DELETE_PARALLELISM;
use bucketvol_s3::{CredentialResolver, S3Client, SecretBundle, StsFederation};
use clap::Parser;
pub use command::Command;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "bucketvol")]
#[command(about = "Manage S3 bucket and prefix backed volumes")]
#[command(version)]
pub struct Cli {
    /// Object store credentials and location.
    #[clap(flatten)]
    pub secret: SecretBundle,

    /// Mounter recorded in volume metadata
    #[arg(long, env = "BUCKETVOL_MOUNTER", default_value = "", global = true)]
    pub mounter: String,

    /// Maximum number of concurrent single-object deletes
    #[arg(
        long,
        env = "BUCKETVOL_DELETE_PARALLELISM",
        default_value_t = DEFAULT_DELETE_PARALLELISM,
        global = true
    )]
    pub delete_parallelism: usize,

    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is loaded before clap parses arguments so that its
    /// variables act as defaults.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    /// Loads environment variables from .env file if the dotenv feature is enabled.
    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    /// No-op when dotenv feature is disabled.
    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Initializes tracing with environment-based filtering.
    pub fn init_tracing() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    /// Resolves credentials and builds the S3 client.
    pub async fn create_client(&self) -> anyhow::Result<S3Client> {
        let resolver = CredentialResolver::from_env(Arc::new(StsFederation::new()));
        let config = resolver
            .resolve(&self.secret)
            .await
            .context("failed to resolve S3 credentials")?
            .with_mounter(&self.mounter)
            .with_delete_parallelism(self.delete_parallelism);

        S3Client::new(config).context("invalid S3 configuration")
    }

    /// Logs configuration (no sensitive information).
    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            endpoint = %self.secret.endpoint,
            region = %self.secret.region,
            federated = self.secret.iam_role_arn().is_some(),
            delete_parallelism = self.delete_parallelism,
            command = self.command.name(),
            "Configuration"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_delete_prefix() {
        let cli = Cli::try_parse_from([
            "bucketvol",
            "--endpoint",
            "http://minio:9000",
            "--access-key-id",
            "a",
            "--secret-access-key",
            "s",
            "delete",
            "volumes",
            "--prefix",
            "pvc-1",
        ])
        .unwrap();

        assert_eq!(cli.secret.endpoint, "http://minio:9000");
        assert_eq!(cli.delete_parallelism, DEFAULT_DELETE_PARALLELISM);
        match cli.command {
            Command::Delete { bucket, prefix } => {
                assert_eq!(bucket, "volumes");
                assert_eq!(prefix, "pvc-1");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
