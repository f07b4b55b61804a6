#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;

use std::process;

use anyhow::Context;

use crate::config::Cli;

// Tracing target constants
pub const TRACING_TARGET_STARTUP: &str = "bucketvol_cli::startup";
pub const TRACING_TARGET_SHUTDOWN: &str = "bucketvol_cli::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "bucketvol_cli::config";
pub const TRACING_TARGET_COMMAND: &str = "bucketvol_cli::command";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::debug!(
            target: TRACING_TARGET_SHUTDOWN,
            "command completed successfully"
        );
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            error = %format!("{error:#}"),
            "command failed"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    Cli::init_tracing();
    cli.log();

    let client = cli.create_client().await?;
    cancel_on_ctrl_c(&client);

    cli.command
        .execute(&client)
        .await
        .context("command failed")
}

/// Cancels the client's in-flight work on Ctrl-C.
fn cancel_on_ctrl_c(client: &bucketvol_s3::S3Client) {
    let token = client.cancellation_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(target: TRACING_TARGET_SHUTDOWN, "interrupt received, cancelling");
            token.cancel();
        }
    });
}
