//! auditflow - ship Cloud Foundry audit events to Splunk
//!
//! Polls the Cloud Controller audit event API on a fixed cadence, drops events
//! already delivered, and forwards the rest to a Splunk HTTP Event Collector.
//!
//! Settings come from an optional TOML file
//! ($XDG_CONFIG_HOME/auditflow/config.toml by default), overridden by flags,
//! which in turn fall back to environment variables.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use auditflow_core::config::parse_duration;
use auditflow_core::{logging, pipeline, Config};
use clap::Parser;

#[derive(Parser)]
#[command(name = "auditflow")]
#[command(about = "Ship Cloud Foundry audit events to Splunk")]
#[command(version)]
struct Args {
    /// Config file (defaults to $XDG_CONFIG_HOME/auditflow/config.toml)
    #[arg(long, env = "AUDITFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// UAA API URL to be used for authentication
    #[arg(long, env = "UAA_API_URL")]
    uaa_api_url: Option<String>,

    /// UAA client ID for client-credentials authentication
    #[arg(long, env = "UAA_CLIENT_ID")]
    uaa_client_id: Option<String>,

    /// UAA client secret for client-credentials authentication
    #[arg(long, env = "UAA_CLIENT_SECRET", hide_env_values = true)]
    uaa_client_secret: Option<String>,

    /// Cloud Foundry API URL to scrape audit events from
    #[arg(long, env = "CLOUDFOUNDRY_API_URL")]
    cf_api_url: Option<String>,

    /// Time between collection cycles in whole seconds (e.g. 15m, 1h30m, 90s)
    #[arg(long, env = "SCRAPE_CADENCE", value_parser = parse_cadence)]
    scrape_cadence: Option<Duration>,

    /// Splunk HTTP Event Collector URL
    #[arg(long, env = "SPLUNK_URL")]
    splunk_url: Option<String>,

    /// Splunk HTTP Event Collector token
    #[arg(long, env = "SPLUNK_KEY", hide_env_values = true)]
    splunk_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Run a single collection cycle, print a summary and exit
    #[arg(long)]
    once: bool,
}

impl Args {
    /// Overlay flag and environment values onto the file configuration
    fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.uaa_api_url {
            config.uaa.url = Some(url.clone());
        }
        if let Some(id) = &self.uaa_client_id {
            config.uaa.client_id = Some(id.clone());
        }
        if let Some(secret) = &self.uaa_client_secret {
            config.uaa.client_secret = Some(secret.clone());
        }
        if let Some(url) = &self.cf_api_url {
            config.cloud_foundry.url = Some(url.clone());
        }
        if let Some(cadence) = self.scrape_cadence {
            config.collector.scrape_cadence_secs = cadence.as_secs();
        }
        if let Some(url) = &self.splunk_url {
            config.shipper.url = Some(url.clone());
        }
        if let Some(key) = &self.splunk_key {
            config.shipper.token = Some(key.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

/// Cadences are stored as whole seconds, so anything finer is rejected
fn parse_cadence(s: &str) -> std::result::Result<Duration, String> {
    let cadence = parse_duration(s)?;
    if cadence.as_secs() == 0 || cadence.subsec_nanos() != 0 {
        return Err(format!(
            "scrape cadence must be a whole number of seconds, at least 1s: '{}'",
            s.trim()
        ));
    }
    Ok(cadence)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load_from(path).context("failed to load configuration")?,
        None => Config::load().context("failed to load configuration")?,
    };
    args.apply(&mut config);

    // Initialize logging
    let _log_guard = logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("auditflow starting");

    let pipeline = pipeline::connect(&config)
        .await
        .context("failed to start pipeline")?;

    if args.once {
        let summary = pipeline.run_once().await.context("collection failed")?;
        println!("Collected:   {}", summary.collected);
        println!("Forwarded:   {}", summary.forwarded);
        println!("Duplicates:  {}", summary.duplicates);
        println!("Shipped:     {}", summary.shipped);
        println!("Ship errors: {}", summary.ship_failures);
        return Ok(());
    }

    tokio::select! {
        res = pipeline.run() => res.context("pipeline terminated")?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, exiting"),
    }

    Ok(())
}
