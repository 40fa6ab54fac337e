//! # auditflow-core
//!
//! Core library for auditflow, a Cloud Foundry audit event shipper.
//!
//! This library provides:
//! - UAA client-credentials authentication
//! - An incremental, checkpointed collector for `/v3/audit_events`
//! - A Bloom-filter deduplicator
//! - A batching shipper for the Splunk HTTP Event Collector
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Events flow through three concurrent stages joined by bounded channels:
//!
//! ```text
//! Cloud Controller ──► EventCollector ──► Deduplicator ──► Shipper ──► Splunk
//!                      (checkpoint,        (Bloom filter)    (batches)
//!                       lookback, retry)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use auditflow_core::{pipeline, Config};
//!
//! # async fn start() -> auditflow_core::Result<()> {
//! let config = Config::load()?;
//! let pipeline = pipeline::connect(&config).await?;
//! pipeline.run().await
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{Pipeline, RunSummary};
pub use types::*;

// Public modules
pub mod auth;
pub mod collector;
pub mod config;
pub mod dedup;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod shipper;
pub mod types;
