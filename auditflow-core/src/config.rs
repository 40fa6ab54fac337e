//! Configuration loading and management
//!
//! Configuration is layered: an optional TOML file (by default
//! `$XDG_CONFIG_HOME/auditflow/config.toml`) provides the base values, and the
//! binary overlays command-line flags and environment variables on top.
//! Anything required that is still missing after both layers is a fatal
//! startup error, reported by [`Config::validate`].

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// UAA client-credentials settings
    #[serde(default)]
    pub uaa: UaaConfig,

    /// Cloud Controller audit event API settings
    #[serde(default)]
    pub cloud_foundry: CloudFoundryConfig,

    /// Polling and retry behaviour
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Bloom filter sizing
    #[serde(default)]
    pub deduplicator: DeduplicatorConfig,

    /// Channel sizing between stages
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Splunk HTTP Event Collector settings
    #[serde(default)]
    pub shipper: ShipperConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// UAA authorization server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UaaConfig {
    /// UAA base URL (e.g., `https://uaa.system.example.com`)
    pub url: Option<String>,
    /// OAuth client id
    pub client_id: Option<String>,
    /// OAuth client secret
    pub client_secret: Option<String>,
    /// Scope requested with the client-credentials grant
    #[serde(default = "default_uaa_scope")]
    pub scope: String,
}

impl Default for UaaConfig {
    fn default() -> Self {
        Self {
            url: None,
            client_id: None,
            client_secret: None,
            scope: default_uaa_scope(),
        }
    }
}

fn default_uaa_scope() -> String {
    "cloud_controller.admin_read_only".to_string()
}

/// Cloud Controller API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CloudFoundryConfig {
    /// Cloud Controller base URL (e.g., `https://api.system.example.com`)
    pub url: Option<String>,

    /// Events requested per page
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for CloudFoundryConfig {
    fn default() -> Self {
        Self {
            url: None,
            per_page: default_per_page(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_per_page() -> u32 {
    500
}

fn default_http_timeout() -> u64 {
    30
}

/// Collection cycle configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Seconds between collection cycles
    #[serde(default = "default_scrape_cadence")]
    pub scrape_cadence_secs: u64,

    /// Events older than this many hours stop pagination
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,

    /// Attempts per tick before the process gives up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Hard cap on pages fetched in one cycle
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            scrape_cadence_secs: default_scrape_cadence(),
            lookback_hours: default_lookback_hours(),
            max_attempts: default_max_attempts(),
            max_pages: default_max_pages(),
        }
    }
}

impl CollectorConfig {
    pub fn scrape_cadence(&self) -> Duration {
        Duration::from_secs(self.scrape_cadence_secs)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(self.lookback_hours as i64)
    }
}

fn default_scrape_cadence() -> u64 {
    15 * 60
}

fn default_lookback_hours() -> u64 {
    6
}

fn default_max_attempts() -> u32 {
    10
}

fn default_max_pages() -> usize {
    1000
}

/// Bloom filter sizing
#[derive(Debug, Deserialize, Clone)]
pub struct DeduplicatorConfig {
    /// Number of bits in the filter
    #[serde(default = "default_filter_bits")]
    pub bits: usize,

    /// Number of hash probes per item
    #[serde(default = "default_filter_hashes")]
    pub hashes: u32,
}

impl Default for DeduplicatorConfig {
    fn default() -> Self {
        Self {
            bits: default_filter_bits(),
            hashes: default_filter_hashes(),
        }
    }
}

fn default_filter_bits() -> usize {
    1024 * 42
}

fn default_filter_hashes() -> u32 {
    9
}

/// Inter-stage channel configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Capacity of each bounded channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    1024
}

/// Splunk HTTP Event Collector configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ShipperConfig {
    /// Splunk base URL (e.g., `https://splunk.example.com:8088`)
    pub url: Option<String>,

    /// HEC token
    pub token: Option<String>,

    /// Sourcetype attached to every event
    #[serde(default = "default_sourcetype")]
    pub sourcetype: String,

    /// Events per HEC request
    #[serde(default = "default_shipper_batch_size")]
    pub batch_size: usize,

    /// Max seconds before flushing an incomplete batch
    #[serde(default = "default_shipper_flush_interval")]
    pub flush_interval_secs: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    /// Max retry attempts for transient failures
    #[serde(default = "default_shipper_max_retries")]
    pub max_retries: usize,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            sourcetype: default_sourcetype(),
            batch_size: default_shipper_batch_size(),
            flush_interval_secs: default_shipper_flush_interval(),
            timeout_secs: default_http_timeout(),
            max_retries: default_shipper_max_retries(),
        }
    }
}

impl ShipperConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

fn default_sourcetype() -> String {
    "cf:audit".to_string()
}

fn default_shipper_batch_size() -> usize {
    50
}

fn default_shipper_flush_interval() -> u64 {
    5
}

fn default_shipper_max_retries() -> usize {
    3
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write rotated log files here instead of stdout
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn require<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Config(format!("{} is required", key))),
    }
}

impl Config {
    /// Load configuration from the default path, falling back to defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/auditflow/config.toml` (~/.config/auditflow/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("auditflow").join("config.toml")
    }

    /// Check that every required value is present and every size is usable
    pub fn validate(&self) -> Result<()> {
        require(&self.uaa.url, "uaa.url")?;
        require(&self.uaa.client_id, "uaa.client_id")?;
        require(&self.uaa.client_secret, "uaa.client_secret")?;
        require(&self.cloud_foundry.url, "cloud_foundry.url")?;
        require(&self.shipper.url, "shipper.url")?;
        require(&self.shipper.token, "shipper.token")?;

        if self.cloud_foundry.per_page == 0 || self.cloud_foundry.per_page > 5000 {
            return Err(Error::Config(
                "cloud_foundry.per_page must be between 1 and 5000".to_string(),
            ));
        }
        if self.collector.scrape_cadence_secs == 0 {
            return Err(Error::Config(
                "collector.scrape_cadence_secs must be greater than 0".to_string(),
            ));
        }
        if self.collector.max_attempts == 0 {
            return Err(Error::Config(
                "collector.max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.collector.max_pages == 0 {
            return Err(Error::Config(
                "collector.max_pages must be greater than 0".to_string(),
            ));
        }
        if self.deduplicator.bits == 0 || self.deduplicator.hashes == 0 {
            return Err(Error::Config(
                "deduplicator.bits and deduplicator.hashes must be greater than 0".to_string(),
            ));
        }
        if self.pipeline.channel_capacity == 0 {
            return Err(Error::Config(
                "pipeline.channel_capacity must be greater than 0".to_string(),
            ));
        }
        if self.shipper.batch_size == 0 {
            return Err(Error::Config(
                "shipper.batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse a duration literal in Go's `time.Duration` form, such as `15m`,
/// `1h30m`, `1.5h` or `250ms`.
///
/// Segments of `<number><unit>` are summed; units are `ns`, `us` (or `µs`),
/// `ms`, `s`, `m` and `h`. A bare number is read as seconds.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let input = s.trim();
    let invalid = || format!("unknown duration format: '{input}' (use '15m', '1h30m' or '500ms')");
    let overflow = || format!("duration out of range: '{input}'");

    if input.is_empty() {
        return Err(invalid());
    }
    if input.bytes().all(|b| b.is_ascii_digit()) {
        return input.parse::<u64>().map(Duration::from_secs).map_err(|_| overflow());
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut rest = input;
    let mut total_nanos: u128 = 0;
    while !rest.is_empty() {
        let (number, tail) = rest.split_at(rest.find(|c| !is_number(c)).unwrap_or(rest.len()));
        let (unit, tail) = tail.split_at(tail.find(is_number).unwrap_or(tail.len()));
        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 3600 * NANOS_PER_SEC,
            _ => return Err(invalid()),
        };
        let segment = segment_nanos(number, unit_nanos).map_err(|e| match e {
            SegmentError::Malformed => invalid(),
            SegmentError::Overflow => overflow(),
        })?;
        total_nanos = total_nanos.checked_add(segment).ok_or_else(overflow)?;
        rest = tail;
    }

    let secs = u64::try_from(total_nanos / NANOS_PER_SEC).map_err(|_| overflow())?;
    Ok(Duration::new(secs, (total_nanos % NANOS_PER_SEC) as u32))
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

enum SegmentError {
    Malformed,
    Overflow,
}

/// Nanoseconds in `number` units worth `unit_nanos` each.
///
/// Fraction digits finer than a nanosecond are truncated.
fn segment_nanos(number: &str, unit_nanos: u128) -> std::result::Result<u128, SegmentError> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && fraction.is_empty()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SegmentError::Malformed);
    }

    let whole_nanos = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u128>()
            .ok()
            .and_then(|value| value.checked_mul(unit_nanos))
            .ok_or(SegmentError::Overflow)?
    };

    let mut place = unit_nanos;
    let mut fraction_nanos = 0;
    for digit in fraction.bytes() {
        place /= 10;
        fraction_nanos += u128::from(digit - b'0') * place;
    }

    whole_nanos
        .checked_add(fraction_nanos)
        .ok_or(SegmentError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> Config {
        let mut config = Config::default();
        config.uaa.url = Some("https://uaa.example.com".to_string());
        config.uaa.client_id = Some("auditflow".to_string());
        config.uaa.client_secret = Some("s3cret".to_string());
        config.cloud_foundry.url = Some("https://api.example.com".to_string());
        config.shipper.url = Some("https://splunk.example.com:8088".to_string());
        config.shipper.token = Some("hec-token".to_string());
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.uaa.scope, "cloud_controller.admin_read_only");
        assert_eq!(config.cloud_foundry.per_page, 500);
        assert_eq!(config.collector.scrape_cadence(), Duration::from_secs(900));
        assert_eq!(config.collector.lookback(), chrono::Duration::hours(6));
        assert_eq!(config.collector.max_attempts, 10);
        assert_eq!(config.deduplicator.bits, 43008);
        assert_eq!(config.deduplicator.hashes, 9);
        assert_eq!(config.pipeline.channel_capacity, 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_required_values() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("uaa.url"));

        let mut config = complete();
        config.shipper.token = Some("   ".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("shipper.token"));

        assert!(complete().validate().is_ok());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let mut config = complete();
        config.deduplicator.hashes = 0;
        assert!(config.validate().is_err());

        let mut config = complete();
        config.pipeline.channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[uaa]
url = "https://uaa.example.com"
client_id = "auditflow"
client_secret = "s3cret"

[cloud_foundry]
url = "https://api.example.com"
per_page = 100

[collector]
scrape_cadence_secs = 60

[deduplicator]
bits = 2048
hashes = 4

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.uaa.url.as_deref(), Some("https://uaa.example.com"));
        assert_eq!(config.cloud_foundry.per_page, 100);
        assert_eq!(config.collector.scrape_cadence_secs, 60);
        assert_eq!(config.collector.lookback_hours, 6);
        assert_eq!(config.deduplicator.bits, 2048);
        assert_eq!(config.logging.level, "debug");
        assert!(config.shipper.url.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[shipper]\nbatch_size = 10\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.shipper.batch_size, 10);

        std::fs::write(&path, "[shipper\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_parse_compound_and_fractional_durations() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("2m30s").unwrap(), Duration::from_secs(150));
        assert_eq!(parse_duration("1m0.5s").unwrap(), Duration::from_millis(60_500));
        assert_eq!(parse_duration(".5m").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1s500ms").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("10us").unwrap(), Duration::from_micros(10));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("1.5.5h").is_err());
        assert!(parse_duration("-1h").is_err());
        assert!(parse_duration("1d").is_err());
        assert!(parse_duration("15 m").is_err());
    }

    #[test]
    fn test_parse_duration_out_of_range() {
        let err = parse_duration("18446744073709551615h").unwrap_err();
        assert!(err.contains("out of range"));
        assert!(parse_duration("99999999999999999999999999999999999999999s").is_err());
        assert!(parse_duration("99999999999999999999999").is_err());
        assert!(parse_duration("18446744073709551615s1s").is_err());
    }
}
