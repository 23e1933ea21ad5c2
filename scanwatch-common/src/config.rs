//! Configuration for scanwatch.
//!
//! The service reads a single JSON file, by default `~/.scanwatch/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `CLIENTS_JSON` → clients (same shape as the `clients` object)
//! - `HOLIDAYS_JSON` → holidays (array of ISO dates)
//! - `SCANWATCH_TEST_MODE` → schedule.test_mode
//! - `SCANWATCH_RUN_ON_WEEKENDS` → schedule.run_on_weekends
//! - `SCANWATCH_LOG_LEVEL` → observability.log_level
//! - `SCANWATCH_LOG_FORMAT` → observability.log_format
//!
//! # Example
//!
//! ```json
//! {
//!   "schedule": { "test_mode": false, "run_on_weekends": false },
//!   "holidays": ["2025-01-26", "2025-08-15"],
//!   "clients": {
//!     "acme": {
//!       "EXPIRY": "2026-12-31",
//!       "BOT_TOKEN": "123:abc",
//!       "CHAT_ID": "-100200300",
//!       "SCANNER_URL": "https://chartink.com/screener/breakouts",
//!       "PAYLOAD": "( {cash} ( latest close > 100 ) )"
//!     }
//!   }
//! }
//! ```

use chrono::{FixedOffset, NaiveDate, NaiveTime};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, ResultExt};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".scanwatch"),
        |dirs| dirs.home_dir().join(".scanwatch"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// Longest allowed inter-cycle delay (one day).
pub const MAX_DELAY_SECS: f64 = 86_400.0;

/// Polling cadence and trading-calendar policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Run regardless of the session window (holidays and weekends still apply)
    #[serde(default)]
    pub test_mode: bool,

    /// Allow cycles on Saturday and Sunday
    #[serde(default)]
    pub run_on_weekends: bool,

    /// Lower bound of the randomized inter-cycle delay
    #[serde(default = "default_delay_min_secs")]
    pub delay_min_secs: f64,

    /// Upper bound of the randomized inter-cycle delay
    #[serde(default = "default_delay_max_secs")]
    pub delay_max_secs: f64,

    /// Session start, inclusive (HH:MM or HH:MM:SS)
    #[serde(default = "default_session_start")]
    pub session_start: String,

    /// Session end, inclusive (HH:MM or HH:MM:SS)
    #[serde(default = "default_session_end")]
    pub session_end: String,

    /// Fixed offset of the exchange time zone from UTC, in minutes
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

fn default_delay_min_secs() -> f64 {
    55.0
}
fn default_delay_max_secs() -> f64 {
    65.0
}
fn default_session_start() -> String {
    "09:15".to_string()
}
fn default_session_end() -> String {
    "15:15".to_string()
}
fn default_utc_offset_minutes() -> i32 {
    // IST, UTC+05:30
    330
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            test_mode: false,
            run_on_weekends: false,
            delay_min_secs: default_delay_min_secs(),
            delay_max_secs: default_delay_max_secs(),
            session_start: default_session_start(),
            session_end: default_session_end(),
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

/// Parse a wall-clock time in `HH:MM:SS` or `HH:MM` form.
pub fn parse_clock_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

impl ScheduleConfig {
    /// Parsed session start.
    pub fn session_start_time(&self) -> Option<NaiveTime> {
        parse_clock_time(&self.session_start)
    }

    /// Parsed session end.
    pub fn session_end_time(&self) -> Option<NaiveTime> {
        parse_clock_time(&self.session_end)
    }

    /// The exchange time zone.
    pub fn timezone(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes.checked_mul(60)?)
    }
}

// ============================================================================
// Screener
// ============================================================================

/// Screener endpoint configuration shared by all clients.
#[derive(Debug, Clone, Deserialize)]
pub struct ScreenerConfig {
    /// Endpoint receiving the scan clause
    #[serde(default = "default_process_url")]
    pub process_url: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Rows kept after sorting
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Column used as the sort key
    #[serde(default = "default_price_field")]
    pub price_field: String,

    /// Column identifying the symbol
    #[serde(default = "default_symbol_field")]
    pub symbol_field: String,

    /// Ordinal column stripped from results
    #[serde(default = "default_ordinal_field")]
    pub ordinal_field: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_referer")]
    pub referer: String,
}

fn default_process_url() -> String {
    "https://chartink.com/screener/process".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_results() -> usize {
    10
}
fn default_price_field() -> String {
    "close".to_string()
}
fn default_symbol_field() -> String {
    "nsecode".to_string()
}
fn default_ordinal_field() -> String {
    "sr".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64)".to_string()
}
fn default_referer() -> String {
    "https://chartink.com/".to_string()
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            process_url: default_process_url(),
            timeout_secs: default_timeout_secs(),
            max_results: default_max_results(),
            price_field: default_price_field(),
            symbol_field: default_symbol_field(),
            ordinal_field: default_ordinal_field(),
            user_agent: default_user_agent(),
            referer: default_referer(),
        }
    }
}

// ============================================================================
// Notifier
// ============================================================================

/// Delivery configuration shared by all clients.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Telegram Bot API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Caption prefix, rendered as "{prefix}: {symbol}"
    #[serde(default = "default_caption_prefix")]
    pub caption_prefix: String,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}
fn default_caption_prefix() -> String {
    "TradingView".to_string()
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
            caption_prefix: default_caption_prefix(),
        }
    }
}

// ============================================================================
// Clients
// ============================================================================

/// A subscriber account.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Registry key
    pub name: String,
    /// Last day the subscription is active (inclusive)
    pub expiry: NaiveDate,
    /// Telegram bot credential
    pub bot_token: String,
    /// Telegram chat identifier
    pub chat_id: String,
    /// Screener page carrying the anti-forgery token
    pub scanner_url: String,
    /// Scan clause submitted to the screener
    pub payload: String,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("name", &self.name)
            .field("expiry", &self.expiry)
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("scanner_url", &self.scanner_url)
            .field("payload", &self.payload)
            .finish()
    }
}

/// Wire shape of one client entry.
#[derive(Deserialize)]
struct ClientFields {
    #[serde(rename = "EXPIRY", alias = "expiry")]
    expiry: NaiveDate,
    #[serde(rename = "BOT_TOKEN", alias = "bot_token")]
    bot_token: String,
    #[serde(rename = "CHAT_ID", alias = "chat_id")]
    chat_id: String,
    #[serde(rename = "SCANNER_URL", alias = "scanner_url")]
    scanner_url: String,
    #[serde(rename = "PAYLOAD", alias = "payload")]
    payload: String,
}

/// Client entries in source order.
///
/// Deserialized from a JSON object keyed by client name. Key order in the
/// source is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientsConfig(pub Vec<ClientConfig>);

impl<'de> Deserialize<'de> for ClientsConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ClientsVisitor;

        impl<'de> Visitor<'de> for ClientsVisitor {
            type Value = ClientsConfig;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of client name to client settings")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries: Vec<ClientConfig> = Vec::new();
                while let Some((name, fields)) = map.next_entry::<String, ClientFields>()? {
                    if entries.iter().any(|c| c.name == name) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate client '{}'",
                            name
                        )));
                    }
                    entries.push(ClientConfig {
                        name,
                        expiry: fields.expiry,
                        bot_token: fields.bot_token,
                        chat_id: fields.chat_id,
                        scanner_url: fields.scanner_url,
                        payload: fields.payload,
                    });
                }
                Ok(ClientsConfig(entries))
            }
        }

        deserializer.deserialize_map(ClientsVisitor)
    }
}

// ============================================================================
// Root
// ============================================================================

/// Where a loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file
    File(PathBuf),
    /// No file at the default path; built-in defaults
    Defaults { missing: PathBuf },
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Defaults { missing } => write!(f, "defaults ({} not found)", missing.display()),
        }
    }
}

/// Root configuration, immutable after startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub screener: ScreenerConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Exchange holidays (ISO dates)
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,

    /// Subscriber accounts keyed by name
    #[serde(default)]
    pub clients: ClientsConfig,
}

impl AppConfig {
    /// Load configuration from `path`, or from the default path when `None`.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    /// Runs before logging is set up, so the source is returned for the
    /// caller to report.
    pub fn load(path: Option<&Path>) -> Result<(Self, ConfigSource)> {
        match path {
            Some(p) => Ok((Self::load_from(p)?, ConfigSource::File(p.to_path_buf()))),
            None => Self::load_or_default(&config_path()),
        }
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<(Self, ConfigSource)> {
        if !path.exists() {
            return Ok((
                Self::default(),
                ConfigSource::Defaults {
                    missing: path.to_path_buf(),
                },
            ));
        }
        Ok((Self::load_from(path)?, ConfigSource::File(path.to_path_buf())))
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        Self::from_json(&content).map_err(|e| {
            e.with_context(format!("Failed to parse config from {}", path.display()))
        })
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("CLIENTS_JSON") {
            self.clients = serde_json::from_str(&raw).context("Failed to parse CLIENTS_JSON")?;
        }

        if let Some(raw) = lookup("HOLIDAYS_JSON") {
            self.holidays = serde_json::from_str(&raw).context("Failed to parse HOLIDAYS_JSON")?;
        }

        if let Some(raw) = lookup("SCANWATCH_TEST_MODE") {
            self.schedule.test_mode = parse_flag("SCANWATCH_TEST_MODE", &raw)?;
        }

        if let Some(raw) = lookup("SCANWATCH_RUN_ON_WEEKENDS") {
            self.schedule.run_on_weekends = parse_flag("SCANWATCH_RUN_ON_WEEKENDS", &raw)?;
        }

        if let Some(level) = lookup("SCANWATCH_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Some(format) = lookup("SCANWATCH_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        Ok(())
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}
