//! Configuration for lightning-gate.

use crate::error::{Error, Result};
use crate::provider::ProviderKind;
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How long a paid grant lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AccessDuration {
    /// Seven days.
    Week,
    /// One calendar month.
    #[default]
    Month,
    /// One calendar year.
    Year,
    /// Access never expires.
    Forever,
    /// Explicit duration such as `720h` or `30d`.
    Explicit(std::time::Duration),
}

impl AccessDuration {
    /// Length of a grant issued at `now`, or `None` for a grant that never expires.
    ///
    /// Calendar units are resolved relative to `now`, so a month granted on
    /// January 31st ends on the last day of February.
    #[must_use]
    pub fn grant_length(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::Forever => None,
            Self::Week => Some(Duration::days(7)),
            Self::Month => calendar_span(now, Months::new(1)),
            Self::Year => calendar_span(now, Months::new(12)),
            Self::Explicit(d) => Duration::from_std(*d).ok().filter(|d| !d.is_zero()),
        }
    }
}

fn calendar_span(now: DateTime<Utc>, months: Months) -> Option<Duration> {
    now.checked_add_months(months).map(|end| end - now)
}

impl FromStr for AccessDuration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1week" => Ok(Self::Week),
            "1month" => Ok(Self::Month),
            "1year" => Ok(Self::Year),
            "forever" => Ok(Self::Forever),
            other => parse_explicit(other).map(Self::Explicit),
        }
    }
}

fn parse_explicit(s: &str) -> Result<std::time::Duration> {
    let invalid = || Error::Config(format!("invalid access duration: {s:?}"));
    let split = s.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits.parse().map_err(|_| invalid())?;
    let secs = match unit {
        "s" => value,
        "m" => value.checked_mul(60).ok_or_else(invalid)?,
        "h" => value.checked_mul(3600).ok_or_else(invalid)?,
        "d" => value.checked_mul(86_400).ok_or_else(invalid)?,
        _ => return Err(invalid()),
    };
    Ok(std::time::Duration::from_secs(secs))
}

impl fmt::Display for AccessDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Week => f.write_str("1week"),
            Self::Month => f.write_str("1month"),
            Self::Year => f.write_str("1year"),
            Self::Forever => f.write_str("forever"),
            Self::Explicit(d) => {
                let (value, unit) = largest_whole_unit(d.as_secs());
                write!(f, "{value}{unit}")
            }
        }
    }
}

fn largest_whole_unit(secs: u64) -> (u64, char) {
    match secs {
        0 => (0, 's'),
        s if s % 86_400 == 0 => (s / 86_400, 'd'),
        s if s % 3600 == 0 => (s / 3600, 'h'),
        s if s % 60 == 0 => (s / 60, 'm'),
        s => (s, 's'),
    }
}

impl TryFrom<String> for AccessDuration {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<AccessDuration> for String {
    fn from(d: AccessDuration) -> Self {
        d.to_string()
    }
}

/// Gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Payment backend.
    #[serde(default)]
    pub provider: ProviderKind,

    /// Price of access in millisatoshis.
    #[serde(default = "default_payment_amount")]
    pub payment_amount_msat: u64,

    /// How long a grant lasts.
    #[serde(default)]
    pub access_duration: AccessDuration,

    /// Access record store file.
    #[serde(default = "default_paid_access_file")]
    pub paid_access_file: PathBuf,

    /// Payment hash to charge reference store file.
    #[serde(default = "default_charge_mapping_file")]
    pub charge_mapping_file: PathBuf,

    /// Message shown to actors that have to pay.
    #[serde(default = "default_reject_message")]
    pub reject_message: String,

    /// Reconciler wake interval in seconds.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Age after which charge mappings are pruned, in hours.
    #[serde(default = "default_mapping_ttl")]
    pub mapping_ttl_hours: u64,

    /// Timeout for provider HTTP calls in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// ZBD settings.
    #[serde(default)]
    pub zbd: ZbdConfig,

    /// phoenixd settings.
    #[serde(default)]
    pub phoenixd: PhoenixdConfig,
}

/// ZBD charges API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZbdConfig {
    /// API key sent in the `apikey` header.
    #[serde(default)]
    pub api_key: String,

    /// Lightning address receiving payments (reported in stats).
    #[serde(default)]
    pub lightning_address: String,

    /// API base URL.
    #[serde(default = "default_zbd_base_url")]
    pub base_url: String,
}

/// phoenixd HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixdConfig {
    /// Base URL of the phoenixd daemon.
    #[serde(default = "default_phoenixd_url")]
    pub url: String,

    /// HTTP password (basic auth, empty username).
    #[serde(default)]
    pub password: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            payment_amount_msat: default_payment_amount(),
            access_duration: AccessDuration::default(),
            paid_access_file: default_paid_access_file(),
            charge_mapping_file: default_charge_mapping_file(),
            reject_message: default_reject_message(),
            reconcile_interval_secs: default_reconcile_interval(),
            mapping_ttl_hours: default_mapping_ttl(),
            request_timeout_secs: default_request_timeout(),
            log_level: default_log_level(),
            zbd: ZbdConfig::default(),
            phoenixd: PhoenixdConfig::default(),
        }
    }
}

impl Default for ZbdConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            lightning_address: String::new(),
            base_url: default_zbd_base_url(),
        }
    }
}

impl Default for PhoenixdConfig {
    fn default() -> Self {
        Self {
            url: default_phoenixd_url(),
            password: String::new(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "lightning-gate")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn default_paid_access_file() -> PathBuf {
    default_data_dir().join("paid_access.json")
}

fn default_charge_mapping_file() -> PathBuf {
    default_data_dir().join("charge_mappings.json")
}

const fn default_payment_amount() -> u64 {
    21_000 // 21 sats
}

fn default_reject_message() -> String {
    "You are not part of the WoT, payment required to join relay".to_string()
}

fn default_zbd_base_url() -> String {
    "https://api.zebedee.io".to_string()
}

fn default_phoenixd_url() -> String {
    "http://localhost:9740".to_string()
}

const fn default_reconcile_interval() -> u64 {
    3600
}

const fn default_mapping_ttl() -> u64 {
    24
}

const fn default_request_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GateConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check that the selected provider has the credentials it needs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first missing setting.
    pub fn validate(&self) -> Result<()> {
        if self.payment_amount_msat == 0 {
            return Err(Error::Config("payment amount must be positive".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request timeout must be positive".to_string()));
        }
        match self.provider {
            ProviderKind::Zbd => {
                if self.zbd.api_key.is_empty() {
                    return Err(Error::Config("ZBD API key required for zbd provider".to_string()));
                }
                if self.zbd.lightning_address.is_empty() {
                    return Err(Error::Config(
                        "lightning address required for zbd provider".to_string(),
                    ));
                }
            }
            ProviderKind::Phoenixd => {
                if self.phoenixd.password.is_empty() {
                    return Err(Error::Config(
                        "phoenixd password required for phoenixd provider".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Reconciler wake interval.
    #[must_use]
    pub fn reconcile_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reconcile_interval_secs.max(1))
    }

    /// Maximum age of a charge mapping.
    #[must_use]
    pub fn mapping_ttl(&self) -> Duration {
        i64::try_from(self.mapping_ttl_hours)
            .ok()
            .and_then(Duration::try_hours)
            .unwrap_or(Duration::MAX)
    }

    /// Timeout applied to every provider HTTP call.
    #[must_use]
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}
