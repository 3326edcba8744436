//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the mirror schedule defaults.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Default JSONBin API root.
pub const JSONBIN_BASE_URL: &str = "https://api.jsonbin.io/v3";

/// Default pre-check time of day (`HH:MM`, schedule offset).
pub const DEFAULT_PRECHECK_TIME: &str = "03:10";
/// Default backup time of day.
pub const DEFAULT_BACKUP_TIME: &str = "03:30";
/// Default repost time of day.
pub const DEFAULT_REPOST_TIME: &str = "03:55";
/// Default schedule offset from UTC in minutes (Asia/Kolkata, +05:30).
pub const DEFAULT_SCHEDULE_OFFSET_MINUTES: i32 = 330;

/// Forward-channel capture window.
pub const FORWARD_CAPTURE_TTL_SECS: u64 = 120;
/// Default lifetime of attach-bot pending interactions.
pub const DEFAULT_ATTACH_SESSION_TTL_SECS: u64 = 600;
/// Delivered attach messages are deleted after this many seconds.
pub const ATTACH_MESSAGE_TTL_SECS: u64 = 30 * 60;

/// Which document store backend to use.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON file per document under `data_dir`.
    #[default]
    File,
    /// JSONBin.io document API.
    Jsonbin,
    /// Cloudflare R2 / S3-compatible object storage.
    R2,
}

/// Core settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppSettings {
    /// Selected document store backend
    #[serde(default)]
    pub storage_backend: StorageBackend,
    /// Directory for the file backend
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// JSONBin access key
    pub jsonbin_key: Option<String>,
    /// JSONBin API root
    #[serde(default = "default_jsonbin_base_url")]
    pub jsonbin_base_url: String,
    /// Bin holding the storage document
    pub storage_bin: Option<String>,
    /// Bin holding the config document
    pub config_bin: Option<String>,
    /// Bin holding attach entries
    pub attach_bin: Option<String>,
    /// Bin holding the banner image record
    pub image_bin: Option<String>,
    /// Bin holding the private channel record
    pub channel_bin: Option<String>,

    /// R2 Storage access key ID
    pub r2_access_key_id: Option<String>,
    /// R2 Storage secret access key
    pub r2_secret_access_key: Option<String>,
    /// R2 Storage endpoint URL
    pub r2_endpoint_url: Option<String>,
    /// R2 Storage bucket name
    pub r2_bucket_name: Option<String>,

    /// Pre-check time of day, `HH:MM`
    #[serde(default = "default_precheck_time")]
    pub precheck_time: String,
    /// Backup time of day, `HH:MM`
    #[serde(default = "default_backup_time")]
    pub backup_time: String,
    /// Repost time of day, `HH:MM`
    #[serde(default = "default_repost_time")]
    pub repost_time: String,
    /// Offset of the schedule clock from UTC, in minutes
    #[serde(default = "default_schedule_offset_minutes")]
    pub schedule_offset_minutes: i32,

    /// Lifetime of attach-bot pending interactions, in seconds
    #[serde(default = "default_attach_session_ttl_secs")]
    pub attach_session_ttl_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::default(),
            data_dir: default_data_dir(),
            jsonbin_key: None,
            jsonbin_base_url: default_jsonbin_base_url(),
            storage_bin: None,
            config_bin: None,
            attach_bin: None,
            image_bin: None,
            channel_bin: None,
            r2_access_key_id: None,
            r2_secret_access_key: None,
            r2_endpoint_url: None,
            r2_bucket_name: None,
            precheck_time: default_precheck_time(),
            backup_time: default_backup_time(),
            repost_time: default_repost_time(),
            schedule_offset_minutes: DEFAULT_SCHEDULE_OFFSET_MINUTES,
            attach_session_ttl_secs: DEFAULT_ATTACH_SESSION_TTL_SECS,
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_jsonbin_base_url() -> String {
    JSONBIN_BASE_URL.to_string()
}

fn default_precheck_time() -> String {
    DEFAULT_PRECHECK_TIME.to_string()
}

fn default_backup_time() -> String {
    DEFAULT_BACKUP_TIME.to_string()
}

fn default_repost_time() -> String {
    DEFAULT_REPOST_TIME.to_string()
}

const fn default_schedule_offset_minutes() -> i32 {
    DEFAULT_SCHEDULE_OFFSET_MINUTES
}

const fn default_attach_session_ttl_secs() -> u64 {
    DEFAULT_ATTACH_SESSION_TTL_SECS
}

/// Build the layered configuration shared by every settings struct.
///
/// Sources, later ones win: `config/default`, `config/{RUN_MODE}`,
/// `config/local`, `APP__*` variables, then plain environment variables.
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // UPPER_SNAKE_CASE maps to snake_case; empty vars count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl AppSettings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use chanmirror_core::config::AppSettings;
    ///
    /// let settings = AppSettings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }
}

/// Parse a comma, semicolon or whitespace separated list of Telegram IDs.
///
/// Tokens that are not integers are dropped.
#[must_use]
pub fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .filter_map(|id| id.parse::<i64>().ok())
        .collect()
}
