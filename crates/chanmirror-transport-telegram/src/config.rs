//! Telegram transport settings.

use chanmirror_core::config::{parse_id_list, AppSettings};
use config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Default port of the liveness endpoint.
pub const DEFAULT_LIVENESS_PORT: u16 = 3000;

/// First delay of the reply retry backoff.
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound of the reply retry backoff.
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 5_000;
/// Retries of a failed reply before giving up.
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;

/// Telegram transport settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelegramSettings {
    /// Admin (mirror) bot token. The bot is not started without it.
    pub admin_bot_token: Option<String>,
    /// Attach bot token. The bot is not started without it.
    #[serde(alias = "bot_token_attach")]
    pub attach_bot_token: Option<String>,
    /// Attach bot username used in deep links.
    #[serde(alias = "bot_username_attach")]
    pub attach_bot_username: Option<String>,
    /// Comma-separated list of admin user IDs.
    #[serde(rename = "admin_users")]
    pub admin_users_str: Option<String>,
    /// Comma-separated list of attach bot admins; falls back to `admin_users`.
    #[serde(rename = "attach_admin_users")]
    pub attach_admin_users_str: Option<String>,
    /// Port of the liveness endpoint.
    #[serde(default = "default_liveness_port", alias = "port")]
    pub liveness_port: u16,
}

const fn default_liveness_port() -> u16 {
    DEFAULT_LIVENESS_PORT
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            admin_bot_token: None,
            attach_bot_token: None,
            attach_bot_username: None,
            admin_users_str: None,
            attach_admin_users_str: None,
            liveness_port: DEFAULT_LIVENESS_PORT,
        }
    }
}

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        chanmirror_core::config::build_config()?.try_deserialize()
    }

    /// Admin bot allow-list.
    #[must_use]
    pub fn admin_users(&self) -> HashSet<i64> {
        self.admin_users_str
            .as_deref()
            .map(|s| parse_id_list(s).into_iter().collect())
            .unwrap_or_default()
    }

    /// Attach bot allow-list.
    #[must_use]
    pub fn attach_admin_users(&self) -> HashSet<i64> {
        match self.attach_admin_users_str.as_deref() {
            Some(s) if !s.trim().is_empty() => parse_id_list(s).into_iter().collect(),
            _ => self.admin_users(),
        }
    }
}

/// Combined settings used by the Telegram transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Store, schedule and session settings.
    pub app: Arc<AppSettings>,
    /// Telegram-specific settings.
    pub telegram: Arc<TelegramSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(app: AppSettings, telegram: TelegramSettings) -> Self {
        Self {
            app: Arc::new(app),
            telegram: Arc::new(telegram),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TelegramSettings;

    #[test]
    fn test_admin_lists() {
        let mut settings = TelegramSettings {
            admin_users_str: Some("1081656301, 1361262107;6335193759".to_string()),
            ..TelegramSettings::default()
        };
        assert_eq!(settings.admin_users().len(), 3);
        // falls back to the admin list
        assert_eq!(settings.attach_admin_users(), settings.admin_users());

        settings.attach_admin_users_str = Some("42".to_string());
        let attach = settings.attach_admin_users();
        assert!(attach.contains(&42));
        assert_eq!(attach.len(), 1);
    }

    #[test]
    fn test_empty_lists() {
        let settings = TelegramSettings::default();
        assert!(settings.admin_users().is_empty());
        assert!(settings.attach_admin_users().is_empty());
        assert_eq!(settings.liveness_port, 3000);
    }
}
