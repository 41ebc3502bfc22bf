//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default number of candidate addresses offered to the user.
pub const DEFAULT_MAX_CANDIDATES: usize = 10;

/// Runtime configuration for the intake bot.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Port of the administrative HTTP surface.
    pub port: u16,
    /// Upper bound on candidate addresses offered in one prompt.
    pub max_candidates: usize,
    /// Sessions idle for longer than this are evicted.
    pub session_idle_timeout: Duration,
    /// Upper bound on the wait for an oracle summary.
    pub oracle_timeout: Duration,
    /// Origins allowed to call the admin API from a browser. Empty allows none.
    pub admin_origins: Vec<String>,
    /// Channel used by admin sends when the request doesn't name one.
    pub default_channel: Option<String>,
    /// Directory for the rolling log file, if any.
    pub log_dir: Option<PathBuf>,
    /// Numbers blocked at startup.
    pub blocklist: Vec<String>,
    pub gemini: Option<GeminiConfig>,
    pub telegram: Option<TelegramConfig>,
}

/// Gemini oracle settings.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: SecretString,
    pub model: String,
}

/// Telegram transport settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub allowed_users: Vec<String>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/intake.db"),
            port: 3008,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            session_idle_timeout: Duration::from_secs(3600), // 1 hour
            oracle_timeout: Duration::from_secs(20),
            admin_origins: Vec::new(),
            default_channel: None,
            log_dir: None,
            blocklist: Vec::new(),
            gemini: None,
            telegram: None,
        }
    }
}

impl IntakeConfig {
    /// Build the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let db_path = lookup("INTAKE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let port: u16 = parse_var(&lookup, "INTAKE_PORT")?.unwrap_or(defaults.port);

        let max_candidates: usize =
            parse_var(&lookup, "INTAKE_MAX_CANDIDATES")?.unwrap_or(defaults.max_candidates);
        if max_candidates == 0 {
            return Err(ConfigError::InvalidValue {
                key: "INTAKE_MAX_CANDIDATES".into(),
                message: "must be at least 1".into(),
            });
        }

        let session_idle_timeout = parse_var(&lookup, "INTAKE_SESSION_IDLE_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.session_idle_timeout);

        let oracle_timeout = parse_var(&lookup, "INTAKE_ORACLE_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.oracle_timeout);
        if oracle_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "INTAKE_ORACLE_TIMEOUT_SECS".into(),
                message: "must be at least 1".into(),
            });
        }

        let gemini = lookup("GEMINI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .map(|key| GeminiConfig {
                api_key: SecretString::from(key),
                model: lookup("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            });

        let telegram = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .map(|token| TelegramConfig {
                bot_token: SecretString::from(token),
                allowed_users: split_list(&lookup("TELEGRAM_ALLOWED_USERS").unwrap_or_else(|| "*".to_string())),
            });

        let default_channel = lookup("INTAKE_DEFAULT_CHANNEL").or_else(|| {
            Some(if telegram.is_some() { "telegram" } else { "cli" }.to_string())
        });

        Ok(Self {
            db_path,
            port,
            max_candidates,
            session_idle_timeout,
            oracle_timeout,
            admin_origins: split_list(&lookup("INTAKE_ADMIN_ORIGINS").unwrap_or_default()),
            default_channel,
            log_dir: lookup("INTAKE_LOG_DIR").map(PathBuf::from),
            blocklist: split_list(&lookup("INTAKE_BLOCKLIST").unwrap_or_default()),
            gemini,
            telegram,
        })
    }
}

/// Parse `key` when it is set. A value that doesn't parse is an error, never
/// a silent fallback to the default.
fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            key: key.into(),
            message: format!("'{raw}' is not a valid number"),
        })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
