//! Configuration for smscast

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "SMSCAST_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Campaign scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Send throttle configuration
    #[serde(default)]
    pub sending: SendingConfig,

    /// SMS gateway configuration
    #[serde(default)]
    pub sms: SmsConfig,

    /// Short-link provider configuration
    #[serde(default)]
    pub short_links: ShortLinkConfig,

    /// Double opt-in configuration
    #[serde(default)]
    pub opt_in: OptInConfig,

    /// Inbound webhook configuration
    #[serde(default)]
    pub webhooks: WebhookConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Public base URL, used for status callbacks and opt-in links
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_database_url() -> String {
    "postgres://localhost/smscast".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address for the HTTP API
    #[serde(default = "default_api_bind")]
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_api_bind(),
        }
    }
}

fn default_api_bind() -> String {
    "0.0.0.0:8080".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Campaign scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Run the due-campaign poller
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between polls for due campaigns
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    60
}

/// Outbound send throttle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendingConfig {
    /// Sustained sends per second; zero or negative disables throttling
    #[serde(default = "default_messages_per_second")]
    pub messages_per_second: f64,

    /// Sends allowed back-to-back before throttling kicks in
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for SendingConfig {
    fn default() -> Self {
        Self {
            messages_per_second: default_messages_per_second(),
            burst: default_burst(),
        }
    }
}

fn default_messages_per_second() -> f64 {
    1.0
}

fn default_burst() -> u32 {
    1
}

/// SMS gateway configuration (Twilio-compatible REST API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    /// Account SID
    pub account_sid: Option<String>,

    /// Auth token
    pub auth_token: Option<String>,

    /// Sender phone number
    pub from_number: Option<String>,

    /// API base URL
    #[serde(default = "default_sms_api_base_url")]
    pub api_base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_sms_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            api_base_url: default_sms_api_base_url(),
            timeout_secs: default_sms_timeout(),
        }
    }
}

impl SmsConfig {
    /// Whether every credential needed to send is present
    pub fn is_configured(&self) -> bool {
        [&self.account_sid, &self.auth_token, &self.from_number]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }
}

fn default_sms_api_base_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_sms_timeout() -> u64 {
    15
}

/// Short-link provider configuration (Short.io-compatible API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortLinkConfig {
    /// Provider API key; without it every link uses the local fallback
    pub api_key: Option<String>,

    /// Link creation endpoint
    #[serde(default = "default_short_link_api_url")]
    pub api_url: String,

    /// Provider domain links are minted under
    #[serde(default = "default_short_link_domain")]
    pub domain: String,

    /// Base URL for locally generated fallback links
    #[serde(default = "default_fallback_base_url")]
    pub fallback_base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_short_link_timeout")]
    pub timeout_secs: u64,
}

impl Default for ShortLinkConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_short_link_api_url(),
            domain: default_short_link_domain(),
            fallback_base_url: default_fallback_base_url(),
            timeout_secs: default_short_link_timeout(),
        }
    }
}

fn default_short_link_api_url() -> String {
    "https://api.short.io/links".to_string()
}

fn default_short_link_domain() -> String {
    "short.io".to_string()
}

fn default_fallback_base_url() -> String {
    "https://sms.ly".to_string()
}

fn default_short_link_timeout() -> u64 {
    10
}

/// Double opt-in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptInConfig {
    /// Hours a confirmation token stays valid
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
}

impl Default for OptInConfig {
    fn default() -> Self {
        Self {
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

fn default_token_ttl_hours() -> i64 {
    24
}

/// Inbound webhook configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret for the HMAC-SHA256 request signature
    pub signing_secret: Option<String>,
}

impl Config {
    /// Load configuration from an optional file layered with `SMSCAST_*`
    /// environment variables (`SMSCAST_SMS__AUTH_TOKEN` sets `sms.auth_token`)
    pub fn load() -> crate::Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                [
                    PathBuf::from("./smscast.toml"),
                    PathBuf::from("/etc/smscast/config.toml"),
                ]
                .into_iter()
                .find(|p| p.exists())
            });

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder
            .add_source(
                config::Environment::with_prefix("SMSCAST")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))
    }
}
