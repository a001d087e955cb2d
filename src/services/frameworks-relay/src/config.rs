//! Configuration module for the Frameworks relay
//!
//! The configuration is assembled once at startup from defaults, an optional
//! config file, `RELAY_*` environment variables and the flat variable names used
//! by existing deployments (`KLAVIYO_API_KEY`, `WEBHOOK_API_KEY`, ...). The
//! resulting [`RelayConfig`] is immutable and shared by reference.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Main configuration structure for the relay
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Marketing API (Klaviyo) configuration
    pub klaviyo: KlaviyoConfig,
    /// Inbound webhook security
    pub webhook: WebhookSecurityConfig,
    /// Chat notification (Discord) configuration
    pub discord: DiscordConfig,
    /// Audit store configuration
    pub audit: AuditConfig,
    /// Delivery behaviour towards the marketing API
    pub delivery: DeliveryConfig,
    /// Logging configuration
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 3000)
    pub port: u16,
    /// Request timeout in seconds (default: 30)
    pub request_timeout_secs: u64,
    /// Deployment environment name reported by /health
    pub environment: String,
}

/// Marketing API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KlaviyoConfig {
    /// Private API key, sent as `Klaviyo-API-Key <key>`
    pub api_key: String,
    /// API base URL
    pub api_url: String,
    /// API revision header value
    pub api_revision: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Shared secret expected in the `X-API-Key` header
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSecurityConfig {
    pub api_key: String,
}

/// Chat notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Incoming webhook URL; notifications are skipped when unset
    pub webhook_url: Option<String>,
    /// Display name of the posting bot
    pub username: String,
    /// Heading of every message
    pub title: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Audit store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Directory holding one JSON file per inbound call
    pub data_dir: PathBuf,
    /// Number of most recent artifacts kept by retention
    pub retain: usize,
    /// Interval of the in-process retention task, 0 disables it
    pub prune_interval_secs: u64,
}

/// How the canonical event's profile reference is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStrategy {
    /// Use `payload.id` verbatim
    PayloadId,
    /// Find or create the profile by email / customer code
    Lookup,
}

impl Default for ProfileStrategy {
    fn default() -> Self {
        Self::PayloadId
    }
}

/// Delivery behaviour towards the marketing API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Total attempts per call, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound for a single retry delay in milliseconds
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,
    /// Randomize delays by +/-25%
    pub jitter: bool,
    /// Overall deadline for resolution and delivery in seconds; must stay
    /// below `server.request_timeout_secs`
    pub deadline_secs: u64,
    /// Profile reference strategy
    pub profile_strategy: ProfileStrategy,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format (json, pretty, compact)
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout_secs: 30,
            environment: "development".to_string(),
        }
    }
}

impl Default for KlaviyoConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: "https://a.klaviyo.com/api".to_string(),
            api_revision: "2023-10-15".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            username: "Integration Bot".to_string(),
            title: "Frameworks to Klaviyo".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            retain: 50,
            prune_interval_secs: 0,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 5_000,
            backoff_multiplier: 2.0,
            jitter: true,
            deadline_secs: 20,
            profile_strategy: ProfileStrategy::PayloadId,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}

/// Flat variable names honoured for compatibility with existing deployments
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("KLAVIYO_API_KEY", "klaviyo.api_key"),
    ("KLAVIYO_API_VERSION", "klaviyo.api_revision"),
    ("KLAVIYO_API_URL", "klaviyo.api_url"),
    ("WEBHOOK_API_KEY", "webhook.api_key"),
    ("DISCORD_WEBHOOK_URL", "discord.webhook_url"),
    ("PORT", "server.port"),
    ("NODE_ENV", "server.environment"),
    ("DATA_DIR", "audit.data_dir"),
];

impl RelayConfig {
    /// Load configuration from environment variables
    ///
    /// Nested keys use `RELAY_<SECTION>__<KEY>`, e.g. `RELAY_KLAVIYO__TIMEOUT_SECS`.
    /// Legacy flat names take precedence over everything else.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut cfg = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.request_timeout_secs", 30)?
            .set_default("server.environment", "development")?
            .set_default("klaviyo.api_url", "https://a.klaviyo.com/api")?
            .set_default("klaviyo.api_revision", "2023-10-15")?
            .set_default("klaviyo.timeout_secs", 10)?
            .set_default("discord.username", "Integration Bot")?
            .set_default("discord.title", "Frameworks to Klaviyo")?
            .set_default("discord.timeout_secs", 10)?
            .set_default("audit.data_dir", "data")?
            .set_default("audit.retain", 50)?
            .set_default("audit.prune_interval_secs", 0)?
            .set_default("delivery.max_attempts", 3)?
            .set_default("delivery.initial_backoff_ms", 250)?
            .set_default("delivery.max_backoff_ms", 5000)?
            .set_default("delivery.backoff_multiplier", 2.0)?
            .set_default("delivery.jitter", true)?
            .set_default("delivery.deadline_secs", 20)?
            .set_default("delivery.profile_strategy", "payload_id")?
            .set_default("observability.log_level", "info")?
            .set_default("observability.log_format", "json")?;

        // Load from optional config file
        if let Ok(config_path) = std::env::var("RELAY_CONFIG_FILE") {
            cfg = cfg.add_source(config::File::with_name(&config_path).required(false));
        }

        cfg = cfg.add_source(
            config::Environment::with_prefix("RELAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        for (var, key) in LEGACY_ENV_KEYS {
            let value = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
            cfg = cfg.set_override_option(*key, value)?;
        }

        cfg.build()?.try_deserialize()
    }

    /// Validate the configuration, reporting every problem at once
    pub fn validate(&self) -> Result<(), String> {
        let mut problems = Vec::new();

        if self.klaviyo.api_key.trim().is_empty() {
            problems.push("missing KLAVIYO_API_KEY (klaviyo.api_key)".to_string());
        }
        if self.webhook.api_key.trim().is_empty() {
            problems.push("missing WEBHOOK_API_KEY (webhook.api_key)".to_string());
        }
        if self.server.port == 0 {
            problems.push("server port cannot be 0".to_string());
        }
        if let Err(e) = Url::parse(&self.klaviyo.api_url) {
            problems.push(format!("invalid Klaviyo API URL: {}", e));
        }
        if let Some(ref webhook_url) = self.discord.webhook_url {
            if let Err(e) = Url::parse(webhook_url) {
                problems.push(format!("invalid Discord webhook URL: {}", e));
            }
        }
        if self.audit.retain == 0 {
            problems.push("audit retention must keep at least one artifact".to_string());
        }
        if self.delivery.max_attempts == 0 {
            problems.push("delivery max_attempts must be at least 1".to_string());
        }
        if self.delivery.deadline_secs == 0 {
            problems.push("delivery deadline_secs must be at least 1".to_string());
        } else if self.delivery.deadline_secs >= self.server.request_timeout_secs {
            problems.push(format!(
                "delivery deadline_secs ({}) must be lower than server request_timeout_secs ({})",
                self.delivery.deadline_secs, self.server.request_timeout_secs
            ));
        }
        if self.delivery.backoff_multiplier < 1.0 {
            problems.push("delivery backoff_multiplier must be >= 1.0".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }

    /// Deadline for profile resolution plus delivery, retries included
    pub fn delivery_deadline(&self) -> Duration {
        Duration::from_secs(self.delivery.deadline_secs)
    }
}
