use std::time::Duration;

use crate::error::ConfigError;

/// Default Slack Web API endpoint for posting a message.
pub const DEFAULT_SLACK_POST_URL: &str = "https://slack.com/api/chat.postMessage";

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Control-plane API base URL (e.g. https://api.sys.example.com)
    pub cf_api_url: String,

    /// Username for the UAA password grant
    pub cf_username: String,

    /// Password for the UAA password grant
    pub cf_password: String,

    /// UAA client id (default: "cf")
    pub cf_client_id: String,

    /// UAA client secret (default: empty)
    pub cf_client_secret: String,

    /// Accept invalid TLS certificates from the control plane
    pub cf_skip_ssl_validation: bool,

    /// Redis connection string
    pub redis_url: String,

    /// Redis key holding the last-run timestamp
    pub run_state_key: String,

    /// Slack bot token
    pub slack_api_token: String,

    /// Channel the summary is posted to
    pub slack_channel: String,

    /// Display name for posted messages
    pub slack_username: Option<String>,

    /// Icon for posted messages
    pub slack_icon_url: Option<String>,

    /// chat.postMessage endpoint
    pub slack_post_url: String,

    /// Seconds between polling cycles (default: 300)
    pub poll_interval_secs: u64,

    /// Timeout applied to every outbound HTTP call and Redis command (default: 30)
    pub http_timeout_secs: u64,

    /// Maximum number of events listed in one summary (default: 50)
    pub summary_max_events: usize,

    /// Emit JSON log lines instead of human-readable text
    pub log_json: bool,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };
        let or_default =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let cf_api_url = required("CF_API_URL")?;
        if !cf_api_url.starts_with("http://") && !cf_api_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                var: "CF_API_URL",
                reason: "must be an http(s) URL".to_string(),
            });
        }

        let redis_url = or_default("REDIS_URL", "redis://localhost:6379");
        redis::Client::open(redis_url.as_str()).map_err(|e| ConfigError::Invalid {
            var: "REDIS_URL",
            reason: e.to_string(),
        })?;

        let log_format = or_default("LOG_FORMAT", "text");
        let log_json = match log_format.to_ascii_lowercase().as_str() {
            "json" => true,
            "text" | "pretty" => false,
            _ => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    reason: format!("expected \"text\" or \"json\", got {log_format:?}"),
                });
            }
        };

        Ok(Self {
            cf_api_url: cf_api_url.trim_end_matches('/').to_string(),
            cf_username: required("CF_USERNAME")?,
            cf_password: required("CF_PASSWORD")?,
            cf_client_id: or_default("CF_CLIENT_ID", "cf"),
            cf_client_secret: or_default("CF_CLIENT_SECRET", ""),
            cf_skip_ssl_validation: parse_bool(
                "CF_SKIP_SSL_VALIDATION",
                &or_default("CF_SKIP_SSL_VALIDATION", "false"),
            )?,
            redis_url,
            run_state_key: or_default("RUN_STATE_KEY", "platform-herald:last-run"),
            slack_api_token: required("SLACK_API_TOKEN")?,
            slack_channel: or_default("SLACK_CHANNEL", "platform-events"),
            slack_username: Some(or_default("SLACK_USERNAME", "cf-events"))
                .filter(|v| !v.is_empty()),
            slack_icon_url: lookup("SLACK_ICON_URL").filter(|v| !v.is_empty()),
            slack_post_url: or_default("SLACK_POST_URL", DEFAULT_SLACK_POST_URL),
            poll_interval_secs: parse_positive(
                "POLL_INTERVAL_SECS",
                &or_default("POLL_INTERVAL_SECS", "300"),
            )?,
            http_timeout_secs: parse_positive(
                "HTTP_TIMEOUT_SECS",
                &or_default("HTTP_TIMEOUT_SECS", "30"),
            )?,
            summary_max_events: or_default("SUMMARY_MAX_EVENTS", "50")
                .parse()
                .map_err(|_| ConfigError::Invalid {
                    var: "SUMMARY_MAX_EVENTS",
                    reason: "must be a valid usize".to_string(),
                })?,
            log_json,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn parse_positive(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ConfigError::Invalid {
            var,
            reason: format!("must be a positive integer, got {raw:?}"),
        }),
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            reason: format!("must be a boolean, got {raw:?}"),
        }),
    }
}
