use crate::error::{ClientError, Result};
use resilience::{live_channel_config, rest_api_config, LinearBackoff, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub api: ApiConfig,
    pub broker: BrokerConfig,
    pub session: SessionConfig,
    pub log: LogConfig,
    pub alerts: AlertConfig,
    /// Receiver to connect on startup; falls back to the stored session's user id
    pub receiver_code: Option<String>,
}

/// How the bearer token travels to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// `Authorization: Bearer <token>`
    #[default]
    Header,
    /// `?token=<token>`, for proxies that inject the header themselves
    QueryParam,
}

impl FromStr for AuthMode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "header" => Ok(AuthMode::Header),
            "query" | "query_param" => Ok(AuthMode::QueryParam),
            other => Err(ClientError::Config(format!("unknown auth mode: {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub auth_mode: AuthMode,
    pub request_timeout: Duration,
    /// Applied to idempotent reads only
    pub retry: RetryConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let preset = rest_api_config();
        Self {
            base_url: "http://localhost:8080/api/".to_string(),
            auth_mode: AuthMode::Header,
            request_timeout: preset.timeout.duration,
            retry: preset.retry.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub url: String,
    pub topic_prefix: String,
    /// Sent as `Sec-WebSocket-Protocol` only when set
    pub subprotocol: Option<String>,
    pub auth_mode: AuthMode,
    /// Bound on handshake plus subscription receipt
    pub connect_timeout: Duration,
    pub reconnect: LinearBackoff,
}

impl BrokerConfig {
    pub fn topic_for(&self, receiver_code: &str) -> String {
        format!("{}/{}", self.topic_prefix.trim_end_matches('/'), receiver_code)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        let preset = live_channel_config();
        Self {
            url: "ws://localhost:8080/ws".to_string(),
            topic_prefix: "/topic/notifications".to_string(),
            subprotocol: None,
            auth_mode: AuthMode::Header,
            connect_timeout: preset.timeout.duration,
            reconnect: preset.reconnect.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".notification-client/session.json"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    pub json: bool,
}

/// Native alerts for pushes that arrive while the console is unattended
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertConfig {
    /// Answer to the one-time permission prompt
    pub desktop: bool,
    /// Whether a console window currently has the user's attention
    pub focused: bool,
}

impl Config {
    /// Load configuration from the environment (and `.env` when present)
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let api_defaults = ApiConfig::default();
        let broker_defaults = BrokerConfig::default();
        let auth_mode: AuthMode = env_or("API_AUTH_MODE", AuthMode::Header)?;

        Ok(Config {
            api: ApiConfig {
                base_url: std::env::var("API_BASE_URL").unwrap_or(api_defaults.base_url),
                auth_mode,
                request_timeout: env_millis("API_REQUEST_TIMEOUT_MS", api_defaults.request_timeout)?,
                retry: api_defaults.retry,
            },
            broker: BrokerConfig {
                url: std::env::var("BROKER_URL").unwrap_or(broker_defaults.url),
                topic_prefix: std::env::var("BROKER_TOPIC_PREFIX")
                    .unwrap_or(broker_defaults.topic_prefix),
                subprotocol: std::env::var("BROKER_SUBPROTOCOL")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                auth_mode,
                connect_timeout: env_millis(
                    "BROKER_CONNECT_TIMEOUT_MS",
                    broker_defaults.connect_timeout,
                )?,
                reconnect: LinearBackoff::new(
                    env_millis("BROKER_RECONNECT_DELAY_MS", broker_defaults.reconnect.base)?,
                    env_or(
                        "BROKER_MAX_RECONNECT_ATTEMPTS",
                        broker_defaults.reconnect.max_attempts,
                    )?,
                ),
            },
            session: SessionConfig {
                path: std::env::var("SESSION_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| SessionConfig::default().path),
            },
            log: LogConfig {
                json: std::env::var("LOG_FORMAT")
                    .map(|v| v.eq_ignore_ascii_case("json"))
                    .unwrap_or(false),
            },
            alerts: AlertConfig {
                desktop: env_or("DESKTOP_ALERTS", false)?,
                focused: env_or("CONSOLE_FOCUSED", false)?,
            },
            receiver_code: std::env::var("RECEIVER_CODE")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ClientError::Config(format!("{key}={raw}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn env_millis(key: &str, default: Duration) -> Result<Duration> {
    let millis: u64 = env_or(key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}
