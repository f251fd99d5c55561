use crate::error::{HubError, Result};
use jsonwebtoken::Algorithm;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub redis: RedisConfig,
    pub relay: RelayConfig,
    pub websocket: WebSocketConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Pub/sub channel the relay listens on
    pub channel: String,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub enabled: bool,
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Upper bound for a single send to one connection
    pub send_timeout_ms: u64,
    /// Capacity of each connection's outbound queue
    pub outbound_buffer: usize,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub secret_key: String,
    pub algorithm: Algorithm,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret_key", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl RelayConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl WebSocketConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: 5000,
            outbound_buffer: 64,
            heartbeat_interval_secs: 5,
            client_timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret_key = lookup("SECRET_KEY")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HubError::Config("SECRET_KEY missing".into()))?;

        let algorithm = parse_or(&lookup, "JWT_ALGORITHM", Algorithm::HS256)?;
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(HubError::Config(format!(
                "JWT_ALGORITHM {:?} is not an HMAC algorithm",
                algorithm
            )));
        }

        let outbound_buffer: usize = parse_or(&lookup, "WS_OUTBOUND_BUFFER", 64)?;
        if outbound_buffer == 0 {
            return Err(HubError::Config(
                "WS_OUTBOUND_BUFFER must be greater than zero".into(),
            ));
        }

        Ok(Config {
            app: AppConfig {
                env: lookup("APP_ENV").unwrap_or_else(|| "development".to_string()),
                host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "APP_PORT", 8000)?,
            },
            redis: RedisConfig {
                url: lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
                channel: lookup("NOTIFICATION_CHANNEL")
                    .unwrap_or_else(|| "notifications".to_string()),
            },
            relay: RelayConfig {
                enabled: parse_flag(&lookup, "RELAY_ENABLED", true),
                reconnect_delay_ms: parse_or(&lookup, "RELAY_RECONNECT_DELAY_MS", 1000)?,
            },
            websocket: WebSocketConfig {
                send_timeout_ms: parse_or(&lookup, "WS_SEND_TIMEOUT_MS", 5000)?,
                outbound_buffer,
                heartbeat_interval_secs: parse_or(&lookup, "WS_HEARTBEAT_INTERVAL_SECS", 5)?,
                client_timeout_secs: parse_or(&lookup, "WS_CLIENT_TIMEOUT_SECS", 30)?,
            },
            auth: AuthConfig {
                secret_key,
                algorithm,
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.app.host, self.app.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| HubError::Config(format!("{key}: {e}"))),
        None => Ok(default),
    }
}

fn parse_flag<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(default)
}
