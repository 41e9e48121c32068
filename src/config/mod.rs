use crate::utils::error::{NotifierError, NotifierResult};
use config::{Config as RawConfig, Environment, File, FileFormat};
use dotenv::dotenv;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

fn default_port() -> u16 {
    3000
}

fn default_host() -> Ipv4Addr {
    Ipv4Addr::new(127, 0, 0, 1)
}

fn default_broker_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_poll_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_cookie_name() -> String {
    "access_token".to_string()
}

fn default_handshake_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_base_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn human_readable_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let duration_str: String = Deserialize::deserialize(deserializer)?;
    humantime::parse_duration(&duration_str).map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: Ipv4Addr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerConfig {
    /// Connection URL of the pub/sub broker.
    #[serde(default = "default_broker_url")]
    pub url: String,
    /// Upper bound for one fan-out listener poll.
    #[serde(
        default = "default_poll_timeout",
        deserialize_with = "human_readable_duration"
    )]
    pub poll_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            poll_timeout: default_poll_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// HS256 secret used to verify bearer tokens. Required; typically set
    /// through `APP__AUTH__JWT_SECRET`.
    #[serde(default)]
    pub jwt_secret: String,
    /// Name of the HttpOnly cookie carrying the token on the upgrade request.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// How long a cookieless client may take to send its auth message.
    #[serde(
        default = "default_handshake_timeout",
        deserialize_with = "human_readable_duration"
    )]
    pub handshake_timeout: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Delay before the first broker reconnect attempt.
    #[serde(
        default = "default_base_delay",
        deserialize_with = "human_readable_duration"
    )]
    pub base_delay: Duration,
    /// Cap for the exponential reconnect backoff.
    #[serde(
        default = "default_max_delay",
        deserialize_with = "human_readable_duration"
    )]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Loads the configuration from an optional file and environment variables.
    pub fn new(config_path: Option<PathBuf>) -> NotifierResult<Self> {
        dotenv().ok();

        let mut builder = RawConfig::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder
            .build()
            .map_err(|e| NotifierError::Config(e.to_string()))?;
        let cfg: Config = raw
            .try_deserialize()
            .map_err(|e| NotifierError::Config(e.to_string()))?;

        Ok(cfg)
    }

    pub fn validate(&self) -> NotifierResult<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(NotifierError::Config(
                "auth.jwt_secret must be set".to_string(),
            ));
        }
        if self.broker.url.is_empty() {
            return Err(NotifierError::Config(
                "broker.url must be set".to_string(),
            ));
        }
        if self.broker.poll_timeout == Duration::from_secs(0) {
            return Err(NotifierError::Config(
                "broker.poll_timeout must be greater than 0".to_string(),
            ));
        }
        if self.auth.handshake_timeout == Duration::from_secs(0) {
            return Err(NotifierError::Config(
                "auth.handshake_timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
