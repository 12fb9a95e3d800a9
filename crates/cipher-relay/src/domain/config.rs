//! Relay configuration with validation.
//!
//! Defaults match the single-process deployment: port 5000 on all interfaces,
//! shift 3 over letters and digits, ten log records, immediate answers.

use crate::domain::cipher::{Alphabet, ShiftCipher};
use crate::domain::message_log::DEFAULT_LOG_CAPACITY;
use crate::domain::types::{ResponsePolicy, DEFAULT_RESPONSE_OPTION};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Main relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// Cipher used to decode submissions
    pub cipher: CipherConfig,
    /// Message log configuration
    pub log: LogConfig,
    /// How submissions are answered
    pub policy: ResponsePolicy,
    /// Pending registry configuration (redirect policy)
    pub pending: PendingConfig,
    /// Session store configuration (session policy)
    pub session: SessionConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// Request limits
    pub limits: LimitsConfig,
    /// Initial response option
    pub default_response_option: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            cipher: CipherConfig::default(),
            log: LogConfig::default(),
            policy: ResponsePolicy::default(),
            pending: PendingConfig::default(),
            session: SessionConfig::default(),
            cors: CorsConfig::default(),
            limits: LimitsConfig::default(),
            default_response_option: DEFAULT_RESPONSE_OPTION.to_string(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from the environment.
    ///
    /// `RELAY_CONFIG` names an optional JSON file used as the base; the
    /// remaining variables override individual fields.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("RELAY_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        let config = serde_json::from_str(&text)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Apply variable overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("APP_PORT") {
            self.http.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("APP_PORT", port.clone()))?;
        }
        if let Some(host) = lookup("RELAY_HOST") {
            self.http.host = host
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("RELAY_HOST", host.clone()))?;
        }
        if let Some(policy) = lookup("RELAY_POLICY") {
            self.policy = policy
                .parse()
                .map_err(|_| ConfigError::InvalidValue("RELAY_POLICY", policy.clone()))?;
        }
        if let Some(shift) = lookup("RELAY_CIPHER_SHIFT") {
            self.cipher.shift = shift
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("RELAY_CIPHER_SHIFT", shift.clone()))?;
        }
        if let Some(flag) = lookup("RELAY_ROTATE_DIGITS") {
            self.cipher.rotate_digits = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(ConfigError::InvalidValue("RELAY_ROTATE_DIGITS", flag)),
            };
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log.capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "log capacity cannot be 0".into(),
            ));
        }

        if self.pending.max_entries == 0 {
            return Err(ConfigError::InvalidLimit(
                "pending max_entries cannot be 0".into(),
            ));
        }

        if self.session.max_entries == 0 {
            return Err(ConfigError::InvalidLimit(
                "session max_entries cannot be 0".into(),
            ));
        }

        if self.limits.max_request_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_request_size cannot be 0".into(),
            ));
        }

        for (name, value) in [
            ("pending ttl", self.pending.ttl),
            ("pending cleanup_interval", self.pending.cleanup_interval),
            ("pending wait_timeout", self.pending.wait_timeout),
            ("session ttl", self.session.ttl),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidTimeout(format!("{} cannot be 0", name)));
            }
        }

        if self.session.cookie_name.is_empty()
            || !self
                .session
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::Invalid(format!(
                "invalid session cookie name: {:?}",
                self.session.cookie_name
            )));
        }

        if self.cipher.shift % 26 == 0 {
            warn!(shift = self.cipher.shift, "Cipher shift leaves letters unchanged");
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 5000)
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5000,
        }
    }
}

/// Cipher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CipherConfig {
    /// Positions to shift back when decoding
    pub shift: i32,
    /// Rotate digits as well as letters
    pub rotate_digits: bool,
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            shift: 3,
            rotate_digits: true,
        }
    }
}

impl CipherConfig {
    pub fn to_cipher(&self) -> ShiftCipher {
        let alphabet = if self.rotate_digits {
            Alphabet::LettersAndDigits
        } else {
            Alphabet::Letters
        };
        ShiftCipher::new(self.shift, alphabet)
    }
}

/// Message log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Records kept before the oldest is evicted
    pub capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

/// Pending registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingConfig {
    /// How long an unanswered submission is kept
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Hard cap on parked submissions
    pub max_entries: usize,
    /// Interval of the expiry sweep
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// How long `GET /pending/:id` waits before answering "pending"
    #[serde(with = "humantime_serde")]
    pub wait_timeout: Duration,
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            max_entries: 1024,
            cleanup_interval: Duration::from_secs(10),
            wait_timeout: Duration::from_secs(30),
        }
    }
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a session is forgotten
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Name of the session cookie
    pub cookie_name: String,
    /// Hard cap on live sessions
    pub max_entries: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            cookie_name: "relay_session".to_string(),
            max_entries: 10_000,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    /// Allowed methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers ("*" for all)
    pub allowed_headers: Vec<String>,
    /// Max age for preflight cache, in seconds
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()],
            allowed_headers: vec!["*".to_string()],
            max_age: 86400, // 24 hours
        }
    }
}

/// Request limits configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Max request body size in bytes (default: 64KB)
    pub max_request_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_size: 64 * 1024,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config: {0}")]
    Read(String),
    /// Config file is not valid JSON for this schema
    #[error("cannot parse config: {0}")]
    Parse(String),
    /// Environment variable has an unusable value
    #[error("invalid value for {0}: {1:?}")]
    InvalidValue(&'static str, String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Duration serialization as "30s", "500ms", "10m" or plain seconds
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
