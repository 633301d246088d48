//! Configuration file parser for `feedgate.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings, since they are
//! usually typos. The API key may also come from `FEEDGATE_API_KEY`, which
//! takes precedence over the file.
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "FEEDGATE_API_KEY";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Size ceilings and timeouts applied to every outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Largest HTML page accepted, in bytes.
    pub max_html_bytes: usize,
    /// Largest feed or proxied body accepted, in bytes.
    pub max_feed_bytes: usize,
    /// Timeout for `/fetch` and `/parse` when the caller sends none.
    pub default_timeout_ms: u64,
    /// Total budget for `/discover` when the caller sends none.
    pub discover_timeout_ms: u64,
    /// Hard ceiling for any caller-supplied timeout.
    pub max_timeout_ms: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_html_bytes: 5 * 1024 * 1024,
            max_feed_bytes: 10 * 1024 * 1024,
            default_timeout_ms: 10_000,
            discover_timeout_ms: 15_000,
            max_timeout_ms: 30_000,
        }
    }
}

impl Limits {
    /// Caller timeout clamped to `max_timeout_ms`. Missing or zero values
    /// use `default_ms`.
    pub fn clamp_timeout(&self, requested_ms: Option<u64>, default_ms: u64) -> Duration {
        let ms = requested_ms
            .filter(|&ms| ms > 0)
            .unwrap_or(default_ms)
            .min(self.max_timeout_ms);
        Duration::from_millis(ms)
    }
}

/// Top-level proxy configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// The custom Debug impl masks `api_key`.
#[derive(Deserialize)]
#[serde(default)]
pub struct Config {
    /// Socket address the server listens on.
    pub bind: String,

    /// Name reported by `/health`.
    pub provider: String,

    /// `User-Agent` sent on outbound requests.
    pub user_agent: String,

    /// Shared secret required from callers. `None` disables authentication.
    #[serde(deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,

    /// Origins allowed by CORS. Empty allows any origin.
    pub cors_origins: Vec<String>,

    /// Hostnames refused in addition to the built-in block-list.
    pub blocked_hosts: Vec<String>,

    pub limits: Limits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            provider: "feedgate".to_string(),
            user_agent: format!("feedgate/{}", env!("CARGO_PKG_VERSION")),
            api_key: None,
            cors_origins: Vec::new(),
            blocked_hosts: Vec::new(),
            limits: Limits::default(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind", &self.bind)
            .field("provider", &self.provider)
            .field("user_agent", &self.user_agent)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("cors_origins", &self.cors_origins)
            .field("blocked_hosts", &self.blocked_hosts)
            .field("limits", &self.limits)
            .finish()
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from))
}

const KNOWN_KEYS: &[&str] = &[
    "bind",
    "provider",
    "user_agent",
    "api_key",
    "cors_origins",
    "blocked_hosts",
    "limits",
];

const KNOWN_LIMIT_KEYS: &[&str] = &[
    "max_html_bytes",
    "max_feed_bytes",
    "default_timeout_ms",
    "discover_timeout_ms",
    "max_timeout_ms",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Zero limits → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(path = %path.display(), bind = %config.bind, "Loaded configuration");
        Ok(config)
    }

    /// Replaces the file's API key with `env_value` when it is set and
    /// non-blank.
    pub fn with_api_key_override(mut self, env_value: Option<String>) -> Self {
        if let Some(key) = env_value.filter(|v| !v.trim().is_empty()) {
            tracing::debug!("API key taken from {}", API_KEY_ENV);
            self.api_key = Some(SecretString::from(key));
        }
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.limits;
        let zero = [
            ("max_html_bytes", limits.max_html_bytes as u64),
            ("max_feed_bytes", limits.max_feed_bytes as u64),
            ("default_timeout_ms", limits.default_timeout_ms),
            ("discover_timeout_ms", limits.discover_timeout_ms),
            ("max_timeout_ms", limits.max_timeout_ms),
        ]
        .into_iter()
        .find(|(_, v)| *v == 0);

        match zero {
            Some((key, _)) => Err(ConfigError::Invalid(format!(
                "limits.{key} must be greater than zero"
            ))),
            None => Ok(()),
        }
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    for key in raw.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
        }
    }
    if let Some(toml::Value::Table(limits)) = raw.get("limits") {
        for key in limits.keys() {
            if !KNOWN_LIMIT_KEYS.contains(&key.as_str()) {
                tracing::warn!(key = %format!("limits.{key}"), "Unknown key in config file, ignoring");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("feedgate_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("feedgate.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bind, "127.0.0.1:8787");
        assert_eq!(config.provider, "feedgate");
        assert!(config.user_agent.starts_with("feedgate/"));
        assert!(config.api_key.is_none());
        assert!(config.cors_origins.is_empty());
        assert!(config.blocked_hosts.is_empty());
        assert_eq!(config.limits.max_html_bytes, 5 * 1024 * 1024);
        assert_eq!(config.limits.max_feed_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feedgate_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.provider, "feedgate");
    }

    #[test]
    fn test_empty_file_returns_default() {
        let path = write_config("empty", "   \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.bind, "127.0.0.1:8787");
        cleanup(&path);
    }

    #[test]
    fn test_partial_limits_use_defaults_for_missing() {
        let path = write_config(
            "partial",
            "provider = \"my-proxy\"\n[limits]\nmax_timeout_ms = 5000\n",
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.provider, "my-proxy");
        assert_eq!(config.limits.max_timeout_ms, 5000);
        assert_eq!(config.limits.discover_timeout_ms, 15_000);
        cleanup(&path);
    }

    #[test]
    fn test_full_config() {
        let content = r#"
bind = "0.0.0.0:9000"
provider = "reader-proxy"
user_agent = "ReaderBot/1.0"
api_key = "test-key-123"
cors_origins = ["https://reader.example.com"]
blocked_hosts = ["intranet.corp"]

[limits]
max_html_bytes = 1000
max_feed_bytes = 2000
default_timeout_ms = 3000
discover_timeout_ms = 4000
max_timeout_ms = 5000
"#;
        let path = write_config("full", content);
        let config = Config::load(&path).unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.user_agent, "ReaderBot/1.0");
        assert_eq!(
            config.api_key.as_ref().map(|k| k.expose_secret().to_owned()),
            Some("test-key-123".to_owned())
        );
        assert_eq!(config.cors_origins, vec!["https://reader.example.com"]);
        assert_eq!(config.blocked_hosts, vec!["intranet.corp"]);
        assert_eq!(
            config.limits,
            Limits {
                max_html_bytes: 1000,
                max_feed_bytes: 2000,
                default_timeout_ms: 3000,
                discover_timeout_ms: 4000,
                max_timeout_ms: 5000,
            }
        );
        cleanup(&path);
    }

    #[test]
    fn test_blank_api_key_is_none() {
        let path = write_config("blank_key", "api_key = \"  \"\n");
        assert!(Config::load(&path).unwrap().api_key.is_none());
        cleanup(&path);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        cleanup(&path);
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let path = write_config(
            "unknown",
            "provider = \"x\"\ntotally_fake_key = 1\n[limits]\nmax_bogus = 3\n",
        );
        assert_eq!(Config::load(&path).unwrap().provider, "x");
        cleanup(&path);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let path = write_config("wrongtype", "cors_origins = \"https://a.com\"\n");
        assert!(Config::load(&path).is_err());
        cleanup(&path);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let path = write_config("zero", "[limits]\nmax_feed_bytes = 0\n");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("max_feed_bytes"));
        cleanup(&path);
    }

    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        cleanup(&path);
    }

    #[test]
    fn test_env_key_takes_precedence() {
        let path = write_config("env_override", "api_key = \"from-file\"\n");
        let config = Config::load(&path)
            .unwrap()
            .with_api_key_override(Some("from-env".into()));
        assert_eq!(
            config.api_key.as_ref().map(|k| k.expose_secret().to_owned()),
            Some("from-env".to_owned())
        );

        let config = Config::load(&path).unwrap().with_api_key_override(None);
        assert_eq!(
            config.api_key.as_ref().map(|k| k.expose_secret().to_owned()),
            Some("from-file".to_owned())
        );
        cleanup(&path);
    }

    #[test]
    fn test_debug_masks_api_key() {
        let config = Config::default().with_api_key_override(Some("super-secret-key-12345".into()));
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-key-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_clamp_timeout() {
        let limits = Limits::default();
        assert_eq!(
            limits.clamp_timeout(None, limits.discover_timeout_ms),
            Duration::from_millis(15_000)
        );
        assert_eq!(
            limits.clamp_timeout(Some(2_000), limits.default_timeout_ms),
            Duration::from_millis(2_000)
        );
        assert_eq!(
            limits.clamp_timeout(Some(120_000), limits.default_timeout_ms),
            Duration::from_millis(30_000)
        );
        assert_eq!(
            limits.clamp_timeout(Some(0), limits.default_timeout_ms),
            Duration::from_millis(10_000)
        );
    }
}
