use crate::error::{EditError, Result};
use std::env;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 20;
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;
pub const DEFAULT_MAX_SESSIONS: u64 = 10_000;

/// How the encoder treats an image resource that cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EncodePolicy {
    /// Fail with a `ReadError`.
    #[default]
    Strict,
    /// Encode as an empty payload and let the remote service reject it.
    Lenient,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model_id: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub encode_policy: EncodePolicy,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: Option<u16>,
    pub max_upload_mb: usize,
    pub session_idle_secs: u64,
    pub max_sessions: u64,
    pub gemini: Option<GeminiConfig>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        GeminiConfig {
            api_key: None,
            model_id: None,
            base_url: None,
            timeout: None,
            encode_policy: EncodePolicy::Strict,
        }
    }
}

impl GeminiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `GEMINI_API_KEY` (falling back to `API_KEY`), `GEMINI_MODEL`,
    /// `GEMINI_BASE_URL`, `GEMINI_TIMEOUT_SECS` and `LENIENT_READ`.
    pub fn from_env() -> Self {
        let api_key = first_non_blank(&["GEMINI_API_KEY", "API_KEY"]);
        let model_id = env::var("GEMINI_MODEL").ok();
        let base_url = env::var("GEMINI_BASE_URL").ok();
        let timeout = env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs);
        let encode_policy = if env::var("LENIENT_READ").map_or(false, |val| val == "true") {
            EncodePolicy::Lenient
        } else {
            EncodePolicy::Strict
        };

        GeminiConfig {
            api_key,
            model_id,
            base_url,
            timeout,
            encode_policy,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_encode_policy(mut self, policy: EncodePolicy) -> Self {
        self.encode_policy = policy;
        self
    }

    /// The credential is mandatory; without it nothing may start.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                EditError::ConfigError(
                    "GEMINI_API_KEY (or API_KEY) environment variable not set".into(),
                )
            })
    }

    pub fn model(&self) -> &str {
        self.model_id.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }
}

/// First variable that is set to something other than whitespace.
fn first_non_blank(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: None,
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
            session_idle_secs: DEFAULT_SESSION_IDLE_SECS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            gemini: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let port = env::var("PORT").ok().and_then(|port| port.parse().ok());
        let max_upload_mb = env::var("MAX_UPLOAD_MB")
            .ok()
            .and_then(|mb| mb.parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_MB);
        let session_idle_secs = env::var("SESSION_IDLE_SECS")
            .ok()
            .and_then(|secs| secs.parse().ok())
            .unwrap_or(DEFAULT_SESSION_IDLE_SECS);
        let max_sessions = env::var("MAX_SESSIONS")
            .ok()
            .and_then(|n| n.parse().ok())
            .unwrap_or(DEFAULT_MAX_SESSIONS);

        Config {
            port,
            max_upload_mb,
            session_idle_secs,
            max_sessions,
            gemini: Some(GeminiConfig::from_env()),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_max_upload_mb(mut self, max_upload_mb: usize) -> Self {
        self.max_upload_mb = max_upload_mb;
        self
    }

    pub fn with_session_limits(mut self, idle_secs: u64, max_sessions: u64) -> Self {
        self.session_idle_secs = idle_secs;
        self.max_sessions = max_sessions;
        self
    }

    pub fn with_gemini(mut self, config: GeminiConfig) -> Self {
        self.gemini = Some(config);
        self
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }

    /// How long a named session may sit unused before it is evicted.
    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_is_config_error() {
        let config = GeminiConfig::new();
        assert!(matches!(
            config.require_api_key(),
            Err(EditError::ConfigError(_))
        ));

        let blank = GeminiConfig::new().with_api_key("   ");
        assert!(blank.require_api_key().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = GeminiConfig::new().with_api_key("k");
        assert_eq!(config.require_api_key().unwrap(), "k");
        assert_eq!(config.model(), DEFAULT_MODEL);
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.encode_policy, EncodePolicy::Strict);
        assert!(config.timeout.is_none());

        let server = Config::new();
        assert_eq!(server.port(), DEFAULT_PORT);
        assert_eq!(server.max_upload_bytes(), 20 * 1024 * 1024);
        assert_eq!(server.session_idle(), Duration::from_secs(1800));
        assert_eq!(server.max_sessions, DEFAULT_MAX_SESSIONS);
    }

    #[test]
    fn test_blank_primary_key_falls_back() {
        env::set_var("RGENEDIT_TEST_PRIMARY_KEY", "  ");
        env::set_var("RGENEDIT_TEST_FALLBACK_KEY", "fallback-key");
        assert_eq!(
            first_non_blank(&["RGENEDIT_TEST_PRIMARY_KEY", "RGENEDIT_TEST_FALLBACK_KEY"]).as_deref(),
            Some("fallback-key")
        );
        assert!(first_non_blank(&["RGENEDIT_TEST_PRIMARY_KEY", "RGENEDIT_TEST_UNSET_KEY"]).is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = GeminiConfig::new().with_base_url("http://localhost:9999/v1beta/");
        assert_eq!(config.base_url(), "http://localhost:9999/v1beta");
    }
}
