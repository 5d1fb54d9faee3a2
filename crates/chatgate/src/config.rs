use std::fmt::Display;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;
use url::Url;

use chatgate_types::Provider;

// ============================================================================
// Config (root)
// ============================================================================

/// Gateway configuration.
///
/// Built once at startup from defaults, an optional YAML file and the
/// environment, then shared read-only.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
}

impl Config {
    /// Load from a YAML file. A missing file yields the defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("API_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("API_PORT") {
            self.server.port = parse_var("API_PORT", v)?;
        }
        if let Some(v) = lookup("API_PREFIX") {
            self.server.api_prefix = v;
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT_SECONDS") {
            self.server.request_timeout_seconds = parse_var("REQUEST_TIMEOUT_SECONDS", v)?;
        }
        if let Some(v) = lookup("IDLE_TIMEOUT_SECONDS") {
            self.server.idle_timeout_seconds = parse_var("IDLE_TIMEOUT_SECONDS", v)?;
        }
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.providers.openai.api_key = Some(v).filter(|k| !k.is_empty());
        }
        if let Some(v) = lookup("OPENAI_API_BASE") {
            self.providers.openai.base_url = v;
        }
        if let Some(v) = lookup("OLLAMA_API_BASE") {
            self.providers.ollama.base_url = v;
        }
        if let Some(v) = lookup("DEFAULT_MODEL") {
            self.providers.default_model = v;
        }
        if let Some(v) = lookup("DEFAULT_PROVIDER") {
            self.providers.default_provider = parse_var("DEFAULT_PROVIDER", v)?;
        }
        if let Some(v) = lookup("STREAM_PACING_MS") {
            self.streaming.pacing_millis = parse_var("STREAM_PACING_MS", v)?;
        }
        Ok(())
    }

    /// Check and normalize the final values.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.providers.openai.base_url =
            check_base_url("OPENAI_API_BASE", &self.providers.openai.base_url)?;
        self.providers.ollama.base_url =
            check_base_url("OLLAMA_API_BASE", &self.providers.ollama.base_url)?;

        let prefix = self.server.api_prefix.trim_matches('/');
        self.server.api_prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("/{prefix}")
        };

        if self.server.keep_alive_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "keep_alive_interval_seconds".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if self.providers.default_model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "DEFAULT_MODEL".to_string(),
                value: self.providers.default_model,
                reason: "must not be empty".to_string(),
            });
        }

        Ok(self)
    }
}

fn parse_var<T>(key: &str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match value.trim().parse() {
        Ok(parsed) => Ok(parsed),
        Err(e) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
            value,
        }),
    }
}

fn check_base_url(key: &str, value: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    };

    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }

    Ok(value.trim_end_matches('/').to_string())
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Longest silence tolerated between two chunks of a provider stream.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_prefix: default_api_prefix(),
            request_timeout_seconds: default_request_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
            keep_alive_interval_seconds: default_keep_alive_interval(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_seconds)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}

fn default_request_timeout() -> u64 {
    300
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_keep_alive_interval() -> u64 {
    15
}

// ============================================================================
// ProvidersConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_provider")]
    pub default_provider: Provider,
    /// Model used when a request does not name one.
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default)]
    pub openai: OpenAIConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            default_model: default_model(),
            openai: OpenAIConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

fn default_provider() -> Provider {
    Provider::OpenAI
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

#[derive(Clone, Deserialize)]
pub struct OpenAIConfig {
    /// Bearer credential. Requests are sent unauthenticated when unset.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
        }
    }
}

// Keeps the credential out of logs.
impl std::fmt::Debug for OpenAIConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
        }
    }
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

// ============================================================================
// StreamingConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct StreamingConfig {
    /// Delay between two pushed chunks. Zero disables pacing.
    #[serde(default = "default_pacing_millis")]
    pub pacing_millis: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            pacing_millis: default_pacing_millis(),
        }
    }
}

impl StreamingConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_millis)
    }
}

fn default_pacing_millis() -> u64 {
    10
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("invalid value for {key} ('{value}'): {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid url for {key} ('{value}'): {reason}")]
    InvalidUrl {
        key: String,
        value: String,
        reason: String,
    },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.api_prefix, "/api/v1");
        assert_eq!(config.server.request_timeout_seconds, 300);
        assert_eq!(config.server.idle_timeout_seconds, 60);
        assert_eq!(config.providers.default_provider, Provider::OpenAI);
        assert_eq!(config.providers.default_model, "gpt-3.5-turbo");
        assert_eq!(config.providers.openai.api_key, None);
        assert_eq!(config.providers.openai.base_url, "https://api.openai.com/v1");
        assert_eq!(config.providers.ollama.base_url, "http://localhost:11434");
        assert_eq!(config.streaming.pacing(), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_defaults() {
        let tmp_dir = TempDir::new().unwrap();
        let missing_path = tmp_dir.path().join("missing-config.yaml");
        let config = Config::load(&missing_path).await.unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.providers.default_provider, Provider::OpenAI);
    }

    #[tokio::test]
    async fn test_load_valid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server:
  host: "127.0.0.1"
  port: 3000
  api_prefix: "/gateway"
providers:
  default_provider: ollama
  default_model: llama3.2
  ollama:
    base_url: "http://gpu-box:11434"
streaming:
  pacing_millis: 0
"#
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.api_prefix, "/gateway");
        assert_eq!(config.server.idle_timeout_seconds, 60); // default
        assert_eq!(config.providers.default_provider, Provider::Ollama);
        assert_eq!(config.providers.default_model, "llama3.2");
        assert_eq!(config.providers.ollama.base_url, "http://gpu-box:11434");
        assert_eq!(config.providers.openai.base_url, "https://api.openai.com/v1"); // default
        assert!(config.streaming.pacing().is_zero());
    }

    #[tokio::test]
    async fn test_load_unknown_provider_fails() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "providers:\n  default_provider: bard").unwrap();

        let result = Config::load(file.path()).await;
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[tokio::test]
    async fn test_load_invalid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(file.path()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                ("API_HOST", "127.0.0.1"),
                ("API_PORT", "9000"),
                ("API_PREFIX", "/v2"),
                ("OPENAI_API_KEY", "sk-test"),
                ("OPENAI_API_BASE", "https://proxy.example.com/v1/"),
                ("OLLAMA_API_BASE", "http://127.0.0.1:11434"),
                ("DEFAULT_MODEL", "llama3.2"),
                ("DEFAULT_PROVIDER", "ollama"),
                ("STREAM_PACING_MS", "25"),
            ]))
            .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.api_prefix, "/v2");
        assert_eq!(config.providers.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.providers.default_model, "llama3.2");
        assert_eq!(config.providers.default_provider, Provider::Ollama);
        assert_eq!(config.streaming.pacing_millis, 25);

        let config = config.validated().unwrap();
        assert_eq!(
            config.providers.openai.base_url,
            "https://proxy.example.com/v1"
        );
    }

    #[test]
    fn test_empty_api_key_means_unauthenticated() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[("OPENAI_API_KEY", "")]))
            .unwrap();
        assert_eq!(config.providers.openai.api_key, None);
    }

    #[test]
    fn test_env_invalid_port() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(env(&[("API_PORT", "eighty")]))
            .unwrap_err();
        assert!(err.to_string().contains("API_PORT"));
    }

    #[test]
    fn test_env_unknown_default_provider() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(env(&[("DEFAULT_PROVIDER", "bard")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "DEFAULT_PROVIDER"));
    }

    #[test]
    fn test_validated_rejects_bad_urls() {
        let mut config = Config::default();
        config.providers.ollama.base_url = "localhost:11434".to_string();
        assert!(matches!(
            config.validated(),
            Err(ConfigError::InvalidUrl { .. })
        ));

        let mut config = Config::default();
        config.providers.openai.base_url = "ftp://example.com".to_string();
        assert!(matches!(
            config.validated(),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_validated_normalizes_prefix() {
        let mut config = Config::default();
        config.server.api_prefix = "api/v1/".to_string();
        assert_eq!(config.validated().unwrap().server.api_prefix, "/api/v1");

        let mut config = Config::default();
        config.server.api_prefix = "/".to_string();
        assert_eq!(config.validated().unwrap().server.api_prefix, "");
    }

    #[test]
    fn test_validated_rejects_zero_keep_alive() {
        let mut config = Config::default();
        config.server.keep_alive_interval_seconds = 0;
        assert!(matches!(
            config.validated(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "keep_alive_interval_seconds"
        ));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = OpenAIConfig {
            api_key: Some("sk-secret".to_string()),
            base_url: default_openai_base_url(),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_config_error_display() {
        let io_error = ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "test",
        ));
        assert!(io_error.to_string().contains("failed to read config file"));
    }
}
