//! Configuration parsing and validation for chatrelay.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Conventional environment variable holding the upstream API key.
pub const API_KEY_ENV: &str = "CHATRELAY_API_KEY";
/// Provider-specific fallback for the API key.
pub const DASHSCOPE_API_KEY_ENV: &str = "DASHSCOPE_API_KEY";
/// Overrides `upstream.base_url`.
pub const API_BASE_ENV: &str = "CHATRELAY_API_BASE";
/// Overrides `upstream.model`.
pub const MODEL_ENV: &str = "CHATRELAY_MODEL";
/// Overrides `server.listen`.
pub const LISTEN_ENV: &str = "CHATRELAY_LISTEN";

/// Root configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:8000")
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Attach a permissive CORS layer to every route
    #[serde(default = "default_true")]
    pub cors: bool,
}

fn default_listen() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            cors: true,
        }
    }
}

/// Upstream chat-completion provider.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the OpenAI-compatible API, without `/chat/completions`
    pub base_url: String,
    /// Bearer credential; absence is only reported when a call is made
    pub api_key: Option<ApiKey>,
    /// Model used when the request does not name one
    pub model: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string()
}

fn default_model() -> String {
    "qwen-turbo".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Outbound SSE relay settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Delay between successive relayed events in milliseconds; 0 disables pacing
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

fn default_pacing_ms() -> u64 {
    10
}

impl StreamConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Upstream bearer credential.
///
/// Debug output is masked, so a `Config` can be logged whole. The raw value
/// is only reachable through [`ApiKey::expose_secret`].
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for ApiKey {
    fn from(key: String) -> Self {
        ApiKey(SecretString::from(key))
    }
}

impl From<&str> for ApiKey {
    fn from(key: &str) -> Self {
        ApiKey(SecretString::from(key))
    }
}

/// How the upstream API key was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// Key was a literal string in the config file
    Literal,
    /// Key contained ${VAR} references expanded from environment
    EnvExpanded,
    /// Key was read from a conventional env var (holds var name)
    Environment(String),
    /// No key available
    None,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Literal => write!(f, "config-literal"),
            KeySource::EnvExpanded => write!(f, "env-expanded"),
            KeySource::Environment(var) => write!(f, "environment ({})", var),
            KeySource::None => write!(f, "none"),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Cannot expand {field}: {message}")]
    EnvVar {
        var: String,
        field: String,
        message: String,
    },
}

/// Raw upstream section as written in TOML.
/// `api_key` and `base_url` may contain `${VAR}` references not yet expanded.
#[derive(Default, Deserialize)]
pub struct RawUpstreamConfig {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
}

/// Raw configuration deserialized directly from TOML.
#[derive(Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    upstream: RawUpstreamConfig,
    #[serde(default)]
    stream: StreamConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

/// Substitute every `${NAME}` in `value` with `lookup(NAME)`.
///
/// `field` names the config key in errors. A `$` that does not open a
/// `${...}` reference is kept as written.
fn expand_env_vars_with<F>(value: &str, field: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env_error = |var: &str, message: String| ConfigError::EnvVar {
        var: var.to_string(),
        field: field.to_string(),
        message,
    };

    let mut expanded = String::with_capacity(value.len());
    let mut remaining = value;
    while let Some((literal, reference)) = remaining.split_once("${") {
        expanded.push_str(literal);

        let (name, tail) = reference
            .split_once('}')
            .ok_or_else(|| env_error(reference, format!("unclosed '${{' in {:?}", value)))?;
        if name.is_empty() {
            return Err(env_error(name, "empty variable name in '${}'".to_string()));
        }
        let resolved = lookup(name).ok_or_else(|| {
            env_error(name, format!("environment variable '{}' is not set", name))
        })?;

        expanded.push_str(&resolved);
        remaining = tail;
    }
    expanded.push_str(remaining);
    Ok(expanded)
}

impl Config {
    /// Convert raw (deserialized) config to the final config.
    ///
    /// Expands `${VAR}` references, falls back to the conventional key
    /// variables when no `api_key` is written, then applies the
    /// `CHATRELAY_*` overrides. All environment access goes through `lookup`.
    pub fn from_raw_with<F>(raw: RawConfig, lookup: F) -> Result<(Self, KeySource), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (api_key, key_source) = match raw.upstream.api_key {
            Some(ref raw_key) if raw_key.contains("${") => {
                let expanded = expand_env_vars_with(raw_key, "upstream.api_key", &lookup)?;
                (Some(ApiKey::from(expanded)), KeySource::EnvExpanded)
            }
            Some(ref raw_key) => (Some(ApiKey::from(raw_key.as_str())), KeySource::Literal),
            None => [API_KEY_ENV, DASHSCOPE_API_KEY_ENV]
                .into_iter()
                .find_map(|var| {
                    lookup(var)
                        .filter(|v| !v.is_empty())
                        .map(|v| (Some(ApiKey::from(v)), KeySource::Environment(var.to_string())))
                })
                .unwrap_or((None, KeySource::None)),
        };

        let base_url = match lookup(API_BASE_ENV) {
            Some(url) => url,
            None => match raw.upstream.base_url {
                Some(ref url) => expand_env_vars_with(url, "upstream.base_url", &lookup)?,
                None => default_base_url(),
            },
        };

        let model = lookup(MODEL_ENV)
            .or(raw.upstream.model)
            .unwrap_or_else(default_model);

        let mut server = raw.server;
        if let Some(listen) = lookup(LISTEN_ENV) {
            server.listen = listen;
        }

        let config = Config {
            server,
            upstream: UpstreamConfig {
                base_url,
                api_key,
                model,
                timeout_secs: raw.upstream.timeout_secs.unwrap_or_else(default_timeout_secs),
                connect_timeout_secs: raw
                    .upstream
                    .connect_timeout_secs
                    .unwrap_or_else(default_connect_timeout_secs),
            },
            stream: raw.stream,
            logging: raw.logging,
        };
        config.validate()?;

        Ok((config, key_source))
    }

    /// Parse configuration from a TOML string, resolving against the process environment.
    pub fn parse_str(content: &str) -> Result<(Self, KeySource), ConfigError> {
        let raw: RawConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
        Self::from_raw_with(raw, |name| std::env::var(name).ok())
    }

    /// Load configuration from a TOML file with environment variable expansion.
    pub fn from_file(path: impl AsRef<Path>) -> Result<(Self, KeySource), ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str(&content)
    }

    /// Load from `path` if given, otherwise build from defaults and the environment alone.
    pub fn load(path: Option<&str>) -> Result<(Self, KeySource), ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::from_raw_with(RawConfig::default(), |name| std::env::var(name).ok()),
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "upstream.base_url must not be empty".to_string(),
            ));
        }
        if self.upstream.model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "upstream.model must not be empty".to_string(),
            ));
        }
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn parse_with<F>(toml: &str, lookup: F) -> Result<(Config, KeySource), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = toml::from_str(toml).unwrap();
        Config::from_raw_with(raw, lookup)
    }

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let (config, source) = parse_with("", no_env).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:8000");
        assert!(config.server.cors);
        assert_eq!(
            config.upstream.base_url,
            "https://dashscope.aliyuncs.com/compatible-mode/v1"
        );
        assert_eq!(config.upstream.model, "qwen-turbo");
        assert_eq!(config.upstream.timeout_secs, 120);
        assert_eq!(config.stream.pacing_ms, 10);
        assert!(config.upstream.api_key.is_none());
        assert_eq!(source, KeySource::None);
        assert!(config.upstream.api_key.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [server]
            listen = "127.0.0.1:9000"
            cors = false

            [upstream]
            base_url = "https://example.com/v1"
            api_key = "sk-literal"
            model = "qwen-max"
            timeout_secs = 30
            connect_timeout_secs = 2

            [stream]
            pacing_ms = 0

            [logging]
            level = "debug"
        "#;

        let (config, source) = parse_with(toml, no_env).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert!(!config.server.cors);
        assert_eq!(config.upstream.base_url, "https://example.com/v1");
        assert_eq!(config.upstream.model, "qwen-max");
        assert_eq!(config.upstream.timeout(), Duration::from_secs(30));
        assert_eq!(config.upstream.connect_timeout(), Duration::from_secs(2));
        assert_eq!(config.stream.pacing(), Duration::ZERO);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(source, KeySource::Literal);
        assert_eq!(
            config.upstream.api_key.as_ref().unwrap().expose_secret(),
            "sk-literal"
        );
    }

    #[test]
    fn test_api_key_masked_in_debug() {
        let (config, _) = parse_with("[upstream]\napi_key = \"sk-dashscope-7f3a\"", no_env).unwrap();
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("sk-dashscope-7f3a"));
        assert_eq!(
            config.upstream.api_key.unwrap().expose_secret(),
            "sk-dashscope-7f3a"
        );
    }

    fn vars(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name: &str| {
            pairs
                .iter()
                .find(|(var, _)| *var == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn test_expand_substitutes_each_reference() {
        let lookup = vars(&[
            ("DASHSCOPE_HOST", "dashscope.aliyuncs.com"),
            ("DASHSCOPE_MODE", "compatible-mode"),
        ]);
        let url = expand_env_vars_with(
            "https://${DASHSCOPE_HOST}/${DASHSCOPE_MODE}/v1",
            "upstream.base_url",
            &lookup,
        )
        .unwrap();
        assert_eq!(url, "https://dashscope.aliyuncs.com/compatible-mode/v1");
    }

    #[test]
    fn test_expand_keeps_plain_values() {
        for value in ["sk-plain", "$QWEN_KEY", "cost: $5"] {
            assert_eq!(
                expand_env_vars_with(value, "upstream.api_key", no_env).unwrap(),
                value
            );
        }
    }

    #[test]
    fn test_expand_reports_bad_references() {
        for (value, needle) in [
            ("${QWEN_KEY}", "QWEN_KEY"),
            ("${QWEN_KEY", "unclosed"),
            ("${}", "empty"),
        ] {
            let message = expand_env_vars_with(value, "upstream.api_key", no_env)
                .unwrap_err()
                .to_string();
            assert!(message.contains(needle), "{}: {}", value, message);
            assert!(message.contains("upstream.api_key"), "{}: {}", value, message);
        }
    }

    // ── Key resolution and overrides ──

    #[test]
    fn test_env_expanded_key() {
        let toml = r#"
            [upstream]
            api_key = "${PROVIDER_SECRET}"
        "#;
        let lookup = |name: &str| match name {
            "PROVIDER_SECRET" => Some("sk-expanded".to_string()),
            _ => None,
        };
        let (config, source) = parse_with(toml, lookup).unwrap();
        assert_eq!(source, KeySource::EnvExpanded);
        assert_eq!(
            config.upstream.api_key.unwrap().expose_secret(),
            "sk-expanded"
        );
    }

    #[test]
    fn test_missing_expanded_key_fails() {
        let toml = r#"
            [upstream]
            api_key = "${NOT_THERE}"
        "#;
        let err = parse_with(toml, no_env).unwrap_err().to_string();
        assert!(err.contains("NOT_THERE"));
    }

    #[test]
    fn test_conventional_key_variable() {
        let lookup = |name: &str| match name {
            API_KEY_ENV => Some("sk-convention".to_string()),
            DASHSCOPE_API_KEY_ENV => Some("sk-dashscope".to_string()),
            _ => None,
        };
        let (config, source) = parse_with("", lookup).unwrap();
        assert_eq!(source, KeySource::Environment(API_KEY_ENV.to_string()));
        assert_eq!(
            config.upstream.api_key.unwrap().expose_secret(),
            "sk-convention"
        );
    }

    #[test]
    fn test_dashscope_key_fallback() {
        let lookup = |name: &str| match name {
            DASHSCOPE_API_KEY_ENV => Some("sk-dashscope".to_string()),
            _ => None,
        };
        let (config, source) = parse_with("", lookup).unwrap();
        assert_eq!(
            source,
            KeySource::Environment(DASHSCOPE_API_KEY_ENV.to_string())
        );
        assert!(config.upstream.api_key.is_some());
    }

    #[test]
    fn test_empty_key_variable_is_ignored() {
        let lookup = |name: &str| match name {
            API_KEY_ENV => Some(String::new()),
            _ => None,
        };
        let (config, source) = parse_with("", lookup).unwrap();
        assert_eq!(source, KeySource::None);
        assert!(config.upstream.api_key.is_none());
    }

    #[test]
    fn test_environment_overrides_file_values() {
        let toml = r#"
            [server]
            listen = "127.0.0.1:9000"

            [upstream]
            base_url = "https://file.example.com/v1"
            model = "qwen-plus"
        "#;
        let lookup = |name: &str| match name {
            API_BASE_ENV => Some("https://env.example.com/v1".to_string()),
            MODEL_ENV => Some("qwen-max".to_string()),
            LISTEN_ENV => Some("127.0.0.1:7000".to_string()),
            _ => None,
        };
        let (config, _) = parse_with(toml, lookup).unwrap();
        assert_eq!(config.upstream.base_url, "https://env.example.com/v1");
        assert_eq!(config.upstream.model, "qwen-max");
        assert_eq!(config.server.listen, "127.0.0.1:7000");
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let toml = r#"
            [upstream]
            base_url = ""
        "#;
        let err = parse_with(toml, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = Config::parse_str("[server\nlisten = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file_reads_toml() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[upstream]\nmodel = \"qwen-long\"\napi_key = \"sk-file\"\n\n[stream]\npacing_ms = 25"
        )
        .unwrap();

        let (config, source) = Config::from_file(file.path()).unwrap();
        assert_eq!(config.stream.pacing_ms, 25);
        assert_eq!(source, KeySource::Literal);
    }

    #[test]
    fn test_from_file_missing_path() {
        let err = Config::from_file("/definitely/not/here/chatrelay.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
