//! Configuration handling
//!
//! Credentials come from the environment, tunables from an optional TOML
//! file. [`Config::new`] is the only way to build a [`Config`] and it is
//! where every credential check lives.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::paths::config_path;
use super::redact::mask_key;
use super::{Error, Result};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.feature.fm";

/// Path of the management API under the base URL
pub const MANAGE_PATH: &str = "/manage/v1";

/// Target environment
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Isolated environment, write operations permitted
    #[default]
    Sandbox,
    /// Live environment, read-only by policy
    Production,
}

impl Environment {
    /// Prefix used for environment-specific variables
    fn var_prefix(&self) -> &'static str {
        match self {
            Environment::Sandbox => "FEATUREFM_SANDBOX_",
            Environment::Production => "FEATUREFM_PRODUCTION_",
        }
    }

    /// Display name used in banners
    pub fn display_name(&self) -> &'static str {
        match self {
            Environment::Sandbox => "SANDBOX",
            Environment::Production => "PRODUCTION",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Sandbox => write!(f, "sandbox"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Environment::Sandbox),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(Error::Configuration(format!(
                "Unknown environment '{}'. Supported: sandbox, production",
                other
            ))),
        }
    }
}

/// API credentials for one environment
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
    pub issuer: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &mask_key(&self.api_key))
            .field("secret_key", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// Tunables loaded from `config.toml`
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    /// Outbound HTTP settings
    #[serde(default)]
    pub http: HttpSettings,

    /// Proxy server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Result artifact and truncation settings
    #[serde(default)]
    pub output: OutputSettings,
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Total attempts for timeouts and connection failures
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Base of the exponential backoff between attempts
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Wait used when a 429 carries no usable Retry-After
    #[serde(default = "default_retry_after")]
    pub default_retry_after_secs: u64,

    /// Consecutive 429 waits tolerated before giving up; a transport
    /// failure in between starts the count again
    #[serde(default = "default_rate_limit_waits")]
    pub max_rate_limit_waits: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            retries: default_retries(),
            backoff_base_ms: default_backoff_base(),
            default_retry_after_secs: default_retry_after(),
            max_rate_limit_waits: default_rate_limit_waits(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_request_timeout() -> u64 {
    10
}
fn default_retries() -> u32 {
    3
}
fn default_backoff_base() -> u64 {
    1000
}
fn default_retry_after() -> u64 {
    60
}
fn default_rate_limit_waits() -> u32 {
    5
}
fn default_user_agent() -> String {
    format!("ffm-tester/{}", env!("CARGO_PKG_VERSION"))
}

/// Proxy server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by the CORS layer
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Timeout for proxied upstream calls
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,

    /// Proxy requests per minute per client address
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    /// Test runs per minute per client address
    #[serde(default = "default_run_tests_limit")]
    pub run_tests_per_minute: u32,

    #[serde(default)]
    pub debug: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            upstream_timeout_secs: default_upstream_timeout(),
            rate_limit_per_minute: default_rate_limit(),
            run_tests_per_minute: default_run_tests_limit(),
            debug: false,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5000".to_string(),
        "http://127.0.0.1:5000".to_string(),
    ]
}
fn default_upstream_timeout() -> u64 {
    30
}
fn default_rate_limit() -> u32 {
    60
}
fn default_run_tests_limit() -> u32 {
    10
}

/// Result artifact and truncation settings
#[derive(Debug, Clone, Deserialize)]
pub struct OutputSettings {
    /// Directory for run artifacts
    #[serde(default = "default_results_dir")]
    pub results_dir: String,

    /// Artifact file name prefix
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Non-JSON response bodies kept in test results
    #[serde(default = "default_response_text_limit")]
    pub response_text_limit: usize,

    /// Non-JSON upstream bodies returned by the proxy
    #[serde(default = "default_proxy_text_limit")]
    pub proxy_text_limit: usize,

    /// Header value preview length in request summaries
    #[serde(default = "default_header_preview")]
    pub header_preview_len: usize,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            file_prefix: default_file_prefix(),
            response_text_limit: default_response_text_limit(),
            proxy_text_limit: default_proxy_text_limit(),
            header_preview_len: default_header_preview(),
        }
    }
}

fn default_results_dir() -> String {
    ".".to_string()
}
fn default_file_prefix() -> String {
    "test_results".to_string()
}
fn default_response_text_limit() -> usize {
    500
}
fn default_proxy_text_limit() -> usize {
    1000
}
fn default_header_preview() -> usize {
    20
}

impl Settings {
    /// Load settings from the default config file
    ///
    /// Returns default settings if the file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load settings from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Apply `FEATUREFM_SERVER_*`, `FEATUREFM_CORS_ORIGINS` and `FEATUREFM_DEBUG`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("FEATUREFM_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("FEATUREFM_SERVER_PORT") {
            self.server.port = port.trim().parse().map_err(|_| {
                Error::Configuration(format!("FEATUREFM_SERVER_PORT '{}' is not a port", port))
            })?;
        }
        if let Some(origins) = lookup("FEATUREFM_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(debug) = lookup("FEATUREFM_DEBUG") {
            self.server.debug = matches!(debug.trim().to_ascii_lowercase().as_str(), "1" | "true");
        }
        Ok(())
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub credentials: Credentials,
    pub base_url: String,
    /// Marketing management API root, `{base_url}/manage/v1` unless overridden
    pub manage_base: String,
    writes_allowed: bool,
    pub settings: Settings,
}

/// Configuration view that is safe to log or return to a browser
#[derive(Debug, Clone, Serialize)]
pub struct MaskedConfig {
    pub api_key: String,
    pub iss: String,
    pub base_url: String,
    pub manage_base: String,
    pub environment: Environment,
    pub writes_allowed: bool,
    pub configured: bool,
}

impl Config {
    /// Build a configuration, failing fast on missing credentials
    ///
    /// Production never allows writes, whatever `writes_requested` says.
    pub fn new(
        environment: Environment,
        credentials: Credentials,
        base_url: impl Into<String>,
        writes_requested: bool,
        settings: Settings,
    ) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();

        let missing: Vec<&str> = [
            ("api key", credentials.api_key.trim()),
            ("secret key", credentials.secret_key.trim()),
            ("issuer", credentials.issuer.trim()),
            ("base URL", base_url.as_str()),
        ]
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| *name)
        .collect();

        if !missing.is_empty() {
            return Err(Error::Configuration(format!(
                "Missing {} for the {} environment. Set FEATUREFM_API_KEY, \
                 FEATUREFM_SECRET_KEY and FEATUREFM_ISS (or their FEATUREFM_{}_* variants)",
                missing.join(", "),
                environment,
                environment.display_name()
            )));
        }

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::Configuration(format!(
                "Base URL '{}' must start with http:// or https://",
                base_url
            )));
        }

        let writes_allowed = match environment {
            Environment::Production => {
                if writes_requested {
                    tracing::warn!("Write operations requested for production; forcing read-only");
                }
                false
            }
            Environment::Sandbox => writes_requested,
        };

        Ok(Self {
            environment,
            credentials,
            manage_base: format!("{}{}", base_url, MANAGE_PATH),
            base_url,
            writes_allowed,
            settings,
        })
    }

    /// Build a configuration from process environment variables
    pub fn from_env(environment: Environment, settings: Settings) -> Result<Self> {
        Self::from_lookup(environment, settings, |name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    ///
    /// Environment-specific variables win over the unprefixed ones.
    pub fn from_lookup<F>(environment: Environment, mut settings: Settings, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |suffix: &str| -> Option<String> {
            lookup(&format!("{}{}", environment.var_prefix(), suffix))
                .or_else(|| lookup(&format!("FEATUREFM_{}", suffix)))
                .filter(|v| !v.trim().is_empty())
        };

        let credentials = Credentials {
            api_key: read("API_KEY").unwrap_or_default(),
            secret_key: read("SECRET_KEY").unwrap_or_default(),
            issuer: read("ISS").unwrap_or_default(),
        };
        let base_url = read("BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let manage_base = read("MANAGE_BASE_URL");

        settings.apply_env_overrides(&lookup)?;

        let mut config = Self::new(
            environment,
            credentials,
            base_url,
            environment == Environment::Sandbox,
            settings,
        )?;
        if let Some(manage_base) = manage_base {
            config.manage_base = manage_base.trim().trim_end_matches('/').to_string();
        }
        Ok(config)
    }

    /// Whether write operations may be issued
    pub fn can_write(&self) -> bool {
        self.writes_allowed
    }

    /// Fail with a permission error unless writes are allowed
    pub fn require_write_permission(&self, operation: &str) -> Result<()> {
        if self.writes_allowed {
            Ok(())
        } else {
            Err(Error::permission_denied(operation, self.environment))
        }
    }

    /// Masked view for display
    pub fn masked(&self) -> MaskedConfig {
        MaskedConfig {
            api_key: mask_key(&self.credentials.api_key),
            iss: self.credentials.issuer.clone(),
            base_url: self.base_url.clone(),
            manage_base: self.manage_base.clone(),
            environment: self.environment,
            writes_allowed: self.writes_allowed,
            configured: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn creds() -> Credentials {
        Credentials {
            api_key: "3890d422-882b-486d".to_string(),
            secret_key: "s3cr3t".to_string(),
            issuer: "sandbox.example".to_string(),
        }
    }

    #[test]
    fn test_production_forces_read_only() {
        let config = Config::new(
            Environment::Production,
            creds(),
            DEFAULT_BASE_URL,
            true,
            Settings::default(),
        )
        .unwrap();
        assert!(!config.can_write());
        assert!(matches!(
            config.require_write_permission("create_artist"),
            Err(Error::PermissionDenied { .. })
        ));
    }

    #[test]
    fn test_sandbox_keeps_requested_writes() {
        let config = Config::new(
            Environment::Sandbox,
            creds(),
            DEFAULT_BASE_URL,
            true,
            Settings::default(),
        )
        .unwrap();
        assert!(config.can_write());
        assert!(config.require_write_permission("create_artist").is_ok());
    }

    #[test]
    fn test_missing_credentials_fail_fast() {
        let mut c = creds();
        c.secret_key = "  ".to_string();
        c.issuer = String::new();
        let err = Config::new(Environment::Sandbox, c, DEFAULT_BASE_URL, true, Settings::default())
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("secret key"));
        assert!(msg.contains("issuer"));
        assert_eq!(err.kind(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_base_url_must_be_http() {
        let err = Config::new(
            Environment::Sandbox,
            creds(),
            "ftp://api.feature.fm",
            true,
            Settings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_from_lookup_prefers_environment_specific_vars() {
        let vars: HashMap<&str, &str> = [
            ("FEATUREFM_API_KEY", "generic-key-123"),
            ("FEATUREFM_PRODUCTION_API_KEY", "prod-key-456789"),
            ("FEATUREFM_SECRET_KEY", "secret"),
            ("FEATUREFM_ISS", "precise.digital"),
            ("FEATUREFM_SERVER_PORT", "8080"),
            ("FEATUREFM_CORS_ORIGINS", "http://a.test, http://b.test"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(Environment::Production, Settings::default(), |k| {
            vars.get(k).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(config.credentials.api_key, "prod-key-456789");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.manage_base, "https://api.feature.fm/manage/v1");
        assert_eq!(config.settings.server.port, 8080);
        assert_eq!(
            config.settings.server.cors_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert!(!config.can_write());
    }

    #[test]
    fn test_masked_hides_key() {
        let config = Config::new(
            Environment::Sandbox,
            creds(),
            "https://api.feature.fm/",
            true,
            Settings::default(),
        )
        .unwrap();
        let masked = config.masked();
        assert_eq!(masked.api_key, "3890d422...");
        assert_eq!(masked.base_url, "https://api.feature.fm");
        let debug = format!("{:?}", config.credentials);
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn test_settings_parse_partial_toml() {
        let settings: Settings = toml::from_str(
            r#"
            [http]
            retries = 5

            [server]
            port = 9000
            "#,
        )
        .unwrap();
        assert_eq!(settings.http.retries, 5);
        assert_eq!(settings.http.request_timeout_secs, 10);
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.output.response_text_limit, 500);
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!("Sandbox".parse::<Environment>().unwrap(), Environment::Sandbox);
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert!("staging".parse::<Environment>().is_err());
    }
}
