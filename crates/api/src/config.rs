use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use domain::services::AccessPolicyConfig;
use shared::retry::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    /// Bearer token verification
    pub jwt: JwtAuthConfig,
    pub access: AccessConfig,
    pub membership: MembershipConfig,
    pub actuator: ActuatorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(c: &DatabaseConfig) -> Self {
        Self {
            url: c.url.clone(),
            max_connections: c.max_connections,
            min_connections: c.min_connections,
            connect_timeout_secs: c.connect_timeout_secs,
            idle_timeout_secs: c.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Unlock requests per user per minute. 0 disables the limiter.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtAuthConfig {
    /// RSA public key in PEM format used to verify access tokens
    #[serde(default)]
    pub public_key: String,

    /// HS256 shared secret; development and tests only. Ignored when
    /// `public_key` is set.
    #[serde(default)]
    pub secret: String,

    /// Leeway in seconds for clock skew tolerance (default: 30)
    #[serde(default = "default_jwt_leeway")]
    pub leeway_secs: u64,
}

/// Access decision tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    #[serde(default = "default_actuator_timeout_ms")]
    pub actuator_timeout_ms: u64,

    /// Whether callers holding the operator role may request test mode.
    #[serde(default)]
    pub test_mode_enabled: bool,

    /// Maximum age of a cached door record.
    #[serde(default = "default_registry_ttl")]
    pub registry_ttl_secs: u64,

    /// Interval of the background registry refresh job.
    #[serde(default = "default_registry_refresh")]
    pub registry_refresh_secs: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Oldest accepted live observation, in seconds.
    #[serde(default = "default_max_observation_age")]
    pub max_observation_age_secs: i64,
}

impl AccessConfig {
    pub fn registry_ttl(&self) -> Duration {
        Duration::from_secs(self.registry_ttl_secs)
    }

    pub fn registry_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.registry_refresh_secs)
    }

    pub fn policy(&self) -> AccessPolicyConfig {
        let retry = RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            ..RetryPolicy::default()
        };
        AccessPolicyConfig {
            cooldown: Duration::from_millis(self.cooldown_ms),
            actuator_timeout: Duration::from_millis(self.actuator_timeout_ms),
            lookup_retry: retry,
            actuator_retry: retry,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MembershipConfig {
    /// Membership provider: http or static
    #[serde(default = "default_membership_provider")]
    pub provider: String,

    /// Subscription service URL (required for http)
    #[serde(default)]
    pub base_url: String,

    #[serde(default = "default_collaborator_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActuatorConfig {
    /// Actuator provider: http or mock
    #[serde(default = "default_actuator_provider")]
    pub provider: String,

    /// Door controller gateway URL (required for http)
    #[serde(default)]
    pub base_url: String,

    #[serde(default = "default_collaborator_timeout_ms")]
    pub timeout_ms: u64,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_rate_limit() -> u32 {
    30
}
fn default_jwt_leeway() -> u64 {
    30
}
fn default_cooldown_ms() -> u64 {
    5_000
}
fn default_actuator_timeout_ms() -> u64 {
    3_000
}
fn default_registry_ttl() -> u64 {
    30
}
fn default_registry_refresh() -> u64 {
    60
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    100
}
fn default_max_observation_age() -> i64 {
    60
}
fn default_membership_provider() -> String {
    "http".to_string()
}
fn default_actuator_provider() -> String {
    "http".to_string()
}
fn default_collaborator_timeout_ms() -> u64 {
    2_000
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with DA__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("DA").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration from embedded defaults plus overrides.
    ///
    /// Does not touch the file system or the environment and skips
    /// validation, so partial configs can be exercised.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = ""
            max_connections = 20
            min_connections = 5
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [logging]
            level = "info"
            format = "json"

            [security]
            cors_origins = []
            rate_limit_per_minute = 30

            [jwt]
            public_key = ""
            secret = ""
            leeway_secs = 30

            [access]
            cooldown_ms = 5000
            actuator_timeout_ms = 3000
            test_mode_enabled = false
            registry_ttl_secs = 30
            registry_refresh_secs = 60
            retry_attempts = 3
            retry_base_delay_ms = 100
            max_observation_age_secs = 60

            [membership]
            provider = "static"
            base_url = ""
            timeout_ms = 2000

            [actuator]
            provider = "mock"
            base_url = ""
            timeout_ms = 2000
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "DA__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.jwt.public_key.is_empty() && self.jwt.secret.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "DA__JWT__PUBLIC_KEY or DA__JWT__SECRET must be set".to_string(),
            ));
        }

        if self.access.actuator_timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "access.actuator_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.access.registry_refresh_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "access.registry_refresh_secs must be greater than 0".to_string(),
            ));
        }

        match self.membership.provider.as_str() {
            "static" => {}
            "http" if !self.membership.base_url.is_empty() => {}
            "http" => {
                return Err(ConfigValidationError::MissingRequired(
                    "membership.base_url is required for the http provider".to_string(),
                ))
            }
            other => {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "Unknown membership provider: {}",
                    other
                )))
            }
        }

        match self.actuator.provider.as_str() {
            "mock" => {}
            "http" if !self.actuator.base_url.is_empty() => {}
            "http" => {
                return Err(ConfigValidationError::MissingRequired(
                    "actuator.base_url is required for the http provider".to_string(),
                ))
            }
            other => {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "Unknown actuator provider: {}",
                    other
                )))
            }
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigValidationError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|_| {
                ConfigValidationError::InvalidValue(format!(
                    "Invalid socket address {}:{}",
                    self.server.host, self.server.port
                ))
            })
    }
}
