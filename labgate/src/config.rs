//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `LABGATE_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `LABGATE_` override YAML values
//! 3. **DATABASE_URL** - Special case: overrides `database.url` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `LABGATE_SCHEDULE__UTC_OFFSET=+00:00` sets the `schedule.utc_offset` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use labgate::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port` - HTTP server binding configuration
//! - **Database**: `database.url`, pool sizes - SQLite connection settings
//! - **Admin User**: `admin_email`, `admin_password` - Initial admin account, ensured at startup
//! - **Authentication**: `auth.native` - Registration, login and session cookies
//! - **Security**: `secret_key`, `auth.security` - Token lifetimes and CORS
//! - **Schedule**: `schedule.utc_offset`, `schedule.min_duration` - How batch times are interpreted
//! - **Features**: `enable_metrics`, `enable_otel_export` - Optional feature toggles
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! LABGATE_PORT=8080
//!
//! # Set database connection (preferred method)
//! DATABASE_URL="sqlite:///var/lib/labgate/labgate.db?mode=rwc"
//!
//! # Override nested values
//! LABGATE_AUTH__NATIVE__ADMIN_INVITE_CODE=let-me-in
//! LABGATE_ENABLE_METRICS=true
//! ```

use chrono::FixedOffset;
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;
use crate::schedule::ScheduleRules;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "LABGATE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// SQLite database settings
    pub database: DatabaseConfig,
    /// Email address for the initial admin user
    pub admin_email: String,
    /// Password for the initial admin user. No admin is seeded without it.
    pub admin_password: Option<String>,
    /// Secret key for JWT signing (required when native auth is enabled)
    pub secret_key: Option<String>,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Batch scheduling rules
    pub schedule: ScheduleConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// SQLite connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection URL, e.g. `sqlite://labgate.db?mode=rwc`
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long to wait for a free connection
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Native email/password authentication
    pub native: NativeAuthConfig,
    /// Security settings (JWT, CORS, etc.)
    pub security: SecurityConfig,
}

/// Native email/password authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NativeAuthConfig {
    /// Enable native authentication (login/registration)
    pub enabled: bool,
    /// Allow new users to self-register
    pub allow_registration: bool,
    /// Code a registrant must present to sign up as an admin. Admin self-registration is
    /// impossible while unset.
    pub admin_invite_code: Option<String>,
    /// Password validation rules
    pub password: PasswordConfig,
    /// Session cookie configuration
    pub session: SessionConfig,
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Cookie name for the access token
    pub cookie_name: String,
    /// Cookie name for the refresh token (scoped to `/authentication`)
    pub refresh_cookie_name: String,
    /// Set Secure flag on cookies (HTTPS only)
    pub cookie_secure: bool,
    /// SameSite cookie attribute ("strict", "lax", or "none")
    pub cookie_same_site: String,
}

/// Password validation rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    /// Minimum password length
    pub min_length: usize,
    /// Maximum password length
    pub max_length: usize,
    /// Argon2 memory cost in KiB (default: 19456 KiB = 19 MB, secure for production)
    pub argon2_memory_kib: u32,
    /// Argon2 iterations (default: 2, secure for production)
    pub argon2_iterations: u32,
    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

/// Security configuration for JWT and CORS.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    /// Access token lifetime
    #[serde(with = "humantime_serde")]
    pub jwt_expiry: Duration,
    /// Refresh token lifetime
    #[serde(with = "humantime_serde")]
    pub refresh_expiry: Duration,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://portal.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

/// How batch schedules are interpreted and judged.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Fixed UTC offset batch dates and times are written in, e.g. `+05:30`
    pub utc_offset: String,
    /// Shortest allowed batch
    #[serde(with = "humantime_serde")]
    pub min_duration: Duration,
    /// How long before `endAt` a live batch is flagged as expiring soon
    #[serde(with = "humantime_serde")]
    pub expiring_soon_window: Duration,
}

impl ScheduleConfig {
    /// Resolve into the rules the scheduling pipeline runs on.
    pub fn rules(&self) -> Result<ScheduleRules, Error> {
        let offset: FixedOffset = self.utc_offset.trim().parse().map_err(|e| Error::Internal {
            operation: format!("Config validation: schedule.utc_offset '{}' is not a UTC offset like +05:30: {e}", self.utc_offset),
        })?;
        let to_chrono = |name: &str, d: Duration| {
            chrono::Duration::from_std(d).map_err(|e| Error::Internal {
                operation: format!("Config validation: schedule.{name} is out of range: {e}"),
            })
        };

        Ok(ScheduleRules {
            offset,
            min_duration: to_chrono("min_duration", self.min_duration)?,
            expiring_soon_window: to_chrono("expiring_soon_window", self.expiring_soon_window)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            database: DatabaseConfig::default(),
            admin_email: "admin@labgate.local".to_string(),
            admin_password: None,
            secret_key: None,
            auth: AuthConfig::default(),
            schedule: ScheduleConfig::default(),
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://labgate.db?mode=rwc".to_string(),
            max_connections: 8,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for NativeAuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_registration: true,
            admin_invite_code: None,
            password: PasswordConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "labgate_session".to_string(),
            refresh_cookie_name: "labgate_refresh".to_string(),
            cookie_secure: true,
            cookie_same_site: "strict".to_string(),
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 10,
            max_length: 128,
            // Secure defaults for production (Argon2id RFC recommendations)
            argon2_memory_kib: 19456, // 19 MB
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_expiry: Duration::from_secs(15 * 60),
            refresh_expiry: Duration::from_secs(7 * 24 * 60 * 60),
            cors: CorsConfig::default(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            // Development frontend (Vite)
            allowed_origins: Url::parse("http://localhost:5173").map(CorsOrigin::Url).into_iter().collect(),
            allow_credentials: true,
            max_age: Some(3600),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            utc_offset: "+05:30".to_string(),
            min_duration: Duration::from_secs(10 * 60),
            expiring_soon_window: Duration::from_secs(10 * 60),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.auth.native.enabled {
            if self.secret_key.is_none() {
                return Err(Error::Internal {
                    operation: "Config validation: Native authentication is enabled but secret_key is not configured. \
                     Please set LABGATE_SECRET_KEY environment variable or add secret_key to config file."
                        .to_string(),
                });
            }

            if self.auth.native.password.min_length > self.auth.native.password.max_length {
                return Err(Error::Internal {
                    operation: format!(
                        "Config validation: Invalid password configuration: min_length ({}) cannot be greater than max_length ({})",
                        self.auth.native.password.min_length, self.auth.native.password.max_length
                    ),
                });
            }

            if self.auth.native.password.min_length < 1 {
                return Err(Error::Internal {
                    operation: "Config validation: Invalid password configuration: min_length must be at least 1".to_string(),
                });
            }
        }

        if self.auth.security.refresh_expiry <= self.auth.security.jwt_expiry {
            return Err(Error::Internal {
                operation: "Config validation: refresh_expiry must be longer than jwt_expiry".to_string(),
            });
        }

        let has_wildcard = self
            .auth
            .security
            .cors
            .allowed_origins
            .iter()
            .any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.auth.security.cors.allow_credentials {
            return Err(Error::Internal {
                operation: "Config validation: CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins."
                    .to_string(),
            });
        }

        if self.schedule.min_duration.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: schedule.min_duration must be greater than zero".to_string(),
            });
        }
        self.schedule.rules()?;

        if self.database.max_connections == 0 || self.database.min_connections > self.database.max_connections {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: database pool sizes are inconsistent (min {}, max {})",
                    self.database.min_connections, self.database.max_connections
                ),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can override specific values
            .merge(Env::prefixed("LABGATE_").ignore(&["CONFIG"]).split("__"))
            // Common DATABASE_URL pattern
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database.url".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args() -> Args {
        Args {
            config: "test.yaml".to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults_from_minimal_file() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "secret_key: hello\n")?;

            let config = Config::load(&args())?;

            assert_eq!(config.port, 3001);
            assert_eq!(config.schedule.utc_offset, "+05:30");
            assert_eq!(config.schedule.min_duration, Duration::from_secs(600));
            assert_eq!(config.auth.security.jwt_expiry, Duration::from_secs(900));
            assert_eq!(config.auth.native.password.min_length, 10);
            assert!(config.auth.native.admin_invite_code.is_none());

            let rules = config.schedule.rules().map_err(|e| e.to_string())?;
            assert_eq!(rules, ScheduleRules::default());

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
host: 0.0.0.0
schedule:
  min_duration: 15m
"#,
            )?;

            jail.set_env("LABGATE_HOST", "127.0.0.1");
            jail.set_env("LABGATE_PORT", "8080");
            jail.set_env("LABGATE_AUTH__NATIVE__ADMIN_INVITE_CODE", "open-sesame");
            jail.set_env("DATABASE_URL", "sqlite://elsewhere.db");

            let config = Config::load(&args())?;

            // Env vars should override
            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 8080);
            assert_eq!(config.auth.native.admin_invite_code.as_deref(), Some("open-sesame"));
            assert_eq!(config.database.url, "sqlite://elsewhere.db");

            // YAML values should be preserved
            assert_eq!(config.schedule.min_duration, Duration::from_secs(15 * 60));

            Ok(())
        });
    }

    #[test]
    fn test_auth_config_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: "test-secret-key-for-testing"
auth:
  native:
    allow_registration: false
    session:
      cookie_name: custom_session
      cookie_secure: false
  security:
    jwt_expiry: 30m
    refresh_expiry: 1day
    cors:
      allowed_origins:
        - https://portal.example.com
"#,
            )?;

            let config = Config::load(&args())?;

            assert!(!config.auth.native.allow_registration);
            assert_eq!(config.auth.native.session.cookie_name, "custom_session");
            assert_eq!(config.auth.native.session.refresh_cookie_name, "labgate_refresh");
            assert!(!config.auth.native.session.cookie_secure);
            assert_eq!(config.auth.security.jwt_expiry, Duration::from_secs(30 * 60));
            assert_eq!(config.auth.security.refresh_expiry, Duration::from_secs(24 * 60 * 60));
            assert!(matches!(
                &config.auth.security.cors.allowed_origins[..],
                [CorsOrigin::Url(url)] if url.as_str() == "https://portal.example.com/"
            ));

            Ok(())
        });
    }

    #[test]
    fn test_unknown_fields_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "secret_key: hello\nnot_a_setting: true\n")?;

            assert!(Config::load(&args()).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_validation_errors() {
        let valid = Config {
            secret_key: Some("secret".to_string()),
            ..Default::default()
        };
        assert!(valid.validate().is_ok());

        let mut missing_secret = valid.clone();
        missing_secret.secret_key = None;
        assert!(missing_secret.validate().is_err());

        let mut inverted_password = valid.clone();
        inverted_password.auth.native.password.min_length = 200;
        assert!(inverted_password.validate().is_err());

        let mut bad_offset = valid.clone();
        bad_offset.schedule.utc_offset = "IST".to_string();
        assert!(bad_offset.validate().is_err());

        let mut zero_duration = valid.clone();
        zero_duration.schedule.min_duration = Duration::ZERO;
        assert!(zero_duration.validate().is_err());

        let mut wildcard = valid.clone();
        wildcard.auth.security.cors.allowed_origins = vec![CorsOrigin::Wildcard];
        assert!(wildcard.validate().is_err());
        wildcard.auth.security.cors.allow_credentials = false;
        assert!(wildcard.validate().is_ok());
    }

    #[test]
    fn test_custom_offset_resolves() {
        let schedule = ScheduleConfig {
            utc_offset: "-04:00".to_string(),
            ..Default::default()
        };
        let rules = schedule.rules().unwrap();
        assert_eq!(rules.offset.local_minus_utc(), -4 * 3600);
    }
}
