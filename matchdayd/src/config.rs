//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use matchday_domain::OperatingWindow;
use matchday_exec::PollPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Booking engine configuration
    pub booking: BookingConfig,

    /// Payment gateway configuration
    pub gateway: GatewayConfig,

    /// PostgreSQL connection string (postgres feature)
    pub database_url: Option<String>,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Booking engine configuration.
#[derive(Debug, Clone)]
pub struct BookingConfig {
    /// First bookable hour
    pub opening_hour: u8,
    /// Hour by which every match must end
    pub closing_hour: u8,
    /// Settlement reads before giving up
    pub poll_attempts: u32,
    /// Pause between settlement reads
    pub poll_interval: Duration,
    /// Pause between reconciler sweeps
    pub reconcile_interval: Duration,
    /// Currency for payments that do not name one
    pub currency: String,
}

/// Payment gateway configuration.
#[derive(Clone, Default)]
pub struct GatewayConfig {
    /// Shared secret for webhook signatures
    pub webhook_secret: Option<String>,
    /// API base URL override
    pub api_url: Option<String>,
    /// API key id
    pub key_id: Option<String>,
    /// API key secret
    pub key_secret: Option<String>,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let config = Self {
            api: Self::load_api_config()?,
            booking: Self::load_booking_config()?,
            gateway: Self::load_gateway_config(),
            database_url: env::var("DATABASE_URL").ok(),
            environment: Self::load_environment()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            booking: BookingConfig {
                poll_interval: Duration::from_millis(10),
                reconcile_interval: Duration::from_secs(1),
                ..BookingConfig::default()
            },
            gateway: GatewayConfig::default(),
            database_url: None,
            environment: Environment::Test,
        }
    }

    /// Check cross-field rules.
    ///
    /// # Errors
    /// `Config` if the operating window is invalid, if production runs
    /// without a webhook secret or gateway credentials, or if only half a
    /// credential pair is set.
    pub fn validate(&self) -> DaemonResult<()> {
        self.booking.operating_window()?;

        if self.booking.poll_attempts == 0 {
            return Err(DaemonError::Config("MATCHDAY_POLL_ATTEMPTS must be at least 1".into()));
        }

        if self.environment == Environment::Production && self.gateway.webhook_secret.is_none() {
            return Err(DaemonError::Config(
                "MATCHDAY_WEBHOOK_SECRET is required in production".into(),
            ));
        }

        if self.environment == Environment::Production && self.gateway.credentials().is_none() {
            return Err(DaemonError::Config(
                "MATCHDAY_GATEWAY_KEY_ID and MATCHDAY_GATEWAY_KEY_SECRET are required in production"
                    .into(),
            ));
        }

        if self.gateway.key_id.is_some() != self.gateway.key_secret.is_some() {
            return Err(DaemonError::Config(
                "MATCHDAY_GATEWAY_KEY_ID and MATCHDAY_GATEWAY_KEY_SECRET must be set together".into(),
            ));
        }

        Ok(())
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("MATCHDAY_ENV").unwrap_or_else(|_| "development".to_string());
        env_str.parse()
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let host = env::var("MATCHDAY_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = Self::load_parsed_env("MATCHDAY_API_PORT", 8080u16)?;

        Ok(ApiConfig { host, port })
    }

    fn load_booking_config() -> DaemonResult<BookingConfig> {
        let defaults = BookingConfig::default();

        let poll_interval_ms = Self::load_parsed_env(
            "MATCHDAY_POLL_INTERVAL_MS",
            defaults.poll_interval.as_millis() as u64,
        )?;
        let reconcile_secs = Self::load_parsed_env(
            "MATCHDAY_RECONCILE_INTERVAL_SECS",
            defaults.reconcile_interval.as_secs(),
        )?;

        Ok(BookingConfig {
            opening_hour: Self::load_parsed_env("MATCHDAY_OPENING_HOUR", defaults.opening_hour)?,
            closing_hour: Self::load_parsed_env("MATCHDAY_CLOSING_HOUR", defaults.closing_hour)?,
            poll_attempts: Self::load_parsed_env("MATCHDAY_POLL_ATTEMPTS", defaults.poll_attempts)?,
            poll_interval: Duration::from_millis(poll_interval_ms),
            reconcile_interval: Duration::from_secs(reconcile_secs),
            currency: env::var("MATCHDAY_CURRENCY").unwrap_or(defaults.currency),
        })
    }

    fn load_gateway_config() -> GatewayConfig {
        let non_empty = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());

        GatewayConfig {
            webhook_secret: non_empty("MATCHDAY_WEBHOOK_SECRET"),
            api_url: non_empty("MATCHDAY_GATEWAY_URL"),
            key_id: non_empty("MATCHDAY_GATEWAY_KEY_ID"),
            key_secret: non_empty("MATCHDAY_GATEWAY_KEY_SECRET"),
        }
    }

    fn load_parsed_env<T: FromStr>(key: &str, default: T) -> DaemonResult<T> {
        match env::var(key) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

impl BookingConfig {
    /// Operating window built from the configured hours.
    pub fn operating_window(&self) -> DaemonResult<OperatingWindow> {
        OperatingWindow::new(self.opening_hour, self.closing_hour).map_err(|e| {
            DaemonError::Config(format!(
                "Invalid MATCHDAY_OPENING_HOUR/MATCHDAY_CLOSING_HOUR: {}",
                e
            ))
        })
    }

    /// Poll policy for settlement polling.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(self.poll_attempts, self.poll_interval)
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            opening_hour: OperatingWindow::DEFAULT_OPENING,
            closing_hour: OperatingWindow::DEFAULT_CLOSING,
            poll_attempts: PollPolicy::DEFAULT_ATTEMPTS,
            poll_interval: PollPolicy::DEFAULT_INTERVAL,
            reconcile_interval: Duration::from_secs(30),
            currency: "INR".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Key id and secret, when both are configured.
    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.key_id, &self.key_secret) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            _ => None,
        }
    }
}

// Secrets stay out of logs
impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "***"))
            .field("api_url", &self.api_url)
            .field("key_id", &self.key_id)
            .field("key_secret", &self.key_secret.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            booking: BookingConfig::default(),
            gateway: GatewayConfig::default(),
            database_url: None,
            environment: Environment::Development,
        }
    }
}

impl FromStr for Environment {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid MATCHDAY_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.api.port, 8080);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.booking.currency, "INR");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_test_config() {
        let config = Config::test();

        assert_eq!(config.api.port, 0);
        assert_eq!(config.environment, Environment::Test);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_booking_defaults() {
        let booking = BookingConfig::default();

        assert_eq!(booking.operating_window().unwrap(), OperatingWindow::default());
        assert_eq!(booking.poll_policy().attempts(), 5);
        assert_eq!(booking.poll_policy().interval(), Duration::from_secs(2));
        assert_eq!(booking.reconcile_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_window_rejected() {
        let mut config = Config::default();
        config.booking.opening_hour = 22;
        config.booking.closing_hour = 6;

        assert!(matches!(config.validate(), Err(DaemonError::Config(_))));
    }

    #[test]
    fn test_production_requires_secrets() {
        let mut config = Config { environment: Environment::Production, ..Config::default() };
        config.gateway.key_id = Some("key".to_string());
        config.gateway.key_secret = Some("secret".to_string());
        assert!(config.validate().is_err());

        config.gateway.webhook_secret = Some("whsec".to_string());
        assert!(config.validate().is_ok());

        config.gateway.key_secret = None;
        config.gateway.key_id = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gateway_credentials_come_in_pairs() {
        let mut config = Config::default();
        config.gateway.key_id = Some("key".to_string());
        assert!(config.validate().is_err());

        config.gateway.key_secret = Some("secret".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(
            config.gateway.credentials(),
            Some(("key".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn test_gateway_debug_hides_secrets() {
        let gateway = GatewayConfig {
            webhook_secret: Some("whsec_live".to_string()),
            key_secret: Some("sk_live".to_string()),
            ..GatewayConfig::default()
        };
        let rendered = format!("{:?}", gateway);
        assert!(!rendered.contains("whsec_live"));
        assert!(!rendered.contains("sk_live"));
    }

    #[test]
    fn test_environment_parse_and_display() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert!("staging".parse::<Environment>().is_err());
        assert_eq!(Environment::Test.to_string(), "test");
        assert_eq!(Environment::Development.to_string(), "development");
        assert_eq!(Environment::Production.to_string(), "production");
    }
}
