use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub booking: BookingConfig,
    pub directory_seed: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let directory_seed = env::var("APP_DIRECTORY_SEED")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                ansi: environment == AppEnvironment::Development,
            },
            booking: BookingConfig::from_env()?,
            directory_seed,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub ansi: bool,
}

/// Timeouts, retry bounds and policy switches for the booking workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingConfig {
    pub store_timeout: Duration,
    pub link_timeout: Duration,
    pub notify_timeout: Duration,
    pub dual_write_attempts: u32,
    pub dual_write_backoff: Duration,
    /// `None` disables the periodic reconciliation job.
    pub reconcile_interval: Option<Duration>,
    pub enforce_availability: bool,
    pub consume_slot_on_approval: bool,
    pub meeting_link_base_url: String,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(2_000),
            link_timeout: Duration::from_millis(5_000),
            notify_timeout: Duration::from_millis(5_000),
            dual_write_attempts: 3,
            dual_write_backoff: Duration::from_millis(25),
            reconcile_interval: Some(Duration::from_secs(300)),
            enforce_availability: true,
            consume_slot_on_approval: true,
            meeting_link_base_url: "https://meet.example.com".to_string(),
        }
    }
}

impl BookingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let reconcile_secs = env_u64(
            "BOOKING_RECONCILE_INTERVAL_SECS",
            defaults.reconcile_interval.map_or(0, |d| d.as_secs()),
        )?;

        Ok(Self {
            store_timeout: env_millis("BOOKING_STORE_TIMEOUT_MS", defaults.store_timeout)?,
            link_timeout: env_millis("BOOKING_LINK_TIMEOUT_MS", defaults.link_timeout)?,
            notify_timeout: env_millis("BOOKING_NOTIFY_TIMEOUT_MS", defaults.notify_timeout)?,
            dual_write_attempts: env_u64(
                "BOOKING_DUAL_WRITE_ATTEMPTS",
                u64::from(defaults.dual_write_attempts),
            )?
            .clamp(1, u64::from(u32::MAX)) as u32,
            dual_write_backoff: env_millis(
                "BOOKING_DUAL_WRITE_BACKOFF_MS",
                defaults.dual_write_backoff,
            )?,
            reconcile_interval: (reconcile_secs > 0).then(|| Duration::from_secs(reconcile_secs)),
            enforce_availability: env_bool(
                "BOOKING_ENFORCE_AVAILABILITY",
                defaults.enforce_availability,
            )?,
            consume_slot_on_approval: env_bool(
                "BOOKING_CONSUME_SLOT_ON_APPROVAL",
                defaults.consume_slot_on_approval,
            )?,
            meeting_link_base_url: env::var("MEETING_LINK_BASE_URL")
                .ok()
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.meeting_link_base_url),
        })
    }
}

fn env_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

fn env_millis(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let millis = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    env_u64(key, millis).map(Duration::from_millis)
}

fn env_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool { key }),
        },
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    InvalidBool { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a non-negative integer")
            }
            ConfigError::InvalidBool { key } => write!(f, "{key} must be true or false"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_DIRECTORY_SEED",
            "BOOKING_STORE_TIMEOUT_MS",
            "BOOKING_LINK_TIMEOUT_MS",
            "BOOKING_NOTIFY_TIMEOUT_MS",
            "BOOKING_DUAL_WRITE_ATTEMPTS",
            "BOOKING_DUAL_WRITE_BACKOFF_MS",
            "BOOKING_RECONCILE_INTERVAL_SECS",
            "BOOKING_ENFORCE_AVAILABILITY",
            "BOOKING_CONSUME_SLOT_ON_APPROVAL",
            "MEETING_LINK_BASE_URL",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.telemetry.ansi);
        assert_eq!(config.booking, BookingConfig::default());
        assert!(config.directory_seed.is_none());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn booking_overrides_are_parsed() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "production");
        env::set_var("BOOKING_DUAL_WRITE_ATTEMPTS", "5");
        env::set_var("BOOKING_RECONCILE_INTERVAL_SECS", "0");
        env::set_var("BOOKING_ENFORCE_AVAILABILITY", "off");
        env::set_var("MEETING_LINK_BASE_URL", "https://meet.internal/ ");

        let config = AppConfig::load().expect("config loads");
        assert!(!config.telemetry.ansi);
        assert_eq!(config.booking.dual_write_attempts, 5);
        assert_eq!(config.booking.reconcile_interval, None);
        assert!(!config.booking.enforce_availability);
        assert_eq!(config.booking.meeting_link_base_url, "https://meet.internal");
        reset_env();
    }

    #[test]
    fn rejects_malformed_booleans() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("BOOKING_CONSUME_SLOT_ON_APPROVAL", "sometimes");
        match AppConfig::load() {
            Err(ConfigError::InvalidBool { key }) => {
                assert_eq!(key, "BOOKING_CONSUME_SLOT_ON_APPROVAL")
            }
            other => panic!("expected invalid bool, got {other:?}"),
        }
        reset_env();
    }
}
