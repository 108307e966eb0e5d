use chrono::Weekday;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::workflows::attendance::WeekCutover;

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
    pub attendance: AttendanceSettings,
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
        let log_format = LogFormat::from_str(
            &env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        );

        let attendance = AttendanceSettings::from_env()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            attendance,
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

/// Output flavour for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

/// A shorter lookback could not cover a whole week.
pub const MIN_STREAK_LOOKBACK_DAYS: u16 = 7;

/// Engine-wide knobs that are not owned by an individual challenge policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendanceSettings {
    pub cutover: WeekCutover,
    pub streak_lookback_days: u16,
}

impl Default for AttendanceSettings {
    fn default() -> Self {
        Self {
            cutover: WeekCutover::default(),
            streak_lookback_days: 60,
        }
    }
}

impl AttendanceSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let weekday = match env::var("ATTENDANCE_CUTOVER_WEEKDAY") {
            Ok(raw) => raw
                .trim()
                .parse::<Weekday>()
                .map_err(|_| ConfigError::InvalidCutoverWeekday(raw))?,
            Err(_) => defaults.cutover.weekday,
        };

        let hour = match env::var("ATTENDANCE_CUTOVER_HOUR") {
            Ok(raw) => raw
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|hour| *hour < 24)
                .ok_or(ConfigError::InvalidCutoverHour)?,
            Err(_) => defaults.cutover.hour,
        };

        let streak_lookback_days = match env::var("ATTENDANCE_STREAK_LOOKBACK_DAYS") {
            Ok(raw) => raw
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|days| *days >= MIN_STREAK_LOOKBACK_DAYS)
                .ok_or(ConfigError::InvalidStreakLookback)?,
            Err(_) => defaults.streak_lookback_days,
        };

        Ok(Self {
            cutover: WeekCutover { weekday, hour },
            streak_lookback_days,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidCutoverWeekday(String),
    InvalidCutoverHour,
    InvalidStreakLookback,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidCutoverWeekday(raw) => write!(
                f,
                "ATTENDANCE_CUTOVER_WEEKDAY '{}' is not a weekday name",
                raw
            ),
            ConfigError::InvalidCutoverHour => {
                write!(f, "ATTENDANCE_CUTOVER_HOUR must be an hour between 0 and 23")
            }
            ConfigError::InvalidStreakLookback => write!(
                f,
                "ATTENDANCE_STREAK_LOOKBACK_DAYS must be at least {} days",
                MIN_STREAK_LOOKBACK_DAYS
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidCutoverWeekday(_)
            | ConfigError::InvalidCutoverHour
            | ConfigError::InvalidStreakLookback => None,
        }
    }
}
