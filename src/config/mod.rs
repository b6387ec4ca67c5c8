use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::workflows::second_opinion::assignment::{
    AlgorithmSettings, DEFAULT_LOAD_WEIGHT, DEFAULT_MONTHLY_CAP,
};

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
    /// Seeds algorithm config version 1 at startup.
    pub assignment: AlgorithmSettings,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            assignment: load_assignment_settings()?,
        })
    }
}

fn load_assignment_settings() -> Result<AlgorithmSettings, ConfigError> {
    let load_weight = match env::var("MDT_LOAD_WEIGHT") {
        Ok(raw) => raw
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|weight| *weight <= 100)
            .ok_or(ConfigError::InvalidLoadWeight { value: raw })?,
        Err(_) => DEFAULT_LOAD_WEIGHT,
    };

    let monthly_cap = match env::var("MDT_MONTHLY_CAP") {
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|cap| *cap > 0)
            .ok_or(ConfigError::InvalidMonthlyCap { value: raw })?,
        Err(_) => DEFAULT_MONTHLY_CAP,
    };

    Ok(AlgorithmSettings {
        name: "environment".to_string(),
        load_weight,
        strict_mode: flag("MDT_STRICT_MODE", false)?,
        monthly_cap,
        allow_overrides: flag("MDT_ALLOW_OVERRIDES", true)?,
        respect_availability: flag("MDT_RESPECT_AVAILABILITY", true)?,
    })
}

fn flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(default);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag { name, value: raw }),
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidLoadWeight { value: String },
    InvalidMonthlyCap { value: String },
    InvalidFlag { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidLoadWeight { value } => {
                write!(f, "MDT_LOAD_WEIGHT must be between 0 and 100, found '{value}'")
            }
            ConfigError::InvalidMonthlyCap { value } => {
                write!(f, "MDT_MONTHLY_CAP must be a positive integer, found '{value}'")
            }
            ConfigError::InvalidFlag { name, value } => {
                write!(f, "{name} must be true or false, found '{value}'")
            }
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
        for name in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "MDT_LOAD_WEIGHT",
            "MDT_STRICT_MODE",
            "MDT_MONTHLY_CAP",
            "MDT_ALLOW_OVERRIDES",
            "MDT_RESPECT_AVAILABILITY",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().unwrap_or_else(|e| e.into_inner());
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.assignment.load_weight, 50);
        assert_eq!(config.assignment.monthly_cap, 15);
        assert!(!config.assignment.strict_mode);
        assert!(config.assignment.allow_overrides);
        assert!(config.assignment.respect_availability);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().unwrap_or_else(|e| e.into_inner());
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_assignment_overrides() {
        let _lock = env_guard().lock().unwrap_or_else(|e| e.into_inner());
        reset_env();
        env::set_var("MDT_LOAD_WEIGHT", "80");
        env::set_var("MDT_STRICT_MODE", "yes");
        env::set_var("MDT_MONTHLY_CAP", "4");
        env::set_var("MDT_ALLOW_OVERRIDES", "false");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.assignment.load_weight, 80);
        assert!(config.assignment.strict_mode);
        assert_eq!(config.assignment.monthly_cap, 4);
        assert!(!config.assignment.allow_overrides);
        reset_env();
    }

    #[test]
    fn rejects_out_of_range_load_weight() {
        let _lock = env_guard().lock().unwrap_or_else(|e| e.into_inner());
        reset_env();
        env::set_var("MDT_LOAD_WEIGHT", "150");
        let error = AppConfig::load().expect_err("weight above 100 is rejected");
        assert!(matches!(error, ConfigError::InvalidLoadWeight { .. }));
        reset_env();
    }

    #[test]
    fn rejects_unparseable_flag() {
        let _lock = env_guard().lock().unwrap_or_else(|e| e.into_inner());
        reset_env();
        env::set_var("MDT_STRICT_MODE", "sometimes");
        let error = AppConfig::load().expect_err("flag must be boolean");
        assert!(error.to_string().contains("MDT_STRICT_MODE"));
        reset_env();
    }
}
