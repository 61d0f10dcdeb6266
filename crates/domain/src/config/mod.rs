mod bridge;
mod server;

pub use bridge::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default = "d_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub debug: bool,
}

fn d_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from an optional TOML file, then apply the flat
    /// environment variables the original system recognizes (`PORT`,
    /// `TIMEOUT`, `POLL_TIMEOUT`, `LOG_LEVEL`, `DEBUG`,
    /// `HEALTH_INCLUDE_CHANNEL_DETAILS`). Environment variables win over
    /// the file, matching the env-var-first precedence of the system
    /// this bridge reimplements.
    pub fn load(toml_path: Option<&std::path::Path>) -> crate::error::Result<Self> {
        let mut config = match toml_path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path).map_err(crate::error::Error::Io)?;
                toml::from_str(&raw)
                    .map_err(|e| crate::error::Error::Config(format!("parsing {}: {e}", path.display())))?
            }
            _ => Config::default(),
        };

        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                config.server.port = port;
            }
        }
        if let Ok(timeout) = std::env::var("TIMEOUT") {
            if let Ok(timeout) = timeout.parse() {
                config.bridge.command_timeout_secs = timeout;
            }
        }
        if let Ok(poll_timeout) = std::env::var("POLL_TIMEOUT") {
            if let Ok(poll_timeout) = poll_timeout.parse() {
                config.bridge.poll_timeout_secs = poll_timeout;
            }
        }
        if let Ok(log_level) = std::env::var("LOG_LEVEL") {
            config.log_level = log_level;
        }
        if let Ok(debug) = std::env::var("DEBUG") {
            config.debug = matches!(debug.to_lowercase().as_str(), "true" | "1" | "yes");
        }
        if let Ok(detail) = std::env::var("HEALTH_INCLUDE_CHANNEL_DETAILS") {
            config.health.include_channel_details =
                matches!(detail.to_lowercase().as_str(), "true" | "1" | "yes");
        }

        Ok(config)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.bridge.command_timeout_secs <= 0.0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "bridge.command_timeout_secs".into(),
                message: "command timeout must be greater than 0".into(),
            });
        }

        if self.bridge.poll_timeout_secs < 0.0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "bridge.poll_timeout_secs".into(),
                message: "poll timeout must not be negative".into(),
            });
        }

        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)"
                    .into(),
            });
        }

        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.requests_per_second".into(),
                    message: "requests_per_second must be greater than 0".into(),
                });
            }
            if rl.burst_size == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.burst_size".into(),
                    message: "burst_size must be greater than 0".into(),
                });
            }
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            server: ServerConfig {
                port: 6003,
                host: "0.0.0.0".into(),
                ..ServerConfig::default()
            },
            ..Config::default()
        }
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn valid_config_passes() {
        let issues = valid_config().validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn server_port_zero_is_error() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.port").expect("expected server.port error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn server_host_empty_is_error() {
        let mut cfg = valid_config();
        cfg.server.host = String::new();
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.host").expect("expected server.host error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn zero_command_timeout_is_error() {
        let mut cfg = valid_config();
        cfg.bridge.command_timeout_secs = 0.0;
        let issues = cfg.validate();
        find_issue(&issues, "bridge.command_timeout_secs").expect("expected timeout error");
    }

    #[test]
    fn negative_poll_timeout_is_error() {
        let mut cfg = valid_config();
        cfg.bridge.poll_timeout_secs = -1.0;
        let issues = cfg.validate();
        find_issue(&issues, "bridge.poll_timeout_secs").expect("expected poll timeout error");
    }

    #[test]
    fn zero_poll_timeout_is_valid() {
        let mut cfg = valid_config();
        cfg.bridge.poll_timeout_secs = 0.0;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "bridge.poll_timeout_secs").is_none());
    }

    #[test]
    fn cors_wildcard_is_warning() {
        let mut cfg = valid_config();
        cfg.server.cors.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        let issue =
            find_issue(&issues, "server.cors.allowed_origins").expect("expected CORS warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn rate_limit_zero_rps_is_error() {
        let mut cfg = valid_config();
        cfg.server.rate_limit = Some(RateLimitConfig {
            requests_per_second: 0,
            burst_size: 10,
        });
        let issues = cfg.validate();
        find_issue(&issues, "server.rate_limit.requests_per_second")
            .expect("expected rps error");
    }

    #[test]
    fn defaults_match_original_system() {
        let cfg = Config::default();
        assert_eq!(cfg.server.port, 6003);
        assert_eq!(cfg.bridge.command_timeout_secs, 180.0);
        assert_eq!(cfg.bridge.poll_timeout_secs, 0.0);
        assert!(!cfg.health.include_channel_details);
    }
}
