/// Configuration management for Steeple
use crate::error::{SteepleError, SteepleResult};
use crate::reminders::MAX_WINDOW_MINUTES;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Gateway-documented maximum number of messages per send call
pub const MAX_PUSH_BATCH_SIZE: usize = 90;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub push: PushConfig,
    pub reminders: ReminderConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Externally reachable base URL, used to build magic links
    pub public_url: String,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret for member access tokens
    pub jwt_secret: String,
    /// Shared key for scheduler/service callers
    pub service_role_key: String,
    pub magic_link_ttl_secs: i64,
    pub access_token_ttl_secs: i64,
}

/// Push gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    pub send_url: String,
    pub receipts_url: String,
    pub access_token: Option<String>,
    pub batch_size: usize,
    pub timeout_secs: u64,
    /// Log messages instead of calling the gateway
    pub dry_run: bool,
    /// URL scheme of the mobile app, used for notification deep links
    pub deep_link_scheme: String,
}

/// Scheduled reminder and receipt jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub window_minutes: i64,
    pub receipt_interval_secs: u64,
    /// Minimum ticket age before its receipt is checked
    pub receipt_delay_secs: i64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub unauthenticated_rps: u32,
    pub service_rps: u32,
    pub burst_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> SteepleResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("STEEPLE_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("STEEPLE_PORT")
            .unwrap_or_else(|_| "8787".to_string())
            .parse()
            .map_err(|_| SteepleError::invalid("Invalid port number"))?;
        let public_url = env::var("STEEPLE_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port));
        let version = env!("CARGO_PKG_VERSION").to_string();

        let database_path = env::var("STEEPLE_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/steeple.sqlite"));
        let max_connections = env_or("STEEPLE_DATABASE_MAX_CONNECTIONS", 10);

        let jwt_secret = env::var("STEEPLE_JWT_SECRET")
            .map_err(|_| SteepleError::invalid("STEEPLE_JWT_SECRET is required"))?;
        let service_role_key = env::var("STEEPLE_SERVICE_ROLE_KEY")
            .map_err(|_| SteepleError::invalid("STEEPLE_SERVICE_ROLE_KEY is required"))?;
        let magic_link_ttl_secs = env_or("STEEPLE_MAGIC_LINK_TTL_SECS", 900);
        let access_token_ttl_secs = env_or("STEEPLE_ACCESS_TOKEN_TTL_SECS", 3600);

        let send_url = env::var("EXPO_PUSH_URL")
            .unwrap_or_else(|_| "https://exp.host/--/api/v2/push/send".to_string());
        let receipts_url = env::var("EXPO_RECEIPTS_URL")
            .unwrap_or_else(|_| "https://exp.host/--/api/v2/push/getReceipts".to_string());
        let access_token = env::var("EXPO_ACCESS_TOKEN").ok().filter(|t| !t.is_empty());
        let batch_size = env_or("STEEPLE_PUSH_BATCH_SIZE", MAX_PUSH_BATCH_SIZE);
        let timeout_secs = env_or("STEEPLE_PUSH_TIMEOUT_SECS", 15);
        let dry_run = env_or("STEEPLE_PUSH_DRY_RUN", false);
        let deep_link_scheme =
            env::var("STEEPLE_DEEP_LINK_SCHEME").unwrap_or_else(|_| "myapp".to_string());

        let reminders_enabled = env_or("STEEPLE_REMINDERS_ENABLED", true);
        let interval_secs = env_or("REMINDER_INTERVAL_SECS", 120);
        let window_minutes = env_or("REMINDER_WINDOW_MINUTES", 30);
        let receipt_interval_secs = env_or("RECEIPT_INTERVAL_SECS", 900);
        let receipt_delay_secs = env_or("RECEIPT_DELAY_SECS", 900);

        let rate_limit_enabled = env_or("STEEPLE_RATE_LIMITS_ENABLED", true);
        let authenticated_rps = env_or("STEEPLE_RATE_LIMIT_AUTHENTICATED_RPS", 100);
        let unauthenticated_rps = env_or("STEEPLE_RATE_LIMIT_UNAUTHENTICATED_RPS", 10);
        let service_rps = env_or("STEEPLE_RATE_LIMIT_SERVICE_RPS", 1000);
        let burst_size = env_or("STEEPLE_RATE_LIMIT_BURST", 50);

        let level = env::var("STEEPLE_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());
        let json = env::var("STEEPLE_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                public_url,
                version,
            },
            storage: StorageConfig {
                database_path,
                max_connections,
            },
            authentication: AuthConfig {
                jwt_secret,
                service_role_key,
                magic_link_ttl_secs,
                access_token_ttl_secs,
            },
            push: PushConfig {
                send_url,
                receipts_url,
                access_token,
                batch_size,
                timeout_secs,
                dry_run,
                deep_link_scheme,
            },
            reminders: ReminderConfig {
                enabled: reminders_enabled,
                interval_secs,
                window_minutes,
                receipt_interval_secs,
                receipt_delay_secs,
            },
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                authenticated_rps,
                unauthenticated_rps,
                service_rps,
                burst_size,
            },
            logging: LoggingConfig { level, json },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> SteepleResult<()> {
        if self.service.hostname.is_empty() {
            return Err(SteepleError::invalid("Hostname cannot be empty"));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(SteepleError::invalid(
                "JWT secret must be at least 32 characters",
            ));
        }

        if self.authentication.service_role_key.len() < 16 {
            return Err(SteepleError::invalid(
                "Service role key must be at least 16 characters",
            ));
        }

        if self.push.batch_size == 0 || self.push.batch_size > MAX_PUSH_BATCH_SIZE {
            return Err(SteepleError::invalid(format!(
                "Push batch size must be between 1 and {}",
                MAX_PUSH_BATCH_SIZE
            )));
        }

        if !(1..=MAX_WINDOW_MINUTES).contains(&self.reminders.window_minutes) {
            return Err(SteepleError::invalid(format!(
                "Reminder window must be between 1 and {} minutes",
                MAX_WINDOW_MINUTES
            )));
        }

        if self.reminders.interval_secs == 0 || self.reminders.receipt_interval_secs == 0 {
            return Err(SteepleError::invalid("Job intervals must be at least one second"));
        }

        Ok(())
    }

    /// Configuration for local development and tests
    pub fn development() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 8787,
                public_url: "http://localhost:8787".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            storage: StorageConfig {
                database_path: PathBuf::from("./data/steeple.sqlite"),
                max_connections: 1,
            },
            authentication: AuthConfig {
                jwt_secret: "development-secret-do-not-use-in-production".to_string(),
                service_role_key: "development-service-role-key".to_string(),
                magic_link_ttl_secs: 900,
                access_token_ttl_secs: 3600,
            },
            push: PushConfig {
                send_url: "https://exp.host/--/api/v2/push/send".to_string(),
                receipts_url: "https://exp.host/--/api/v2/push/getReceipts".to_string(),
                access_token: None,
                batch_size: MAX_PUSH_BATCH_SIZE,
                timeout_secs: 15,
                dry_run: true,
                deep_link_scheme: "myapp".to_string(),
            },
            reminders: ReminderConfig {
                enabled: false,
                interval_secs: 120,
                window_minutes: 30,
                receipt_interval_secs: 900,
                receipt_delay_secs: 900,
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                authenticated_rps: 100,
                unauthenticated_rps: 10,
                service_rps: 1000,
                burst_size: 50,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_config_is_valid() {
        assert!(ServerConfig::development().validate().is_ok());
    }

    #[test]
    fn test_rejects_oversized_push_batches() {
        let mut config = ServerConfig::development();
        config.push.batch_size = 100;
        assert!(config.validate().is_err());

        config.push.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_job_intervals() {
        let mut config = ServerConfig::development();
        config.reminders.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::development();
        config.reminders.receipt_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_reminder_window() {
        let mut config = ServerConfig::development();
        config.reminders.window_minutes = 0;
        assert!(config.validate().is_err());

        config.reminders.window_minutes = MAX_WINDOW_MINUTES + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_short_jwt_secret() {
        let mut config = ServerConfig::development();
        config.authentication.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }
}
