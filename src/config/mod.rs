use std::env;
use std::time::Duration;

use crate::cache::{AdmissionConfig, CacheConfig, FailurePolicy};
use crate::pagination::PaginationConfig;

/// 配置错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// 未设置时使用进程内存储，只适合单实例
    pub database_url: Option<String>,
    /// 未设置时使用进程内共享存储，只适合单实例
    pub redis_url: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub rate_limit_points: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_block_secs: u64,
    pub rate_limit_failure_policy: FailurePolicy,
    pub cache_ttl_secs: u64,
    pub store_timeout_ms: u64,
    pub pagination: PaginationConfig,
}

fn optional(var: &'static str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn parse_value<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        value: raw.to_string(),
    })
}

/// 秒数允许带 `s` 后缀，如 `60s`
fn parse_secs(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    let trimmed = raw.trim();
    trimmed
        .strip_suffix('s')
        .unwrap_or(trimmed)
        .parse()
        .map_err(|_| ConfigError::Invalid {
            var,
            value: raw.to_string(),
        })
}

fn parse_or<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    optional(var).map_or(Ok(default), |raw| parse_value(var, &raw))
}

fn secs_or(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    optional(var).map_or(Ok(default), |raw| parse_secs(var, &raw))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let defaults = PaginationConfig::default();
        let config = Config {
            database_url: optional("DATABASE_URL"),
            redis_url: optional("REDIS_URL"),
            server_host: optional("SERVER_HOST").unwrap_or_else(|| "::".to_string()),
            server_port: parse_or("SERVER_PORT", 3000)?,
            api_base_uri: optional("API_BASE_URI").unwrap_or_else(|| "/api".to_string()),
            rate_limit_points: parse_or("RATE_LIMIT_POINTS", 100)?,
            rate_limit_window_secs: secs_or("RATE_LIMIT_WINDOW", 60)?,
            rate_limit_block_secs: secs_or("RATE_LIMIT_BLOCK", 60)?,
            rate_limit_failure_policy: match optional("RATE_LIMIT_FAILURE_POLICY") {
                Some(raw) => raw.parse()?,
                None => FailurePolicy::FailClosed,
            },
            cache_ttl_secs: secs_or("CACHE_TTL", 3600)?,
            store_timeout_ms: parse_or("STORE_TIMEOUT_MS", 250)?,
            pagination: PaginationConfig {
                default_page: parse_or("PAGINATION_DEFAULT_PAGE", defaults.default_page)?,
                default_limit: parse_or("PAGINATION_DEFAULT_LIMIT", defaults.default_limit)?,
                max_limit: parse_or("PAGINATION_MAX_LIMIT", defaults.max_limit)?,
            },
        };

        config.admission().validate()?;
        Ok(config)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn admission(&self) -> AdmissionConfig {
        AdmissionConfig::new(
            self.rate_limit_points,
            self.rate_limit_window(),
            Duration::from_secs(self.rate_limit_block_secs),
        )
        .with_failure_policy(self.rate_limit_failure_policy)
        .with_timeout(self.store_timeout())
    }

    pub fn cache(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(self.cache_ttl_secs),
            timeout: self.store_timeout(),
            pagination: self.pagination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            database_url: None,
            redis_url: None,
            server_host: "127.0.0.1".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            rate_limit_points: 3,
            rate_limit_window_secs: 1,
            rate_limit_block_secs: 5,
            rate_limit_failure_policy: FailurePolicy::FailOpen,
            cache_ttl_secs: 60,
            store_timeout_ms: 100,
            pagination: PaginationConfig::default(),
        }
    }

    #[test]
    fn derived_component_configs() {
        let config = sample();

        let admission = config.admission();
        assert_eq!(admission.points, 3);
        assert_eq!(admission.duration, Duration::from_secs(1));
        assert_eq!(admission.block_duration, Duration::from_secs(5));
        assert_eq!(admission.failure_policy, FailurePolicy::FailOpen);
        assert_eq!(admission.timeout, Duration::from_millis(100));

        let cache = config.cache();
        assert_eq!(cache.ttl, Duration::from_secs(60));
        assert_eq!(cache.timeout, Duration::from_millis(100));
        assert_eq!(cache.pagination.max_limit, 100);
    }

    #[test]
    fn zero_points_fail_validation() {
        let config = Config {
            rate_limit_points: 0,
            ..sample()
        };
        assert!(matches!(
            config.admission().validate(),
            Err(ConfigError::Invalid { var: "RATE_LIMIT_POINTS", .. })
        ));
    }

    #[test]
    fn seconds_suffix_only_on_durations() {
        assert_eq!(parse_secs("CACHE_TTL", "60s"), Ok(60));
        assert_eq!(parse_secs("CACHE_TTL", " 60 "), Ok(60));
        assert!(parse_secs("CACHE_TTL", "60ss").is_err());

        assert_eq!(parse_value::<u16>("SERVER_PORT", "3000"), Ok(3000));
        assert_eq!(
            parse_value::<u16>("SERVER_PORT", "3000s"),
            Err(ConfigError::Invalid {
                var: "SERVER_PORT",
                value: "3000s".to_string(),
            })
        );
        assert!(parse_value::<u64>("RATE_LIMIT_POINTS", "5s").is_err());
    }
}
