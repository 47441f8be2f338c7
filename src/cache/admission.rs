//! 按客户端的准入控制
//!
//! 每个客户端在一个时间窗口内有固定的点数，用完之后进入封禁期。
//! 所有状态都保存在共享存储里，控制器本身只持有配置，可以在任意多个进程中同时运行。

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::keys;
use super::store::{SharedStore, StoreError, bounded};
use crate::config::ConfigError;

/// 共享存储不可用时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// 放行请求
    FailOpen,
    /// 拒绝请求
    FailClosed,
}

impl FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" | "fail-open" | "fail_open" => Ok(FailurePolicy::FailOpen),
            "closed" | "fail-closed" | "fail_closed" => Ok(FailurePolicy::FailClosed),
            other => Err(ConfigError::Invalid {
                var: "RATE_LIMIT_FAILURE_POLICY",
                value: other.to_string(),
            }),
        }
    }
}

/// 准入配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// 每个窗口可消耗的点数
    pub points: u64,
    /// 窗口长度
    pub duration: Duration,
    /// 点数耗尽后的封禁时长，为 0 时不封禁
    pub block_duration: Duration,
    pub failure_policy: FailurePolicy,
    /// 单次共享存储调用的超时
    pub timeout: Duration,
}

impl AdmissionConfig {
    pub fn new(points: u64, duration: Duration, block_duration: Duration) -> Self {
        Self {
            points,
            duration,
            block_duration,
            failure_policy: FailurePolicy::FailClosed,
            timeout: Duration::from_millis(250),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.points == 0 {
            return Err(ConfigError::Invalid {
                var: "RATE_LIMIT_POINTS",
                value: self.points.to_string(),
            });
        }
        if self.duration.is_zero() {
            return Err(ConfigError::Invalid {
                var: "RATE_LIMIT_WINDOW",
                value: format!("{:?}", self.duration),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "STORE_TIMEOUT_MS",
                value: format!("{:?}", self.timeout),
            });
        }
        Ok(())
    }
}

/// 一次准入判断的结果
#[derive(Debug, Clone)]
pub enum AdmissionOutcome {
    /// 消耗了一个点数
    Admitted { remaining: u64 },
    /// 点数耗尽或处于封禁期
    Rejected { retry_after: Duration, blocked: bool },
    /// 共享存储出错，按配置的策略给出结论
    Degraded {
        allowed: bool,
        retry_after: Duration,
        error: StoreError,
    },
}

impl AdmissionOutcome {
    pub fn allowed(&self) -> bool {
        match self {
            AdmissionOutcome::Admitted { .. } => true,
            AdmissionOutcome::Rejected { .. } => false,
            AdmissionOutcome::Degraded { allowed, .. } => *allowed,
        }
    }

    /// 距离下一个可用点数的估计时间，放行时为 0
    pub fn retry_after(&self) -> Duration {
        match self {
            AdmissionOutcome::Admitted { .. } => Duration::ZERO,
            AdmissionOutcome::Rejected { retry_after, .. }
            | AdmissionOutcome::Degraded { retry_after, .. } => *retry_after,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, AdmissionOutcome::Degraded { .. })
    }
}

/// 准入控制器
#[derive(Clone)]
pub struct AdmissionController {
    store: Arc<dyn SharedStore>,
    config: AdmissionConfig,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn SharedStore>, config: AdmissionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// 替换配置
    ///
    /// 已经在执行中的判断仍然使用旧配置；共享存储里已有的计数和封禁不会被清理，
    /// 新的点数上限会在下一次判断时生效。
    pub fn configure(&mut self, config: AdmissionConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// 尝试为客户端消耗一个点数，按配置的策略处理共享存储错误
    pub async fn admit(&self, client_key: &str) -> AdmissionOutcome {
        match self.try_admit(client_key).await {
            Ok(outcome) => outcome,
            Err(error) => {
                let allowed = self.config.failure_policy == FailurePolicy::FailOpen;
                tracing::warn!(
                    client = %client_key,
                    error = %error,
                    allowed,
                    "admission store failure, applying failure policy"
                );
                AdmissionOutcome::Degraded {
                    allowed,
                    retry_after: if allowed {
                        Duration::ZERO
                    } else {
                        self.config.duration
                    },
                    error,
                }
            }
        }
    }

    /// 尝试为客户端消耗一个点数，共享存储错误原样返回
    pub async fn try_admit(&self, client_key: &str) -> Result<AdmissionOutcome, StoreError> {
        let config = self.config;
        let block_key = keys::admission_block_key(client_key);
        let blocking = !config.block_duration.is_zero();

        if blocking {
            if let Some(ttl) = bounded(config.timeout, self.store.ttl(&block_key)).await? {
                tracing::debug!(client = %client_key, retry_after = ?ttl, "client in cooldown");
                return Ok(AdmissionOutcome::Rejected {
                    retry_after: ttl,
                    blocked: true,
                });
            }
        }

        let points_key = keys::admission_points_key(client_key);
        let incr = bounded(
            config.timeout,
            self.store
                .incr_bounded(&points_key, config.points, config.duration),
        )
        .await?;

        if incr.incremented {
            return Ok(AdmissionOutcome::Admitted {
                remaining: config.points.saturating_sub(incr.count),
            });
        }

        if !blocking {
            return Ok(AdmissionOutcome::Rejected {
                retry_after: incr.ttl,
                blocked: false,
            });
        }

        let created = bounded(
            config.timeout,
            self.store
                .set_if_absent(&block_key, "1", config.block_duration),
        )
        .await?;
        let retry_after = if created {
            tracing::warn!(
                client = %client_key,
                block = ?config.block_duration,
                "client exhausted its budget, blocking"
            );
            config.block_duration
        } else {
            bounded(config.timeout, self.store.ttl(&block_key))
                .await?
                .unwrap_or(config.block_duration)
        };

        Ok(AdmissionOutcome::Rejected {
            retry_after,
            blocked: true,
        })
    }

    /// 清除客户端的计数和封禁
    pub async fn reset(&self, client_key: &str) -> Result<(), StoreError> {
        let timeout = self.config.timeout;
        bounded(
            timeout,
            self.store.delete(&keys::admission_points_key(client_key)),
        )
        .await?;
        bounded(
            timeout,
            self.store.delete(&keys::admission_block_key(client_key)),
        )
        .await
    }
}
