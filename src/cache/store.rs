use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

/// 共享存储错误
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("shared store unavailable: {0}")]
    Unavailable(String),
    #[error("shared store timed out after {0:?}")]
    Timeout(Duration),
    #[error("shared store codec error: {0}")]
    Codec(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

/// 有上限的原子自增结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedIncr {
    /// 自增后(或被拒绝时)的计数
    pub count: u64,
    /// 本次调用是否真正增加了计数
    pub incremented: bool,
    /// 计数键剩余存活时间
    pub ttl: Duration,
}

/// 跨进程共享的键值存储
///
/// 限流器和缓存层唯一的协调手段。所有实现必须保证 `incr_bounded`
/// 对同一个键的并发调用是原子的。
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// 当计数小于 `limit` 时原子地加一，首次创建时设置过期时间 `ttl`
    async fn incr_bounded(
        &self,
        key: &str,
        limit: u64,
        ttl: Duration,
    ) -> Result<BoundedIncr, StoreError>;

    /// 键不存在时写入并设置过期时间，返回是否写入
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    /// 键的剩余存活时间，键不存在时返回 `None`
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// 删除所有以 `prefix` 开头的键，返回删除数量
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError>;
}

/// 给共享存储调用加上超时
pub async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}
